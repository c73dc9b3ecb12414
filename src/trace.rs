//! OpenTelemetry span export and the span-starting entry point

use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::logging::{self, LoggingConfig};

/// Errors from span-export setup
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("failed to build span exporter: {0}")]
    ExporterBuild(#[from] opentelemetry::trace::TraceError),

    #[error("telemetry subscriber already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Span export configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TraceConfig {
    /// Agent address as `host:port`, used when no collector URL is set
    #[serde(default = "default_agent_addr")]
    pub agent_addr: String,
    /// Collector endpoint URL, preferred over the agent address when set
    #[serde(default)]
    pub collector_url: Option<String>,
    /// Service identity attached to every exported span
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_agent_addr() -> String {
    "localhost:6831".to_string()
}

fn default_service_name() -> String {
    "behold".to_string()
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            agent_addr: default_agent_addr(),
            collector_url: None,
            service_name: default_service_name(),
        }
    }
}

impl TraceConfig {
    /// Export endpoint: the collector URL when one is configured, otherwise
    /// the agent address with a scheme prefixed when it lacks one.
    fn endpoint(&self) -> String {
        match self.collector_url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ if self.agent_addr.contains("://") => self.agent_addr.clone(),
            _ => format!("http://{}", self.agent_addr),
        }
    }
}

/// Owns the tracer provider for the life of the process.
///
/// Dropping the handle without calling [`shutdown`](Telemetry::shutdown)
/// loses spans still sitting in the batch queue.
#[derive(Debug)]
pub struct Telemetry {
    provider: TracerProvider,
}

impl Telemetry {
    /// Flush pending spans and stop the exporter.
    pub fn shutdown(self) {
        if let Err(e) = self.provider.shutdown() {
            tracing::error!("Failed to shutdown tracer provider: {}", e);
        }
    }
}

/// Initialize span export and the process-wide subscriber.
///
/// Every span is sampled and exported in batches to the configured
/// endpoint, tagged with the configured service name. Log output follows
/// `logging_config`, so processes call either this or
/// [`init_logging`](crate::logging::init_logging), not both.
pub fn init_traces(
    logging_config: &LoggingConfig,
    config: &TraceConfig,
) -> Result<Telemetry, TraceError> {
    let endpoint = config.endpoint();
    let provider = build_tracer_provider(config, &endpoint)?;
    let tracer = provider.tracer("behold");
    let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(logging::env_filter(logging_config))
        .with(logging::fmt_layer(logging_config))
        .with(telemetry_layer)
        .try_init()?;

    global::set_text_map_propagator(TraceContextPropagator::new());

    tracing::info!(
        "Tracing initialized for '{}' with export to {}",
        config.service_name,
        endpoint
    );

    Ok(Telemetry { provider })
}

fn build_tracer_provider(
    config: &TraceConfig,
    endpoint: &str,
) -> Result<TracerProvider, opentelemetry::trace::TraceError> {
    let resource = Resource::new(vec![KeyValue::new(
        "service.name",
        config.service_name.clone(),
    )]);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = TracerProvider::builder()
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .with_batch_exporter(exporter, runtime::Tokio)
        .build();

    Ok(provider)
}

/// Start a span as a child of whichever span is current.
///
/// The returned span carries `name` on export. Enter it (or instrument a
/// future with it) for the duration of the unit of work; it ends when the
/// last handle drops. Without an initialized subscriber the span is
/// disabled and recording into it does nothing.
pub fn start_span(name: &str) -> Span {
    tracing::info_span!("span", otel.name = name)
}
