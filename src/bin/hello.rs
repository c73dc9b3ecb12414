//! Demo service answering `hello\n` on `/`, with one span and one counted
//! hit per request and a metrics endpoint beside it.

use std::future::IntoFuture;
use std::net::{AddrParseError, SocketAddr};

use axum::{extract::State, routing::get, Router};
use tokio::net::TcpListener;
use tracing::info;

use behold::config;
use behold::logging::LoggingConfig;
use behold::metric::{Counter, MetricRegistry};
use behold::trace::{self, TraceConfig};

#[derive(Clone)]
struct HelloState {
    hits: Counter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let agent_addr = config::env("JAEGER_AGENT_ADDR").with_default("localhost:6831");
    let collector_url = config::env("JAEGER_COLLECTOR_URL").with_default("http://localhost:14268");
    let metrics_addr = config::env("METRICS_ADDR").with_default(":8081");
    let hello_addr = config::env("HELLO_ADDR").with_default(":8080");

    let logging_config = LoggingConfig::default();
    let trace_config = TraceConfig {
        agent_addr,
        collector_url: Some(collector_url),
        service_name: "hello".to_string(),
    };
    let telemetry = trace::init_traces(&logging_config, &trace_config)?;

    let registry = MetricRegistry::default();
    let hits = registry.counter(
        "hello/hits",
        "The number of hits received on / endpoint",
        "1",
    )?;

    let metrics = behold::serve_metrics(&registry, parse_listen_addr(&metrics_addr)?, []).await?;

    let app = hello_router(HelloState { hits });
    let addr = parse_listen_addr(&hello_addr)?;
    let listener = TcpListener::bind(addr).await?;
    info!("Hello serving on {}", addr);

    let result = tokio::select! {
        served = axum::serve(listener, app).into_future() => served.map_err(anyhow::Error::from),
        stopped = metrics.closed() => Err(stopped.into()),
    };

    telemetry.shutdown();
    result
}

fn hello_router(state: HelloState) -> Router {
    Router::new().route("/", get(hello)).with_state(state)
}

async fn hello(State(state): State<HelloState>) -> &'static str {
    let span = trace::start_span("hello");
    let _guard = span.enter();

    state.hits.record(1);
    info!("hit");

    "hello\n"
}

/// Listen addresses accept the bare `:port` shorthand for all interfaces.
fn parse_listen_addr(addr: &str) -> Result<SocketAddr, AddrParseError> {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}").parse()
    } else {
        addr.parse()
    }
}
