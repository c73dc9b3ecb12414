//! Thin observability layer for small services
//!
//! Wraps metric aggregation, span export, and environment lookups behind
//! facades small enough to wire up in a few lines:
//! - Named measurements aggregated as counts, sums, distributions, or last
//!   values, scraped over a Prometheus endpoint
//! - OpenTelemetry span export with always-on sampling
//! - Environment variable snapshots with default, required, and integer
//!   accessors
//! - Structured log output shared by plain and span-exporting processes

pub mod config;
pub mod logging;
pub mod metric;
pub mod trace;

pub use config::{env, EnvVar, EnvVarError};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metric::{
    serve_metrics, views_for_counters, views_for_distributions, views_for_last_values,
    views_for_sums, Aggregation, Counter, Distribution, LastValue, Measurement, MetricError,
    MetricRegistry, MetricsServer, Sum, View,
};
pub use trace::{init_traces, start_span, Telemetry, TraceConfig, TraceError};
