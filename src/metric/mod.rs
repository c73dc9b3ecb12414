//! Metric facade - named measurements, aggregation views, and the
//! Prometheus scrape endpoint

mod exporter;
mod registry;
mod view;

pub use exporter::{serve_metrics, MetricsServer};
pub use registry::{Counter, Distribution, LastValue, MetricError, MetricRegistry, Sum};
pub use view::{
    views_for_counters, views_for_distributions, views_for_last_values, views_for_sums,
    Aggregation, Measurement, View,
};
