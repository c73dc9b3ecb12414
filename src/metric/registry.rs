//! Measurement registration and recording handles

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use thiserror::Error;

use super::view::{Aggregation, Measurement, View};

/// Errors from measurement registration and the metrics endpoint bootstrap
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("measurement name cannot be empty")]
    EmptyName,

    #[error("measurement '{name}' is already registered with {existing:?} aggregation")]
    DuplicateMeasurementName { name: String, existing: Aggregation },

    #[error("metrics recorder already installed: {0}")]
    RecorderInstall(String),

    #[error("failed to bind metrics listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("metrics listener failed: {0}")]
    Listener(#[source] std::io::Error),

    #[error("metrics listener stopped unexpectedly")]
    ListenerStopped,
}

/// Tracks registered measurement names and their aggregation views.
///
/// Registration detects duplicate names; the record path never touches the
/// registry, so recording stays lock-free in this layer.
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    views: Arc<Mutex<HashMap<String, View>>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a Count-aggregated measurement and return its handle.
    pub fn counter(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Result<Counter, MetricError> {
        let measurement = Measurement::new(name, description, unit);
        Ok(Counter {
            measurement: self.register_handle(measurement, Aggregation::Count)?,
        })
    }

    /// Register a Sum-aggregated measurement and return its handle.
    pub fn sum(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Result<Sum, MetricError> {
        let measurement = Measurement::new(name, description, unit);
        Ok(Sum {
            measurement: self.register_handle(measurement, Aggregation::Sum)?,
        })
    }

    /// Register a Distribution-aggregated measurement and return its handle.
    pub fn distribution(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Result<Distribution, MetricError> {
        let measurement = Measurement::new(name, description, unit);
        Ok(Distribution {
            measurement: self.register_handle(measurement, Aggregation::Distribution)?,
        })
    }

    /// Register a LastValue-aggregated measurement and return its handle.
    pub fn last_value(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Result<LastValue, MetricError> {
        let measurement = Measurement::new(name, description, unit);
        Ok(LastValue {
            measurement: self.register_handle(measurement, Aggregation::LastValue)?,
        })
    }

    /// Register a batch of pre-built views.
    ///
    /// The batch is checked as a whole before anything is registered: a name
    /// collision with the registry or within the batch registers nothing.
    pub fn register_views(
        &self,
        views: impl IntoIterator<Item = View>,
    ) -> Result<(), MetricError> {
        let batch: Vec<View> = views.into_iter().collect();
        let mut registered = self.views.lock().unwrap();

        let mut incoming: HashMap<&str, Aggregation> = HashMap::new();
        for view in &batch {
            let name = view.measurement().name();
            if name.is_empty() {
                return Err(MetricError::EmptyName);
            }
            if let Some(existing) = registered.get(name) {
                return Err(MetricError::DuplicateMeasurementName {
                    name: name.to_string(),
                    existing: existing.aggregation(),
                });
            }
            if let Some(existing) = incoming.insert(name, view.aggregation()) {
                return Err(MetricError::DuplicateMeasurementName {
                    name: name.to_string(),
                    existing,
                });
            }
        }

        for view in batch {
            announce(&view);
            registered.insert(view.measurement().name().to_string(), view);
        }

        Ok(())
    }

    /// Whether a measurement name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.views.lock().unwrap().contains_key(name)
    }

    /// Number of registered views.
    pub fn len(&self) -> usize {
        self.views.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-announce every registered view's description and unit.
    ///
    /// Announcements made before a recorder is installed go nowhere, so the
    /// endpoint bootstrap replays them once the recorder exists.
    pub(crate) fn announce_all(&self) {
        for view in self.views.lock().unwrap().values() {
            announce(view);
        }
    }

    fn register_handle(
        &self,
        measurement: Measurement,
        aggregation: Aggregation,
    ) -> Result<Arc<Measurement>, MetricError> {
        let view = View::new(measurement.clone(), aggregation);
        let name = view.measurement().name();
        if name.is_empty() {
            return Err(MetricError::EmptyName);
        }

        let mut registered = self.views.lock().unwrap();
        if let Some(existing) = registered.get(name) {
            return Err(MetricError::DuplicateMeasurementName {
                name: name.to_string(),
                existing: existing.aggregation(),
            });
        }

        announce(&view);
        registered.insert(name.to_string(), view);

        Ok(Arc::new(measurement))
    }
}

/// Announce a view's description and unit to the current recorder.
fn announce(view: &View) {
    let m = view.measurement();
    let name = m.name().to_string();
    let description = m.description().to_string();

    match (view.aggregation(), Unit::from_string(m.unit())) {
        (Aggregation::Count | Aggregation::Sum, Some(unit)) => {
            describe_counter!(name, unit, description)
        }
        (Aggregation::Count | Aggregation::Sum, None) => describe_counter!(name, description),
        (Aggregation::Distribution, Some(unit)) => describe_histogram!(name, unit, description),
        (Aggregation::Distribution, None) => describe_histogram!(name, description),
        (Aggregation::LastValue, Some(unit)) => describe_gauge!(name, unit, description),
        (Aggregation::LastValue, None) => describe_gauge!(name, description),
    }
}

/// Handle for a Count-aggregated measurement.
///
/// The aggregation counts samples: `record` increments the count by one
/// regardless of the value passed.
#[derive(Debug, Clone)]
pub struct Counter {
    measurement: Arc<Measurement>,
}

impl Counter {
    /// Record one sample. Never blocks and never fails.
    pub fn record(&self, value: i64) {
        let _ = value;
        counter!(self.measurement.name().to_string()).increment(1);
    }

    /// Record one sample carrying label pairs.
    pub fn record_tagged(&self, value: i64, tags: &[(&'static str, String)]) {
        let _ = value;
        counter!(self.measurement.name().to_string(), tags).increment(1);
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }
}

/// Handle for a Sum-aggregated measurement.
///
/// The running total is monotonic; negative values clamp to zero.
#[derive(Debug, Clone)]
pub struct Sum {
    measurement: Arc<Measurement>,
}

impl Sum {
    /// Add `value` to the running total. Never blocks and never fails.
    pub fn record(&self, value: i64) {
        counter!(self.measurement.name().to_string()).increment(clamp_to_u64(value));
    }

    /// Add `value` to the total tracked under the given label pairs.
    pub fn record_tagged(&self, value: i64, tags: &[(&'static str, String)]) {
        counter!(self.measurement.name().to_string(), tags).increment(clamp_to_u64(value));
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }
}

/// Handle for a Distribution-aggregated measurement.
#[derive(Debug, Clone)]
pub struct Distribution {
    measurement: Arc<Measurement>,
}

impl Distribution {
    /// Record `value` into the distribution. Never blocks and never fails.
    pub fn record(&self, value: i64) {
        histogram!(self.measurement.name().to_string()).record(value as f64);
    }

    /// Record `value` into the distribution under the given label pairs.
    pub fn record_tagged(&self, value: i64, tags: &[(&'static str, String)]) {
        histogram!(self.measurement.name().to_string(), tags).record(value as f64);
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }
}

/// Handle for a LastValue-aggregated measurement.
#[derive(Debug, Clone)]
pub struct LastValue {
    measurement: Arc<Measurement>,
}

impl LastValue {
    /// Replace the tracked value with `value`. Never blocks and never fails.
    pub fn record(&self, value: i64) {
        gauge!(self.measurement.name().to_string()).set(value as f64);
    }

    /// Replace the value tracked under the given label pairs.
    pub fn record_tagged(&self, value: i64, tags: &[(&'static str, String)]) {
        gauge!(self.measurement.name().to_string(), tags).set(value as f64);
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }
}

fn clamp_to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::view::views_for_counters;
    use metrics::SharedString;
    use metrics_util::CompositeKey;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use ordered_float::OrderedFloat;

    type SnapshotEntry = (CompositeKey, Option<Unit>, Option<SharedString>, DebugValue);

    /// Run `f` against a fresh debugging recorder and return what it saw.
    fn capture(f: impl FnOnce()) -> Vec<SnapshotEntry> {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        metrics::with_local_recorder(&recorder, f);
        snapshotter.snapshot().into_vec()
    }

    fn find_value(entries: &[SnapshotEntry], name: &str) -> Option<DebugValue> {
        entries
            .iter()
            .find(|(key, ..)| key.key().name() == name)
            // DebugValue does not implement Clone; rebuild it by variant.
            .map(|(.., value)| match value {
                DebugValue::Counter(v) => DebugValue::Counter(*v),
                DebugValue::Gauge(v) => DebugValue::Gauge(*v),
                DebugValue::Histogram(values) => DebugValue::Histogram(values.clone()),
            })
    }

    #[test]
    fn test_counter_counts_records_and_ignores_values() {
        let entries = capture(|| {
            let registry = MetricRegistry::new();
            let hits = registry.counter("test_hits", "Hits", "1").unwrap();
            hits.record(5);
            hits.record(100);
        });

        assert_eq!(
            find_value(&entries, "test_hits"),
            Some(DebugValue::Counter(2))
        );
    }

    #[test]
    fn test_sum_adds_recorded_values() {
        let entries = capture(|| {
            let registry = MetricRegistry::new();
            let bytes = registry.sum("test_bytes", "Bytes sent", "By").unwrap();
            bytes.record(3);
            bytes.record(4);
        });

        assert_eq!(
            find_value(&entries, "test_bytes"),
            Some(DebugValue::Counter(7))
        );
    }

    #[test]
    fn test_sum_clamps_negative_values_to_zero() {
        let entries = capture(|| {
            let registry = MetricRegistry::new();
            let total = registry.sum("test_total", "Total", "1").unwrap();
            total.record(-5);
            total.record(3);
        });

        assert_eq!(
            find_value(&entries, "test_total"),
            Some(DebugValue::Counter(3))
        );
    }

    #[test]
    fn test_distribution_captures_each_value() {
        let entries = capture(|| {
            let registry = MetricRegistry::new();
            let latency = registry
                .distribution("test_latency", "Latency", "ms")
                .unwrap();
            latency.record(1);
            latency.record(2);
            latency.record(2);
        });

        assert_eq!(
            find_value(&entries, "test_latency"),
            Some(DebugValue::Histogram(vec![
                OrderedFloat(1.0),
                OrderedFloat(2.0),
                OrderedFloat(2.0),
            ]))
        );
    }

    #[test]
    fn test_last_value_keeps_most_recent() {
        let entries = capture(|| {
            let registry = MetricRegistry::new();
            let depth = registry.last_value("test_depth", "Queue depth", "1").unwrap();
            depth.record(1);
            depth.record(9);
        });

        assert_eq!(
            find_value(&entries, "test_depth"),
            Some(DebugValue::Gauge(OrderedFloat(9.0)))
        );
    }

    #[test]
    fn test_tagged_records_carry_labels() {
        let entries = capture(|| {
            let registry = MetricRegistry::new();
            let hits = registry.counter("test_tagged", "Tagged hits", "1").unwrap();
            hits.record_tagged(1, &[("route", "/".to_string())]);
        });

        let (key, ..) = entries
            .iter()
            .find(|(key, ..)| key.key().name() == "test_tagged")
            .expect("tagged counter not recorded");

        let labels: Vec<_> = key.key().labels().collect();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].key(), "route");
        assert_eq!(labels[0].value(), "/");
    }

    #[test]
    fn test_registration_announces_description_and_unit() {
        let entries = capture(|| {
            let registry = MetricRegistry::new();
            let sent = registry.sum("test_sent", "Bytes sent to peers", "bytes").unwrap();
            sent.record(1);
        });

        let (_, unit, description, _) = entries
            .iter()
            .find(|(key, ..)| key.key().name() == "test_sent")
            .expect("sum not recorded");

        assert_eq!(*unit, Some(Unit::Bytes));
        assert_eq!(description.as_deref(), Some("Bytes sent to peers"));
    }

    #[test]
    fn test_record_without_recorder_is_silent() {
        let registry = MetricRegistry::new();
        let hits = registry.counter("test_noop", "Hits", "1").unwrap();

        // No recorder installed here; recording must not raise.
        hits.record(1);
        hits.record_tagged(1, &[("k", "v".to_string())]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = MetricRegistry::new();
        registry.counter("dup", "First", "1").unwrap();

        let err = registry.counter("dup", "Second", "1").unwrap_err();
        assert!(matches!(
            err,
            MetricError::DuplicateMeasurementName { ref name, existing: Aggregation::Count }
                if name == "dup"
        ));
    }

    #[test]
    fn test_duplicate_across_aggregation_kinds_rejected() {
        let registry = MetricRegistry::new();
        registry.sum("shared", "First", "1").unwrap();

        let err = registry.distribution("shared", "Second", "1").unwrap_err();
        assert!(matches!(
            err,
            MetricError::DuplicateMeasurementName { existing: Aggregation::Sum, .. }
        ));
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = MetricRegistry::new();
        assert!(matches!(
            registry.counter("", "No name", "1"),
            Err(MetricError::EmptyName)
        ));
    }

    #[test]
    fn test_register_views_bulk() {
        let registry = MetricRegistry::new();
        let views = views_for_counters(vec![
            Measurement::new("bulk_a", "First", "1"),
            Measurement::new("bulk_b", "Second", "1"),
        ]);

        registry.register_views(views).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("bulk_a"));
        assert!(registry.contains("bulk_b"));
    }

    #[test]
    fn test_register_views_batch_is_atomic() {
        let registry = MetricRegistry::new();
        let views = views_for_counters(vec![
            Measurement::new("atomic_a", "First", "1"),
            Measurement::new("atomic_a", "Duplicate", "1"),
        ]);

        assert!(matches!(
            registry.register_views(views),
            Err(MetricError::DuplicateMeasurementName { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_views_rejects_collision_with_registry() {
        let registry = MetricRegistry::new();
        registry.counter("taken", "Handle", "1").unwrap();

        let views = views_for_counters(vec![
            Measurement::new("fresh", "New", "1"),
            Measurement::new("taken", "Collides", "1"),
        ]);

        assert!(registry.register_views(views).is_err());
        assert!(!registry.contains("fresh"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_handles_are_cloneable() {
        let registry = MetricRegistry::new();
        let hits = registry.counter("test_clone", "Hits", "1").unwrap();
        let clone = hits.clone();

        assert_eq!(clone.measurement().name(), "test_clone");
    }
}
