//! Measurements and aggregation views

/// A named quantity that can be recorded.
///
/// Created once at process start and immutable thereafter. Names must be
/// unique within a [`MetricRegistry`](super::MetricRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    name: String,
    description: String,
    unit: String,
}

impl Measurement {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            unit: unit.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }
}

/// How recorded samples of a measurement are summarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Number of recorded samples; recorded values are ignored.
    Count,
    /// Running total of recorded values.
    Sum,
    /// Bucketed summary of recorded values.
    Distribution,
    /// Most recently recorded value only.
    LastValue,
}

/// One measurement bound to exactly one aggregation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    measurement: Measurement,
    aggregation: Aggregation,
}

impl View {
    pub fn new(measurement: Measurement, aggregation: Aggregation) -> Self {
        Self {
            measurement,
            aggregation,
        }
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }
}

/// One Count view per measurement, for batch registration without handles.
pub fn views_for_counters(measurements: impl IntoIterator<Item = Measurement>) -> Vec<View> {
    views_for(measurements, Aggregation::Count)
}

/// One Sum view per measurement.
pub fn views_for_sums(measurements: impl IntoIterator<Item = Measurement>) -> Vec<View> {
    views_for(measurements, Aggregation::Sum)
}

/// One Distribution view per measurement.
pub fn views_for_distributions(measurements: impl IntoIterator<Item = Measurement>) -> Vec<View> {
    views_for(measurements, Aggregation::Distribution)
}

/// One LastValue view per measurement.
pub fn views_for_last_values(measurements: impl IntoIterator<Item = Measurement>) -> Vec<View> {
    views_for(measurements, Aggregation::LastValue)
}

fn views_for(
    measurements: impl IntoIterator<Item = Measurement>,
    aggregation: Aggregation,
) -> Vec<View> {
    measurements
        .into_iter()
        .map(|measurement| View::new(measurement, aggregation))
        .collect()
}
