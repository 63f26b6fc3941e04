// Metric definitions supplied by configuration
use std::collections::HashMap;

/// How raw readings of a metric relate to consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonic counter (kWh meter, water meter); consumption is a difference.
    Accumulator,
    /// Point-in-time gauge (temperature, power); slots are averaged.
    Instantaneous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YAxisPosition {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    pub metric_type: String,
    pub telemetry_key: String,
    pub kind: MetricKind,
    pub unit: String,
    pub y_axis_position: YAxisPosition,
    pub decimal_places: u32,
}

impl MetricDefinition {
    pub fn new(
        metric_type: String,
        telemetry_key: String,
        kind: MetricKind,
        unit: String,
        y_axis_position: YAxisPosition,
        decimal_places: u32,
    ) -> Self {
        Self {
            metric_type,
            telemetry_key,
            kind,
            unit,
            y_axis_position,
            decimal_places,
        }
    }

    pub fn is_accumulator(&self) -> bool {
        self.kind == MetricKind::Accumulator
    }

    /// Round a value to the configured display precision.
    pub fn round(&self, value: f64) -> f64 {
        let factor = 10f64.powi(self.decimal_places as i32);
        (value * factor).round() / factor
    }
}

/// Lookup of configured metrics by type.
#[derive(Debug, Clone, Default)]
pub struct MetricCatalog {
    metrics: HashMap<String, MetricDefinition>,
}

impl MetricCatalog {
    pub fn new(definitions: Vec<MetricDefinition>) -> Self {
        Self {
            metrics: definitions
                .into_iter()
                .map(|m| (m.metric_type.clone(), m))
                .collect(),
        }
    }

    pub fn get(&self, metric_type: &str) -> Option<&MetricDefinition> {
        self.metrics.get(metric_type)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }
}
