// Telemetry data domain models
use crate::domain::error::FetchError;
use std::collections::BTreeMap;

/// One reading for a single (entity, metric key) pair.
///
/// `has_data` distinguishes a real reading from a placeholder the upstream
/// source emits for an empty slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp_ms: i64,
    pub value: f64,
    pub has_data: bool,
}

impl Sample {
    pub fn new(timestamp_ms: i64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
            has_data: true,
        }
    }

    pub fn empty(timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            value: 0.0,
            has_data: false,
        }
    }
}

/// Validated result of one upstream fetch: samples grouped by metric key,
/// each series sorted by timestamp ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryPayload {
    series: BTreeMap<String, Vec<Sample>>,
}

impl TelemetryPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, key: impl Into<String>, samples: Vec<Sample>) -> Self {
        self.insert(key, samples);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, mut samples: Vec<Sample>) {
        samples.sort_by_key(|s| s.timestamp_ms);
        self.series.insert(key.into(), samples);
    }

    pub fn samples(&self, key: &str) -> Option<&[Sample]> {
        self.series.get(key).map(Vec::as_slice)
    }

    /// Samples for `key`, or a data-shape error when the source dropped the key
    /// from its response entirely. An empty series is valid ("no data in range").
    pub fn require(&self, key: &str) -> Result<&[Sample], FetchError> {
        self.samples(key)
            .ok_or_else(|| FetchError::DataShape(format!("response is missing metric key '{}'", key)))
    }

    pub fn sample_count(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregation {
    None,
    Avg,
    Min,
    Max,
    Sum,
    Count,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::None => "NONE",
            Aggregation::Avg => "AVG",
            Aggregation::Min => "MIN",
            Aggregation::Max => "MAX",
            Aggregation::Sum => "SUM",
            Aggregation::Count => "COUNT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderBy {
    Asc,
    Desc,
}

impl OrderBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderBy::Asc => "ASC",
            OrderBy::Desc => "DESC",
        }
    }
}

/// The logical query sent to a telemetry source for one entity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TelemetryQuery {
    pub keys: Vec<String>,
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
    pub interval_ms: Option<i64>,
    pub aggregation: Option<Aggregation>,
    pub limit: Option<u32>,
    pub order_by: Option<OrderBy>,
}

impl TelemetryQuery {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn range(mut self, start_ts: i64, end_ts: i64) -> Self {
        self.start_ts = Some(start_ts);
        self.end_ts = Some(end_ts);
        self
    }

    pub fn interval(mut self, interval_ms: i64) -> Self {
        self.interval_ms = Some(interval_ms);
        self
    }

    pub fn aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_sorts_samples() {
        let payload = TelemetryPayload::new().with_series(
            "energy",
            vec![Sample::new(2_000, 2.0), Sample::new(1_000, 1.0)],
        );

        let samples = payload.samples("energy").unwrap();
        assert_eq!(samples[0].timestamp_ms, 1_000);
        assert_eq!(samples[1].timestamp_ms, 2_000);
        assert_eq!(payload.sample_count(), 2);
    }

    #[test]
    fn test_require_distinguishes_missing_key_from_empty_series() {
        let payload = TelemetryPayload::new().with_series("energy", Vec::new());

        assert!(payload.require("energy").unwrap().is_empty());
        assert!(matches!(
            payload.require("temperature"),
            Err(FetchError::DataShape(_))
        ));
    }
}
