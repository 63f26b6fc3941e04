// Canonical cache keys for telemetry queries
use crate::domain::telemetry::TelemetryQuery;
use std::fmt;

const NONE_TOKEN: &str = "none";
const NOW_TOKEN: &str = "now";
const LATEST_TOKEN: &str = "latest";
const SEPARATOR: char = '|';

/// Stable key identifying the semantic content of a telemetry query.
///
/// Metric keys are sorted and de-duplicated, so `[b, a]` and `[a, b, a]`
/// produce the same fingerprint. Omitted optional fields render as fixed
/// lowercase tokens, while explicit values render in their own form
/// (`Aggregation::None` is `NONE`), keeping "omitted" and "explicit default"
/// apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryFingerprint(String);

impl QueryFingerprint {
    pub fn new(entity_id: &str, query: &TelemetryQuery) -> Self {
        let mut keys: Vec<&str> = query.keys.iter().map(String::as_str).collect();
        keys.sort_unstable();
        keys.dedup();

        let fields = [
            entity_id.to_string(),
            keys.join(","),
            token_or(query.start_ts, NONE_TOKEN),
            token_or(query.end_ts, NOW_TOKEN),
            token_or(query.interval_ms, NONE_TOKEN),
            query
                .aggregation
                .map(|a| a.as_str().to_string())
                .unwrap_or_else(|| NONE_TOKEN.to_string()),
            token_or(query.limit, NONE_TOKEN),
            query
                .order_by
                .map(|o| o.as_str().to_string())
                .unwrap_or_else(|| LATEST_TOKEN.to_string()),
        ];

        Self(fields.join(&SEPARATOR.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn token_or<T: ToString>(value: Option<T>, sentinel: &str) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| sentinel.to_string())
}
