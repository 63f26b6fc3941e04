// Error taxonomy for the aggregation core
use std::time::Duration;
use thiserror::Error;

/// Failure of a single upstream fetch.
///
/// `Clone` because one coalesced fetch delivers the same outcome to every
/// caller awaiting it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed telemetry response: {0}")]
    DataShape(String),

    #[error("telemetry request timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure of the backing cache store. Never surfaced past the cache.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("cache write failed: {0}")]
    Write(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AggregationError {
    #[error("unknown metric type: {0}")]
    UnknownMetric(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("aggregate query timed out after {0:?}")]
    Timeout(Duration),

    #[error("entity fetches failed: {0}")]
    EntityFailures(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
