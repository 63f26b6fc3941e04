// Domain layer - Pure telemetry aggregation pipeline
pub mod alignment;
pub mod bucket;
pub mod differential;
pub mod error;
pub mod fingerprint;
pub mod merge;
pub mod metric;
pub mod resolution;
pub mod telemetry;
