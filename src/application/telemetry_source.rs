// Port for telemetry data access
use crate::domain::error::FetchError;
use crate::domain::telemetry::{TelemetryPayload, TelemetryQuery};
use async_trait::async_trait;

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Fetch samples for one entity, grouped by the requested metric keys.
    ///
    /// Implementations keep the requested key association, report timestamps
    /// as epoch milliseconds, and return an empty series (not an error) when
    /// the range holds no data.
    async fn fetch(&self, entity_id: &str, query: &TelemetryQuery) -> Result<TelemetryPayload, FetchError>;
}
