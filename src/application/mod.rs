// Application layer - Use cases and ports
pub mod aggregation_service;
pub mod fetch_cache;
pub mod selection_store;
pub mod telemetry_source;
