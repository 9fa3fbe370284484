// Application layer - Use cases around the ingestion pipeline
pub mod metrics;
pub mod monitor_service;
pub mod normalizer;
pub mod telemetry_source;
