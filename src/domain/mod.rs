// Domain layer - Battery pack telemetry data models
pub mod history;
pub mod payload;
pub mod telemetry;
