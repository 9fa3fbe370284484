// Source trait for live pack telemetry
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

/// Raw snapshots pushed by the transport, in arrival order.
pub type PayloadStream = BoxStream<'static, Value>;

/// Access to the upstream telemetry feed.
///
/// The contract with the controller is exactly "deliver a parsed JSON
/// document, or nothing"; connectivity failures surface here and never
/// reach the normalization core.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// One-shot pull of the current snapshot. `Ok(None)` means the
    /// source holds no data.
    async fn fetch_latest(&self) -> anyhow::Result<Option<Value>>;

    /// Open a live snapshot stream. The stream covers a single
    /// connection and ends when the transport disconnects; dropping it
    /// unsubscribes.
    async fn subscribe(&self) -> anyhow::Result<PayloadStream>;
}
