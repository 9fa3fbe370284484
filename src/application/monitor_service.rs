// Pack monitor service - Owns the latest snapshot and the rolling history
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::application::metrics::extract_metrics;
use crate::application::normalizer::Normalizer;
use crate::application::telemetry_source::TelemetrySource;
use crate::domain::history::{HistoryBuffer, HistoryView};
use crate::domain::payload::CanonicalPayload;
use crate::domain::telemetry::HistorySample;

/// Dashboard state controller.
///
/// Every ingestion - push delivery or pull refresh - funnels through
/// [`ingest`](Self::ingest): normalize, replace the latest-payload slot
/// wholesale, derive metrics, append one history sample. Slot and buffer
/// live behind a single exclusive lock; normalization and extraction run
/// before it is taken, and it is never held across an await point.
pub struct PackMonitorService {
    source: Arc<dyn TelemetrySource>,
    normalizer: Normalizer,
    state: RwLock<MonitorState>,
}

#[derive(Default)]
struct MonitorState {
    latest: Option<CanonicalPayload>,
    history: HistoryBuffer,
}

impl PackMonitorService {
    pub fn new(source: Arc<dyn TelemetrySource>, normalizer: Normalizer) -> Self {
        Self {
            source,
            normalizer,
            state: RwLock::new(MonitorState::default()),
        }
    }

    /// Single ingestion entrypoint. An absent or JSON-null payload is a
    /// complete no-op: no state mutation, no history append, no error.
    pub async fn ingest(&self, raw: Option<Value>) {
        let Some(raw) = raw else { return };
        if raw.is_null() {
            return;
        }

        let now_ms = Utc::now().timestamp_millis();
        let payload = self.normalizer.normalize(raw, now_ms);
        let time = payload.timestamp_ms().unwrap_or(now_ms);
        let sample = HistorySample::new(time, extract_metrics(&payload));

        let mut state = self.state.write().await;
        state.latest = Some(payload);
        state.history.append(sample);
    }

    /// On-demand pull, funneled through the same ingestion entrypoint as
    /// push deliveries. Returns the snapshot current after the pull; on
    /// transport failure existing state stays untouched.
    pub async fn refresh(&self) -> anyhow::Result<Option<CanonicalPayload>> {
        let raw = self.source.fetch_latest().await?;
        self.ingest(raw).await;
        Ok(self.latest().await)
    }

    pub async fn latest(&self) -> Option<CanonicalPayload> {
        self.state.read().await.latest.clone()
    }

    pub async fn history(&self) -> HistoryView {
        self.state.read().await.history.view()
    }
}
