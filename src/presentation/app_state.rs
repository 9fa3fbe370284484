// Application state for HTTP handlers
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::application::monitor_service::PackMonitorService;

pub struct AppState {
    pub monitor: Arc<PackMonitorService>,
    /// Connectivity signal maintained by the subscription pump, outside
    /// the ingestion core.
    pub connected: Arc<AtomicBool>,
}
