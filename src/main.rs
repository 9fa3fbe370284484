// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::application::monitor_service::PackMonitorService;
use crate::application::normalizer::Normalizer;
use crate::application::telemetry_source::TelemetrySource;
use crate::infrastructure::config::{load_monitor_config, load_source_config};
use crate::infrastructure::rtdb_source::RtdbSource;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    connection_status, health_check, history, latest_snapshot, refresh,
};

/// Bound on push deliveries waiting for the serial drain task.
const INGEST_QUEUE_DEPTH: usize = 32;

/// Delay before the pump reopens a dropped subscription.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let source_config = load_source_config()?;
    let monitor_config = load_monitor_config()?;

    // Create transport (infrastructure layer)
    let source = Arc::new(RtdbSource::new(
        source_config.rtdb.database_url,
        source_config.rtdb.path,
        source_config.rtdb.auth_token,
    ));

    // Create the monitor service (application layer)
    let monitor = Arc::new(PackMonitorService::new(
        source.clone(),
        Normalizer::new(monitor_config.normalizer.options()),
    ));
    let connected = Arc::new(AtomicBool::new(false));

    // Push deliveries flow through one bounded channel drained by a
    // single task, so ingestion happens one event at a time.
    let (tx, rx) = mpsc::channel::<Value>(INGEST_QUEUE_DEPTH);
    tokio::spawn(run_subscription_pump(source, tx, connected.clone()));
    tokio::spawn(run_ingest_drain(monitor.clone(), rx));

    // Create application state
    let state = Arc::new(AppState { monitor, connected });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/status", get(connection_status))
        .route("/snapshot", get(latest_snapshot))
        .route("/history", get(history))
        .route("/refresh", post(refresh))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = "0.0.0.0:8080".parse()?;
    println!("Starting bms-telemetry service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}

/// Forward push deliveries into the ingestion channel, reopening the
/// subscription when the transport drops it.
async fn run_subscription_pump(
    source: Arc<RtdbSource>,
    tx: mpsc::Sender<Value>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match source.subscribe().await {
            Ok(mut events) => {
                while let Some(payload) = events.next().await {
                    connected.store(true, Ordering::Relaxed);
                    if tx.send(payload).await.is_err() {
                        return;
                    }
                }
                tracing::warn!("subscription stream ended");
            }
            Err(e) => tracing::warn!("subscription failed: {e}"),
        }
        connected.store(false, Ordering::Relaxed);
        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
    }
}

/// Drain the ingestion channel one payload at a time.
async fn run_ingest_drain(monitor: Arc<PackMonitorService>, rx: mpsc::Receiver<Value>) {
    let mut payloads = ReceiverStream::new(rx);
    while let Some(payload) = payloads.next().await {
        monitor.ingest(Some(payload)).await;
    }
}
