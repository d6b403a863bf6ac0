//! Management API handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::HistoryError;
use crate::history::HistoryScheduler;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Process start, for uptime.
    started_at: Instant,
    /// Flipped to true when shutdown is requested.
    shutdown: Arc<watch::Sender<bool>>,
    /// Statistics history scheduler.
    pub scheduler: HistoryScheduler,
}

impl AppState {
    /// Create new app state around a scheduler.
    pub fn new(scheduler: HistoryScheduler) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            started_at: Instant::now(),
            shutdown: Arc::new(shutdown),
            scheduler,
        }
    }

    /// Seconds since the state was created.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Ask every shutdown listener to stop.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Subscribe to shutdown requests.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// Ping response.
#[derive(Debug, Serialize)]
pub struct PingResponse {
    /// Seconds the service has been up.
    pub uptime: u64,
}

/// Plain message response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Message text.
    pub message: String,
}

/// Configuration change notification pushed by the core.
#[derive(Debug, Deserialize)]
pub struct ChangeNotification {
    /// Name of the changed configuration category.
    pub category: String,
    /// Changed items, as sent by the core.
    #[serde(default)]
    pub items: serde_json::Value,
}

/// Response when no roll has happened yet.
#[derive(Debug, Serialize)]
pub struct NeverRunResponse {
    /// Always "never_run".
    pub status: &'static str,
}

/// Ping handler - returns uptime.
pub async fn ping(State(state): State<AppState>) -> impl IntoResponse {
    Json(PingResponse {
        uptime: state.uptime_secs(),
    })
}

/// Shutdown handler - signals the service to stop.
pub async fn shutdown(State(state): State<AppState>) -> impl IntoResponse {
    info!("Shutdown requested through management API");
    state.request_shutdown();
    Json(MessageResponse {
        message: "Shutdown message received".to_string(),
    })
}

/// Change handler - acknowledges a configuration change notification.
///
/// The service reads its configuration at startup only, so the change is
/// logged and takes effect on restart.
pub async fn change(Json(notification): Json<ChangeNotification>) -> impl IntoResponse {
    info!(
        category = %notification.category,
        items = %notification.items,
        "Configuration change notification received"
    );
    Json(MessageResponse {
        message: format!(
            "Change for category {} received",
            notification.category
        ),
    })
}

/// Last roll handler - returns the most recent roll status.
pub async fn history_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.last_status().await {
        Some(status) => Json(status).into_response(),
        None => Json(NeverRunResponse {
            status: "never_run",
        })
        .into_response(),
    }
}

/// Trigger handler - runs a roll now.
pub async fn trigger_history(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.trigger().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            let status = match e {
                HistoryError::RollInProgress => StatusCode::CONFLICT,
                HistoryError::StorageUnavailable { .. }
                | HistoryError::StorageWriteFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            };
            warn!(error = %e, "Manual statistics history roll failed");
            (
                status,
                Json(MessageResponse {
                    message: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}
