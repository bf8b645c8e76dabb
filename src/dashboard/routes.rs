//! Monitoring route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<MonitorState>`.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::collectors::manager::{CollectorManager, ManagerStatus, StatsEntry};
use crate::types::Chain;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct MonitorState {
    pub service: String,
    pub manager: Arc<CollectorManager>,
    pub started_at: DateTime<Utc>,
}

impl MonitorState {
    pub fn new(service: &str, manager: Arc<CollectorManager>) -> Self {
        Self {
            service: service.to_string(),
            manager,
            started_at: Utc::now(),
        }
    }
}

pub type AppState = Arc<MonitorState>;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub chains: Vec<Chain>,
    pub uptime_secs: i64,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.service.clone(),
        chains: state.manager.chains(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// GET /api/collectors/status
pub async fn collectors_status(State(state): State<AppState>) -> Json<ManagerStatus> {
    Json(state.manager.get_all_status().await)
}

/// GET /api/collectors/stats
pub async fn collectors_stats(State(state): State<AppState>) -> Json<BTreeMap<Chain, StatsEntry>> {
    Json(state.manager.get_network_stats().await)
}
