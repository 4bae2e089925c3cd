//! Heartbeat endpoint handler.
//!
//! Returns server status, uptime, memory usage and whether the dataset is
//! available.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::dataset::Dataset;
use crate::state::AppState;

/// Random per-process server ID
static SERVER_ID: once_cell::sync::Lazy<String> =
    once_cell::sync::Lazy::new(|| Uuid::new_v4().to_string());

/// Heartbeat response structure
#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    /// Server ID (unique per instance)
    pub server_id: String,
    /// Current timestamp (ISO 8601 format)
    pub timestamp: String,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Process memory usage in bytes
    pub memory_usage_bytes: Option<u64>,
    pub dataset: DatasetInfo,
    pub session_count: usize,
    /// "healthy", or "degraded" when the dataset did not open
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct DatasetInfo {
    pub source: String,
    pub available: bool,
    /// Engine that opened the dataset
    pub engine: Option<String>,
    pub variable_count: usize,
    /// Dimension names and sizes
    pub dimensions: Vec<(String, usize)>,
}

/// Handle GET /heartbeat requests
pub async fn heartbeat_handler(State(state): State<Arc<AppState>>) -> Json<HeartbeatResponse> {
    let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

    let dataset = match state.dataset() {
        Ok(handle) => {
            let metadata = handle.metadata();
            DatasetInfo {
                source: state.source.clone(),
                available: true,
                engine: Some(handle.engine_name().to_string()),
                variable_count: metadata.data_variables().len(),
                dimensions: metadata
                    .dimension_names()
                    .into_iter()
                    .map(|name| {
                        let size = metadata.dimensions[&name].size;
                        (name, size)
                    })
                    .collect(),
            }
        }
        Err(_) => DatasetInfo {
            source: state.source.clone(),
            available: false,
            engine: None,
            variable_count: 0,
            dimensions: Vec::new(),
        },
    };

    let status = if dataset.available { "healthy" } else { "degraded" };

    Json(HeartbeatResponse {
        server_id: SERVER_ID.clone(),
        timestamp,
        uptime_seconds: state.uptime_seconds(),
        memory_usage_bytes: get_memory_usage(),
        dataset,
        session_count: state.sessions.len(),
        status: status.to_string(),
    })
}

/// Resident set size of this process, where the platform exposes it
fn get_memory_usage() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        // Second field of /proc/self/statm is RSS in pages
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let pages = statm.split_whitespace().nth(1)?.parse::<u64>().ok()?;
        Some(pages * 4096)
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
