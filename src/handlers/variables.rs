//! Per-variable control endpoints.
//!
//! These describe what the UI should draw for a variable: the dimension
//! checklist, one control per checked dimension, and the label shown under a
//! range slider.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::{error_response, json_response};
use crate::coords::CoordinateAxis;
use crate::error::Result;
use crate::logging::generate_request_id;
use crate::selection::{build_checklist, build_controls, Checklist, Control};
use crate::state::AppState;

/// Query parameters for the controls endpoint
#[derive(Debug, Deserialize)]
pub struct ControlsQuery {
    /// Comma-separated dimension names; defaults to the checked dimensions
    pub dims: Option<String>,
}

/// Query parameters for the range label endpoint
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: i64,
    pub end: i64,
}

/// Handle GET /variables/:var/checklist requests
pub async fn checklist_handler(
    State(state): State<Arc<AppState>>,
    Path(var): Path<String>,
) -> Response {
    let request_id = generate_request_id();
    let endpoint = format!("/variables/{}/checklist", var);

    let result: Result<Checklist> = state
        .metadata()
        .and_then(|metadata| build_checklist(metadata, &var));

    match result {
        Ok(checklist) => json_response(StatusCode::OK, &checklist),
        Err(error) => error_response(&error, &endpoint, &request_id, None),
    }
}

/// Handle GET /variables/:var/controls requests
pub async fn controls_handler(
    State(state): State<Arc<AppState>>,
    Path(var): Path<String>,
    Query(params): Query<ControlsQuery>,
) -> Response {
    let request_id = generate_request_id();
    let endpoint = format!("/variables/{}/controls", var);

    debug!(
        endpoint = %endpoint,
        request_id = %request_id,
        dims = ?params.dims,
        "Processing controls request"
    );

    let result: Result<Vec<Control>> = state.metadata().and_then(|metadata| {
        let checklist = build_checklist(metadata, &var)?;
        let dims = match params.dims.as_deref() {
            Some(list) => parse_dims(list),
            None => checklist.checked,
        };
        build_controls(metadata, &var, &dims)
    });

    match result {
        Ok(controls) => json_response(StatusCode::OK, &controls),
        Err(error) => error_response(&error, &endpoint, &request_id, params.dims.as_deref()),
    }
}

/// Handle GET /variables/:var/dimensions/:dim/range requests
pub async fn range_label_handler(
    State(state): State<Arc<AppState>>,
    Path((var, dim)): Path<(String, String)>,
    Query(params): Query<RangeQuery>,
) -> Response {
    let request_id = generate_request_id();
    let endpoint = format!("/variables/{}/dimensions/{}/range", var, dim);

    let result = state.metadata().and_then(|metadata| {
        let axis = CoordinateAxis::for_dimension(metadata, &var, &dim)?;
        let (min, max) = axis.sorted_range(params.start, params.end)?;
        Ok(serde_json::json!({
            "dimension": dim,
            "start": params.start,
            "end": params.end,
            "min": min,
            "max": max,
            "label": axis.range_label(params.start, params.end)?,
        }))
    });

    match result {
        Ok(body) => json_response(StatusCode::OK, &body),
        Err(error) => error_response(
            &error,
            &endpoint,
            &request_id,
            Some(&format!("start={}, end={}", params.start, params.end)),
        ),
    }
}

fn parse_dims(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from)
        .collect()
}
