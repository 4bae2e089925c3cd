//! Session endpoints: variable choice, selection, and the three actions.
//!
//! `ShowStats` and `ShowPlot` take a fetch ticket under the store lock, do the
//! dataset work on the blocking pool, then record the outcome on the session.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::{error_response, json_response, run_blocking};
use crate::coords::{format_number, CoordinateAxis};
use crate::error::{Result, ViewerError};
use crate::logging::generate_request_id;
use crate::render::{render_map, PlotResult};
use crate::selection::UserSelection;
use crate::session::FetchTicket;
use crate::state::AppState;
use crate::stats::{compute_stats, StatsResult};
use crate::subset::resolve;

/// Body of PUT /sessions/:id/variable
#[derive(Debug, Deserialize)]
pub struct VariableChoice {
    pub variable: String,
}

fn parse_session_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|e| ViewerError::InvalidParameter {
        param: "session".to_string(),
        message: format!("{} is not a session id: {}", id, e),
    })
}

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ViewerError::InvalidParameter {
            param: "body".to_string(),
            message: rejection.body_text(),
        })
}

/// Handle POST /sessions requests
pub async fn create_session_handler(State(state): State<Arc<AppState>>) -> Response {
    let session = state.sessions.create();
    json_response(StatusCode::CREATED, &session)
}

/// Handle GET /sessions/:id requests
pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let request_id = generate_request_id();
    match parse_session_id(&id).and_then(|id| state.sessions.get(id)) {
        Ok(session) => json_response(StatusCode::OK, &session),
        Err(error) => error_response(&error, "/sessions/:id", &request_id, Some(&id)),
    }
}

/// Handle DELETE /sessions/:id requests
pub async fn delete_session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let request_id = generate_request_id();
    match parse_session_id(&id).and_then(|id| state.sessions.remove(id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(&error, "/sessions/:id", &request_id, Some(&id)),
    }
}

/// Handle PUT /sessions/:id/variable requests
pub async fn choose_variable_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<VariableChoice>, JsonRejection>,
) -> Response {
    let request_id = generate_request_id();

    let result = (|| {
        let id = parse_session_id(&id)?;
        let choice = body(payload)?;
        let metadata = state.metadata()?;
        state
            .sessions
            .update(id, |session| session.choose_variable(metadata, &choice.variable))?
    })();

    match result {
        Ok(checklist) => json_response(StatusCode::OK, &checklist),
        Err(error) => error_response(&error, "/sessions/:id/variable", &request_id, Some(&id)),
    }
}

/// Handle PUT /sessions/:id/selection requests
pub async fn selection_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<UserSelection>, JsonRejection>,
) -> Response {
    let request_id = generate_request_id();

    let result = (|| {
        let id = parse_session_id(&id)?;
        let input = body(payload)?;
        let metadata = state.metadata()?;
        state
            .sessions
            .update(id, |session| session.apply_selection(metadata, &input))?
    })();

    match result {
        Ok(outcome) => {
            debug!(
                endpoint = "/sessions/:id/selection",
                request_id = %request_id,
                entries = outcome.selection.len(),
                control_errors = outcome.control_errors.len(),
                "Selection updated"
            );
            json_response(StatusCode::OK, &outcome)
        }
        Err(error) => error_response(&error, "/sessions/:id/selection", &request_id, Some(&id)),
    }
}

/// Take a fetch ticket; the dataset must be available first
fn begin_fetch(state: &AppState, id: &str) -> Result<(Uuid, FetchTicket)> {
    let id = parse_session_id(id)?;
    state.dataset()?;
    let ticket = state.sessions.update(id, |session| session.begin_fetch())??;
    Ok((id, ticket))
}

fn ticket_params(ticket: &FetchTicket) -> String {
    format!("variable={}, selection={:?}", ticket.variable, ticket.selection.entries)
}

/// Handle POST /sessions/:id/stats requests (`ShowStats`)
pub async fn stats_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let request_id = generate_request_id();
    let start_time = Instant::now();
    let endpoint = "/sessions/:id/stats";

    let (session_id, ticket) = match begin_fetch(&state, &id) {
        Ok(started) => started,
        Err(error) => return error_response(&error, endpoint, &request_id, Some(&id)),
    };

    let worker_state = state.clone();
    let worker_ticket = ticket.clone();
    let result: Result<StatsResult> = run_blocking(move || {
        let subset = resolve(
            worker_state.access(),
            &worker_ticket.variable,
            &worker_ticket.selection,
        )?;
        compute_stats(&subset.data)
    })
    .await;

    let recorded = state
        .sessions
        .update(session_id, |session| session.record_stats(&ticket, &result))
        .unwrap_or(false);

    match result {
        Ok(stats) => {
            info!(
                endpoint = endpoint,
                request_id = %request_id,
                session = %session_id,
                recorded = recorded,
                duration_ms = start_time.elapsed().as_secs_f64() * 1000.0,
                "Statistics computed"
            );
            json_response(StatusCode::OK, &stats)
        }
        Err(error) => error_response(&error, endpoint, &request_id, Some(&ticket_params(&ticket))),
    }
}

/// Handle POST /sessions/:id/plot requests (`ShowPlot`)
pub async fn plot_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let request_id = generate_request_id();
    let start_time = Instant::now();
    let endpoint = "/sessions/:id/plot";

    let (session_id, ticket) = match begin_fetch(&state, &id) {
        Ok(started) => started,
        Err(error) => return error_response(&error, endpoint, &request_id, Some(&id)),
    };

    let worker_state = state.clone();
    let worker_ticket = ticket.clone();
    let result: Result<PlotResult> = run_blocking(move || {
        let subset = resolve(
            worker_state.access(),
            &worker_ticket.variable,
            &worker_ticket.selection,
        )?;
        let metadata = worker_state.metadata()?;
        let plot = &worker_state.config.plot;
        render_map(&subset, plot.width, plot.height, |dim, value| {
            CoordinateAxis::for_dimension(metadata, &worker_ticket.variable, dim)
                .map(|axis| axis.label(value))
                .unwrap_or_else(|_| format_number(value))
        })
    })
    .await;

    let recorded = state
        .sessions
        .update(session_id, |session| session.record_plot(&ticket, &result))
        .unwrap_or(false);

    match result {
        Ok(plot) => {
            info!(
                endpoint = endpoint,
                request_id = %request_id,
                session = %session_id,
                recorded = recorded,
                png_bytes = plot.png.len(),
                duration_ms = start_time.elapsed().as_secs_f64() * 1000.0,
                "Plot rendered"
            );
            plot_response(plot)
        }
        Err(error) => error_response(&error, endpoint, &request_id, Some(&ticket_params(&ticket))),
    }
}

/// PNG body; extent and title travel in headers
fn plot_response(plot: PlotResult) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));

    let extent = plot
        .extent
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",");
    if let Ok(value) = HeaderValue::from_str(&extent) {
        headers.insert(HeaderName::from_static("x-plot-extent"), value);
    }
    // Header values cannot hold newlines
    let title = plot.title.lines().collect::<Vec<_>>().join(" | ");
    if let Ok(value) = HeaderValue::from_str(&title) {
        headers.insert(HeaderName::from_static("x-plot-title"), value);
    }

    (StatusCode::OK, headers, Bytes::from(plot.png)).into_response()
}

/// Handle POST /sessions/:id/reset requests (`Reset`)
pub async fn reset_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let request_id = generate_request_id();
    let result = parse_session_id(&id).and_then(|id| state.sessions.update(id, |session| session.reset()));

    match result {
        Ok(reset) => json_response(StatusCode::OK, &reset),
        Err(error) => error_response(&error, "/sessions/:id/reset", &request_id, Some(&id)),
    }
}
