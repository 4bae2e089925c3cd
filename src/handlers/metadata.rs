//! Metadata endpoint handlers.
//!
//! `/metadata` describes the opened dataset, or reports why it could not be
//! opened. `/variables` lists the selectable data variables.

use axum::{extract::State, http::StatusCode, response::Response};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{error_response, json_response};
use crate::dataset::{AttributeValue, Dataset, Variable};
use crate::logging::generate_request_id;
use crate::state::{AppState, OpenFailure};

/// Body of a successful `/metadata` response
#[derive(Debug, Serialize)]
pub struct MetadataResponse<'a> {
    pub source: &'a str,
    pub engine: &'static str,
    pub dimensions: BTreeMap<&'a str, usize>,
    pub data_variables: Vec<String>,
    pub variables: &'a HashMap<String, Variable>,
    pub global_attributes: &'a HashMap<String, AttributeValue>,
}

#[derive(Debug, Serialize)]
struct UnavailableResponse<'a> {
    error: &'a str,
    kind: &'static str,
    request_id: &'a str,
    source: &'a str,
    open_failure: &'a OpenFailure,
}

/// Handle GET /metadata requests
pub async fn metadata_handler(State(state): State<Arc<AppState>>) -> Response {
    let request_id = generate_request_id();
    let start_time = Instant::now();

    debug!(
        endpoint = "/metadata",
        request_id = %request_id,
        "Processing metadata request"
    );

    let dataset = match state.dataset() {
        Ok(dataset) => dataset,
        Err(error) => {
            // Startup failures are reported with every engine that was tried
            if let Some(failure) = state.open_failure() {
                let body = UnavailableResponse {
                    error: &failure.message,
                    kind: "DatasetUnavailable",
                    request_id: &request_id,
                    source: &state.source,
                    open_failure: failure,
                };
                return json_response(StatusCode::SERVICE_UNAVAILABLE, &body);
            }
            return error_response(&error, "/metadata", &request_id, None);
        }
    };

    let metadata = dataset.metadata();
    let response = MetadataResponse {
        source: &state.source,
        engine: dataset.engine_name(),
        dimensions: metadata
            .dimensions
            .iter()
            .map(|(name, dim)| (name.as_str(), dim.size))
            .collect(),
        data_variables: metadata.data_variables(),
        variables: &metadata.variables,
        global_attributes: &metadata.global_attributes,
    };

    info!(
        endpoint = "/metadata",
        request_id = %request_id,
        duration_us = start_time.elapsed().as_micros() as u64,
        variable_count = response.data_variables.len(),
        dimension_count = response.dimensions.len(),
        "Metadata request successful"
    );

    json_response(StatusCode::OK, &response)
}

/// Handle GET /variables requests
pub async fn variables_handler(State(state): State<Arc<AppState>>) -> Response {
    let request_id = generate_request_id();

    match state.metadata() {
        Ok(metadata) => json_response(
            StatusCode::OK,
            &serde_json::json!({ "variables": metadata.data_variables() }),
        ),
        Err(error) => error_response(&error, "/variables", &request_id, None),
    }
}
