//! Logging utilities for the gridview server.
//!
//! Structured `tracing` helpers shared by the dataset layer, the handlers and
//! the binaries, so every operation logs the same field names.

use std::time::Instant;
use tracing::{debug, error, info, warn, Level};

use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use uuid::Uuid;

use crate::dataset::Dataset;
use crate::error::ViewerError;

/// Creates the tracing layer for HTTP request/response logging
pub fn create_http_trace_layer() -> TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
    DefaultMakeSpan,
    DefaultOnRequest,
    DefaultOnResponse,
> {
    let response_formatter = DefaultOnResponse::new()
        .level(Level::DEBUG)
        .latency_unit(LatencyUnit::Millis);

    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(response_formatter)
}

/// Initialize the tracing subscriber; `RUST_LOG` wins over `log_level`
pub fn init_tracing(log_level: &str) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(val) => val,
        Err(_) => log_level.to_string(),
    };

    // A second initialization (tests, embedded use) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}

/// Log a start message for a significant operation
pub fn log_operation_start(operation: &str, details: Option<&str>) {
    if let Some(details) = details {
        info!(operation = operation, details = details, "Starting operation");
    } else {
        info!(operation = operation, "Starting operation");
    }
}

/// Log the completion of a significant operation
pub fn log_operation_end(operation: &str, start_time: Instant, success: bool) {
    let duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;

    if success {
        info!(
            operation = operation,
            duration_ms = duration_ms,
            "Operation completed successfully"
        );
    } else {
        warn!(
            operation = operation,
            duration_ms = duration_ms,
            "Operation failed"
        );
    }
}

/// Run `f`, logging its duration under a fresh request id
pub fn log_timed_operation<F, R>(operation: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    let start = Instant::now();
    let request_id = Uuid::new_v4();

    debug!(
        operation = operation,
        request_id = %request_id,
        "Starting operation"
    );

    let result = f();

    info!(
        operation = operation,
        request_id = %request_id,
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Operation completed"
    );

    result
}

/// Log what an opened dataset contains
pub fn log_dataset_open(source: &str, dataset: &dyn Dataset) {
    let metadata = dataset.metadata();
    let variables = metadata.data_variables();
    let dims = metadata
        .dimension_names()
        .iter()
        .map(|name| format!("{}={}", name, metadata.dimensions[name].size))
        .collect::<Vec<_>>()
        .join(", ");

    info!(
        operation = "dataset_open",
        source = source,
        engine = dataset.engine_name(),
        var_count = variables.len(),
        vars = %variables.join(", "),
        dims = %dims,
        "Dataset opened"
    );
}

/// Log an error with context
pub fn log_error(error: &ViewerError, context: &str) {
    error!(
        error = %error,
        kind = error.kind(),
        context = context,
        "Error occurred"
    );
}

/// Log an error that occurred during request processing
pub fn log_request_error(error: &ViewerError, endpoint: &str, request_id: &str, params: Option<&str>) {
    let status = error.status_code();
    if status.is_server_error() {
        error!(
            error = %error,
            kind = error.kind(),
            status = status.as_u16(),
            endpoint = endpoint,
            request_id = request_id,
            params = params.unwrap_or("none"),
            "Request processing error"
        );
    } else {
        warn!(
            error = %error,
            kind = error.kind(),
            status = status.as_u16(),
            endpoint = endpoint,
            request_id = request_id,
            params = params.unwrap_or("none"),
            "Request rejected"
        );
    }
}

/// Generate a unique request ID
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}
