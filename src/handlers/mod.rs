//! HTTP request handlers for the gridview API.
//!
//! This module contains all the endpoint handlers for the web server and the
//! router that wires them together.

pub mod heartbeat;
pub mod metadata;
pub mod sessions;
pub mod variables;

pub use heartbeat::heartbeat_handler;
pub use metadata::{metadata_handler, variables_handler};
pub use sessions::{
    choose_variable_handler, create_session_handler, delete_session_handler, get_session_handler,
    plot_handler, reset_handler, selection_handler, stats_handler,
};
pub use variables::{checklist_handler, controls_handler, range_label_handler};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::error::{Result, ViewerError};
use crate::logging::{create_http_trace_layer, log_request_error};
use crate::state::AppState;

/// Build the API router over the shared state
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/heartbeat", get(heartbeat_handler))
        .route("/metadata", get(metadata_handler))
        .route("/variables", get(variables_handler))
        .route("/variables/:var/checklist", get(checklist_handler))
        .route("/variables/:var/controls", get(controls_handler))
        .route("/variables/:var/dimensions/:dim/range", get(range_label_handler))
        .route("/sessions", post(create_session_handler))
        .route(
            "/sessions/:id",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/sessions/:id/variable", put(choose_variable_handler))
        .route("/sessions/:id/selection", put(selection_handler))
        .route("/sessions/:id/stats", post(stats_handler))
        .route("/sessions/:id/plot", post(plot_handler))
        .route("/sessions/:id/reset", post(reset_handler))
        .layer(
            ServiceBuilder::new()
                .layer(create_http_trace_layer())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Log a failed request and turn it into a JSON error body
pub(crate) fn error_response(
    error: &ViewerError,
    endpoint: &str,
    request_id: &str,
    params: Option<&str>,
) -> Response {
    log_request_error(error, endpoint, request_id, params);

    (
        error.status_code(),
        Json(serde_json::json!({
            "error": error.to_string(),
            "kind": error.kind(),
            "request_id": request_id
        })),
    )
        .into_response()
}

/// Successful JSON body with an explicit status
pub(crate) fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response {
    (status, Json(body)).into_response()
}

/// Run dataset I/O off the async workers
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ViewerError::Server {
            message: format!("Blocking task failed: {}", e),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_error_response_status() {
        let error = ViewerError::VariableNotFound {
            name: "salinity".to_string(),
        };
        let response = error_response(&error, "/variables/salinity/checklist", "req-1", None);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let value = run_blocking(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);

        let err = run_blocking::<(), _>(|| Err(ViewerError::subset("no data")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "SubsetResolutionFailure");
    }

    #[tokio::test]
    async fn test_router_serves_through_layers() {
        let error = ViewerError::DatasetOpen {
            source_path: "/data/missing.zarr".to_string(),
            attempts: Vec::new(),
        };
        let app = build_router(AppState::new_shared(Config::default(), "/data/missing.zarr", Err(error)));

        let response = app
            .clone()
            .oneshot(Request::get("/heartbeat").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/metadata").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
