//! Error types for the gridview application.
//!
//! A single error enum covers every failure the viewer can surface. Each
//! variant knows the HTTP status it maps to and a stable `kind` string that
//! the API returns alongside the message.

use axum::http::StatusCode;
use thiserror::Error;

/// One failed attempt inside a multi-step fallback (an engine or an opener).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AttemptFailure {
    /// Name of the thing that was tried
    pub label: String,
    /// The error text it produced
    pub error: String,
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.label, self.error)
    }
}

fn join_attempts(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The main error type for gridview operations.
#[derive(Error, Debug)]
pub enum ViewerError {
    /// None of the configured storage engines could open the source
    #[error("Failed to open dataset {source_path}: engines tried [{}]", join_attempts(.attempts))]
    DatasetOpen {
        source_path: String,
        attempts: Vec<AttemptFailure>,
    },

    /// The dataset failed to open at startup, so no data action can run
    #[error("Dataset unavailable: {message}")]
    DatasetUnavailable { message: String },

    /// The variable lacks a latitude-like or a longitude-like dimension
    #[error("Latitude and/or longitude dimensions are not present in variable {variable} (dimensions: {dimensions:?})")]
    MissingSpatialDimension {
        variable: String,
        dimensions: Vec<String>,
    },

    /// A slider or dropdown index falls outside its coordinate array
    #[error("Index out of bounds for {dimension}: {index} (length {len})")]
    IndexOutOfBounds {
        dimension: String,
        index: i64,
        len: usize,
    },

    /// Query construction or execution failed
    #[error("Subset resolution failed: {message}")]
    SubsetResolution { message: String },

    /// The subset was fetched but could not be rendered
    #[error("Render failed: {message}")]
    Render { message: String },

    /// Variable not present in the dataset
    #[error("Variable not found: {name}")]
    VariableNotFound { name: String },

    /// Dimension not present on a variable
    #[error("Dimension {dimension} not found on variable {variable}")]
    DimensionNotFound { variable: String, dimension: String },

    /// Invalid parameter errors
    #[error("Invalid parameter: {param} - {message}")]
    InvalidParameter { param: String, message: String },

    /// Unknown or expired session
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    /// Zarr store errors
    #[error("Zarr error: {message}")]
    Zarr { message: String },

    /// NetCDF file operation errors
    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    /// Array shape mismatches while materializing data
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Server errors
    #[error("Server error: {message}")]
    Server { message: String },
}

impl ViewerError {
    /// Stable name of the error category, returned to API clients
    pub fn kind(&self) -> &'static str {
        match self {
            ViewerError::DatasetOpen { .. } => "DatasetOpenFailure",
            ViewerError::DatasetUnavailable { .. } => "DatasetUnavailable",
            ViewerError::MissingSpatialDimension { .. } => "MissingSpatialDimension",
            ViewerError::IndexOutOfBounds { .. } => "IndexOutOfBounds",
            ViewerError::SubsetResolution { .. } => "SubsetResolutionFailure",
            ViewerError::Render { .. } => "RenderFailure",
            ViewerError::VariableNotFound { .. } => "VariableNotFound",
            ViewerError::DimensionNotFound { .. } => "DimensionNotFound",
            ViewerError::InvalidParameter { .. } => "InvalidParameter",
            ViewerError::SessionNotFound { .. } => "SessionNotFound",
            ViewerError::Zarr { .. } => "ZarrError",
            #[cfg(feature = "netcdf")]
            ViewerError::NetCdf(_) => "NetCdfError",
            ViewerError::Shape(_) => "ShapeError",
            ViewerError::Io(_) => "IoError",
            ViewerError::Json(_) => "JsonError",
            ViewerError::Config { .. } => "ConfigError",
            ViewerError::Server { .. } => "ServerError",
        }
    }

    /// HTTP status used when this error reaches a handler boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            ViewerError::DatasetOpen { .. } | ViewerError::DatasetUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ViewerError::MissingSpatialDimension { .. }
            | ViewerError::SubsetResolution { .. }
            | ViewerError::Render { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ViewerError::IndexOutOfBounds { .. } | ViewerError::InvalidParameter { .. } => {
                StatusCode::BAD_REQUEST
            }
            ViewerError::VariableNotFound { .. }
            | ViewerError::DimensionNotFound { .. }
            | ViewerError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wrap any error as a subset resolution failure, keeping its text
    pub fn subset(message: impl Into<String>) -> Self {
        ViewerError::SubsetResolution {
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results with ViewerError
pub type Result<T> = std::result::Result<T, ViewerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_open_lists_attempts() {
        let err = ViewerError::DatasetOpen {
            source_path: "/data/sst.zarr".to_string(),
            attempts: vec![
                AttemptFailure {
                    label: "zarr".to_string(),
                    error: "no zarr.json".to_string(),
                },
                AttemptFailure {
                    label: "netcdf".to_string(),
                    error: "not a netCDF file".to_string(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("zarr: no zarr.json"));
        assert!(text.contains("netcdf: not a netCDF file"));
        assert_eq!(err.kind(), "DatasetOpenFailure");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_status_mapping() {
        let err = ViewerError::IndexOutOfBounds {
            dimension: "lat".to_string(),
            index: 12,
            len: 10,
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = ViewerError::MissingSpatialDimension {
            variable: "depth_profile".to_string(),
            dimensions: vec!["time".to_string(), "depth".to_string()],
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.kind(), "MissingSpatialDimension");
    }
}
