//! Application state management for gridview.
//!
//! The state passed to every handler: configuration, the dataset opened at
//! startup (or why it could not be opened), the two-tier access path used
//! for subsetting, and the live sessions.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::dataset::{Dataset, DatasetAccess, DatasetHandle, Metadata, VendorOpener};
use crate::error::{AttemptFailure, Result, ViewerError};
use crate::session::SessionStore;

/// Why the dataset is not available
#[derive(Debug, Clone, Serialize)]
pub struct OpenFailure {
    pub message: String,
    pub kind: String,
    /// Every engine tried, with its error
    pub attempts: Vec<AttemptFailure>,
}

impl From<&ViewerError> for OpenFailure {
    fn from(error: &ViewerError) -> Self {
        let attempts = match error {
            ViewerError::DatasetOpen { attempts, .. } => attempts.clone(),
            _ => Vec::new(),
        };
        Self {
            message: error.to_string(),
            kind: error.kind().to_string(),
            attempts,
        }
    }
}

/// The main application state shared across all handlers
#[derive(Debug)]
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Dataset location as given on the command line
    pub source: String,
    dataset: std::result::Result<DatasetHandle, OpenFailure>,
    access: DatasetAccess,
    /// Live viewer sessions
    pub sessions: SessionStore,
    started_at: Instant,
}

impl AppState {
    /// Create the state from the outcome of the startup open
    pub fn new(config: Config, source: impl Into<String>, opened: Result<DatasetHandle>) -> Self {
        let source = source.into();
        let mut access = DatasetAccess::new(source.clone(), config.data.engines.clone())
            .with_vendor(VendorOpener::new(&config.data.vendor));

        let dataset = match opened {
            Ok(handle) => {
                access = access.with_shared(handle.clone());
                Ok(handle)
            }
            Err(e) => Err(OpenFailure::from(&e)),
        };

        Self {
            config,
            source,
            dataset,
            access,
            sessions: SessionStore::new(),
            started_at: Instant::now(),
        }
    }

    /// Create a new AppState wrapped in an Arc for shared ownership
    pub fn new_shared(config: Config, source: impl Into<String>, opened: Result<DatasetHandle>) -> Arc<Self> {
        Arc::new(Self::new(config, source, opened))
    }

    /// The shared dataset handle, or `DatasetUnavailable`
    pub fn dataset(&self) -> Result<&DatasetHandle> {
        self.dataset
            .as_ref()
            .map_err(|failure| ViewerError::DatasetUnavailable {
                message: failure.message.clone(),
            })
    }

    pub fn metadata(&self) -> Result<&Metadata> {
        Ok(self.dataset()?.metadata())
    }

    /// Why the startup open failed, if it did
    pub fn open_failure(&self) -> Option<&OpenFailure> {
        self.dataset.as_ref().err()
    }

    pub fn is_available(&self) -> bool {
        self.dataset.is_ok()
    }

    pub fn access(&self) -> &DatasetAccess {
        &self.access
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
