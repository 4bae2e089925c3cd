//! Storage engine selection and the two-tier access strategy.
//!
//! Opening walks an ordered engine list and keeps the first success. Subset
//! reads go through the generic handle first and fall back to the vendor
//! opener when the whole generic path fails.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::vendor::VendorOpener;
use super::{zarr, DatasetHandle};
use crate::error::{AttemptFailure, Result, ViewerError};
use crate::logging::{log_dataset_open, log_operation_end, log_operation_start};
use crate::subset::{execute_query, Query, SubsetArray};

/// Storage engines, tried in the configured order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Chunked Zarr store (v2 or v3), local directory or HTTP
    Zarr,
    /// Classic NetCDF / HDF5 file
    NetCdf,
}

impl EngineKind {
    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::Zarr => "zarr",
            EngineKind::NetCdf => "netcdf",
        }
    }

    /// Default priority: chunked store first, classic file second
    pub fn default_order() -> Vec<EngineKind> {
        vec![EngineKind::Zarr, EngineKind::NetCdf]
    }

    /// Open `source` with this engine
    pub fn open(&self, source: &str) -> Result<DatasetHandle> {
        match self {
            EngineKind::Zarr => Ok(Arc::new(zarr::ZarrDataset::open(source)?)),
            #[cfg(feature = "netcdf")]
            EngineKind::NetCdf => Ok(Arc::new(super::netcdf::NetCdfDataset::open(source)?)),
            #[cfg(not(feature = "netcdf"))]
            EngineKind::NetCdf => Err(ViewerError::Config {
                message: "the netcdf engine is not compiled into this build".to_string(),
            }),
        }
    }

    /// Parse a comma-separated engine list such as `zarr,netcdf`
    pub fn parse_list(list: &str) -> Result<Vec<EngineKind>> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(EngineKind::from_str)
            .collect()
    }
}

impl FromStr for EngineKind {
    type Err = ViewerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zarr" => Ok(EngineKind::Zarr),
            "netcdf" | "netcdf4" | "nc" => Ok(EngineKind::NetCdf),
            other => Err(ViewerError::InvalidParameter {
                param: "engines".to_string(),
                message: format!("Unknown storage engine: {}. Must be one of: zarr, netcdf", other),
            }),
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A labelled attempt for [`first_success`]
pub type Attempt<'a, T> = (String, Box<dyn FnOnce() -> Result<T> + 'a>);

/// Label a closure as an attempt
pub fn attempt<'a, T>(label: &str, f: impl FnOnce() -> Result<T> + 'a) -> Attempt<'a, T> {
    (label.to_string(), Box::new(f))
}

/// Run attempts in order and return the first success, or every failure
pub fn first_success<T>(attempts: Vec<Attempt<'_, T>>) -> std::result::Result<T, Vec<AttemptFailure>> {
    let mut failures = Vec::with_capacity(attempts.len());
    for (label, attempt) in attempts {
        match attempt() {
            Ok(value) => {
                debug!(attempt = %label, failed_before = failures.len(), "Attempt succeeded");
                return Ok(value);
            }
            Err(error) => {
                warn!(attempt = %label, error = %error, "Attempt failed, trying next");
                failures.push(AttemptFailure {
                    label,
                    error: error.to_string(),
                });
            }
        }
    }
    Err(failures)
}

/// Whether a dataset location is a remote URL rather than a local path
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Open a dataset with the first engine in `engines` that succeeds
pub fn open_dataset(source: &str, engines: &[EngineKind]) -> Result<DatasetHandle> {
    let start = Instant::now();
    log_operation_start("dataset_open", Some(source));

    let attempts: Vec<Attempt<'_, DatasetHandle>> = engines
        .iter()
        .map(|&engine| attempt(engine.name(), move || engine.open(source)))
        .collect();

    match first_success(attempts) {
        Ok(handle) => {
            log_dataset_open(source, handle.as_ref());
            log_operation_end("dataset_open", start, true);
            Ok(handle)
        }
        Err(attempts) => {
            log_operation_end("dataset_open", start, false);
            Err(ViewerError::DatasetOpen {
                source_path: source.to_string(),
                attempts,
            })
        }
    }
}

/// Everything needed to turn a query into data for one dataset location.
#[derive(Debug, Clone)]
pub struct DatasetAccess {
    source: String,
    engines: Vec<EngineKind>,
    shared: Option<DatasetHandle>,
    vendor: Option<VendorOpener>,
}

impl DatasetAccess {
    pub fn new(source: impl Into<String>, engines: Vec<EngineKind>) -> Self {
        Self {
            source: source.into(),
            engines,
            shared: None,
            vendor: None,
        }
    }

    /// Reuse an already opened handle for the generic path
    pub fn with_shared(mut self, handle: DatasetHandle) -> Self {
        self.shared = Some(handle);
        self
    }

    /// Enable the authenticated second tier
    pub fn with_vendor(mut self, vendor: VendorOpener) -> Self {
        self.vendor = Some(vendor);
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn engines(&self) -> &[EngineKind] {
        &self.engines
    }

    /// The shared handle, if the dataset opened at startup
    pub fn shared(&self) -> Option<&DatasetHandle> {
        self.shared.as_ref()
    }

    /// The shared handle, or a fresh multi-engine open
    pub fn handle(&self) -> Result<DatasetHandle> {
        match &self.shared {
            Some(handle) => Ok(handle.clone()),
            None => open_dataset(&self.source, &self.engines),
        }
    }

    /// Any readable handle: the generic one, else the vendor one
    pub fn any_handle(&self) -> Result<DatasetHandle> {
        let mut attempts = vec![attempt("generic", || self.handle())];
        if let Some(vendor) = &self.vendor {
            attempts.push(attempt("vendor", move || vendor.open(&self.source)));
        }
        first_success(attempts).map_err(|attempts| ViewerError::DatasetOpen {
            source_path: self.source.clone(),
            attempts,
        })
    }

    /// Execute `query` on `variable`, generic path first, vendor opener second
    pub fn open_for_subset(&self, variable: &str, query: &Query) -> Result<SubsetArray> {
        let mut attempts = vec![attempt("generic", || {
            let handle = self.handle()?;
            execute_query(handle.as_ref(), variable, query)
        })];

        if let Some(vendor) = &self.vendor {
            attempts.push(attempt("vendor", move || {
                let handle = vendor.open(&self.source)?;
                execute_query(handle.as_ref(), variable, query)
            }));
        }

        match first_success(attempts) {
            Ok(array) => {
                info!(
                    source = %self.source,
                    variable = variable,
                    shape = ?array.data.shape(),
                    "Subset materialized"
                );
                Ok(array)
            }
            Err(failures) if failures.len() == 1 => Err(ViewerError::subset(failures[0].error.clone())),
            Err(failures) => Err(ViewerError::subset(
                failures
                    .iter()
                    .map(|f| f.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
        }
    }
}
