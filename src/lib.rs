//! # gridview
//!
//! An interactive viewer API for gridded multi-dimensional datasets.
//!
//! A user picks a variable, narrows it along its non-spatial dimensions,
//! picks a latitude/longitude window, and asks for summary statistics or a
//! rendered map. The library turns those per-dimension UI selections into a
//! coordinate-space query, executes it lazily against a Zarr store or a
//! NetCDF file, and materializes only the selected hyperslab.
//!
//! ## Architecture
//!
//! - **Coordinates** ([`coords`]): storage-order and sorted coordinate values,
//!   index bounds and labels
//! - **Selection** ([`selection`]): dimension checklist, UI controls, and the
//!   normalized selection map
//! - **Dataset access** ([`dataset`]): prioritized storage engines and the
//!   authenticated vendor fallback
//! - **Subsetting** ([`subset`]): selection map to query to materialized array
//! - **Outputs** ([`stats`], [`render`]) and per-user [`session`] state
//! - **API layer** ([`handlers`]): JSON/PNG HTTP endpoints over [`state::AppState`]

pub mod config;
pub mod coords;
pub mod dataset;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod render;
pub mod selection;
pub mod session;
pub mod state;
pub mod stats;
pub mod subset;

pub use config::Config;
pub use dataset::{open_dataset, Dataset, DatasetAccess, DatasetHandle, EngineKind, Metadata};
pub use error::{Result, ViewerError};
pub use logging::{
    create_http_trace_layer, generate_request_id, init_tracing, log_dataset_open, log_error,
    log_operation_end, log_operation_start, log_request_error, log_timed_operation,
};
pub use selection::{SelectionEntry, SelectionMap, UserSelection};
pub use state::AppState;
pub use subset::{resolve, SubsetArray};
