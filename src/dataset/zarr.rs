//! Zarr engine backed by `zarrs`.
//!
//! Local stores are plain directories; remote stores are read over HTTP via
//! `object_store`, bridged into the synchronous `zarrs` API with an
//! async-to-sync adapter driven by the tokio runtime.

use ndarray::{ArrayD, IxDyn};
use serde_json::Value;
use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zarrs::array::{Array, DataType};
use zarrs::array_subset::ArraySubset;
use zarrs::group::Group;
use zarrs_filesystem::FilesystemStore;
use zarrs_object_store::object_store::http::HttpBuilder;
use zarrs_object_store::object_store::ClientOptions;
use zarrs_object_store::AsyncObjectStore;
use zarrs_storage::storage_adapter::async_to_sync::{
    AsyncToSyncBlockOn, AsyncToSyncStorageAdapter,
};
use zarrs_storage::{ReadableStorage, ReadableStorageTraits, StoreKey};

use super::engine::is_url;
use super::{check_ranges, AttributeValue, CfPacking, Dataset, Dimension, Metadata, Variable};
use crate::error::{Result, ViewerError};

/// Runtime for remote reads issued outside any tokio runtime
static FALLBACK_RUNTIME: once_cell::sync::OnceCell<tokio::runtime::Runtime> = once_cell::sync::OnceCell::new();

fn fallback_runtime() -> Result<&'static tokio::runtime::Runtime> {
    FALLBACK_RUNTIME.get_or_try_init(|| {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| zarr_error(format!("Failed to build a runtime for remote Zarr reads: {}", e)))
    })
}

/// Drives async store futures from synchronous `zarrs` calls.
///
/// Inside a multi-threaded runtime the current worker is handed to
/// `block_in_place`. On a current-thread runtime the read must already run
/// on a blocking thread (`spawn_blocking`), as every handler does. Outside
/// any runtime the process-wide fallback runtime runs the future.
#[derive(Clone, Copy)]
pub struct TokioBlockOn {
    fallback: &'static tokio::runtime::Runtime,
}

impl TokioBlockOn {
    pub fn new() -> Result<Self> {
        Ok(Self {
            fallback: fallback_runtime()?,
        })
    }
}

impl AsyncToSyncBlockOn for TokioBlockOn {
    fn block_on<F: core::future::Future>(&self, future: F) -> F::Output {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => match handle.runtime_flavor() {
                tokio::runtime::RuntimeFlavor::CurrentThread => handle.block_on(future),
                _ => tokio::task::block_in_place(|| handle.block_on(future)),
            },
            Err(_) => self.fallback.block_on(future),
        }
    }
}

fn zarr_error(e: impl std::fmt::Display) -> ViewerError {
    ViewerError::Zarr {
        message: e.to_string(),
    }
}

/// A Zarr store opened for lazy reads.
pub struct ZarrDataset {
    source: String,
    engine_name: &'static str,
    metadata: Metadata,
    arrays: HashMap<String, Array<dyn ReadableStorageTraits>>,
}

impl std::fmt::Debug for ZarrDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZarrDataset")
            .field("source", &self.source)
            .field("engine", &self.engine_name)
            .field("variables", &self.metadata.variables.len())
            .finish()
    }
}

impl ZarrDataset {
    /// Open a local directory store or an `http(s)://` store
    pub fn open(source: &str) -> Result<Self> {
        if is_url(source) {
            Self::open_remote(source, ClientOptions::new(), "zarr")
        } else {
            Self::open_local(source)
        }
    }

    /// Open a remote store with custom HTTP client options
    pub fn open_remote(source: &str, options: ClientOptions, engine_name: &'static str) -> Result<Self> {
        let http = HttpBuilder::new()
            .with_url(source)
            .with_client_options(options)
            .build()
            .map_err(|e| zarr_error(format!("Failed to create HTTP store for {}: {}", source, e)))?;

        let async_store = Arc::new(AsyncObjectStore::new(http));
        let store: ReadableStorage = Arc::new(AsyncToSyncStorageAdapter::new(async_store, TokioBlockOn::new()?));

        let names = consolidated_array_names(&store)?.ok_or_else(|| {
            zarr_error(format!(
                "Remote store {} has no consolidated metadata to list its arrays",
                source
            ))
        })?;
        Self::from_store(source, engine_name, store, names)
    }

    fn open_local(source: &str) -> Result<Self> {
        let path = Path::new(source);
        if !path.is_dir() {
            return Err(zarr_error(format!("{} is not a Zarr directory store", source)));
        }

        let filesystem = Arc::new(FilesystemStore::new(path).map_err(zarr_error)?);
        let store: ReadableStorage = filesystem.clone();

        let names = match consolidated_array_names(&store)? {
            Some(names) => names,
            None => {
                let group = Group::open(filesystem.clone(), "/").map_err(zarr_error)?;
                let children = group.children(false).map_err(zarr_error)?;
                children
                    .iter()
                    .map(|child| child.path().as_str().trim_start_matches('/').to_string())
                    .collect()
            }
        };
        Self::from_store(source, "zarr", store, names)
    }

    fn from_store(
        source: &str,
        engine_name: &'static str,
        store: ReadableStorage,
        names: Vec<String>,
    ) -> Result<Self> {
        let mut metadata = Metadata::default();

        match Group::open(store.clone(), "/") {
            Ok(group) => {
                for (key, value) in group.attributes() {
                    metadata
                        .global_attributes
                        .insert(key.clone(), AttributeValue::from_json(value));
                }
            }
            Err(e) => debug!(source = source, error = %e, "No readable root group attributes"),
        }

        let mut arrays = HashMap::new();
        for name in names {
            // Child groups and unreadable nodes are skipped, not fatal
            let array = match Array::open(store.clone(), &format!("/{}", name)) {
                Ok(array) => array,
                Err(e) => {
                    debug!(node = %name, error = %e, "Skipping non-array node");
                    continue;
                }
            };

            let variable = describe_array(&name, &array);
            for (dim, &size) in variable.dimensions.iter().zip(&variable.shape) {
                metadata.dimensions.entry(dim.clone()).or_insert_with(|| Dimension {
                    name: dim.clone(),
                    size,
                });
            }
            metadata.variables.insert(name.clone(), variable);
            arrays.insert(name, array);
        }

        // Coordinate variables: 1-D arrays named after their dimension
        let coordinate_names: Vec<String> = metadata
            .variables
            .keys()
            .filter(|name| metadata.is_coordinate_variable(name))
            .cloned()
            .collect();
        for name in coordinate_names {
            let var = &metadata.variables[&name];
            let array = &arrays[&name];
            let full = ArraySubset::new_with_ranges(&[0..var.shape[0] as u64]);
            let packing = CfPacking::from_variable(var);
            let values: Vec<f64> = read_elements_f64(array, &full)?
                .into_iter()
                .map(|v| packing.unpack(v))
                .collect();
            metadata.coordinates.insert(name.clone(), values);
        }

        metadata.fill_missing_coordinates();
        metadata.validate()?;

        info!(
            source = source,
            variables = metadata.variables.len(),
            dimensions = metadata.dimensions.len(),
            "Opened Zarr store"
        );

        Ok(Self {
            source: source.to_string(),
            engine_name,
            metadata,
            arrays,
        })
    }
}

impl Dataset for ZarrDataset {
    fn engine_name(&self) -> &'static str {
        self.engine_name
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn read_hyperslab(&self, variable: &str, ranges: &[Range<usize>]) -> Result<ArrayD<f32>> {
        let var = self.metadata.variable(variable)?;
        check_ranges(var, ranges)?;
        let array = self
            .arrays
            .get(variable)
            .ok_or_else(|| ViewerError::VariableNotFound {
                name: variable.to_string(),
            })?;

        let subset_ranges: Vec<Range<u64>> = ranges
            .iter()
            .map(|r| r.start as u64..r.end as u64)
            .collect();
        let subset = ArraySubset::new_with_ranges(&subset_ranges);
        debug!(variable = variable, subset = ?subset_ranges, "Reading Zarr hyperslab");

        let raw = read_elements_f64(array, &subset)?;
        let shape: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
        let raw = ArrayD::from_shape_vec(IxDyn(&shape), raw)?;
        Ok(CfPacking::from_variable(var).decode(raw))
    }
}

fn describe_array(name: &str, array: &Array<dyn ReadableStorageTraits>) -> Variable {
    let shape: Vec<usize> = array.shape().iter().map(|&s| s as usize).collect();
    let attributes: HashMap<String, AttributeValue> = array
        .attributes()
        .iter()
        .filter(|(key, _)| key.as_str() != "_ARRAY_DIMENSIONS")
        .map(|(key, value)| (key.clone(), AttributeValue::from_json(value)))
        .collect();

    let named: Option<Vec<String>> = array.dimension_names().as_ref().and_then(|names| {
        names
            .iter()
            .map(|n| n.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
    });
    let named = named.or_else(|| {
        array
            .attributes()
            .get("_ARRAY_DIMENSIONS")
            .and_then(Value::as_array)
            .and_then(|items| {
                items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
            })
    });

    let dimensions = match named {
        Some(names) if names.len() == shape.len() => names,
        _ => {
            warn!(variable = name, "Array has no dimension names, using positional names");
            (0..shape.len()).map(|i| format!("{}_dim_{}", name, i)).collect()
        }
    };

    Variable {
        name: name.to_string(),
        dimensions,
        shape,
        attributes,
        dtype: format!("{:?}", array.data_type()).to_lowercase(),
    }
}

/// Read a subset as f64 whatever the stored numeric type
fn read_elements_f64(array: &Array<dyn ReadableStorageTraits>, subset: &ArraySubset) -> Result<Vec<f64>> {
    macro_rules! read_as {
        ($t:ty) => {
            array
                .retrieve_array_subset_elements::<$t>(subset)
                .map_err(zarr_error)?
                .into_iter()
                .map(|v| v as f64)
                .collect()
        };
    }

    let values: Vec<f64> = match array.data_type() {
        DataType::Float32 => read_as!(f32),
        DataType::Float64 => read_as!(f64),
        DataType::Int8 => read_as!(i8),
        DataType::Int16 => read_as!(i16),
        DataType::Int32 => read_as!(i32),
        DataType::Int64 => read_as!(i64),
        DataType::UInt8 => read_as!(u8),
        DataType::UInt16 => read_as!(u16),
        DataType::UInt32 => read_as!(u32),
        DataType::UInt64 => read_as!(u64),
        other => {
            return Err(zarr_error(format!("Unsupported Zarr data type: {:?}", other)));
        }
    };
    Ok(values)
}

/// Array names from consolidated metadata, if the store has any
fn consolidated_array_names(store: &ReadableStorage) -> Result<Option<Vec<String>>> {
    let v2_key = StoreKey::new(".zmetadata").map_err(zarr_error)?;
    if let Some(bytes) = store.get(&v2_key).map_err(zarr_error)? {
        let json: Value = serde_json::from_slice(&bytes)?;
        return Ok(Some(names_from_v2_consolidated(&json)));
    }

    let v3_key = StoreKey::new("zarr.json").map_err(zarr_error)?;
    if let Some(bytes) = store.get(&v3_key).map_err(zarr_error)? {
        let json: Value = serde_json::from_slice(&bytes)?;
        return Ok(names_from_v3_root(&json));
    }

    Ok(None)
}

/// Top-level array names from a v2 `.zmetadata` document
fn names_from_v2_consolidated(json: &Value) -> Vec<String> {
    let mut names: Vec<String> = json
        .get("metadata")
        .and_then(Value::as_object)
        .map(|entries| {
            entries
                .keys()
                .filter_map(|key| key.strip_suffix("/.zarray"))
                .filter(|name| !name.contains('/'))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Top-level array names from a v3 root `zarr.json` with inline consolidated metadata
fn names_from_v3_root(json: &Value) -> Option<Vec<String>> {
    let entries = json
        .get("consolidated_metadata")?
        .get("metadata")?
        .as_object()?;
    let mut names: Vec<String> = entries
        .iter()
        .filter(|(key, node)| {
            !key.contains('/') && node.get("node_type").and_then(Value::as_str) == Some("array")
        })
        .map(|(key, _)| key.clone())
        .collect();
    names.sort();
    Some(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use zarrs::array::{ArrayBuilder, FillValue};
    use zarrs::group::GroupBuilder;

    #[test]
    fn test_block_on_outside_and_inside_runtimes() {
        let block_on = TokioBlockOn::new().unwrap();
        assert_eq!(block_on.block_on(async { 7 }), 7);

        let multi = tokio::runtime::Builder::new_multi_thread().worker_threads(1).build().unwrap();
        assert_eq!(multi.block_on(async move { block_on.block_on(async { 8 }) }), 8);

        let current = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let value = current.block_on(async move {
            tokio::task::spawn_blocking(move || block_on.block_on(async { 9 }))
                .await
                .unwrap()
        });
        assert_eq!(value, 9);
    }

    fn write_store(path: &Path) -> anyhow::Result<()> {
        let store = Arc::new(FilesystemStore::new(path)?);

        let mut attrs = serde_json::Map::new();
        attrs.insert("title".to_string(), json!("test ocean"));
        GroupBuilder::new()
            .attributes(attrs)
            .build(store.clone(), "/")?
            .store_metadata()?;

        for (name, values) in [("lat", vec![10.0f32, 20.0, 30.0]), ("lon", vec![5.0f32, 0.0])] {
            let array = ArrayBuilder::new(
                vec![values.len() as u64],
                DataType::Float32,
                vec![values.len() as u64].try_into()?,
                FillValue::from(f32::NAN),
            )
            .dimension_names(Some([name]))
            .build(store.clone(), &format!("/{}", name))?;
            array.store_metadata()?;
            array.store_array_subset_elements::<f32>(
                &ArraySubset::new_with_ranges(&[0..values.len() as u64]),
                &values,
            )?;
        }

        let mut sst_attrs = serde_json::Map::new();
        sst_attrs.insert("units".to_string(), json!("degC"));
        sst_attrs.insert("scale_factor".to_string(), json!(0.5));
        sst_attrs.insert("_FillValue".to_string(), json!(-1));
        let sst = ArrayBuilder::new(
            vec![3, 2],
            DataType::Int16,
            vec![2, 2].try_into()?,
            FillValue::from(-1i16),
        )
        .dimension_names(Some(["lat", "lon"]))
        .attributes(sst_attrs)
        .build(store.clone(), "/sst")?;
        sst.store_metadata()?;
        sst.store_array_subset_elements::<i16>(
            &ArraySubset::new_with_ranges(&[0..3, 0..2]),
            &[2, 4, 6, -1, 10, 12],
        )?;
        Ok(())
    }

    #[test]
    fn test_open_local_store() {
        let dir = tempfile::tempdir().unwrap();
        write_store(dir.path()).unwrap();

        let dataset = ZarrDataset::open(dir.path().to_str().unwrap()).unwrap();
        let metadata = dataset.metadata();

        assert_eq!(dataset.engine_name(), "zarr");
        assert_eq!(metadata.data_variables(), vec!["sst".to_string()]);
        assert_eq!(metadata.coordinate("lat"), Some(&[10.0, 20.0, 30.0][..]));
        assert_eq!(metadata.coordinate("lon"), Some(&[5.0, 0.0][..]));
        assert_eq!(
            metadata.global_attributes.get("title"),
            Some(&AttributeValue::Text("test ocean".to_string()))
        );
        let sst = metadata.variable("sst").unwrap();
        assert_eq!(sst.dimensions, vec!["lat".to_string(), "lon".to_string()]);
        assert_eq!(sst.text_attribute("units"), Some("degC"));
    }

    #[test]
    fn test_read_hyperslab_applies_packing() {
        let dir = tempfile::tempdir().unwrap();
        write_store(dir.path()).unwrap();
        let dataset = ZarrDataset::open(dir.path().to_str().unwrap()).unwrap();

        let slab = dataset.read_hyperslab("sst", &[1..3, 0..2]).unwrap();
        assert_eq!(slab.shape(), &[2, 2]);
        assert_eq!(slab[IxDyn(&[0, 0])], 3.0);
        assert!(slab[IxDyn(&[0, 1])].is_nan());
        assert_eq!(slab[IxDyn(&[1, 1])], 6.0);

        assert!(dataset.read_hyperslab("sst", &[0..4, 0..2]).is_err());
        assert!(dataset.read_hyperslab("missing", &[0..1]).is_err());
    }

    #[test]
    fn test_open_rejects_non_directory() {
        let err = ZarrDataset::open("/nonexistent/store.zarr").unwrap_err();
        assert_eq!(err.kind(), "ZarrError");
    }

    #[test]
    fn test_consolidated_metadata_names() {
        let v2 = json!({
            "zarr_consolidated_format": 1,
            "metadata": {
                ".zattrs": {},
                ".zgroup": {"zarr_format": 2},
                "thetao/.zarray": {},
                "thetao/.zattrs": {"_ARRAY_DIMENSIONS": ["time", "latitude", "longitude"]},
                "latitude/.zarray": {},
                "nested/inner/.zarray": {}
            }
        });
        assert_eq!(
            names_from_v2_consolidated(&v2),
            vec!["latitude".to_string(), "thetao".to_string()]
        );

        let v3 = json!({
            "zarr_format": 3,
            "node_type": "group",
            "consolidated_metadata": {
                "kind": "inline",
                "metadata": {
                    "so": {"node_type": "array"},
                    "depth": {"node_type": "array"},
                    "sub": {"node_type": "group"}
                }
            }
        });
        assert_eq!(
            names_from_v3_root(&v3),
            Some(vec!["depth".to_string(), "so".to_string()])
        );
        assert_eq!(names_from_v3_root(&json!({"zarr_format": 3})), None);
    }
}
