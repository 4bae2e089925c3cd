//! Dataset access layer.
//!
//! A dataset is opened once through an ordered list of storage engines and
//! then shared read-only. Metadata and 1-D coordinate arrays are read eagerly
//! at open time; variable data stays in the store until a hyperslab is asked
//! for.

pub mod engine;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
#[cfg(feature = "netcdf")]
pub mod netcdf;
pub mod vendor;
pub mod zarr;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use crate::error::{Result, ViewerError};

pub use engine::{first_success, open_dataset, DatasetAccess, EngineKind};
#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryDataset;
pub use vendor::VendorOpener;

/// Metadata about a dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    /// Name of the dimension
    pub name: String,
    /// Size of the dimension
    pub size: usize,
}

/// Metadata about a variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    /// Name of the variable
    pub name: String,
    /// Dimensions of the variable, in storage axis order
    pub dimensions: Vec<String>,
    /// Shape of the variable (dimension sizes)
    pub shape: Vec<usize>,
    /// Variable attributes
    pub attributes: HashMap<String, AttributeValue>,
    /// Data type as string
    pub dtype: String,
}

impl Variable {
    /// Look up a text attribute such as `units`
    pub fn text_attribute(&self, name: &str) -> Option<&str> {
        match self.attributes.get(name) {
            Some(AttributeValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Look up a numeric attribute; single-element arrays count
    pub fn number_attribute(&self, name: &str) -> Option<f64> {
        match self.attributes.get(name) {
            Some(AttributeValue::Number(n)) => Some(*n),
            Some(AttributeValue::NumberArray(values)) if values.len() == 1 => Some(values[0]),
            _ => None,
        }
    }

    /// Position of a dimension in this variable's axis order
    pub fn axis_of(&self, dimension: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d == dimension)
    }
}

/// Possible attribute values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// String attribute
    Text(String),
    /// Numeric attribute (stored as f64 for simplicity)
    Number(f64),
    /// Array of numbers
    NumberArray(Vec<f64>),
}

impl AttributeValue {
    /// Convert a JSON attribute (as found in Zarr metadata)
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => AttributeValue::Text(s.clone()),
            serde_json::Value::Number(n) => AttributeValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::Array(items) if items.iter().all(|v| v.is_number()) => {
                AttributeValue::NumberArray(items.iter().filter_map(|v| v.as_f64()).collect())
            }
            other => AttributeValue::Text(other.to_string()),
        }
    }
}

/// Complete metadata for an opened dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Dataset-level attributes
    pub global_attributes: HashMap<String, AttributeValue>,
    /// Dimensions in the dataset
    pub dimensions: HashMap<String, Dimension>,
    /// All variables, coordinate variables included
    pub variables: HashMap<String, Variable>,
    /// Coordinate values per dimension, in storage order
    pub coordinates: HashMap<String, Vec<f64>>,
}

impl Metadata {
    /// Variable metadata or `VariableNotFound`
    pub fn variable(&self, name: &str) -> Result<&Variable> {
        self.variables
            .get(name)
            .ok_or_else(|| ViewerError::VariableNotFound {
                name: name.to_string(),
            })
    }

    /// Coordinate values of a dimension, in storage order
    pub fn coordinate(&self, dimension: &str) -> Option<&[f64]> {
        self.coordinates.get(dimension).map(|c| c.as_slice())
    }

    /// Whether a variable is a 1-D coordinate variable (named after its only dimension)
    pub fn is_coordinate_variable(&self, name: &str) -> bool {
        self.variables
            .get(name)
            .map(|v| v.dimensions.len() == 1 && v.dimensions[0] == name)
            .unwrap_or(false)
    }

    /// Names of the data variables (coordinate variables excluded), sorted
    pub fn data_variables(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .variables
            .keys()
            .filter(|name| !self.is_coordinate_variable(name))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Dimension names, sorted
    pub fn dimension_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.dimensions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Fill in index coordinates for dimensions without a coordinate variable
    pub fn fill_missing_coordinates(&mut self) {
        for (name, dim) in &self.dimensions {
            if !self.coordinates.contains_key(name) {
                tracing::warn!("Created default coordinates for dimension: {}", name);
                self.coordinates
                    .insert(name.clone(), (0..dim.size).map(|i| i as f64).collect());
            }
        }
    }

    /// Validate that the metadata is consistent and ready for use
    pub fn validate(&self) -> Result<()> {
        if self.variables.is_empty() {
            return Err(ViewerError::DatasetUnavailable {
                message: "No variables found in the dataset".to_string(),
            });
        }

        for (var_name, var) in &self.variables {
            if var.dimensions.len() != var.shape.len() {
                return Err(ViewerError::DatasetUnavailable {
                    message: format!(
                        "Variable {} has {} dimension names but shape {:?}",
                        var_name,
                        var.dimensions.len(),
                        var.shape
                    ),
                });
            }
            for (dim_name, &size) in var.dimensions.iter().zip(&var.shape) {
                match self.dimensions.get(dim_name) {
                    None => {
                        return Err(ViewerError::DatasetUnavailable {
                            message: format!(
                                "Variable {} references non-existent dimension {}",
                                var_name, dim_name
                            ),
                        })
                    }
                    Some(dim) if dim.size != size => {
                        return Err(ViewerError::DatasetUnavailable {
                            message: format!(
                                "Variable {} dimension {} has inconsistent size: expected {}, got {}",
                                var_name, dim_name, dim.size, size
                            ),
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        for (dim_name, dim) in &self.dimensions {
            match self.coordinates.get(dim_name) {
                Some(coords) if coords.len() == dim.size => {}
                Some(coords) => {
                    return Err(ViewerError::DatasetUnavailable {
                        message: format!(
                            "Coordinate {} has {} values for a dimension of size {}",
                            dim_name,
                            coords.len(),
                            dim.size
                        ),
                    })
                }
                None => {
                    return Err(ViewerError::DatasetUnavailable {
                        message: format!("Coordinate values for dimension {} not found", dim_name),
                    })
                }
            }
        }

        Ok(())
    }
}

/// An opened, read-only dataset.
pub trait Dataset: Send + Sync + std::fmt::Debug {
    /// Name of the engine that opened this dataset
    fn engine_name(&self) -> &'static str;

    /// Where the dataset was opened from
    fn source(&self) -> &str;

    /// Dataset metadata, coordinates included
    fn metadata(&self) -> &Metadata;

    /// Materialize the contiguous index box `ranges` (one per axis, storage order)
    fn read_hyperslab(&self, variable: &str, ranges: &[Range<usize>]) -> Result<ArrayD<f32>>;
}

/// Shared handle to an opened dataset
pub type DatasetHandle = Arc<dyn Dataset>;

/// Check hyperslab ranges against a variable's shape before reading
pub(crate) fn check_ranges(var: &Variable, ranges: &[Range<usize>]) -> Result<()> {
    if ranges.len() != var.shape.len() {
        return Err(ViewerError::subset(format!(
            "Variable {} has {} dimensions but {} ranges were requested",
            var.name,
            var.shape.len(),
            ranges.len()
        )));
    }
    for ((range, &size), dim) in ranges.iter().zip(&var.shape).zip(&var.dimensions) {
        if range.start >= range.end || range.end > size {
            return Err(ViewerError::subset(format!(
                "Range {:?} is invalid for dimension {} of size {}",
                range, dim, size
            )));
        }
    }
    Ok(())
}

/// CF packing attributes applied to raw values after a read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CfPacking {
    pub fill_value: Option<f64>,
    pub missing_value: Option<f64>,
    pub scale_factor: f64,
    pub add_offset: f64,
}

impl CfPacking {
    pub fn from_variable(var: &Variable) -> Self {
        Self {
            fill_value: var.number_attribute("_FillValue"),
            missing_value: var.number_attribute("missing_value"),
            scale_factor: var.number_attribute("scale_factor").unwrap_or(1.0),
            add_offset: var.number_attribute("add_offset").unwrap_or(0.0),
        }
    }

    fn is_identity(&self) -> bool {
        self.fill_value.is_none()
            && self.missing_value.is_none()
            && self.scale_factor == 1.0
            && self.add_offset == 0.0
    }

    /// Unpack one raw value; masked values become NaN
    pub fn unpack(&self, v: f64) -> f64 {
        let masked = [self.fill_value, self.missing_value]
            .iter()
            .flatten()
            .any(|&m| v == m);
        if masked {
            f64::NAN
        } else {
            v * self.scale_factor + self.add_offset
        }
    }

    /// Decode raw values: masked values become NaN, the rest are unpacked
    pub fn decode(&self, raw: ArrayD<f64>) -> ArrayD<f32> {
        if self.is_identity() {
            return raw.mapv(|v| v as f32);
        }
        raw.mapv(|v| self.unpack(v) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, IxDyn};

    fn variable(attributes: HashMap<String, AttributeValue>) -> Variable {
        Variable {
            name: "sst".to_string(),
            dimensions: vec!["lat".to_string(), "lon".to_string()],
            shape: vec![2, 2],
            attributes,
            dtype: "int16".to_string(),
        }
    }

    #[test]
    fn test_attribute_value_serialization() {
        let text = AttributeValue::Text("test".to_string());
        assert_eq!(serde_json::to_string(&text).unwrap(), r#""test""#);

        let number = AttributeValue::Number(42.0);
        assert_eq!(serde_json::to_string(&number).unwrap(), "42.0");

        let array = AttributeValue::NumberArray(vec![1.0, 2.0, 3.0]);
        assert_eq!(serde_json::to_string(&array).unwrap(), "[1.0,2.0,3.0]");
    }

    #[test]
    fn test_attribute_from_json() {
        assert_eq!(
            AttributeValue::from_json(&serde_json::json!("K")),
            AttributeValue::Text("K".to_string())
        );
        assert_eq!(
            AttributeValue::from_json(&serde_json::json!(0.01)),
            AttributeValue::Number(0.01)
        );
        assert_eq!(
            AttributeValue::from_json(&serde_json::json!([1, 2])),
            AttributeValue::NumberArray(vec![1.0, 2.0])
        );
        assert_eq!(
            AttributeValue::from_json(&serde_json::json!({"a": 1})),
            AttributeValue::Text(r#"{"a":1}"#.to_string())
        );
    }

    #[test]
    fn test_cf_packing_decode() {
        let mut attrs = HashMap::new();
        attrs.insert("_FillValue".to_string(), AttributeValue::Number(-32767.0));
        attrs.insert("scale_factor".to_string(), AttributeValue::Number(0.01));
        attrs.insert("add_offset".to_string(), AttributeValue::Number(20.0));
        let packing = CfPacking::from_variable(&variable(attrs));

        let raw = array![[100.0, -32767.0], [0.0, -100.0]].into_dyn();
        let decoded = packing.decode(raw);

        assert!((decoded[IxDyn(&[0, 0])] - 21.0).abs() < 1e-5);
        assert!(decoded[IxDyn(&[0, 1])].is_nan());
        assert!((decoded[IxDyn(&[1, 0])] - 20.0).abs() < 1e-5);
        assert!((decoded[IxDyn(&[1, 1])] - 19.0).abs() < 1e-5);
    }

    #[test]
    fn test_metadata_validation() {
        let mut metadata = Metadata::default();
        metadata.dimensions.insert(
            "lat".to_string(),
            Dimension {
                name: "lat".to_string(),
                size: 2,
            },
        );
        metadata.dimensions.insert(
            "lon".to_string(),
            Dimension {
                name: "lon".to_string(),
                size: 2,
            },
        );
        metadata
            .variables
            .insert("sst".to_string(), variable(HashMap::new()));
        metadata.coordinates.insert("lat".to_string(), vec![0.0, 1.0]);

        // lon has no coordinate yet
        assert!(metadata.validate().is_err());

        metadata.fill_missing_coordinates();
        assert!(metadata.validate().is_ok());
        assert_eq!(metadata.coordinate("lon"), Some(&[0.0, 1.0][..]));
        assert_eq!(metadata.data_variables(), vec!["sst".to_string()]);
    }
}
