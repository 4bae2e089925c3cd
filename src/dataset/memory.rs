//! In-memory dataset.
//!
//! Holds fully materialized arrays. A test fixture wherever a real store
//! would only add I/O; compiled for unit tests and the `test-util` feature.

use ndarray::{ArrayD, Slice};
use std::collections::HashMap;
use std::ops::Range;

use super::{check_ranges, AttributeValue, CfPacking, Dataset, Dimension, Metadata, Variable};
use crate::error::{Result, ViewerError};

#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    source: String,
    metadata: Metadata,
    data: HashMap<String, ArrayD<f32>>,
}

impl InMemoryDataset {
    pub fn builder(source: impl Into<String>) -> InMemoryDatasetBuilder {
        InMemoryDatasetBuilder {
            source: source.into(),
            metadata: Metadata::default(),
            data: HashMap::new(),
        }
    }
}

/// Assembles an [`InMemoryDataset`] variable by variable.
#[derive(Debug)]
pub struct InMemoryDatasetBuilder {
    source: String,
    metadata: Metadata,
    data: HashMap<String, ArrayD<f32>>,
}

impl InMemoryDatasetBuilder {
    /// Add a 1-D coordinate variable for `dimension`
    pub fn coordinate(mut self, dimension: &str, values: Vec<f64>) -> Self {
        let data = ArrayD::from_shape_vec(vec![values.len()], values.iter().map(|&v| v as f32).collect())
            .unwrap_or_else(|_| ArrayD::zeros(vec![0]));
        self.insert_variable(dimension, &[dimension], data);
        self.metadata.coordinates.insert(dimension.to_string(), values);
        self
    }

    /// Add a data variable laid out over `dimensions`
    pub fn variable(mut self, name: &str, dimensions: &[&str], data: ArrayD<f32>) -> Self {
        self.insert_variable(name, dimensions, data);
        self
    }

    pub fn attribute(mut self, variable: &str, key: &str, value: AttributeValue) -> Self {
        if let Some(var) = self.metadata.variables.get_mut(variable) {
            var.attributes.insert(key.to_string(), value);
        }
        self
    }

    pub fn global_attribute(mut self, key: &str, value: AttributeValue) -> Self {
        self.metadata.global_attributes.insert(key.to_string(), value);
        self
    }

    fn insert_variable(&mut self, name: &str, dimensions: &[&str], data: ArrayD<f32>) {
        for (dim, &size) in dimensions.iter().zip(data.shape()) {
            self.metadata
                .dimensions
                .entry(dim.to_string())
                .or_insert_with(|| Dimension {
                    name: dim.to_string(),
                    size,
                });
        }
        self.metadata.variables.insert(
            name.to_string(),
            Variable {
                name: name.to_string(),
                dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
                shape: data.shape().to_vec(),
                attributes: HashMap::new(),
                dtype: "float32".to_string(),
            },
        );
        self.data.insert(name.to_string(), data);
    }

    /// Fill index coordinates where none were given and validate
    pub fn build(mut self) -> Result<InMemoryDataset> {
        self.metadata.fill_missing_coordinates();
        self.metadata.validate()?;
        Ok(InMemoryDataset {
            source: self.source,
            metadata: self.metadata,
            data: self.data,
        })
    }
}

impl Dataset for InMemoryDataset {
    fn engine_name(&self) -> &'static str {
        "memory"
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
        let data = self
            .data
            .get(variable)
            .ok_or_else(|| ViewerError::VariableNotFound {
                name: variable.to_string(),
            })?;

        let slab = data
            .slice_each_axis(|axis| Slice::from(ranges[axis.axis.index()].clone()))
            .to_owned();
        let packing = CfPacking::from_variable(var);
        Ok(packing.decode(slab.mapv(f64::from)))
    }
}
