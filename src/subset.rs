//! Subset resolution.
//!
//! A selection map is first turned into a coordinate-space query: slider
//! ranges become value intervals taken from the sorted coordinates and
//! dropdown indices become single storage-order values. Execution maps the
//! values back to storage indices, reads one bounding hyperslab and narrows
//! it in memory.

use ndarray::{ArrayD, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use std::time::Instant;
use tracing::debug;

use crate::coords::CoordinateAxis;
use crate::dataset::{Dataset, DatasetAccess, Metadata};
use crate::error::{Result, ViewerError};
use crate::selection::{is_spatial, SelectionEntry, SelectionMap};

/// Coordinate-space constraint on one dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DimensionSelector {
    /// Every coordinate in `[min, max]`
    Slice { min: f64, max: f64 },
    /// Exactly these coordinates
    Values { values: Vec<f64> },
    /// One coordinate; the dimension is dropped from the result.
    ///
    /// `index` pins the storage position when the coordinate repeats a value.
    Value {
        value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub selectors: BTreeMap<String, DimensionSelector>,
}

impl Query {
    pub fn with(mut self, dimension: &str, selector: DimensionSelector) -> Self {
        self.selectors.insert(dimension.to_string(), selector);
        self
    }
}

/// A materialized subset. Kept axes are ordered by ascending coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct SubsetArray {
    pub variable: String,
    /// Kept dimensions, in variable axis order
    pub dims: Vec<String>,
    /// Selected coordinate values per kept dimension
    pub coords: Vec<Vec<f64>>,
    /// Dimensions fixed to a single value, with that value
    pub fixed: Vec<(String, f64)>,
    pub data: ArrayD<f32>,
}

impl SubsetArray {
    pub fn coordinate(&self, dimension: &str) -> Option<&[f64]> {
        self.dims
            .iter()
            .position(|d| d == dimension)
            .map(|i| self.coords[i].as_slice())
    }
}

/// Translate a selection map into a coordinate-space query
pub fn build_query(metadata: &Metadata, variable: &str, selection: &SelectionMap) -> Result<Query> {
    if selection.variable != variable {
        return Err(ViewerError::subset(format!(
            "Selection is bound to {} but {} was requested",
            selection.variable, variable
        )));
    }
    if selection.is_empty() {
        return Err(ViewerError::subset(format!(
            "Empty selection for {}: check at least one dimension",
            variable
        )));
    }

    let mut query = Query::default();
    for (dimension, entry) in &selection.entries {
        let axis = CoordinateAxis::for_dimension(metadata, variable, dimension)?;
        let selector = match *entry {
            SelectionEntry::IndexRange { start, end } if is_spatial(dimension) => {
                let (min, max) = axis.sorted_range(start as i64, end as i64)?;
                DimensionSelector::Slice { min, max }
            }
            SelectionEntry::IndexRange { start, end } => DimensionSelector::Values {
                values: axis.sorted_slice(start as i64, end as i64)?.to_vec(),
            },
            SelectionEntry::SingleIndex { index } => DimensionSelector::Value {
                value: axis.storage_value(index as i64)?,
                index: Some(index),
            },
        };
        query.selectors.insert(dimension.clone(), selector);
    }
    Ok(query)
}

/// Resolve a selection to data through the two-tier access strategy
pub fn resolve(access: &DatasetAccess, variable: &str, selection: &SelectionMap) -> Result<SubsetArray> {
    let start = Instant::now();
    let handle = access.any_handle()?;
    let query = build_query(handle.metadata(), variable, selection)?;
    debug!(variable = variable, query = ?query, "Built subset query");

    let array = access.open_for_subset(variable, &query)?;
    debug!(
        variable = variable,
        shape = ?array.data.shape(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Resolved selection"
    );
    Ok(array)
}

/// Storage indices picked on one axis, ordered by coordinate value
struct AxisPick {
    indices: Vec<usize>,
    scalar: bool,
}

impl AxisPick {
    fn bounds(&self) -> Range<usize> {
        let low = self.indices.iter().copied().min().unwrap_or(0);
        let high = self.indices.iter().copied().max().unwrap_or(0);
        low..high + 1
    }
}

fn pick_axis(axis: &CoordinateAxis, selector: Option<&DimensionSelector>) -> Result<AxisPick> {
    let dimension = axis.dimension();
    let (mut indices, scalar) = match selector {
        None => ((0..axis.len()).collect::<Vec<_>>(), false),
        Some(DimensionSelector::Slice { min, max }) => {
            let indices = axis.storage_indices_between(*min, *max);
            if indices.is_empty() {
                return Err(ViewerError::subset(format!(
                    "No {} coordinate lies between {} and {}",
                    dimension, min, max
                )));
            }
            (indices, false)
        }
        Some(DimensionSelector::Values { values }) => {
            let mut indices = Vec::with_capacity(values.len());
            for value in values {
                let index = axis.storage_index_of(*value).ok_or_else(|| {
                    ViewerError::subset(format!("{} has no coordinate {}", dimension, value))
                })?;
                indices.push(index);
            }
            indices.dedup();
            if indices.is_empty() {
                return Err(ViewerError::subset(format!("No {} values selected", dimension)));
            }
            (indices, false)
        }
        Some(DimensionSelector::Value { value, index: Some(index) }) => {
            match axis.storage_values().get(*index) {
                Some(stored) if stored.total_cmp(value).is_eq() => (vec![*index], true),
                _ => {
                    return Err(ViewerError::subset(format!(
                        "{} has no coordinate {} at storage index {}",
                        dimension, value, index
                    )))
                }
            }
        }
        Some(DimensionSelector::Value { value, index: None }) => {
            let index = axis.storage_index_of(*value).ok_or_else(|| {
                ViewerError::subset(format!("{} has no coordinate {}", dimension, value))
            })?;
            (vec![index], true)
        }
    };

    let storage = axis.storage_values();
    indices.sort_by(|a, b| storage[*a].total_cmp(&storage[*b]));
    indices.dedup();
    Ok(AxisPick { indices, scalar })
}

/// Execute a query against an opened dataset
pub fn execute_query(handle: &dyn Dataset, variable: &str, query: &Query) -> Result<SubsetArray> {
    let metadata = handle.metadata();
    let var = metadata.variable(variable)?;

    if let Some(unknown) = query.selectors.keys().find(|d| var.axis_of(d).is_none()) {
        return Err(ViewerError::DimensionNotFound {
            variable: variable.to_string(),
            dimension: unknown.clone(),
        });
    }

    let mut axes = Vec::with_capacity(var.dimensions.len());
    let mut picks = Vec::with_capacity(var.dimensions.len());
    for dimension in &var.dimensions {
        let axis = CoordinateAxis::for_dimension(metadata, variable, dimension)?;
        picks.push(pick_axis(&axis, query.selectors.get(dimension))?);
        axes.push(axis);
    }

    let ranges: Vec<Range<usize>> = picks.iter().map(AxisPick::bounds).collect();
    let mut data = handle.read_hyperslab(variable, &ranges)?;

    for (i, (pick, range)) in picks.iter().zip(&ranges).enumerate() {
        let relative: Vec<usize> = pick.indices.iter().map(|&idx| idx - range.start).collect();
        let identity = relative.len() == range.len() && relative.iter().enumerate().all(|(k, &r)| k == r);
        if !identity {
            data = data.select(Axis(i), &relative);
        }
    }

    let mut dims = Vec::new();
    let mut coords = Vec::new();
    let mut fixed = Vec::new();
    for (axis, pick) in axes.iter().zip(&picks) {
        let values: Vec<f64> = pick.indices.iter().map(|&i| axis.storage_values()[i]).collect();
        if pick.scalar {
            fixed.push((axis.dimension().to_string(), values[0]));
        } else {
            dims.push(axis.dimension().to_string());
            coords.push(values);
        }
    }

    for i in (0..picks.len()).rev() {
        if picks[i].scalar {
            data = data.index_axis_move(Axis(i), 0);
        }
    }

    Ok(SubsetArray {
        variable: variable.to_string(),
        dims,
        coords,
        fixed,
        data,
    })
}
