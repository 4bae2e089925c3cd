//! Selection building.
//!
//! Turns the raw state of the UI controls into a normalized selection map,
//! one entry per constrained dimension. The map is rebuilt from scratch on
//! every change; nothing is patched incrementally.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::coords::CoordinateAxis;
use crate::dataset::Metadata;
use crate::error::{Result, ViewerError};

/// Whether a dimension name looks like latitude
pub fn is_latitude(name: &str) -> bool {
    name.to_lowercase().contains("lat")
}

/// Whether a dimension name looks like longitude
pub fn is_longitude(name: &str) -> bool {
    name.to_lowercase().contains("lon")
}

pub fn is_spatial(name: &str) -> bool {
    is_latitude(name) || is_longitude(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    RangeSlider,
    Dropdown,
}

/// Identifies one dynamic control.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ControlKey {
    pub kind: ControlKind,
    pub dimension: String,
}

impl ControlKey {
    /// The control kind a dimension gets: sliders for spatial axes
    pub fn for_dimension(dimension: &str) -> Self {
        let kind = if is_spatial(dimension) {
            ControlKind::RangeSlider
        } else {
            ControlKind::Dropdown
        };
        Self {
            kind,
            dimension: dimension.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistOption {
    pub label: String,
    pub value: String,
}

/// Dimensions a user may filter on, with the spatial ones pre-checked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checklist {
    pub variable: String,
    pub options: Vec<ChecklistOption>,
    pub checked: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliderMark {
    pub index: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropdownOption {
    pub label: String,
    pub value: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlSpec {
    /// Index range over the sorted coordinate values
    RangeSlider {
        min: usize,
        max: usize,
        value: [usize; 2],
        marks: Vec<SliderMark>,
    },
    /// One storage-order index
    Dropdown {
        options: Vec<DropdownOption>,
        value: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub key: ControlKey,
    #[serde(flatten)]
    pub spec: ControlSpec,
}

/// How one dimension is constrained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionEntry {
    /// Inclusive range in the sorted index space
    IndexRange { start: usize, end: usize },
    /// One storage-order index
    SingleIndex { index: usize },
}

/// Per-dimension constraints, bound to one variable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectionMap {
    pub variable: String,
    pub entries: BTreeMap<String, SelectionEntry>,
}

impl SelectionMap {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn with(mut self, dimension: &str, entry: SelectionEntry) -> Self {
        self.entries.insert(dimension.to_string(), entry);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, dimension: &str) -> Option<&SelectionEntry> {
        self.entries.get(dimension)
    }
}

/// Raw control state as submitted by the UI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSelection {
    pub selected_variable: Option<String>,
    pub dimension_checklist: BTreeSet<String>,
    pub slider_values: BTreeMap<String, [i64; 2]>,
    pub dropdown_values: BTreeMap<String, i64>,
}

/// A control whose value was rejected
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlError {
    pub key: ControlKey,
    pub kind: String,
    pub message: String,
}

impl ControlError {
    fn new(key: ControlKey, error: &ViewerError) -> Self {
        Self {
            key,
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result of rebuilding the selection map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionOutcome {
    pub selection: SelectionMap,
    pub control_errors: Vec<ControlError>,
}

/// Checklist for a variable, or `MissingSpatialDimension`
pub fn build_checklist(metadata: &Metadata, variable: &str) -> Result<Checklist> {
    let var = metadata.variable(variable)?;

    let has_lat = var.dimensions.iter().any(|d| is_latitude(d));
    let has_lon = var.dimensions.iter().any(|d| is_longitude(d));
    if !(has_lat && has_lon) {
        return Err(ViewerError::MissingSpatialDimension {
            variable: variable.to_string(),
            dimensions: var.dimensions.clone(),
        });
    }

    Ok(Checklist {
        variable: variable.to_string(),
        options: var
            .dimensions
            .iter()
            .map(|d| ChecklistOption {
                label: d.clone(),
                value: d.clone(),
            })
            .collect(),
        checked: var
            .dimensions
            .iter()
            .filter(|d| is_spatial(d))
            .cloned()
            .collect(),
    })
}

/// Controls for the given dimensions of a variable
pub fn build_controls(metadata: &Metadata, variable: &str, dimensions: &[String]) -> Result<Vec<Control>> {
    dimensions
        .iter()
        .map(|dimension| {
            let axis = CoordinateAxis::for_dimension(metadata, variable, dimension)?;
            if axis.is_empty() {
                return Err(ViewerError::subset(format!(
                    "Dimension {} has no coordinate values",
                    dimension
                )));
            }
            let key = ControlKey::for_dimension(dimension);
            let spec = match key.kind {
                ControlKind::RangeSlider => range_slider(&axis),
                ControlKind::Dropdown => dropdown(&axis),
            };
            Ok(Control { key, spec })
        })
        .collect()
}

fn range_slider(axis: &CoordinateAxis) -> ControlSpec {
    let max = axis.len() - 1;
    let low = (0.25 * max as f64).floor() as usize;
    let high = (0.75 * max as f64).floor() as usize;
    let step = (axis.len() / 10).max(1);

    let sorted = axis.sorted_values();
    let marks = (0..axis.len())
        .step_by(step)
        .map(|index| SliderMark {
            index,
            label: if axis.is_time() {
                axis.label(sorted[index])
            } else {
                format!("{:.4}", sorted[index])
            },
        })
        .collect();

    ControlSpec::RangeSlider {
        min: 0,
        max,
        value: [low, high],
        marks,
    }
}

fn dropdown(axis: &CoordinateAxis) -> ControlSpec {
    ControlSpec::Dropdown {
        options: axis
            .storage_values()
            .iter()
            .enumerate()
            .map(|(value, &v)| DropdownOption {
                label: axis.label(v),
                value,
            })
            .collect(),
        value: None,
    }
}

/// Rebuild the selection map from the full control state
pub fn build_selection(metadata: &Metadata, input: &UserSelection) -> Result<SelectionOutcome> {
    let variable = input
        .selected_variable
        .as_deref()
        .ok_or_else(|| ViewerError::InvalidParameter {
            param: "selected_variable".to_string(),
            message: "no variable is selected".to_string(),
        })?;
    build_checklist(metadata, variable)?;

    let mut selection = SelectionMap::new(variable);
    let mut control_errors = Vec::new();

    for dimension in &input.dimension_checklist {
        let key = ControlKey::for_dimension(dimension);
        let axis = match CoordinateAxis::for_dimension(metadata, variable, dimension) {
            Ok(axis) => axis,
            Err(e) => {
                control_errors.push(ControlError::new(key, &e));
                continue;
            }
        };

        let entry = match key.kind {
            ControlKind::RangeSlider => match input.slider_values.get(dimension) {
                None => continue,
                Some(&[start, end]) => axis.sorted_range(start, end).and_then(|_| {
                    if start > end {
                        Err(ViewerError::InvalidParameter {
                            param: dimension.clone(),
                            message: format!("range start {} is after end {}", start, end),
                        })
                    } else {
                        Ok(SelectionEntry::IndexRange {
                            start: start as usize,
                            end: end as usize,
                        })
                    }
                }),
            },
            ControlKind::Dropdown => match input.dropdown_values.get(dimension) {
                None => continue,
                Some(&index) => axis
                    .check_storage_index(index)
                    .map(|index| SelectionEntry::SingleIndex { index }),
            },
        };

        match entry {
            Ok(entry) => {
                selection.entries.insert(dimension.clone(), entry);
            }
            Err(e) => control_errors.push(ControlError::new(key, &e)),
        }
    }

    Ok(SelectionOutcome {
        selection,
        control_errors,
    })
}
