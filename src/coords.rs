//! Coordinate index resolution.
//!
//! A coordinate axis keeps the values of one dimension twice: in storage
//! order, exactly as read from the dataset, and as a sorted copy. Range
//! sliders address the sorted copy; dropdowns address storage order.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::dataset::Metadata;
use crate::error::{Result, ViewerError};

/// CF time encoding, `<unit> since <epoch>`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    seconds_per_unit: f64,
    epoch: NaiveDateTime,
}

impl TimeUnits {
    /// Parse a CF `units` attribute such as `days since 1950-01-01`
    pub fn parse(units: &str) -> Option<Self> {
        let (unit, epoch) = units.trim().split_once(" since ")?;
        let seconds_per_unit = match unit.trim().to_lowercase().as_str() {
            "seconds" | "second" | "secs" | "s" => 1.0,
            "minutes" | "minute" | "mins" => 60.0,
            "hours" | "hour" | "hrs" | "h" => 3600.0,
            "days" | "day" | "d" => 86400.0,
            _ => return None,
        };
        let epoch = parse_epoch(epoch)?;
        Some(Self {
            seconds_per_unit,
            epoch,
        })
    }

    pub fn decode(&self, value: f64) -> Option<NaiveDateTime> {
        if !value.is_finite() {
            return None;
        }
        // Saturates for fill values far outside the representable range
        let millis = (value * self.seconds_per_unit * 1000.0).round() as i64;
        self.epoch.checked_add_signed(Duration::try_milliseconds(millis)?)
    }
}

fn parse_epoch(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim().trim_end_matches(" UTC").trim_end_matches('Z');
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Coordinate values of one dimension, in storage order and sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateAxis {
    dimension: String,
    storage: Vec<f64>,
    sorted: Vec<f64>,
    time_units: Option<TimeUnits>,
}

impl CoordinateAxis {
    pub fn new(dimension: impl Into<String>, storage: Vec<f64>) -> Self {
        let mut sorted = storage.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Self {
            dimension: dimension.into(),
            storage,
            sorted,
            time_units: None,
        }
    }

    pub fn with_time_units(mut self, time_units: Option<TimeUnits>) -> Self {
        self.time_units = time_units;
        self
    }

    /// Axis for `dimension` of `variable`
    pub fn for_dimension(metadata: &Metadata, variable: &str, dimension: &str) -> Result<Self> {
        let var = metadata.variable(variable)?;
        let axis = var
            .axis_of(dimension)
            .ok_or_else(|| ViewerError::DimensionNotFound {
                variable: variable.to_string(),
                dimension: dimension.to_string(),
            })?;

        let values = match metadata.coordinate(dimension) {
            Some(values) => values.to_vec(),
            None => (0..var.shape[axis]).map(|i| i as f64).collect(),
        };
        let time_units = metadata
            .variables
            .get(dimension)
            .and_then(|coord| coord.text_attribute("units"))
            .and_then(TimeUnits::parse);

        Ok(Self::new(dimension, values).with_time_units(time_units))
    }

    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn storage_values(&self) -> &[f64] {
        &self.storage
    }

    pub fn sorted_values(&self) -> &[f64] {
        &self.sorted
    }

    pub fn is_time(&self) -> bool {
        self.time_units.is_some()
    }

    fn out_of_bounds(&self, index: i64) -> ViewerError {
        ViewerError::IndexOutOfBounds {
            dimension: self.dimension.clone(),
            index,
            len: self.len(),
        }
    }

    /// Sorted values at a slider pair `(start, end)`
    pub fn sorted_range(&self, start: i64, end: i64) -> Result<(f64, f64)> {
        if start < 0 || start as usize >= self.len() {
            return Err(self.out_of_bounds(start));
        }
        if end < 0 || end as usize >= self.len() {
            return Err(self.out_of_bounds(end));
        }
        Ok((self.sorted[start as usize], self.sorted[end as usize]))
    }

    /// Sorted values from `start` to `end` inclusive
    pub fn sorted_slice(&self, start: i64, end: i64) -> Result<&[f64]> {
        self.sorted_range(start, end)?;
        if start > end {
            return Err(ViewerError::subset(format!(
                "Range start {} is after end {} for {}",
                start, end, self.dimension
            )));
        }
        Ok(&self.sorted[start as usize..=end as usize])
    }

    /// Display text for a slider pair
    pub fn range_label(&self, start: i64, end: i64) -> Result<String> {
        let (low, high) = self.sorted_range(start, end)?;
        Ok(match self.time_units {
            Some(_) => format!("Selected range: {} to {}", self.label(low), self.label(high)),
            None => format!("Selected range: {:.4} to {:.4}", low, high),
        })
    }

    /// Storage index checked against the axis length
    pub fn check_storage_index(&self, index: i64) -> Result<usize> {
        if index < 0 || index as usize >= self.len() {
            return Err(self.out_of_bounds(index));
        }
        Ok(index as usize)
    }

    pub fn storage_value(&self, index: i64) -> Result<f64> {
        let index = self.check_storage_index(index)?;
        Ok(self.storage[index])
    }

    /// Storage index holding exactly `value`
    pub fn storage_index_of(&self, value: f64) -> Option<usize> {
        self.storage.iter().position(|&v| v == value)
    }

    /// Storage indices whose value lies in `[min, max]`, ascending
    pub fn storage_indices_between(&self, min: f64, max: f64) -> Vec<usize> {
        let (low, high) = if min <= max { (min, max) } else { (max, min) };
        self.storage
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v >= low && v <= high)
            .map(|(i, _)| i)
            .collect()
    }

    /// Human-readable text for one coordinate value
    pub fn label(&self, value: f64) -> String {
        match self.time_units.and_then(|units| units.decode(value)) {
            Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => format_number(value),
        }
    }
}

/// Integers print without a fraction, everything else as-is
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{AttributeValue, Dataset, InMemoryDataset};
    use ndarray::ArrayD;

    fn descending() -> CoordinateAxis {
        CoordinateAxis::new("lat", vec![40.0, 30.0, 20.0, 10.0, 0.0])
    }

    #[test]
    fn test_sorted_copy_keeps_storage_order() {
        let axis = descending();
        assert_eq!(axis.storage_values(), &[40.0, 30.0, 20.0, 10.0, 0.0]);
        assert_eq!(axis.sorted_values(), &[0.0, 10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_sorted_range_in_bounds() {
        let axis = descending();
        for start in 0..5i64 {
            for end in start..5i64 {
                let (a, b) = axis.sorted_range(start, end).unwrap();
                assert_eq!(a, axis.sorted_values()[start as usize]);
                assert_eq!(b, axis.sorted_values()[end as usize]);
            }
        }
    }

    #[test]
    fn test_sorted_range_out_of_bounds() {
        let axis = descending();
        match axis.sorted_range(-1, 2) {
            Err(ViewerError::IndexOutOfBounds { dimension, index, len }) => {
                assert_eq!(dimension, "lat");
                assert_eq!(index, -1);
                assert_eq!(len, 5);
            }
            other => panic!("Expected IndexOutOfBounds, got {:?}", other),
        }
        assert!(matches!(
            axis.sorted_range(1, 5),
            Err(ViewerError::IndexOutOfBounds { index: 5, .. })
        ));
        assert!(axis.sorted_slice(3, 1).is_err());
    }

    #[test]
    fn test_range_label() {
        let axis = CoordinateAxis::new("lon", vec![-10.5, 0.0, 10.25]);
        assert_eq!(
            axis.range_label(0, 2).unwrap(),
            "Selected range: -10.5000 to 10.2500"
        );
    }

    #[test]
    fn test_storage_lookup() {
        let axis = descending();
        assert_eq!(axis.storage_value(0).unwrap(), 40.0);
        assert!(axis.storage_value(5).is_err());
        assert_eq!(axis.storage_index_of(10.0), Some(3));
        assert_eq!(axis.storage_indices_between(35.0, 5.0), vec![1, 2, 3]);
    }

    #[test]
    fn test_time_labels() {
        let units = TimeUnits::parse("hours since 2020-01-01 00:00:00").unwrap();
        let axis = CoordinateAxis::new("time", vec![0.0, 36.0]).with_time_units(Some(units));
        assert_eq!(axis.label(36.0), "2020-01-02 12:00:00");
        assert!(TimeUnits::parse("degrees_north").is_none());
        assert_eq!(CoordinateAxis::new("depth", vec![5.0]).label(5.0), "5");
    }

    #[test]
    fn test_time_label_out_of_range_falls_back_to_number() {
        let units = TimeUnits::parse("days since 1950-01-01").unwrap();
        let axis = CoordinateAxis::new("time", vec![-1.0e300, 0.0, 9.97e36]).with_time_units(Some(units));
        assert_eq!(axis.label(-1.0e300), format_number(-1.0e300));
        assert_eq!(axis.label(9.97e36), format_number(9.97e36));
        assert_eq!(axis.label(0.0), "1950-01-01 00:00:00");
        assert!(units.decode(-9.97e36).is_none());
    }

    #[test]
    fn test_for_dimension_reads_metadata() {
        let dataset = InMemoryDataset::builder("memory://axis")
            .coordinate("time", vec![0.0, 1.0])
            .attribute("time", "units", AttributeValue::Text("days since 1990-06-01".to_string()))
            .variable("temp", &["time"], ArrayD::zeros(vec![2]))
            .build()
            .unwrap();

        let axis = CoordinateAxis::for_dimension(dataset.metadata(), "temp", "time").unwrap();
        assert!(axis.is_time());
        assert_eq!(axis.label(1.0), "1990-06-02 00:00:00");

        assert!(matches!(
            CoordinateAxis::for_dimension(dataset.metadata(), "temp", "depth"),
            Err(ViewerError::DimensionNotFound { .. })
        ));
    }
}
