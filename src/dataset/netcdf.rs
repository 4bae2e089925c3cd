//! NetCDF engine.
//!
//! Metadata and coordinate variables are read when the file is opened. The
//! file handle is not kept: each hyperslab read reopens the file, so the
//! dataset stays `Send + Sync` without holding library state.

use ::netcdf::{Attribute, Extent};
use ndarray::{ArrayD, IxDyn};
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{check_ranges, AttributeValue, CfPacking, Dataset, Dimension, Metadata, Variable};
use crate::error::{Result, ViewerError};

/// A NetCDF file opened for lazy reads.
#[derive(Debug)]
pub struct NetCdfDataset {
    source: String,
    path: PathBuf,
    metadata: Metadata,
}

impl NetCdfDataset {
    pub fn open(source: &str) -> Result<Self> {
        let path = Path::new(source);
        if !path.is_file() {
            return Err(ViewerError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", path.display()),
            )));
        }

        let file = ::netcdf::open(path)?;
        debug!(
            variables = file.variables().count(),
            dimensions = file.dimensions().count(),
            "Opened NetCDF file: {}",
            path.display()
        );

        let metadata = extract_metadata(&file)?;
        metadata.validate()?;
        info!(source = source, variables = metadata.variables.len(), "Read NetCDF metadata");

        Ok(Self {
            source: source.to_string(),
            path: path.to_path_buf(),
            metadata,
        })
    }
}

impl Dataset for NetCdfDataset {
    fn engine_name(&self) -> &'static str {
        "netcdf"
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn read_hyperslab(&self, variable: &str, ranges: &[Range<usize>]) -> Result<ArrayD<f32>> {
        let meta = self.metadata.variable(variable)?;
        check_ranges(meta, ranges)?;

        let file = ::netcdf::open(&self.path)?;
        let var = file
            .variable(variable)
            .ok_or_else(|| ViewerError::VariableNotFound {
                name: variable.to_string(),
            })?;

        let extents: Vec<Extent> = ranges.iter().cloned().map(Extent::from).collect();
        let raw = read_values_f64(&var, &extents)?;
        let shape: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
        let raw = ArrayD::from_shape_vec(IxDyn(&shape), raw)?;
        Ok(CfPacking::from_variable(meta).decode(raw))
    }
}

fn extract_metadata(file: &::netcdf::File) -> Result<Metadata> {
    let mut global_attributes = HashMap::new();
    for attr in file.attributes() {
        global_attributes.insert(attr.name().to_string(), convert_attribute(&attr)?);
    }

    let mut dimensions = HashMap::new();
    for dim in file.dimensions() {
        dimensions.insert(
            dim.name().to_string(),
            Dimension {
                name: dim.name().to_string(),
                size: dim.len(),
            },
        );
    }

    let mut variables = HashMap::new();
    let mut coordinates = HashMap::new();

    for var in file.variables() {
        let var_dims: Vec<String> = var
            .dimensions()
            .iter()
            .map(|dim| dim.name().to_string())
            .collect();
        let var_shape: Vec<usize> = var.dimensions().iter().map(|dim| dim.len()).collect();

        let mut var_attrs = HashMap::new();
        for attr in var.attributes() {
            var_attrs.insert(attr.name().to_string(), convert_attribute(&attr)?);
        }

        let variable = Variable {
            name: var.name().to_string(),
            dimensions: var_dims,
            shape: var_shape,
            attributes: var_attrs,
            dtype: format!("{:?}", var.vartype()),
        };

        if variable.dimensions.len() == 1 && variable.dimensions[0] == variable.name {
            let packing = CfPacking::from_variable(&variable);
            let values = match read_values_f64(&var, &[]) {
                Ok(values) => values.into_iter().map(|v| packing.unpack(v)).collect(),
                Err(e) => {
                    warn!(
                        "Unsupported coordinate variable {}: {}, using indices instead",
                        variable.name, e
                    );
                    (0..variable.shape[0]).map(|i| i as f64).collect()
                }
            };
            coordinates.insert(variable.name.clone(), values);
        }

        variables.insert(variable.name.clone(), variable);
    }

    let mut metadata = Metadata {
        global_attributes,
        dimensions,
        variables,
        coordinates,
    };
    metadata.fill_missing_coordinates();
    Ok(metadata)
}

/// Read values as f64, trying the numeric element types in turn
fn read_values_f64(var: &::netcdf::Variable, extents: &[Extent]) -> Result<Vec<f64>> {
    macro_rules! try_read {
        ($($t:ty),*) => {
            $(
                if let Ok(values) = var.get_values::<$t, _>(extents) {
                    return Ok(values.into_iter().map(|v| v as f64).collect());
                }
            )*
        };
    }
    try_read!(f64, f32, i32, i16, i8, u8, u16, u32, i64, u64);

    Err(ViewerError::subset(format!(
        "Variable {} of type {:?} cannot be read as numbers",
        var.name(),
        var.vartype()
    )))
}

fn convert_attribute(attr: &Attribute) -> Result<AttributeValue> {
    use ::netcdf::AttributeValue as Nc;

    let value = attr.value()?;
    let converted = match value {
        Nc::Str(s) => AttributeValue::Text(s),
        Nc::Strs(items) => AttributeValue::Text(items.join(", ")),
        Nc::Uchar(v) => AttributeValue::Number(v as f64),
        Nc::Schar(v) => AttributeValue::Number(v as f64),
        Nc::Ushort(v) => AttributeValue::Number(v as f64),
        Nc::Short(v) => AttributeValue::Number(v as f64),
        Nc::Uint(v) => AttributeValue::Number(v as f64),
        Nc::Int(v) => AttributeValue::Number(v as f64),
        Nc::Ulonglong(v) => AttributeValue::Number(v as f64),
        Nc::Longlong(v) => AttributeValue::Number(v as f64),
        Nc::Float(v) => AttributeValue::Number(v as f64),
        Nc::Double(v) => AttributeValue::Number(v),
        Nc::Shorts(v) => AttributeValue::NumberArray(v.into_iter().map(f64::from).collect()),
        Nc::Ints(v) => AttributeValue::NumberArray(v.into_iter().map(f64::from).collect()),
        Nc::Floats(v) => AttributeValue::NumberArray(v.into_iter().map(f64::from).collect()),
        Nc::Doubles(v) => AttributeValue::NumberArray(v),
        other => AttributeValue::Text(format!("{:?}", other)),
    };
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(path: &Path) -> std::result::Result<(), ::netcdf::Error> {
        let mut file = ::netcdf::create(path)?;
        file.add_dimension("time", 2)?;
        file.add_dimension("lat", 3)?;
        file.add_dimension("lon", 2)?;
        file.add_attribute("title", "netcdf engine test")?;

        {
            let mut time = file.add_variable::<f64>("time", &["time"])?;
            time.put_attribute("units", "days since 2020-01-01")?;
            time.put_values(&[0.0, 1.0], &[..])?;
        }
        {
            let mut lat = file.add_variable::<f32>("lat", &["lat"])?;
            lat.put_values(&[30.0f32, 20.0, 10.0], &[..])?;
        }
        {
            let mut lon = file.add_variable::<f32>("lon", &["lon"])?;
            lon.put_values(&[100.0f32, 101.0], &[..])?;
        }
        {
            let mut sst = file.add_variable::<i16>("sst", &["time", "lat", "lon"])?;
            sst.put_attribute("scale_factor", 0.1f64)?;
            sst.put_attribute("_FillValue", -999i16)?;
            let values: Vec<i16> = (0..12).map(|i| if i == 5 { -999 } else { i * 10 }).collect();
            sst.put_values(&values, &[.., .., ..])?;
        }
        Ok(())
    }

    #[test]
    fn test_open_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sst.nc");
        write_file(&path).unwrap();

        let dataset = NetCdfDataset::open(path.to_str().unwrap()).unwrap();
        let metadata = dataset.metadata();
        assert_eq!(metadata.data_variables(), vec!["sst".to_string()]);
        assert_eq!(metadata.coordinate("lat"), Some(&[30.0, 20.0, 10.0][..]));
        assert_eq!(
            metadata.variable("time").unwrap().text_attribute("units"),
            Some("days since 2020-01-01")
        );

        let slab = dataset.read_hyperslab("sst", &[0..1, 1..3, 0..2]).unwrap();
        assert_eq!(slab.shape(), &[1, 2, 2]);
        assert!((slab[IxDyn(&[0, 0, 0])] - 2.0).abs() < 1e-5);
        assert!((slab[IxDyn(&[0, 0, 1])] - 3.0).abs() < 1e-5);
        assert!((slab[IxDyn(&[0, 1, 0])] - 4.0).abs() < 1e-5);
        assert!(slab[IxDyn(&[0, 1, 1])].is_nan());
    }

    #[test]
    fn test_open_missing_file() {
        assert!(NetCdfDataset::open("/nonexistent/file.nc").is_err());
    }
}
