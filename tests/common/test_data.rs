//! Test data generation utilities.
//!
//! Writes small Zarr stores (and NetCDF files when the engine is compiled
//! in) with a known `temp(time, lat, lon)` pattern, so tests can predict
//! every value the server returns.

use anyhow::Result;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use zarrs::array::{ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

/// Time coordinate, in days since 2000-01-01
pub const TIMES: [f64; 3] = [0.0, 1.0, 2.0];
pub const TIME_UNITS: &str = "days since 2000-01-01";
/// Latitudes in ascending storage order
pub const LATS: [f64; 5] = [-20.0, -10.0, 0.0, 10.0, 20.0];
pub const LONS: [f64; 5] = [0.0, 10.0, 20.0, 30.0, 40.0];
/// Stored where the last time step has no data at the first grid cell
pub const FILL_VALUE: f32 = -999.0;

/// The value of `temp` at one grid point
pub fn ocean_value(time_index: usize, lat: f64, lon: f64) -> f32 {
    (100.0 * time_index as f64 + lat + lon / 10.0) as f32
}

/// `temp` values in C order over the given coordinate orders
fn temp_values(lats: &[f64], lons: &[f64]) -> Vec<f32> {
    let mut values = Vec::with_capacity(TIMES.len() * lats.len() * lons.len());
    for t in 0..TIMES.len() {
        for (i, &lat) in lats.iter().enumerate() {
            for (j, &lon) in lons.iter().enumerate() {
                if t == TIMES.len() - 1 && i == 0 && j == 0 {
                    values.push(FILL_VALUE);
                } else {
                    values.push(ocean_value(t, lat, lon));
                }
            }
        }
    }
    values
}

fn write_coordinate(
    store: &Arc<FilesystemStore>,
    name: &str,
    values: &[f64],
    units: &str,
) -> Result<()> {
    let mut attrs = serde_json::Map::new();
    attrs.insert("units".to_string(), json!(units));

    let array = ArrayBuilder::new(
        vec![values.len() as u64],
        DataType::Float64,
        vec![values.len() as u64].try_into()?,
        FillValue::from(f64::NAN),
    )
    .dimension_names(Some([name]))
    .attributes(attrs)
    .build(store.clone(), &format!("/{}", name))?;
    array.store_metadata()?;
    array.store_array_subset_elements::<f64>(
        &ArraySubset::new_with_ranges(&[0..values.len() as u64]),
        values,
    )?;
    Ok(())
}

/// Write the ocean store with latitudes in the given storage order.
///
/// Contains `temp(time, lat, lon)` with a `_FillValue` and
/// `depth_profile(time)`, which has no spatial dimensions.
pub fn create_ocean_store_with_lats(path: &Path, lats: &[f64]) -> Result<()> {
    let store = Arc::new(FilesystemStore::new(path)?);

    let mut attrs = serde_json::Map::new();
    attrs.insert("title".to_string(), json!("gridview test ocean"));
    attrs.insert("institution".to_string(), json!("gridview test suite"));
    GroupBuilder::new()
        .attributes(attrs)
        .build(store.clone(), "/")?
        .store_metadata()?;

    write_coordinate(&store, "time", &TIMES, TIME_UNITS)?;
    write_coordinate(&store, "lat", lats, "degrees_north")?;
    write_coordinate(&store, "lon", &LONS, "degrees_east")?;

    let mut temp_attrs = serde_json::Map::new();
    temp_attrs.insert("units".to_string(), json!("degC"));
    temp_attrs.insert("long_name".to_string(), json!("sea water temperature"));
    temp_attrs.insert("_FillValue".to_string(), json!(FILL_VALUE));
    let shape = vec![TIMES.len() as u64, lats.len() as u64, LONS.len() as u64];
    let temp = ArrayBuilder::new(
        shape.clone(),
        DataType::Float32,
        vec![1, 3, 3].try_into()?,
        FillValue::from(FILL_VALUE),
    )
    .dimension_names(Some(["time", "lat", "lon"]))
    .attributes(temp_attrs)
    .build(store.clone(), "/temp")?;
    temp.store_metadata()?;
    temp.store_array_subset_elements::<f32>(
        &ArraySubset::new_with_ranges(&[0..shape[0], 0..shape[1], 0..shape[2]]),
        &temp_values(lats, &LONS),
    )?;

    let profile = ArrayBuilder::new(
        vec![TIMES.len() as u64],
        DataType::Float32,
        vec![TIMES.len() as u64].try_into()?,
        FillValue::from(f32::NAN),
    )
    .dimension_names(Some(["time"]))
    .build(store.clone(), "/depth_profile")?;
    profile.store_metadata()?;
    profile.store_array_subset_elements::<f32>(
        &ArraySubset::new_with_ranges(&[0..TIMES.len() as u64]),
        &[5.0, 6.0, 7.0],
    )?;

    Ok(())
}

/// Write the ocean store with ascending latitudes
pub fn create_ocean_store(path: &Path) -> Result<()> {
    create_ocean_store_with_lats(path, &LATS)
}

/// Write the same data as a NetCDF file
#[cfg(feature = "netcdf")]
pub fn create_ocean_nc(path: &Path) -> std::result::Result<(), netcdf::Error> {
    let mut file = netcdf::create(path)?;
    file.add_dimension("time", TIMES.len())?;
    file.add_dimension("lat", LATS.len())?;
    file.add_dimension("lon", LONS.len())?;
    file.add_attribute("title", "gridview test ocean")?;

    {
        let mut time = file.add_variable::<f64>("time", &["time"])?;
        time.put_attribute("units", TIME_UNITS)?;
        time.put_values(&TIMES, &[..])?;
    }
    {
        let mut lat = file.add_variable::<f64>("lat", &["lat"])?;
        lat.put_attribute("units", "degrees_north")?;
        lat.put_values(&LATS, &[..])?;
    }
    {
        let mut lon = file.add_variable::<f64>("lon", &["lon"])?;
        lon.put_attribute("units", "degrees_east")?;
        lon.put_values(&LONS, &[..])?;
    }
    {
        let mut temp = file.add_variable::<f32>("temp", &["time", "lat", "lon"])?;
        temp.put_attribute("units", "degC")?;
        temp.put_attribute("_FillValue", FILL_VALUE)?;
        temp.put_values(&temp_values(&LATS, &LONS), &[.., .., ..])?;
    }
    Ok(())
}
