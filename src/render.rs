//! Map rendering for the `ShowPlot` action.
//!
//! A 2-D latitude/longitude subset is drawn north-up with a fixed viridis
//! ramp. Missing cells stay transparent.

use image::{ImageBuffer, ImageFormat, Rgba, RgbaImage};
use ndarray::{ArrayView2, Ix2};
use serde::Serialize;
use std::io::Cursor;
use std::time::Instant;
use tracing::debug;

use crate::coords::format_number;
use crate::error::{Result, ViewerError};
use crate::selection::{is_latitude, is_longitude};
use crate::subset::SubsetArray;

/// Result of the `ShowPlot` action
#[derive(Debug, Clone, Serialize)]
pub struct PlotResult {
    /// Encoded PNG
    #[serde(skip)]
    pub png: Vec<u8>,
    /// `[lon_min, lon_max, lat_min, lat_max]`
    pub extent: [f64; 4],
    pub title: String,
}

fn render_error(message: impl Into<String>) -> ViewerError {
    ViewerError::Render {
        message: message.into(),
    }
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Render `subset` to a `width` x `height` PNG.
///
/// `label` formats the value of each scalar-selected dimension for the title.
pub fn render_map(
    subset: &SubsetArray,
    width: u32,
    height: u32,
    label: impl Fn(&str, f64) -> String,
) -> Result<PlotResult> {
    let start = Instant::now();

    if subset.dims.len() != 2 {
        return Err(render_error(format!(
            "Plotting needs exactly a latitude and a longitude dimension, got {:?}",
            subset.dims
        )));
    }
    let lat_axis = subset
        .dims
        .iter()
        .position(|d| is_latitude(d))
        .ok_or_else(|| render_error(format!("No latitude dimension in {:?}", subset.dims)))?;
    let lon_axis = subset
        .dims
        .iter()
        .position(|d| is_longitude(d) && !is_latitude(d))
        .ok_or_else(|| render_error(format!("No longitude dimension in {:?}", subset.dims)))?;
    if lat_axis == lon_axis {
        return Err(render_error("Latitude and longitude resolve to the same dimension"));
    }

    let lats = &subset.coords[lat_axis];
    let lons = &subset.coords[lon_axis];
    let (lat_min, lat_max) = min_max(lats).ok_or_else(|| render_error("Empty latitude selection"))?;
    let (lon_min, lon_max) = min_max(lons).ok_or_else(|| render_error("Empty longitude selection"))?;
    if lat_min == lat_max || lon_min == lon_max {
        return Err(render_error(format!(
            "Degenerate map extent: lon {} to {}, lat {} to {}",
            lon_min, lon_max, lat_min, lat_max
        )));
    }

    let grid = subset
        .data
        .view()
        .into_dimensionality::<Ix2>()?;
    // Rows must be latitude
    let grid = if lat_axis == 0 { grid } else { grid.reversed_axes() };

    let img = paint(grid, width, height)?;

    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| render_error(format!("Failed to encode PNG: {}", e)))?;

    let mut lines = vec![subset.variable.clone()];
    for dim in &subset.dims {
        if is_latitude(dim) {
            lines.push(format!("Lat: {:.4} to {:.4}", lat_min, lat_max));
        } else {
            lines.push(format!("Lon: {:.4} to {:.4}", lon_min, lon_max));
        }
    }
    for (dim, value) in &subset.fixed {
        lines.push(format!("{}: {}", dim, label(dim, *value)));
    }

    debug!(
        variable = %subset.variable,
        width = width,
        height = height,
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Map rendered"
    );

    Ok(PlotResult {
        png: buffer.into_inner(),
        extent: [lon_min, lon_max, lat_min, lat_max],
        title: lines.join("\n"),
    })
}

/// Title label for a scalar dimension when no decoding is available
pub fn plain_label(_dimension: &str, value: f64) -> String {
    format_number(value)
}

/// Nearest-cell raster of a (lat, lon) grid with ascending axes, north up
fn paint(grid: ArrayView2<f32>, width: u32, height: u32) -> Result<RgbaImage> {
    if width == 0 || height == 0 {
        return Err(render_error("Image size must be positive"));
    }
    let (rows, cols) = grid.dim();

    let (lo, hi) = grid
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f32, f32)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .ok_or_else(|| render_error("Selected data contains no valid values"))?;

    let gradient = colorgrad::viridis();
    let mut img = ImageBuffer::new(width, height);

    for y in 0..height {
        let row = rows - 1 - (y as usize * rows / height as usize);
        for x in 0..width {
            let col = x as usize * cols / width as usize;
            let value = grid[[row, col]];
            let pixel = if value.is_finite() {
                let t = if hi > lo {
                    ((value - lo) / (hi - lo)) as f64
                } else {
                    0.5
                };
                gradient.at(t).to_rgba8()
            } else {
                [0, 0, 0, 0]
            };
            img.put_pixel(x, y, Rgba(pixel));
        }
    }

    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn subset(dims: &[&str], coords: Vec<Vec<f64>>, shape: &[usize], data: Vec<f32>) -> SubsetArray {
        SubsetArray {
            variable: "sst".to_string(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            coords,
            fixed: vec![("time".to_string(), 3.0)],
            data: ArrayD::from_shape_vec(IxDyn(shape), data).unwrap(),
        }
    }

    #[test]
    fn test_render_lat_lon() {
        let s = subset(
            &["lat", "lon"],
            vec![vec![-10.0, 0.0, 10.0], vec![100.0, 110.0]],
            &[3, 2],
            vec![1.0, 2.0, 3.0, f32::NAN, 5.0, 6.0],
        );
        let plot = render_map(&s, 20, 30, plain_label).unwrap();

        assert_eq!(plot.extent, [100.0, 110.0, -10.0, 10.0]);
        assert_eq!(
            plot.title,
            "sst\nLat: -10.0000 to 10.0000\nLon: 100.0000 to 110.0000\ntime: 3"
        );

        let img = image::load_from_memory(&plot.png).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (20, 30));
        // Image rows run north to south, so the NaN cell lands in the middle band
        assert_eq!(img.get_pixel(15, 15)[3], 0);
        assert_eq!(img.get_pixel(0, 0)[3], 255);
    }

    #[test]
    fn test_lon_first_is_transposed() {
        let lat_first = subset(
            &["lat", "lon"],
            vec![vec![0.0, 1.0], vec![0.0, 1.0, 2.0]],
            &[2, 3],
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        );
        let lon_first = subset(
            &["lon", "lat"],
            vec![vec![0.0, 1.0, 2.0], vec![0.0, 1.0]],
            &[3, 2],
            vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0],
        );
        let a = render_map(&lat_first, 12, 8, plain_label).unwrap();
        let b = render_map(&lon_first, 12, 8, plain_label).unwrap();
        assert_eq!(a.png, b.png);
        assert_eq!(a.extent, b.extent);
    }

    #[test]
    fn test_degenerate_extent() {
        let s = subset(&["lat", "lon"], vec![vec![5.0], vec![0.0, 1.0]], &[1, 2], vec![1.0, 2.0]);
        let err = render_map(&s, 10, 10, plain_label).unwrap_err();
        assert_eq!(err.kind(), "RenderFailure");
    }

    #[test]
    fn test_non_spatial_subset() {
        let s = subset(&["time", "lon"], vec![vec![0.0, 1.0], vec![0.0, 1.0]], &[2, 2], vec![1.0; 4]);
        assert!(render_map(&s, 10, 10, plain_label).is_err());
    }
}
