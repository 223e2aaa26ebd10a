//! Nearest-neighbour resampling of a source raster band onto the target grid.

use crate::crs::CrsTransform;
use crate::error::{CubeError, Result};
use crate::focal::{fill_gaps, GAP_FILL_WINDOW};
use crate::grid::Grid;
use crate::io::SourceRaster;
use crate::layer::Layer;
use log::{debug, info, warn};
use ndarray::Array2;
use rayon::prelude::*;

fn sample(source: &SourceRaster, x: f64, y: f64, nodata: f64) -> f32 {
    let Some((col, row)) = source.geotransform.world_to_pixel(x, y) else {
        return f32::NAN;
    };
    if !(col >= 0.0 && row >= 0.0) {
        return f32::NAN;
    }
    let (row, col) = (row.floor() as usize, col.floor() as usize);
    match source.data.get((row, col)) {
        Some(&v) if v.is_nan() || v == nodata => f32::NAN,
        Some(&v) => v as f32,
        None => f32::NAN,
    }
}

/// Resample `source` onto `grid`, sampling the source at every target cell centre.
///
/// Source nodata and cells outside the source become NaN. With `fill`, NaN
/// cells are first interpolated from their neighbourhood. Remaining NaN cells are
/// written as 0.
pub fn resample_nearest(
    source: &SourceRaster,
    source_crs: Option<&str>,
    grid: &Grid,
    name: &str,
    fill: bool,
) -> Result<Layer> {
    let nodata = source.effective_nodata();
    let to_source = match source_crs.or(source.crs.as_deref()) {
        Some(crs) => CrsTransform::between(grid.crs(), crs)?,
        None => {
            warn!("Raster '{}' declares no CRS; assuming {}", name, grid.crs());
            None
        }
    };
    let (rows, cols) = grid.shape();

    let resampled: Vec<Vec<f32>> = (0..rows)
        .into_par_iter()
        .map(|row| -> Result<Vec<f32>> {
            (0..cols)
                .map(|col| -> Result<f32> {
                    let (x, y) = grid.cell_center(row, col);
                    let (sx, sy) = match &to_source {
                        Some(t) => t.transform_point(x, y)?,
                        None => (x, y),
                    };
                    Ok(sample(source, sx, sy, nodata))
                })
                .collect()
        })
        .collect::<Result<Vec<Vec<f32>>>>()
        .map_err(|e| match e {
            CubeError::Reprojection(msg) => CubeError::Reprojection(format!("raster '{}': {}", name, msg)),
            other => other,
        })?;

    let flat: Vec<f32> = resampled.into_iter().flatten().collect();
    let mut data = Array2::from_shape_vec((rows, cols), flat)?;

    let missing = data.iter().filter(|v| v.is_nan()).count();
    if missing == data.len() {
        warn!("Raster '{}' does not overlap the grid", name);
    }
    debug!("Raster '{}': {} of {} cells without data", name, missing, data.len());

    if fill && missing > 0 {
        data = fill_gaps(&data, GAP_FILL_WINDOW);
    }
    data.mapv_inplace(|v| if v.is_nan() { 0.0 } else { v });

    info!(
        "Resampled '{}' ({}x{}) onto {}x{} grid",
        name,
        source.height(),
        source.width(),
        rows,
        cols
    );
    Ok(Layer::new(name, data))
}
