//! Numeric point attributes painted onto the grid and spread into a smooth surface.

use crate::error::{CubeError, Result};
use crate::features::{geometry_kind, property_columns, Feature, GeometryKind};
use crate::focal::{positive_median, uniform_filter};
use crate::grid::Grid;
use crate::layer::Layer;
use crate::rasterize::rasterize;
use log::{debug, info, warn};
use ndarray::{Array2, Zip};
use serde_json::Value;

/// Box filter size used to spread observations into empty cells.
pub const SMOOTHING_WINDOW: usize = 50;

fn numeric(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

/// Fill empty cells of a painted attribute grid while keeping observations.
///
/// NaN and zero cells take the median of the strictly positive cells, the grid is
/// box-filtered with mirrored edges, and the original non-zero painted values are
/// written back. Without any positive cell, NaN cells become 0 and nothing is smoothed.
pub fn smooth_surface(painted: &Array2<f32>, window: usize) -> Array2<f32> {
    let Some(median) = positive_median(painted) else {
        return painted.mapv(|v| if v.is_nan() { 0.0 } else { v });
    };

    let filled = painted.mapv(|v| {
        if v.is_nan() || v == 0.0 {
            median as f64
        } else {
            v as f64
        }
    });
    let smoothed = uniform_filter(&filled, window);

    let mut out = smoothed.mapv(|v| v as f32);
    Zip::from(&mut out).and(painted).for_each(|o, &p| {
        if !p.is_nan() && p != 0.0 {
            *o = p;
        }
    });
    out
}

/// Rasterize numeric point attributes into one band per column, named `{layer_name}_{column}`.
///
/// An empty `columns` list means every column holding at least one number.
/// Columns no feature carries are skipped with a warning.
pub fn rasterize_attributes(
    features: &[Feature],
    columns: &[String],
    grid: &Grid,
    layer_name: &str,
) -> Result<Vec<Layer>> {
    if let Some(feature) = features
        .iter()
        .find(|f| geometry_kind(&f.geometry) != GeometryKind::Point)
    {
        return Err(CubeError::Config(format!(
            "attribute layer '{}' holds {:?} geometry; expected points",
            layer_name,
            geometry_kind(&feature.geometry)
        )));
    }

    let columns: Vec<String> = if columns.is_empty() {
        property_columns(features)
            .into_iter()
            .filter(|c| features.iter().any(|f| f.property(c).and_then(numeric).is_some()))
            .collect()
    } else {
        columns.to_vec()
    };

    let mut layers = Vec::with_capacity(columns.len());
    for column in &columns {
        if !features.iter().any(|f| f.properties.contains_key(column)) {
            warn!("Attribute '{}' not found in layer '{}', skipping", column, layer_name);
            continue;
        }

        let shapes: Vec<_> = features
            .iter()
            .filter_map(|f| {
                let value = f.property(column).and_then(numeric)?;
                Some((&f.geometry, value as f32))
            })
            .collect();
        debug!("Attribute '{}': {} observations", column, shapes.len());

        let painted = rasterize(shapes, grid, f32::NAN);
        let data = smooth_surface(&painted, SMOOTHING_WINDOW);
        layers.push(Layer::new(format!("{}_{}", layer_name, column), data));
    }

    info!("Layer '{}': {} attribute bands", layer_name, layers.len());
    Ok(layers)
}
