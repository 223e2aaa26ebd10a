//! Categorical polygon layers: one coded band per attribute column.

use crate::error::{CubeError, Result};
use crate::features::{geometry_kind, property_columns, Feature, GeometryKind};
use crate::grid::Grid;
use crate::layer::{Layer, Legend};
use crate::rasterize::rasterize;
use log::{debug, info, warn};
use serde_json::Value;

/// Category label of a property value; nulls have none.
pub fn category_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn ensure_polygons(features: &[Feature], layer_name: &str) -> Result<()> {
    for feature in features {
        let kind = geometry_kind(&feature.geometry);
        if kind != GeometryKind::Polygon {
            return Err(CubeError::Config(format!(
                "layer '{}' holds {:?} geometry; categorical layers need polygons",
                layer_name, kind
            )));
        }
    }
    Ok(())
}

/// Rasterize each column of `features` into a band named `{layer_name}_{column}`.
///
/// Cells hold the category code (first-seen order) of the last feature covering
/// them and NaN where no feature does. An empty `columns` list means every
/// attribute column. Columns no feature carries are skipped with a warning.
pub fn rasterize_categorical(
    features: &[Feature],
    columns: &[String],
    grid: &Grid,
    layer_name: &str,
) -> Result<Vec<Layer>> {
    ensure_polygons(features, layer_name)?;

    let columns = if columns.is_empty() {
        property_columns(features)
    } else {
        columns.to_vec()
    };

    let mut layers = Vec::with_capacity(columns.len());
    for column in &columns {
        let mut legend = Legend::new();
        let mut shapes = Vec::new();
        let mut present = false;

        for feature in features {
            if feature.properties.contains_key(column) {
                present = true;
            }
            if let Some(key) = feature.property(column).and_then(category_key) {
                let code = legend.insert(key);
                shapes.push((&feature.geometry, code as f32));
            }
        }

        if !present {
            warn!("Column '{}' not found in layer '{}', skipping", column, layer_name);
            continue;
        }

        debug!(
            "Column '{}': {} categories from {} shapes",
            column,
            legend.len(),
            shapes.len()
        );
        let data = rasterize(shapes, grid, f32::NAN);
        layers.push(Layer::categorical(
            format!("{}_{}", layer_name, column),
            data,
            legend,
        ));
    }

    info!("Layer '{}': {} categorical bands", layer_name, layers.len());
    Ok(layers)
}
