//! Line layers: binary occupancy, optionally spread into a distance-decay buffer.

use crate::distance::{decay_surface, DecayMode};
use crate::error::{CubeError, Result};
use crate::features::{geometry_kind, Feature, GeometryKind};
use crate::grid::Grid;
use crate::layer::Layer;
use crate::rasterize::rasterize;
use geo::Intersects;
use log::{debug, info, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Buffer settings for one line layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineBuffer {
    /// Buffer reach in target CRS units.
    pub max_distance: f64,
    pub decay: DecayMode,
}

pub fn rasterize_lines(
    features: &[Feature],
    buffer: Option<&LineBuffer>,
    grid: &Grid,
    name: &str,
) -> Result<Layer> {
    if let Some(feature) = features
        .iter()
        .find(|f| geometry_kind(&f.geometry) != GeometryKind::Line)
    {
        return Err(CubeError::Config(format!(
            "line layer '{}' holds {:?} geometry",
            name,
            geometry_kind(&feature.geometry)
        )));
    }

    let aoi = grid.bounds().to_rect();
    let shapes: Vec<_> = features
        .iter()
        .filter(|f| f.geometry.intersects(&aoi))
        .map(|f| (&f.geometry, 1.0f32))
        .collect();

    if shapes.is_empty() {
        warn!("No line in '{}' intersects the AOI; emitting an empty band", name);
        return Ok(Layer::new(name, Array2::zeros(grid.shape())));
    }
    debug!("Line layer '{}': {} of {} lines inside AOI", name, shapes.len(), features.len());

    let binary = rasterize(shapes, grid, 0.0);

    let data = match buffer {
        Some(buffer) => {
            let pixel_distance = buffer.max_distance / grid.mean_resolution();
            if pixel_distance > 0.0 {
                info!(
                    "Buffering '{}': {} units = {:.2} px, {:?} decay",
                    name, buffer.max_distance, pixel_distance, buffer.decay
                );
                let occupied = binary.mapv(|v| v > 0.0);
                decay_surface(&occupied, pixel_distance, buffer.decay)
            } else {
                warn!("Buffer distance for '{}' is not positive; keeping binary band", name);
                binary
            }
        }
        None => binary,
    };

    Ok(Layer::new(name, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Bounds;
    use geo::{line_string, polygon, Geometry};

    fn grid_10() -> Grid {
        Grid::from_bounds(Bounds::new(0.0, 0.0, 10.0, 10.0), 10, "EPSG:3857").unwrap()
    }

    fn vertical_line(x: f64) -> Feature {
        Feature::new(line_string![(x: x, y: -1.0), (x: x, y: 11.0)].into())
    }

    #[test]
    fn test_binary_when_unbuffered() {
        let layer = rasterize_lines(&[vertical_line(0.5)], None, &grid_10(), "roads").unwrap();
        assert_eq!(layer.name, "roads");
        assert!(layer.data.column(0).iter().all(|&v| v == 1.0));
        assert_eq!(layer.data.iter().filter(|&&v| v == 1.0).count(), 10);
    }

    #[test]
    fn test_linear_buffer_profile() {
        let buffer = LineBuffer {
            max_distance: 4.0,
            decay: DecayMode::Linear,
        };
        let layer = rasterize_lines(&[vertical_line(0.5)], Some(&buffer), &grid_10(), "roads").unwrap();
        let row: Vec<f32> = layer.data.row(3).to_vec();
        let expected = [1.0, 0.75, 0.5, 0.25, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        for (got, want) in row.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{:?}", row);
        }
    }

    #[test]
    fn test_exponential_buffer_cut_beyond_reach() {
        let buffer = LineBuffer {
            max_distance: 3.0,
            decay: DecayMode::Exponential,
        };
        let layer = rasterize_lines(&[vertical_line(4.5)], Some(&buffer), &grid_10(), "rivers").unwrap();
        assert_eq!(layer.data[[0, 4]], 1.0);
        assert!((layer.data[[0, 7]] - 0.01).abs() < 1e-6);
        assert_eq!(layer.data[[0, 8]], 0.0);
        assert!(layer.data[[0, 5]] > layer.data[[0, 6]]);
    }

    #[test]
    fn test_no_intersection_gives_zeros() {
        let far = Feature::new(line_string![(x: 50.0, y: 50.0), (x: 60.0, y: 60.0)].into());
        let layer = rasterize_lines(&[far], None, &grid_10(), "roads").unwrap();
        assert_eq!(layer.data.dim(), (10, 10));
        assert!(layer.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_polygon_rejected() {
        let area: Geometry<f64> = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)].into();
        assert!(rasterize_lines(&[Feature::new(area)], None, &grid_10(), "roads").is_err());
    }
}
