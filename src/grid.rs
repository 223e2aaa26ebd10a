//! Target grid: shape from the AOI bounding box, north-up affine transform and CRS.
//!
//! The grid is computed once per build and shared read-only by every rasterizer.

use crate::error::{CubeError, Result};
use geo::{coord, Rect};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// World-space bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl Bounds {
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Self {
        Self {
            minx,
            miny,
            maxx,
            maxy,
        }
    }

    pub fn width(&self) -> f64 {
        self.maxx - self.minx
    }

    pub fn height(&self) -> f64 {
        self.maxy - self.miny
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.minx, y: self.miny },
            coord! { x: self.maxx, y: self.maxy },
        )
    }
}

impl From<Rect<f64>> for Bounds {
    fn from(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

/// Six-coefficient affine transform in GDAL order:
/// `x = c0 + col * c1 + row * c2`, `y = c3 + col * c4 + row * c5`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// North-up transform covering `bounds` with `rows` x `cols` pixels.
    pub fn from_bounds(bounds: &Bounds, rows: usize, cols: usize) -> Self {
        let x_res = bounds.width() / cols as f64;
        let y_res = bounds.height() / rows as f64;
        GeoTransform([bounds.minx, x_res, 0.0, bounds.maxy, 0.0, -y_res])
    }

    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    pub fn x_res(&self) -> f64 {
        self.0[1]
    }

    pub fn y_res(&self) -> f64 {
        self.0[5]
    }

    /// World coordinate of a fractional pixel position (col, row).
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        let c = &self.0;
        (
            c[0] + col * c[1] + row * c[2],
            c[3] + col * c[4] + row * c[5],
        )
    }

    /// Fractional pixel position (col, row) of a world coordinate.
    /// Returns `None` when the transform is singular.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let c = &self.0;
        let det = c[1] * c[5] - c[2] * c[4];
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let dx = x - c[0];
        let dy = y - c[3];
        let col = (dx * c[5] - dy * c[2]) / det;
        let row = (dy * c[1] - dx * c[4]) / det;
        Some((col, row))
    }
}

/// Computes `(rows, cols)` for the AOI bounding box so the short edge gets
/// `short_edge_cells` cells and the long edge keeps the aspect ratio.
pub fn compute_grid_size(bounds: &Bounds, short_edge_cells: usize) -> Result<(usize, usize)> {
    if short_edge_cells == 0 {
        return Err(CubeError::Config(
            "short_edge_cells must be positive".to_string(),
        ));
    }

    let width = bounds.width();
    let height = bounds.height();
    if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
        return Err(CubeError::Config(format!(
            "degenerate AOI bounding box [{}, {}, {}, {}]",
            bounds.minx, bounds.miny, bounds.maxx, bounds.maxy
        )));
    }

    let portrait = width < height;
    let (short_edge, long_edge) = if portrait {
        (width, height)
    } else {
        (height, width)
    };
    let aspect_ratio = long_edge / short_edge;
    let long_edge_cells = ((short_edge_cells as f64 * aspect_ratio).round() as usize).max(1);

    debug!(
        "AOI {:.3} x {:.3} ({}), aspect ratio {:.4}",
        width,
        height,
        if portrait { "portrait" } else { "landscape" },
        aspect_ratio
    );

    if portrait {
        Ok((long_edge_cells, short_edge_cells))
    } else {
        Ok((short_edge_cells, long_edge_cells))
    }
}

/// Immutable target grid shared by all rasterizers.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    transform: GeoTransform,
    crs: String,
    bounds: Bounds,
}

impl Grid {
    pub fn from_bounds(bounds: Bounds, short_edge_cells: usize, crs: impl Into<String>) -> Result<Self> {
        let (rows, cols) = compute_grid_size(&bounds, short_edge_cells)?;
        let transform = GeoTransform::from_bounds(&bounds, rows, cols);
        let crs = crs.into();

        info!(
            "Grid: {} rows x {} cols, pixel {:.6} x {:.6} ({})",
            rows,
            cols,
            transform.x_res(),
            transform.y_res().abs(),
            crs
        );

        Ok(Self {
            rows,
            cols,
            transform,
            crs,
            bounds,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`, matching `Array2::dim()`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Mean absolute pixel size, used to convert world distances to pixels.
    pub fn mean_resolution(&self) -> f64 {
        (self.transform.x_res().abs() + self.transform.y_res().abs()) / 2.0
    }

    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.transform
            .pixel_to_world(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// World rectangle covered by one cell.
    pub fn cell_bounds(&self, row: usize, col: usize) -> Rect<f64> {
        let (x0, y0) = self.transform.pixel_to_world(col as f64, row as f64);
        let (x1, y1) = self
            .transform
            .pixel_to_world(col as f64 + 1.0, row as f64 + 1.0);
        Rect::new(coord! { x: x0, y: y0 }, coord! { x: x1, y: y1 })
    }

    /// Cell containing a world coordinate, if inside the grid.
    pub fn cell_at(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (col, row) = self.transform.world_to_pixel(x, y)?;
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (row, col) = (row.floor() as usize, col.floor() as usize);
        (row < self.rows && col < self.cols).then_some((row, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_aoi() {
        let bounds = Bounds::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(compute_grid_size(&bounds, 20).unwrap(), (20, 20));
    }

    #[test]
    fn test_landscape_aoi() {
        let bounds = Bounds::new(0.0, 0.0, 30.0, 10.0);
        assert_eq!(compute_grid_size(&bounds, 20).unwrap(), (20, 60));
    }

    #[test]
    fn test_portrait_aoi() {
        let bounds = Bounds::new(100.0, 200.0, 104.0, 210.0);
        // aspect 2.5 -> 25 rows along the long (vertical) edge
        assert_eq!(compute_grid_size(&bounds, 10).unwrap(), (25, 10));
    }

    #[test]
    fn test_aspect_ratio_within_one_cell() {
        let boxes = [
            (0.0, 0.0, 1.0, 3.7),
            (5.0, -2.0, 17.3, 1.1),
            (-180.0, -85.0, 180.0, 85.0),
            (0.0, 0.0, 0.001, 0.0123),
        ];
        for &(minx, miny, maxx, maxy) in &boxes {
            let bounds = Bounds::new(minx, miny, maxx, maxy);
            let (rows, cols) = compute_grid_size(&bounds, 37).unwrap();
            assert!(rows > 0 && cols > 0);
            let expected_cols = 37.0 * bounds.width() / bounds.width().min(bounds.height());
            let expected_rows = 37.0 * bounds.height() / bounds.width().min(bounds.height());
            assert!((cols as f64 - expected_cols).abs() <= 1.0);
            assert!((rows as f64 - expected_rows).abs() <= 1.0);
        }
    }

    #[test]
    fn test_degenerate_aoi_rejected() {
        assert!(compute_grid_size(&Bounds::new(0.0, 0.0, 0.0, 10.0), 20).is_err());
        assert!(compute_grid_size(&Bounds::new(0.0, 5.0, 10.0, 5.0), 20).is_err());
        assert!(compute_grid_size(&Bounds::new(0.0, 0.0, f64::NAN, 10.0), 20).is_err());
        assert!(compute_grid_size(&Bounds::new(0.0, 0.0, 10.0, 10.0), 0).is_err());
    }

    #[test]
    fn test_transform_roundtrip() {
        let grid = Grid::from_bounds(Bounds::new(0.0, 0.0, 10.0, 10.0), 20, "EPSG:3857").unwrap();
        assert_eq!(grid.transform().coefficients(), [0.0, 0.5, 0.0, 10.0, 0.0, -0.5]);
        assert_eq!(grid.cell_center(0, 0), (0.25, 9.75));
        assert_eq!(grid.cell_at(0.25, 9.75), Some((0, 0)));
        assert_eq!(grid.cell_at(5.1, 5.1), Some((9, 10)));
        assert_eq!(grid.cell_at(10.5, 5.0), None);

        let (col, row) = grid.transform().world_to_pixel(2.0, 7.0).unwrap();
        assert!((col - 4.0).abs() < 1e-12);
        assert!((row - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_cell_bounds() {
        let grid = Grid::from_bounds(Bounds::new(0.0, 0.0, 10.0, 10.0), 20, "EPSG:3857").unwrap();
        let rect = grid.cell_bounds(19, 0);
        assert_eq!(rect.min().x, 0.0);
        assert_eq!(rect.min().y, 0.0);
        assert_eq!(rect.max().x, 0.5);
        assert_eq!(rect.max().y, 0.5);
    }
}
