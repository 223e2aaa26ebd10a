//! Burn vector geometries into a grid-aligned `Array2<f32>`.
//!
//! Polygons burn cells whose centre falls inside (even-odd rule, so holes stay
//! empty), lines burn every cell they pass through, points burn the cell that
//! contains them. Shapes are burned in order and later values overwrite earlier ones.
//!
//! With the `gdal` feature the burn goes through `gdal::raster::rasterize` on an
//! in-memory dataset instead; the pure `geo` path stays as the fallback.

use crate::grid::Grid;
use geo::{Coord, Geometry, LineString, Point, Polygon};
use ndarray::Array2;
use std::f64::consts::PI;

/// Vertices used to approximate a buffered point.
pub const CIRCLE_SEGMENTS: usize = 64;

/// Rasterize `(geometry, value)` pairs onto `grid`; uncovered cells hold `fill`.
pub fn rasterize<'a, I>(shapes: I, grid: &Grid, fill: f32) -> Array2<f32>
where
    I: IntoIterator<Item = (&'a Geometry<f64>, f32)>,
{
    #[cfg(feature = "gdal")]
    {
        let shapes: Vec<(&Geometry<f64>, f32)> = shapes.into_iter().collect();
        match gdal_burn::rasterize(&shapes, grid, fill) {
            Ok(out) => out,
            Err(e) => {
                log::warn!("GDAL rasterize failed ({}), using the geo rasterizer", e);
                rasterize_geo(shapes, grid, fill)
            }
        }
    }
    #[cfg(not(feature = "gdal"))]
    {
        rasterize_geo(shapes, grid, fill)
    }
}

/// Scanline rasterizer over `geo` types, used when GDAL is not available.
pub fn rasterize_geo<'a, I>(shapes: I, grid: &Grid, fill: f32) -> Array2<f32>
where
    I: IntoIterator<Item = (&'a Geometry<f64>, f32)>,
{
    let mut out = Array2::from_elem(grid.shape(), fill);
    for (geometry, value) in shapes {
        burn_geometry(&mut out, grid, geometry, value);
    }
    out
}

#[cfg(feature = "gdal")]
pub mod gdal_burn {
    use crate::error::Result;
    use crate::grid::Grid;
    use gdal::raster::{MergeAlgorithm, RasterizeOptions};
    use gdal::vector::ToGdal;
    use gdal::DriverManager;
    use geo::Geometry;
    use ndarray::Array2;

    /// Burn the shapes into a one-band MEM dataset laid out like `grid` and read it back.
    pub fn rasterize(shapes: &[(&Geometry<f64>, f32)], grid: &Grid, fill: f32) -> Result<Array2<f32>> {
        let (rows, cols) = grid.shape();
        let driver = DriverManager::get_driver_by_name("MEM")?;
        let mut dataset = driver.create_with_band_type::<f64, _>("", cols, rows, 1)?;
        dataset.set_geo_transform(&grid.transform().coefficients())?;
        dataset.rasterband(1)?.fill(fill as f64, None)?;

        if !shapes.is_empty() {
            let geometries = shapes
                .iter()
                .map(|(geometry, _)| geometry.to_gdal())
                .collect::<gdal::errors::Result<Vec<_>>>()?;
            let values: Vec<f64> = shapes.iter().map(|&(_, v)| v as f64).collect();
            let options = RasterizeOptions {
                all_touched: false,
                merge_algorithm: MergeAlgorithm::Replace,
                ..Default::default()
            };
            gdal::raster::rasterize(&mut dataset, &[1], &geometries, &values, Some(options))?;
        }

        let buffer = dataset
            .rasterband(1)?
            .read_as::<f64>((0, 0), (cols, rows), (cols, rows), None)?;
        let data: Vec<f32> = buffer.into_iter().map(|v| v as f32).collect();
        Ok(Array2::from_shape_vec((rows, cols), data)?)
    }
}

pub fn burn_geometry(out: &mut Array2<f32>, grid: &Grid, geometry: &Geometry<f64>, value: f32) {
    match geometry {
        Geometry::Point(p) => burn_point(out, grid, p, value),
        Geometry::MultiPoint(mp) => mp.iter().for_each(|p| burn_point(out, grid, p, value)),
        Geometry::Line(line) => burn_segment(out, grid, line.start, line.end, value),
        Geometry::LineString(ls) => burn_line_string(out, grid, ls, value),
        Geometry::MultiLineString(mls) => mls.iter().for_each(|ls| burn_line_string(out, grid, ls, value)),
        Geometry::Polygon(polygon) => burn_polygon(out, grid, polygon, value),
        Geometry::MultiPolygon(mp) => mp.iter().for_each(|p| burn_polygon(out, grid, p, value)),
        Geometry::Rect(rect) => burn_polygon(out, grid, &rect.to_polygon(), value),
        Geometry::Triangle(triangle) => burn_polygon(out, grid, &triangle.to_polygon(), value),
        Geometry::GeometryCollection(collection) => collection
            .iter()
            .for_each(|g| burn_geometry(out, grid, g, value)),
    }
}

fn to_pixel(grid: &Grid, c: Coord<f64>) -> Option<(f64, f64)> {
    grid.transform().world_to_pixel(c.x, c.y)
}

fn burn_point(out: &mut Array2<f32>, grid: &Grid, point: &Point<f64>, value: f32) {
    if let Some((row, col)) = grid.cell_at(point.x(), point.y()) {
        out[[row, col]] = value;
    }
}

fn burn_line_string(out: &mut Array2<f32>, grid: &Grid, line_string: &LineString<f64>, value: f32) {
    if line_string.0.len() == 1 {
        burn_point(out, grid, &Point(line_string.0[0]), value);
        return;
    }
    for line in line_string.lines() {
        burn_segment(out, grid, line.start, line.end, value);
    }
}

/// Clip the segment to `[0, width] x [0, height]` (Liang-Barsky).
fn clip_segment(p0: (f64, f64), p1: (f64, f64), width: f64, height: f64) -> Option<((f64, f64), (f64, f64))> {
    let (dx, dy) = (p1.0 - p0.0, p1.1 - p0.1);
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    let checks = [
        (-dx, p0.0),
        (dx, width - p0.0),
        (-dy, p0.1),
        (dy, height - p0.1),
    ];
    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
        }
    }
    if t0 > t1 {
        return None;
    }
    Some((
        (p0.0 + t0 * dx, p0.1 + t0 * dy),
        (p0.0 + t1 * dx, p0.1 + t1 * dy),
    ))
}

/// Burn every cell crossed by the segment (grid traversal in pixel space).
fn burn_segment(out: &mut Array2<f32>, grid: &Grid, start: Coord<f64>, end: Coord<f64>, value: f32) {
    let (Some(a), Some(b)) = (to_pixel(grid, start), to_pixel(grid, end)) else {
        return;
    };
    let (rows, cols) = out.dim();
    let Some(((x0, y0), (x1, y1))) = clip_segment(a, b, cols as f64, rows as f64) else {
        return;
    };

    let mut burn = |cx: i64, cy: i64| {
        if cx >= 0 && cy >= 0 && (cx as usize) < cols && (cy as usize) < rows {
            out[[cy as usize, cx as usize]] = value;
        }
    };

    let (mut cx, mut cy) = (x0.floor() as i64, y0.floor() as i64);
    let (ex, ey) = (x1.floor() as i64, y1.floor() as i64);
    let (dx, dy) = (x1 - x0, y1 - y0);
    let step_x = if dx > 0.0 { 1 } else { -1 };
    let step_y = if dy > 0.0 { 1 } else { -1 };

    let t_delta_x = if dx != 0.0 { (1.0 / dx).abs() } else { f64::INFINITY };
    let t_delta_y = if dy != 0.0 { (1.0 / dy).abs() } else { f64::INFINITY };
    let mut t_max_x = if dx > 0.0 {
        ((cx + 1) as f64 - x0) / dx
    } else if dx < 0.0 {
        (cx as f64 - x0) / dx
    } else {
        f64::INFINITY
    };
    let mut t_max_y = if dy > 0.0 {
        ((cy + 1) as f64 - y0) / dy
    } else if dy < 0.0 {
        (cy as f64 - y0) / dy
    } else {
        f64::INFINITY
    };

    burn(cx, cy);
    let steps = (ex - cx).abs() + (ey - cy).abs();
    for _ in 0..steps {
        if t_max_x < t_max_y {
            cx += step_x;
            t_max_x += t_delta_x;
        } else {
            cy += step_y;
            t_max_y += t_delta_y;
        }
        burn(cx, cy);
    }
}

/// Scanline fill over all rings of the polygon, sampling at cell centres.
fn burn_polygon(out: &mut Array2<f32>, grid: &Grid, polygon: &Polygon<f64>, value: f32) {
    let rings: Vec<Vec<(f64, f64)>> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring| ring.0.iter().filter_map(|&c| to_pixel(grid, c)).collect())
        .filter(|ring: &Vec<(f64, f64)>| ring.len() >= 3)
        .collect();
    if rings.is_empty() {
        return;
    }

    let (rows, cols) = out.dim();
    let (min_y, max_y) = rings
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, y)| (lo.min(y), hi.max(y)));
    let row_start = (min_y - 0.5).ceil().max(0.0) as usize;
    let row_end = ((max_y - 0.5).floor() + 1.0).clamp(0.0, rows as f64) as usize;

    let mut crossings: Vec<f64> = Vec::new();
    for row in row_start..row_end {
        let yc = row as f64 + 0.5;
        crossings.clear();
        for ring in &rings {
            let n = ring.len();
            for i in 0..n {
                let (x0, y0) = ring[i];
                let (x1, y1) = ring[(i + 1) % n];
                if (y0 <= yc && yc < y1) || (y1 <= yc && yc < y0) {
                    crossings.push(x0 + (yc - y0) * (x1 - x0) / (y1 - y0));
                }
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));

        for pair in crossings.chunks_exact(2) {
            let col_start = (pair[0] - 0.5).ceil().max(0.0) as usize;
            let col_end = (pair[1] - 0.5).ceil().clamp(0.0, cols as f64) as usize;
            for col in col_start..col_end {
                out[[row, col]] = value;
            }
        }
    }
}

/// Polygon approximating a circle of `radius` around `center`.
pub fn circle(center: Point<f64>, radius: f64) -> Polygon<f64> {
    let mut ring: Vec<Coord<f64>> = (0..CIRCLE_SEGMENTS)
        .map(|i| {
            let angle = 2.0 * PI * i as f64 / CIRCLE_SEGMENTS as f64;
            Coord {
                x: center.x() + radius * angle.cos(),
                y: center.y() + radius * angle.sin(),
            }
        })
        .collect();
    ring.push(ring[0]);
    Polygon::new(LineString(ring), vec![])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Bounds;
    use geo::{line_string, polygon, Geometry};

    fn grid_10() -> Grid {
        // 10 x 10 cells of size 1
        Grid::from_bounds(Bounds::new(0.0, 0.0, 10.0, 10.0), 10, "EPSG:3857").unwrap()
    }

    fn burned(arr: &Array2<f32>) -> usize {
        arr.iter().filter(|v| !v.is_nan() && **v != 0.0).count()
    }

    #[test]
    fn test_polygon_burns_cell_centres() {
        let grid = grid_10();
        let square: Geometry<f64> = polygon![(x: 2.0, y: 2.0), (x: 5.0, y: 2.0), (x: 5.0, y: 6.0), (x: 2.0, y: 6.0)].into();
        let out = rasterize([(&square, 1.0)], &grid, 0.0);
        assert_eq!(burned(&out), 12);
        // world y in [2, 6] -> rows 4..8, world x in [2, 5] -> cols 2..5
        assert_eq!(out[[4, 2]], 1.0);
        assert_eq!(out[[7, 4]], 1.0);
        assert_eq!(out[[3, 2]], 0.0);
        assert_eq!(out[[4, 5]], 0.0);
    }

    #[test]
    fn test_polygon_hole_left_empty() {
        let grid = grid_10();
        let donut: Geometry<f64> = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 6.0, y: 0.0), (x: 6.0, y: 6.0), (x: 0.0, y: 6.0)],
            interiors: [[(x: 2.0, y: 2.0), (x: 4.0, y: 2.0), (x: 4.0, y: 4.0), (x: 2.0, y: 4.0)]],
        )
        .into();
        let out = rasterize([(&donut, 1.0)], &grid, f32::NAN);
        assert_eq!(burned(&out), 36 - 4);
        assert!(out[[6, 2]].is_nan()); // centre (2.5, 3.5) inside the hole
    }

    #[test]
    fn test_last_write_wins() {
        let grid = grid_10();
        let a: Geometry<f64> = polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 4.0), (x: 0.0, y: 4.0)].into();
        let b: Geometry<f64> = polygon![(x: 2.0, y: 2.0), (x: 6.0, y: 2.0), (x: 6.0, y: 6.0), (x: 2.0, y: 6.0)].into();
        let out = rasterize([(&a, 1.0), (&b, 2.0)], &grid, f32::NAN);
        assert_eq!(out[[7, 3]], 2.0); // centre (3.5, 2.5) in overlap
        assert_eq!(out[[9, 0]], 1.0);
    }

    #[test]
    fn test_diagonal_line() {
        let grid = grid_10();
        let line: Geometry<f64> = line_string![(x: 0.5, y: 9.5), (x: 9.5, y: 0.5)].into();
        let out = rasterize([(&line, 1.0)], &grid, 0.0);
        for i in 0..10 {
            assert_eq!(out[[i, i]], 1.0);
        }
    }

    #[test]
    fn test_line_clipped_outside_grid() {
        let grid = grid_10();
        let line: Geometry<f64> = line_string![(x: -100.0, y: 5.5), (x: 100.0, y: 5.5)].into();
        let out = rasterize([(&line, 1.0)], &grid, 0.0);
        assert_eq!(burned(&out), 10);
        assert!(out.row(4).iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_point_outside_ignored() {
        let grid = grid_10();
        let inside = Geometry::Point(Point::new(3.2, 3.7));
        let outside = Geometry::Point(Point::new(30.0, 3.0));
        let out = rasterize([(&inside, 5.0), (&outside, 5.0)], &grid, 0.0);
        assert_eq!(burned(&out), 1);
        assert_eq!(out[[6, 3]], 5.0);
    }

    #[cfg(feature = "gdal")]
    #[test]
    fn test_gdal_burn_matches_geo_rasterizer() {
        let grid = grid_10();
        let donut: Geometry<f64> = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 6.0, y: 0.0), (x: 6.0, y: 6.0), (x: 0.0, y: 6.0)],
            interiors: [[(x: 2.0, y: 2.0), (x: 4.0, y: 2.0), (x: 4.0, y: 4.0), (x: 2.0, y: 4.0)]],
        )
        .into();
        let square: Geometry<f64> = polygon![(x: 5.0, y: 5.0), (x: 9.0, y: 5.0), (x: 9.0, y: 9.0), (x: 5.0, y: 9.0)].into();
        let shapes = [(&donut, 1.0), (&square, 2.0)];

        let expected = rasterize_geo(shapes, &grid, f32::NAN);
        let out = gdal_burn::rasterize(&shapes, &grid, f32::NAN).unwrap();
        assert_eq!(out.dim(), expected.dim());
        for (a, b) in out.iter().zip(expected.iter()) {
            assert!(a == b || (a.is_nan() && b.is_nan()), "{} != {}", a, b);
        }
        assert_eq!(out[[4, 5]], 2.0); // centre (5.5, 5.5) in the overlap
    }

    #[test]
    fn test_circle_closed_ring() {
        let c = circle(Point::new(1.0, 1.0), 2.0);
        assert_eq!(c.exterior().0.len(), CIRCLE_SEGMENTS + 1);
        assert_eq!(c.exterior().0.first(), c.exterior().0.last());
    }
}
