//! Target layers: binary occupancy from points (buffered) and polygons.
//!
//! Polygon occupancy is an intersection test per cell. The grid is cut into
//! disjoint blocks; each rayon task reads the shared R-tree and returns
//! `(row, col, value)` triples that are written back without locking.

use crate::chunking::BlockGrid;
use crate::error::{CubeError, Result};
use crate::features::{geometry_kind, Feature, GeometryKind};
use crate::grid::Grid;
use crate::layer::Layer;
use crate::rasterize::{circle, rasterize};
use geo::{BoundingRect, Geometry, Intersects, Point};
use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};

/// Block edge, in cells, for the parallel polygon test.
const BLOCK_SIZE: usize = 64;

/// Prefix of every target band name.
pub const TARGET_PREFIX: &str = "TARGET_";

struct IndexedGeometry<'a> {
    geometry: &'a Geometry<f64>,
    env: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedGeometry<'_> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

fn build_index<'a>(geometries: &[&'a Geometry<f64>]) -> RTree<IndexedGeometry<'a>> {
    let items: Vec<IndexedGeometry<'a>> = geometries
        .iter()
        .filter_map(|&geometry| {
            let rect = geometry.bounding_rect()?;
            Some(IndexedGeometry {
                geometry,
                env: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
            })
        })
        .collect();
    RTree::bulk_load(items)
}

/// 1 for every cell intersecting any polygon, else 0.
pub fn polygon_occupancy(polygons: &[&Geometry<f64>], grid: &Grid) -> Array2<f32> {
    let mut out = Array2::zeros(grid.shape());
    if polygons.is_empty() {
        return out;
    }

    let tree = build_index(polygons);
    let blocks = BlockGrid::new(grid.rows(), grid.cols(), BLOCK_SIZE);

    let hits: Vec<(usize, usize, f32)> = blocks
        .iter()
        .collect::<Vec<_>>()
        .into_par_iter()
        .flat_map_iter(|(_, block)| {
            let tree = &tree;
            block
                .cells()
                .filter_map(move |(row, col)| {
                    let cell = grid.cell_bounds(row, col);
                    let env = AABB::from_corners([cell.min().x, cell.min().y], [cell.max().x, cell.max().y]);
                    tree.locate_in_envelope_intersecting(&env)
                        .any(|item| item.geometry.intersects(&cell))
                        .then_some((row, col, 1.0))
                })
                .collect::<Vec<_>>()
        })
        .collect();

    debug!("Polygon occupancy: {} of {} cells hit", hits.len(), grid.rows() * grid.cols());
    for (row, col, value) in hits {
        out[[row, col]] = value;
    }
    out
}

/// Rasterize a target file into a band named `TARGET_{name}`.
///
/// Points are buffered by `point_radius` and burned; polygons use the per-cell
/// intersection test. A file may mix both. Lines are rejected.
pub fn rasterize_targets(
    features: &[Feature],
    point_radius: Option<f64>,
    grid: &Grid,
    name: &str,
) -> Result<Layer> {
    let band_name = format!("{}{}", TARGET_PREFIX, name);
    let mut points: Vec<Point<f64>> = Vec::new();
    let mut polygons: Vec<&Geometry<f64>> = Vec::new();

    for feature in features {
        match (geometry_kind(&feature.geometry), &feature.geometry) {
            (GeometryKind::Point, Geometry::Point(p)) => points.push(*p),
            (GeometryKind::Point, Geometry::MultiPoint(mp)) => points.extend(mp.iter().copied()),
            (GeometryKind::Polygon, geometry) => polygons.push(geometry),
            (kind, _) => {
                return Err(CubeError::Config(format!(
                    "target layer '{}' holds unsupported {:?} geometry",
                    name, kind
                )))
            }
        }
    }

    let mut data = polygon_occupancy(&polygons, grid);

    if !points.is_empty() {
        let radius = match point_radius {
            Some(r) if r > 0.0 && r.is_finite() => r,
            _ => {
                return Err(CubeError::Config(format!(
                    "target layer '{}' has points but no positive point_radius",
                    name
                )))
            }
        };
        let buffers: Vec<Geometry<f64>> = points
            .iter()
            .map(|p| Geometry::Polygon(circle(*p, radius)))
            .collect();
        let burned = rasterize(buffers.iter().map(|g| (g, 1.0)), grid, 0.0);
        ndarray::Zip::from(&mut data).and(&burned).for_each(|d, &b| {
            if b > 0.0 {
                *d = 1.0;
            }
        });
    }

    info!(
        "Target '{}': {} points, {} polygons, {} occupied cells",
        band_name,
        points.len(),
        polygons.len(),
        data.iter().filter(|&&v| v > 0.0).count()
    );
    Ok(Layer::new(band_name, data))
}
