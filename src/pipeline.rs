//! One build: AOI to grid, every configured layer onto the grid, layers into a cube.

use crate::attribute::rasterize_attributes;
use crate::categorical::rasterize_categorical;
use crate::combine::LayerCombiner;
use crate::config::{BuildConfig, LayerConfig};
use crate::cube::Cube;
use crate::error::{CubeError, Result};
use crate::features::{
    features_bounds, geometry_kind, read_csv_points, read_geojson, reproject_features, Feature,
    GeometryKind,
};
use crate::grid::{Bounds, Grid};
use crate::io::read_raster;
use crate::layer::{Layer, LayerKind};
use crate::line::rasterize_lines;
use crate::resample::resample_nearest;
use crate::target::rasterize_targets;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// An input file the build skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: LayerKind,
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug)]
pub struct BuildReport {
    pub cube: Cube,
    pub diagnostics: Vec<Diagnostic>,
}

/// Read the AOI, move it into the target CRS and size the grid from its bounds.
pub fn grid_for_aoi(config: &BuildConfig) -> Result<Grid> {
    let path = &config.aoi.path;
    let mut features = read_geojson(path)?;
    if features.is_empty() {
        return Err(CubeError::Config(format!("AOI {} holds no geometry", path.display())));
    }
    if let Some(f) = features
        .iter()
        .find(|f| geometry_kind(&f.geometry) != GeometryKind::Polygon)
    {
        return Err(CubeError::Config(format!(
            "AOI {} holds {:?} geometry; expected a polygon",
            path.display(),
            geometry_kind(&f.geometry)
        )));
    }

    let source_crs = config.aoi.crs.as_deref().unwrap_or(&config.crs);
    reproject_features(&mut features, source_crs, &config.crs)?;

    let rect = features_bounds(&features)
        .ok_or_else(|| CubeError::Config(format!("AOI {} has no extent", path.display())))?;
    let bounds = Bounds::from(rect);
    info!(
        "AOI bounds [{:.3}, {:.3}, {:.3}, {:.3}] in {}",
        bounds.minx, bounds.miny, bounds.maxx, bounds.maxy, config.crs
    );
    Grid::from_bounds(bounds, config.short_edge_cells, config.crs.clone())
}

fn read_layer_features(layer: &LayerConfig, grid: &Grid) -> Result<Vec<Feature>> {
    let path = layer.path();
    let mut features = match layer {
        LayerConfig::Attribute(a) if is_csv(path) => read_csv_points(path, &a.x_column, &a.y_column)?,
        _ => read_geojson(path)?,
    };
    let source_crs = layer.crs().unwrap_or(grid.crs());
    reproject_features(&mut features, source_crs, grid.crs())?;
    Ok(features)
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Rasterize one configured input onto `grid`.
pub fn rasterize_layer(layer: &LayerConfig, grid: &Grid) -> Result<Vec<Layer>> {
    let name = layer.name();
    match layer {
        LayerConfig::Vector(v) => {
            let features = read_layer_features(layer, grid)?;
            rasterize_categorical(&features, &v.columns, grid, &name)
        }
        LayerConfig::Raster(r) => {
            let source = read_raster(&r.path)?;
            debug!(
                "Raster '{}': {}x{} {:?}, nodata {:?}",
                name,
                source.width(),
                source.height(),
                source.sample_type,
                source.nodata
            );
            let band = resample_nearest(&source, r.crs.as_deref(), grid, &name, r.fill_gaps)?;
            Ok(vec![band])
        }
        LayerConfig::Line(l) => {
            let features = read_layer_features(layer, grid)?;
            Ok(vec![rasterize_lines(&features, l.buffer.as_ref(), grid, &name)?])
        }
        LayerConfig::Attribute(a) => {
            let features = read_layer_features(layer, grid)?;
            rasterize_attributes(&features, &a.columns, grid, &name)
        }
        LayerConfig::Target(t) => {
            let features = read_layer_features(layer, grid)?;
            Ok(vec![rasterize_targets(&features, t.point_radius, grid, &name)?])
        }
    }
}

/// Run a whole build.
///
/// A failing input file is logged, recorded as a [`Diagnostic`] and left out;
/// fatal errors abort and no cube is returned.
pub fn build(config: &BuildConfig) -> Result<BuildReport> {
    config.validate()?;
    let start = Instant::now();

    let grid = grid_for_aoi(config)?;
    let mut combiner = LayerCombiner::for_grid(&grid);
    let mut diagnostics = Vec::new();

    for (i, layer) in config.layers.iter().enumerate() {
        let kind = layer.kind();
        info!(
            "[{}/{}] {} layer {}",
            i + 1,
            config.layers.len(),
            kind,
            layer.path().display()
        );
        match rasterize_layer(layer, &grid) {
            Ok(layers) => combiner.extend(kind, layers),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Skipping {} layer {}: {}", kind, layer.path().display(), e);
                diagnostics.push(Diagnostic {
                    kind,
                    path: layer.path().to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let cube = combiner.into_cube(&grid)?;
    info!(
        "Build finished in {:.2?}: {} bands, {} skipped inputs",
        start.elapsed(),
        cube.band_count(),
        diagnostics.len()
    );
    Ok(BuildReport { cube, diagnostics })
}
