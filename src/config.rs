//! Build recipe: the AOI, target grid settings and the list of input layers.
//!
//! Every decision the pipeline needs is resolved here before a build starts, so
//! the build itself never has to stop and ask.

use crate::error::{CubeError, Result};
use crate::layer::LayerKind;
use crate::line::LineBuffer;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CRS: &str = "EPSG:3857";
pub const DEFAULT_SHORT_EDGE_CELLS: usize = 100;

fn default_crs() -> String {
    DEFAULT_CRS.to_string()
}

fn default_short_edge_cells() -> usize {
    DEFAULT_SHORT_EDGE_CELLS
}

fn default_x_column() -> String {
    "x".to_string()
}

fn default_y_column() -> String {
    "y".to_string()
}

/// Area of interest polygon file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AoiConfig {
    pub path: PathBuf,
    /// CRS of the file; defaults to the target CRS.
    #[serde(default)]
    pub crs: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorLayer {
    pub path: PathBuf,
    /// Attribute columns to rasterize; empty means all of them.
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub crs: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterLayer {
    pub path: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    /// Overrides the CRS declared by the file.
    #[serde(default)]
    pub crs: Option<String>,
    /// Interpolate nodata holes before they are zeroed.
    #[serde(default)]
    pub fill_gaps: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineLayer {
    pub path: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub crs: Option<String>,
    /// Distance buffer; absent means a binary band.
    #[serde(default)]
    pub buffer: Option<LineBuffer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeLayer {
    /// GeoJSON points or a CSV table.
    pub path: PathBuf,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default = "default_x_column")]
    pub x_column: String,
    #[serde(default = "default_y_column")]
    pub y_column: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub crs: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetLayer {
    pub path: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub crs: Option<String>,
    /// Buffer radius for point targets, in target CRS units.
    #[serde(default)]
    pub point_radius: Option<f64>,
}

/// One input file with the parameters of its layer kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LayerConfig {
    Vector(VectorLayer),
    Raster(RasterLayer),
    Line(LineLayer),
    Attribute(AttributeLayer),
    Target(TargetLayer),
}

impl LayerConfig {
    pub fn kind(&self) -> LayerKind {
        match self {
            LayerConfig::Vector(_) => LayerKind::Vector,
            LayerConfig::Raster(_) => LayerKind::Raster,
            LayerConfig::Line(_) => LayerKind::Line,
            LayerConfig::Attribute(_) => LayerKind::Attribute,
            LayerConfig::Target(_) => LayerKind::Target,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            LayerConfig::Vector(l) => &l.path,
            LayerConfig::Raster(l) => &l.path,
            LayerConfig::Line(l) => &l.path,
            LayerConfig::Attribute(l) => &l.path,
            LayerConfig::Target(l) => &l.path,
        }
    }

    fn path_mut(&mut self) -> &mut PathBuf {
        match self {
            LayerConfig::Vector(l) => &mut l.path,
            LayerConfig::Raster(l) => &mut l.path,
            LayerConfig::Line(l) => &mut l.path,
            LayerConfig::Attribute(l) => &mut l.path,
            LayerConfig::Target(l) => &mut l.path,
        }
    }

    pub fn crs(&self) -> Option<&str> {
        match self {
            LayerConfig::Vector(l) => l.crs.as_deref(),
            LayerConfig::Raster(l) => l.crs.as_deref(),
            LayerConfig::Line(l) => l.crs.as_deref(),
            LayerConfig::Attribute(l) => l.crs.as_deref(),
            LayerConfig::Target(l) => l.crs.as_deref(),
        }
    }

    /// Explicit name, or the file stem.
    pub fn name(&self) -> String {
        let explicit = match self {
            LayerConfig::Vector(l) => l.name.as_ref(),
            LayerConfig::Raster(l) => l.name.as_ref(),
            LayerConfig::Line(l) => l.name.as_ref(),
            LayerConfig::Attribute(l) => l.name.as_ref(),
            LayerConfig::Target(l) => l.name.as_ref(),
        };
        explicit.cloned().unwrap_or_else(|| {
            self.path()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.kind().to_string())
        })
    }
}

/// Everything one build needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub aoi: AoiConfig,
    #[serde(default = "default_crs")]
    pub crs: String,
    #[serde(default = "default_short_edge_cells")]
    pub short_edge_cells: usize,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    /// Worker threads; all cores when absent.
    #[serde(default)]
    pub threads: Option<usize>,
}

impl BuildConfig {
    pub fn new(aoi: impl Into<PathBuf>) -> Self {
        Self {
            aoi: AoiConfig {
                path: aoi.into(),
                crs: None,
            },
            crs: default_crs(),
            short_edge_cells: DEFAULT_SHORT_EDGE_CELLS,
            layers: Vec::new(),
            threads: None,
        }
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = crs.into();
        self
    }

    pub fn with_short_edge_cells(mut self, cells: usize) -> Self {
        self.short_edge_cells = cells;
        self
    }

    pub fn with_layer(mut self, layer: LayerConfig) -> Self {
        self.layers.push(layer);
        self
    }

    /// Parse a JSON recipe; relative paths resolve against its directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut config: BuildConfig = serde_json::from_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        if self.aoi.path.is_relative() {
            self.aoi.path = base.join(&self.aoi.path);
        }
        for layer in &mut self.layers {
            let path = layer.path_mut();
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.short_edge_cells == 0 {
            return Err(CubeError::Config("short_edge_cells must be positive".to_string()));
        }
        if self.crs.trim().is_empty() {
            return Err(CubeError::Config("crs must not be empty".to_string()));
        }
        if self.threads == Some(0) {
            return Err(CubeError::Config("threads must be positive".to_string()));
        }

        let mut names = HashSet::new();
        for layer in &self.layers {
            let name = layer.name();
            if !names.insert((layer.kind(), name.clone())) {
                return Err(CubeError::Config(format!(
                    "{} layer name '{}' used twice",
                    layer.kind(),
                    name
                )));
            }
            match layer {
                LayerConfig::Line(LineLayer {
                    buffer: Some(buffer), ..
                }) if !(buffer.max_distance.is_finite() && buffer.max_distance >= 0.0) => {
                    return Err(CubeError::Config(format!(
                        "line layer '{}': max_distance must be a non-negative number",
                        name
                    )));
                }
                LayerConfig::Target(TargetLayer {
                    point_radius: Some(r), ..
                }) if !(r.is_finite() && *r > 0.0) => {
                    return Err(CubeError::Config(format!(
                        "target layer '{}': point_radius must be positive",
                        name
                    )));
                }
                LayerConfig::Attribute(a) if a.x_column == a.y_column => {
                    return Err(CubeError::Config(format!(
                        "attribute layer '{}': x_column and y_column are the same",
                        name
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
