// Library exports for the CLI, tests and reuse

pub mod analysis;
pub mod attribute;
pub mod categorical;
pub mod chunking;
pub mod cli;
pub mod combine;
pub mod config;
pub mod crs;
pub mod cube;
pub mod distance;
pub mod error;
pub mod features;
pub mod focal;
pub mod grid;
pub mod io;
pub mod layer;
pub mod line;
pub mod pipeline;
pub mod rasterize;
pub mod resample;
pub mod target;

// Re-export commonly used types
pub use config::{BuildConfig, LayerConfig};
pub use cube::Cube;
pub use error::{CubeError, Result};
pub use grid::{Bounds, GeoTransform, Grid};
pub use layer::{Layer, LayerKind, Legend};
pub use pipeline::{build, BuildReport, Diagnostic};
