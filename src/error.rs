use thiserror::Error;

#[derive(Error, Debug)]
pub enum CubeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Band shape mismatch: '{name}' is {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Layer name count mismatch: {names} names for {bands} bands")]
    NameCountMismatch { names: usize, bands: usize },

    #[error("Duplicate band name: {0}")]
    DuplicateBandName(String),

    #[error("Reprojection failed: {0}")]
    Reprojection(String),

    #[error("Band not found: {0}")]
    BandNotFound(String),

    #[error("Invalid cube file: {0}")]
    InvalidCube(String),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl CubeError {
    /// Errors that invalidate the whole build rather than a single input file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CubeError::ShapeMismatch { .. }
                | CubeError::NameCountMismatch { .. }
                | CubeError::DuplicateBandName(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CubeError>;
