use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "datacube")]
#[command(about = "Rasterize and align geospatial layers onto one grid as a multi-band cube")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Number of threads (default: all available, or `threads` from the config)
    #[arg(short, long, value_name = "N", global = true)]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a cube from a JSON build config
    Build {
        /// Build config (AOI, target CRS, grid size, layers)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Output cube path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Print band statistics of a cube
    Inspect {
        #[arg(value_name = "CUBE")]
        cube: PathBuf,

        /// Also print the band correlation matrix
        #[arg(long)]
        correlation: bool,

        /// Maximum pixels sampled per band for correlation
        #[arg(long, value_name = "N", default_value_t = 100_000)]
        samples: usize,

        /// Write per-pixel mean/min/max/std/cv across bands as a cube
        #[arg(long, value_name = "FILE")]
        summary: Option<PathBuf>,
    },

    /// Keep a subset of weakly correlated bands
    Select {
        #[arg(value_name = "CUBE")]
        cube: PathBuf,

        /// Maximum absolute Pearson r between kept bands
        #[arg(long, value_name = "R", default_value_t = 0.6)]
        threshold: f64,

        /// Number of bands to keep
        #[arg(short, long, value_name = "N")]
        count: usize,

        /// Maximum pixels sampled per band
        #[arg(long, value_name = "N", default_value_t = 100_000)]
        samples: usize,

        /// Output cube path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Export a cube as GeoTIFF (all bands with the `gdal` feature, otherwise one band)
    Export {
        #[arg(value_name = "CUBE")]
        cube: PathBuf,

        /// Output GeoTIFF path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Band to export; required without the `gdal` feature
        #[arg(short, long, value_name = "NAME")]
        band: Option<String>,
    },
}
