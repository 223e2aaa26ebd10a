use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use ndarray::{stack, Axis};
use std::collections::BTreeMap;
use std::path::Path;

use datacube::analysis::{band_stats, correlation_matrix, select_uncorrelated, stack_summary};
use datacube::cli::{Args, Command};
use datacube::config::BuildConfig;
use datacube::error::{CubeError, Result};
use datacube::{pipeline, Cube};

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    info!("=== Datacube Builder ===");

    match args.command {
        Command::Build { config, output } => {
            let config = BuildConfig::from_file(&config)?;
            init_thread_pool(args.threads.or(config.threads))?;
            run_build(&config, &output)?;
        }
        Command::Inspect {
            cube,
            correlation,
            samples,
            summary,
        } => {
            init_thread_pool(args.threads)?;
            run_inspect(&cube, correlation, samples, summary.as_deref())?;
        }
        Command::Select {
            cube,
            threshold,
            count,
            samples,
            output,
        } => {
            init_thread_pool(args.threads)?;
            run_select(&cube, threshold, count, samples, &output)?;
        }
        Command::Export { cube, output, band } => {
            run_export(&cube, &output, band.as_deref())?;
        }
    }

    info!("=== Done! ===");
    Ok(())
}

fn init_thread_pool(threads: Option<usize>) -> Result<()> {
    match threads {
        Some(n) => {
            rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build_global()
                .map_err(|e| CubeError::Config(format!("failed to build thread pool: {}", e)))?;
            info!("Using {} threads", n);
        }
        None => info!("Using all available threads"),
    }
    Ok(())
}

fn run_build(config: &BuildConfig, output: &Path) -> Result<()> {
    info!("Building cube from {} layers", config.layers.len());
    let report = pipeline::build(config)?;

    for diagnostic in &report.diagnostics {
        warn!(
            "Skipped {} input {}: {}",
            diagnostic.kind,
            diagnostic.path.display(),
            diagnostic.reason
        );
    }

    let (bands, rows, cols) = report.cube.shape();
    info!("Cube: {} bands, {}x{} ({})", bands, rows, cols, report.cube.crs());
    info!("Bands: {:?}", report.cube.names());
    info!("Writing output: {}", output.display());
    report.cube.save(output)
}

fn run_inspect(path: &Path, correlation: bool, samples: usize, summary: Option<&Path>) -> Result<()> {
    let cube = Cube::load(path)?;
    let (bands, rows, cols) = cube.shape();
    let bounds = cube.bounds();
    println!("{}: {} bands, {} rows x {} cols", path.display(), bands, rows, cols);
    println!("CRS: {}", cube.crs());
    println!("Transform: {:?}", cube.transform().coefficients());
    println!(
        "Bounds: [{}, {}, {}, {}]",
        bounds.minx, bounds.miny, bounds.maxx, bounds.maxy
    );

    println!(
        "{:<32} {:>12} {:>12} {:>12} {:>12} {:>8}",
        "band", "min", "max", "mean", "std", "nan"
    );
    for stats in band_stats(&cube) {
        println!(
            "{:<32} {:>12.4} {:>12.4} {:>12.4} {:>12.4} {:>8}",
            stats.name, stats.min, stats.max, stats.mean, stats.std, stats.nan
        );
        if let Some(legend) = cube.legend(&stats.name) {
            println!("{:<32} legend: {:?}", "", legend.categories());
        }
    }

    if correlation && bands > 0 {
        let matrix = correlation_matrix(&cube, samples);
        println!();
        for (i, name) in cube.names().iter().enumerate() {
            let row: Vec<String> = matrix.row(i).iter().map(|r| format!("{:6.2}", r)).collect();
            println!("{:<32} {}", name, row.join(" "));
        }
    }

    if let Some(output) = summary {
        let stats = stack_summary(&cube);
        let data = stack(
            Axis(0),
            &[stats.mean.view(), stats.min.view(), stats.max.view(), stats.std.view(), stats.cv.view()],
        )?;
        let names = ["mean", "min", "max", "std", "cv"].map(String::from).to_vec();
        let summary_cube = Cube::new(
            data,
            names,
            BTreeMap::new(),
            cube.crs(),
            *cube.transform(),
            *cube.bounds(),
        )?;
        info!("Writing stack summary: {}", output.display());
        summary_cube.save(output)?;
    }
    Ok(())
}

fn run_select(path: &Path, threshold: f64, count: usize, samples: usize, output: &Path) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(CubeError::Config(format!(
            "threshold must lie in [0, 1], got {}",
            threshold
        )));
    }
    let cube = Cube::load(path)?;
    info!("Computing correlation for {} bands", cube.band_count());
    let matrix = correlation_matrix(&cube, samples);
    let picked = select_uncorrelated(cube.names(), &matrix, threshold, count);
    info!("Selected {} bands: {:?}", picked.len(), picked);

    let selected = cube.select(&picked)?;
    info!("Writing output: {}", output.display());
    selected.save(output)
}

#[cfg(feature = "gdal")]
fn run_export(path: &Path, output: &Path, band: Option<&str>) -> Result<()> {
    use datacube::io::gdal_io::write_multiband_output;

    let cube = Cube::load(path)?;
    let cube = match band {
        Some(name) => cube.select(&[name.to_string()])?,
        None => cube,
    };
    write_multiband_output(output, cube.data(), cube.names(), cube.transform(), cube.crs())
}

#[cfg(not(feature = "gdal"))]
fn run_export(path: &Path, output: &Path, band: Option<&str>) -> Result<()> {
    let name = band.ok_or_else(|| {
        CubeError::Config("--band is required unless built with the `gdal` feature".to_string())
    })?;
    let cube = Cube::load(path)?;
    let data = cube.band(name)?.to_owned();
    info!("Writing band '{}' to {}", name, output.display());
    datacube::io::write_geotiff(output, &data, cube.transform(), cube.crs())
}
