//! Cube inspection: per-band statistics, per-pixel stack summaries and
//! band correlation with low-correlation band selection.

use crate::cube::Cube;
use log::{debug, info};
use ndarray::{Array2, ArrayView2, Axis, Zip};
use rayon::prelude::*;
use serde::Serialize;

/// Summary statistics over the finite cells of one band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandStats {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
    pub valid: usize,
    pub nan: usize,
}

fn stats_of(name: &str, band: ArrayView2<f32>) -> BandStats {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut valid = 0usize;
    let mut nan = 0usize;
    for &v in band.iter() {
        if v.is_nan() {
            nan += 1;
            continue;
        }
        let v = v as f64;
        min = min.min(v);
        max = max.max(v);
        sum += v;
        sum_sq += v * v;
        valid += 1;
    }
    let (mean, std) = if valid > 0 {
        let mean = sum / valid as f64;
        (mean, (sum_sq / valid as f64 - mean * mean).max(0.0).sqrt())
    } else {
        (f64::NAN, f64::NAN)
    };
    BandStats {
        name: name.to_string(),
        min: if valid > 0 { min } else { f64::NAN },
        max: if valid > 0 { max } else { f64::NAN },
        mean,
        std,
        valid,
        nan,
    }
}

pub fn band_stats(cube: &Cube) -> Vec<BandStats> {
    cube.names()
        .par_iter()
        .enumerate()
        .map(|(i, name)| stats_of(name, cube.data().index_axis(Axis(0), i)))
        .collect()
}

/// Per-pixel statistics across all bands of a cube.
#[derive(Debug, Clone)]
pub struct StackSummary {
    pub mean: Array2<f32>,
    pub min: Array2<f32>,
    pub max: Array2<f32>,
    pub std: Array2<f32>,
    /// Coefficient of variation, 0 where the mean is 0.
    pub cv: Array2<f32>,
}

/// Per-pixel mean, min, max, population std and coefficient of variation over
/// the band axis. NaN band values are ignored; pixels with no finite value are NaN.
pub fn stack_summary(cube: &Cube) -> StackSummary {
    let (_, rows, cols) = cube.shape();
    let data = cube.data();
    let mut summary = StackSummary {
        mean: Array2::from_elem((rows, cols), f32::NAN),
        min: Array2::from_elem((rows, cols), f32::NAN),
        max: Array2::from_elem((rows, cols), f32::NAN),
        std: Array2::from_elem((rows, cols), f32::NAN),
        cv: Array2::from_elem((rows, cols), f32::NAN),
    };

    Zip::from(&mut summary.mean)
        .and(&mut summary.min)
        .and(&mut summary.max)
        .and(&mut summary.std)
        .and(&mut summary.cv)
        .and(data.lanes(Axis(0)))
        .for_each(|mean, min, max, std, cv, lane| {
            let values: Vec<f64> = lane.iter().filter(|v| !v.is_nan()).map(|&v| v as f64).collect();
            if values.is_empty() {
                return;
            }
            let n = values.len() as f64;
            let m = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / n;
            let s = var.sqrt();
            *mean = m as f32;
            *min = values.iter().copied().fold(f64::INFINITY, f64::min) as f32;
            *max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max) as f32;
            *std = s as f32;
            *cv = if m != 0.0 { (s / m) as f32 } else { 0.0 };
        });

    summary
}

/// Pearson correlation of two equally long samples over positions where both are finite.
fn pearson(a: &[f32], b: &[f32]) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(&x, &y)| (x as f64, y as f64))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a) * (x - mean_a);
        var_b += (y - mean_b) * (y - mean_b);
    }
    if var_a == 0.0 || var_b == 0.0 {
        return f64::NAN;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

/// Band-by-band Pearson correlation matrix.
///
/// Pixels are subsampled with a fixed stride so at most `max_samples` enter each
/// pair. Pairs involving a constant band are NaN.
pub fn correlation_matrix(cube: &Cube, max_samples: usize) -> Array2<f64> {
    let (bands, rows, cols) = cube.shape();
    let cells = rows * cols;
    let stride = cells.div_ceil(max_samples.max(1)).max(1);

    let samples: Vec<Vec<f32>> = (0..bands)
        .map(|b| {
            cube.data()
                .index_axis(Axis(0), b)
                .iter()
                .step_by(stride)
                .copied()
                .collect()
        })
        .collect();
    debug!("Correlation over {} samples per band (stride {})", cells.div_ceil(stride), stride);

    let pairs: Vec<(usize, usize)> = (0..bands)
        .flat_map(|i| (i..bands).map(move |j| (i, j)))
        .collect();
    let values: Vec<(usize, usize, f64)> = pairs
        .par_iter()
        .map(|&(i, j)| (i, j, pearson(&samples[i], &samples[j])))
        .collect();

    let mut matrix = Array2::from_elem((bands, bands), f64::NAN);
    for (i, j, r) in values {
        matrix[[i, j]] = r;
        matrix[[j, i]] = r;
    }
    matrix
}

/// Greedily pick bands, in cube order, whose |r| with every band already
/// picked is below `threshold`; stops at `target_count`. Constant bands are skipped.
pub fn select_uncorrelated(
    names: &[String],
    correlation: &Array2<f64>,
    threshold: f64,
    target_count: usize,
) -> Vec<String> {
    let mut picked: Vec<usize> = Vec::new();
    for i in 0..names.len() {
        if picked.len() >= target_count {
            break;
        }
        if correlation[[i, i]].is_nan() {
            debug!("Skipping constant band {}", names[i]);
            continue;
        }
        let independent = picked
            .iter()
            .all(|&j| correlation[[i, j]].abs() < threshold);
        if independent {
            picked.push(i);
        }
    }

    if picked.len() < target_count {
        info!(
            "Only {} bands have pairwise |r| below {} (wanted {})",
            picked.len(),
            threshold,
            target_count
        );
    }
    picked.into_iter().map(|i| names[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Bounds, Grid};
    use ndarray::Array3;
    use std::collections::BTreeMap;

    fn cube_from(data: Array3<f32>, names: &[&str]) -> Cube {
        let (_, rows, cols) = data.dim();
        let grid = Grid::from_bounds(
            Bounds::new(0.0, 0.0, cols as f64, rows as f64),
            rows.min(cols),
            "EPSG:3857",
        )
        .unwrap();
        Cube::on_grid(data, names.iter().map(|s| s.to_string()).collect(), BTreeMap::new(), &grid).unwrap()
    }

    fn four_bands() -> Cube {
        // a: ramp, b: 2a + 1, c: -a, d: checkerboard
        let data = Array3::from_shape_fn((4, 4, 4), |(b, r, c)| {
            let a = (r * 4 + c) as f32;
            match b {
                0 => a,
                1 => 2.0 * a + 1.0,
                2 => -a,
                _ => ((r + c) % 2) as f32,
            }
        });
        cube_from(data, &["a", "b", "c", "d"])
    }

    #[test]
    fn test_band_stats() {
        let mut data = Array3::from_elem((1, 2, 2), 2.0f32);
        data[[0, 0, 0]] = f32::NAN;
        data[[0, 1, 1]] = 5.0;
        let stats = band_stats(&cube_from(data, &["x"]));
        assert_eq!(stats[0].valid, 3);
        assert_eq!(stats[0].nan, 1);
        assert_eq!(stats[0].min, 2.0);
        assert_eq!(stats[0].max, 5.0);
        assert!((stats[0].mean - 3.0).abs() < 1e-12);
        assert!((stats[0].std - 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_stack_summary() {
        let mut data = Array3::zeros((3, 1, 2));
        data[[0, 0, 0]] = 1.0;
        data[[1, 0, 0]] = 2.0;
        data[[2, 0, 0]] = 3.0;
        data[[0, 0, 1]] = f32::NAN;
        let summary = stack_summary(&cube_from(data, &["a", "b", "c"]));
        assert_eq!(summary.mean[[0, 0]], 2.0);
        assert_eq!(summary.min[[0, 0]], 1.0);
        assert_eq!(summary.max[[0, 0]], 3.0);
        assert!((summary.std[[0, 0]] - (2.0f32 / 3.0).sqrt()).abs() < 1e-6);
        assert!((summary.cv[[0, 0]] - (2.0f32 / 3.0).sqrt() / 2.0).abs() < 1e-6);
        // all-zero pixel: cv defined as 0
        assert_eq!(summary.mean[[0, 1]], 0.0);
        assert_eq!(summary.cv[[0, 1]], 0.0);
    }

    #[test]
    fn test_correlation_matrix() {
        let corr = correlation_matrix(&four_bands(), 1000);
        assert!((corr[[0, 0]] - 1.0).abs() < 1e-9);
        assert!((corr[[0, 1]] - 1.0).abs() < 1e-9);
        assert!((corr[[0, 2]] + 1.0).abs() < 1e-9);
        assert_eq!(corr[[1, 3]], corr[[3, 1]]);
        assert!(corr[[0, 3]].abs() < 0.5);
    }

    #[test]
    fn test_select_uncorrelated() {
        let cube = four_bands();
        let corr = correlation_matrix(&cube, 1000);
        let picked = select_uncorrelated(cube.names(), &corr, 0.6, 10);
        assert_eq!(picked, vec!["a", "d"]);
        let sub = cube.select(&picked).unwrap();
        assert_eq!(sub.band_count(), 2);

        let one = select_uncorrelated(cube.names(), &corr, 0.6, 1);
        assert_eq!(one, vec!["a"]);
    }

    #[test]
    fn test_constant_band_skipped() {
        let mut data = Array3::from_shape_fn((2, 3, 3), |(_, r, c)| (r * 3 + c) as f32);
        data.index_axis_mut(Axis(0), 0).fill(7.0);
        let cube = cube_from(data, &["flat", "ramp"]);
        let corr = correlation_matrix(&cube, 100);
        assert_eq!(select_uncorrelated(cube.names(), &corr, 0.5, 5), vec!["ramp"]);
    }
}
