//! Moving-window filters with mirrored boundaries.
//!
//! `uniform_filter` matches `scipy.ndimage.uniform_filter(mode="mirror")`: a window
//! of `size` cells spans offsets `-(size / 2) ..= size - size / 2 - 1` and indices
//! outside the array reflect about the edge cell without repeating it.

use log::debug;
use ndarray::Array2;
use rayon::prelude::*;

/// Window used by the generic gap filler.
pub const GAP_FILL_WINDOW: usize = 20;

/// Reflect an out-of-range index back into `0..n` (`d c b | a b c d | c b a`).
pub fn mirror_index(i: isize, n: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - m) as usize
    }
}

/// Mean over a sliding window of one line of values.
fn filter_line(line: &[f64], size: usize) -> Vec<f64> {
    let n = line.len();
    let before = (size / 2) as isize;

    let mut prefix = Vec::with_capacity(n + size);
    prefix.push(0.0);
    let mut running = 0.0;
    for k in 0..(n + size - 1) {
        running += line[mirror_index(k as isize - before, n)];
        prefix.push(running);
    }

    (0..n)
        .map(|j| (prefix[j + size] - prefix[j]) / size as f64)
        .collect()
}

/// Apply `filter_line` to every row in parallel.
fn filter_rows(data: &Array2<f64>, size: usize) -> Array2<f64> {
    let (nrows, ncols) = data.dim();

    let rows: Vec<Vec<f64>> = (0..nrows)
        .into_par_iter()
        .map(|row| {
            let line: Vec<f64> = data.row(row).iter().copied().collect();
            filter_line(&line, size)
        })
        .collect();

    let flat_data: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((nrows, ncols), flat_data).unwrap_or_else(|_| Array2::zeros((nrows, ncols)))
}

/// Separable box (mean) filter of `size` x `size` cells with mirrored edges.
pub fn uniform_filter(data: &Array2<f64>, size: usize) -> Array2<f64> {
    if size <= 1 || data.is_empty() {
        return data.clone();
    }
    let along_rows = filter_rows(data, size);
    let along_cols = filter_rows(&along_rows.reversed_axes(), size);
    along_cols.reversed_axes().as_standard_layout().into_owned()
}

/// Mean of the non-NaN values in a `size` x `size` window around every cell.
/// Cells whose window holds no finite value are NaN.
pub fn nan_mean_filter(data: &Array2<f32>, size: usize) -> Array2<f32> {
    let values = data.mapv(|v| if v.is_finite() { v as f64 } else { 0.0 });
    let weights = data.mapv(|v| if v.is_finite() { 1.0 } else { 0.0 });

    let value_means = uniform_filter(&values, size);
    let weight_means = uniform_filter(&weights, size);
    let min_weight = 0.5 / (size * size).max(1) as f64;

    let mut out = Array2::from_elem(data.dim(), f32::NAN);
    ndarray::Zip::from(&mut out)
        .and(&value_means)
        .and(&weight_means)
        .for_each(|o, &v, &w| {
            if w > min_weight {
                *o = (v / w) as f32;
            }
        });
    out
}

/// Replace NaN cells with the NaN-ignoring window mean; other cells are untouched.
pub fn fill_gaps(data: &Array2<f32>, size: usize) -> Array2<f32> {
    let gaps = data.iter().filter(|v| v.is_nan()).count();
    if gaps == 0 {
        return data.clone();
    }

    let interpolated = nan_mean_filter(data, size);
    let mut out = data.clone();
    ndarray::Zip::from(&mut out)
        .and(&interpolated)
        .for_each(|o, &fill| {
            if o.is_nan() {
                *o = fill;
            }
        });

    let remaining = out.iter().filter(|v| v.is_nan()).count();
    debug!(
        "Gap fill ({}x{} window): {} NaN cells, {} remain",
        size, size, gaps, remaining
    );
    out
}

/// Median of the strictly-positive finite cells; `None` if there are none.
pub fn positive_median(data: &Array2<f32>) -> Option<f32> {
    let mut values: Vec<f32> = data
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
