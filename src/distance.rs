//! Exact Euclidean distance transform and distance-decay surfaces.

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const FAR: f64 = 1e20;

/// Decay profile applied to the distance from a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecayMode {
    Linear,
    Exponential,
}

impl DecayMode {
    /// Value at `distance` pixels for a buffer reaching `pixel_distance` pixels.
    ///
    /// Exponential decay uses scale `pixel_distance / ln(100)`, so it reaches
    /// about 1% at the buffer edge and is cut to 0 beyond it.
    pub fn value(&self, distance: f64, pixel_distance: f64) -> f32 {
        match self {
            DecayMode::Linear => (1.0 - distance / pixel_distance).clamp(0.0, 1.0) as f32,
            DecayMode::Exponential => {
                if distance > pixel_distance {
                    0.0
                } else {
                    let scale = pixel_distance / 100f64.ln();
                    (-distance / scale).exp() as f32
                }
            }
        }
    }
}

/// Squared 1-D distance transform of a sampled function (Felzenszwalb & Huttenlocher).
fn squared_edt_1d(f: &[f64]) -> Vec<f64> {
    let n = f.len();
    if n == 0 {
        return Vec::new();
    }
    let mut d = vec![0.0; n];
    let mut v = vec![0usize; n];
    let mut z = vec![0.0; n + 1];
    let mut k = 0usize;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;

    for q in 1..n {
        loop {
            let p = v[k];
            let s = ((f[q] + (q * q) as f64) - (f[p] + (p * p) as f64)) / (2.0 * (q as f64 - p as f64));
            if s <= z[k] {
                k -= 1;
                continue;
            }
            k += 1;
            v[k] = q;
            z[k] = s;
            z[k + 1] = f64::INFINITY;
            break;
        }
    }

    k = 0;
    for (q, out) in d.iter_mut().enumerate() {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let offset = q as f64 - v[k] as f64;
        *out = offset * offset + f[v[k]];
    }
    d
}

fn transform_rows(data: &Array2<f64>) -> Array2<f64> {
    let (nrows, ncols) = data.dim();
    let rows: Vec<Vec<f64>> = (0..nrows)
        .into_par_iter()
        .map(|row| {
            let line: Vec<f64> = data.row(row).iter().copied().collect();
            squared_edt_1d(&line)
        })
        .collect();
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((nrows, ncols), flat).unwrap_or_else(|_| Array2::zeros((nrows, ncols)))
}

/// Distance in pixels from every cell to the nearest occupied cell.
/// Occupied cells are 0; with no occupied cell at all every distance is infinite.
pub fn distance_to_occupied(occupied: &Array2<bool>) -> Array2<f64> {
    if !occupied.iter().any(|&o| o) {
        return Array2::from_elem(occupied.dim(), f64::INFINITY);
    }

    let seed = occupied.mapv(|o| if o { 0.0 } else { FAR });
    let rows_done = transform_rows(&seed);
    let cols_done = transform_rows(&rows_done.reversed_axes());
    cols_done
        .reversed_axes()
        .as_standard_layout()
        .mapv(f64::sqrt)
}

/// Decay surface around occupied cells; `pixel_distance` is the buffer reach in pixels.
pub fn decay_surface(occupied: &Array2<bool>, pixel_distance: f64, mode: DecayMode) -> Array2<f32> {
    distance_to_occupied(occupied).mapv(|d| mode.value(d, pixel_distance))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_seed(shape: (usize, usize), at: (usize, usize)) -> Array2<bool> {
        let mut occupied = Array2::from_elem(shape, false);
        occupied[[at.0, at.1]] = true;
        occupied
    }

    #[test]
    fn test_distance_single_seed() {
        let dist = distance_to_occupied(&single_seed((5, 7), (2, 3)));
        assert_eq!(dist[[2, 3]], 0.0);
        assert!((dist[[2, 6]] - 3.0).abs() < 1e-12);
        assert!((dist[[0, 0]] - (4.0f64 + 9.0).sqrt()).abs() < 1e-12);
        assert!((dist[[4, 5]] - 8f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_distance_nearest_of_two() {
        let mut occupied = single_seed((1, 10), (0, 0));
        occupied[[0, 9]] = true;
        let dist = distance_to_occupied(&occupied);
        let expected = [0.0, 1.0, 2.0, 3.0, 4.0, 4.0, 3.0, 2.0, 1.0, 0.0];
        for (got, want) in dist.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn test_distance_without_seeds() {
        let dist = distance_to_occupied(&Array2::from_elem((3, 3), false));
        assert!(dist.iter().all(|d| d.is_infinite()));
        let surface = decay_surface(&Array2::from_elem((3, 3), false), 5.0, DecayMode::Exponential);
        assert!(surface.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_linear_decay_profile() {
        let mode = DecayMode::Linear;
        assert_eq!(mode.value(0.0, 10.0), 1.0);
        assert_eq!(mode.value(10.0, 10.0), 0.0);
        assert_eq!(mode.value(25.0, 10.0), 0.0);
        let samples: Vec<f32> = [0.0, 1.5, 3.0, 4.5, 6.0, 9.0, 12.0]
            .iter()
            .map(|&d| mode.value(d, 10.0))
            .collect();
        assert!(samples.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_exponential_decay_profile() {
        let mode = DecayMode::Exponential;
        assert_eq!(mode.value(0.0, 10.0), 1.0);
        // ~1% at the buffer edge, cut beyond it
        assert!((mode.value(10.0, 10.0) - 0.01).abs() < 1e-6);
        assert_eq!(mode.value(10.01, 10.0), 0.0);
        let samples: Vec<f32> = (0..8).map(|d| mode.value(d as f64 * 1.5, 10.0)).collect();
        assert!(samples.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_decay_surface_linear() {
        let surface = decay_surface(&single_seed((1, 6), (0, 0)), 4.0, DecayMode::Linear);
        let expected = [1.0, 0.75, 0.5, 0.25, 0.0, 0.0];
        for (got, want) in surface.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6);
        }
    }
}
