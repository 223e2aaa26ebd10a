//! Validate per-kind layer outputs and stack them into one band array.

use crate::cube::Cube;
use crate::error::{CubeError, Result};
use crate::grid::Grid;
use crate::layer::{Layer, LayerKind, Legend};
use log::{debug, info};
use ndarray::{stack, Array3, ArrayView2, Axis};
use std::collections::{BTreeMap, HashMap};

/// Collects rasterized layers by kind until `combine` stacks them.
#[derive(Debug, Default)]
pub struct LayerCombiner {
    expected_shape: Option<(usize, usize)>,
    outputs: HashMap<LayerKind, Vec<Layer>>,
}

/// Bands in final order with their flattened names and legends.
#[derive(Debug)]
pub struct CombinedLayers {
    pub data: Array3<f32>,
    pub names: Vec<String>,
    pub legends: BTreeMap<String, Legend>,
}

impl LayerCombiner {
    /// Combiner that checks every layer against `shape`; without one the first
    /// non-empty layer in band order sets it.
    pub fn new(expected_shape: Option<(usize, usize)>) -> Self {
        Self {
            expected_shape,
            outputs: HashMap::new(),
        }
    }

    pub fn for_grid(grid: &Grid) -> Self {
        Self::new(Some(grid.shape()))
    }

    pub fn push(&mut self, kind: LayerKind, layer: Layer) {
        self.outputs.entry(kind).or_default().push(layer);
    }

    pub fn extend<I: IntoIterator<Item = Layer>>(&mut self, kind: LayerKind, layers: I) {
        self.outputs.entry(kind).or_default().extend(layers);
    }

    pub fn layer_count(&self) -> usize {
        self.outputs.values().map(Vec::len).sum()
    }

    /// Stack all non-empty layers in band order (vector, raster, line, attribute, target).
    pub fn combine(mut self) -> Result<CombinedLayers> {
        let mut ordered: Vec<Layer> = Vec::with_capacity(self.layer_count());
        for kind in LayerKind::BAND_ORDER {
            let layers = self.outputs.remove(&kind).unwrap_or_default();
            let before = ordered.len();
            ordered.extend(layers.into_iter().filter(|l| !l.is_empty()));
            debug!("{} {} layers", ordered.len() - before, kind);
        }

        let mut expected = self.expected_shape;
        for layer in &ordered {
            let shape = layer.data.dim();
            match expected {
                None => expected = Some(shape),
                Some(want) if want != shape => {
                    return Err(CubeError::ShapeMismatch {
                        name: layer.name.clone(),
                        expected: want,
                        actual: shape,
                    })
                }
                Some(_) => {}
            }
        }

        let names: Vec<String> = ordered.iter().map(|l| l.name.clone()).collect();
        let mut legends = BTreeMap::new();
        for layer in &ordered {
            if let Some(legend) = &layer.legend {
                if legends.insert(layer.name.clone(), legend.clone()).is_some() {
                    return Err(CubeError::DuplicateBandName(layer.name.clone()));
                }
            }
        }

        let data = if ordered.is_empty() {
            let (rows, cols) = expected.unwrap_or((0, 0));
            Array3::zeros((0, rows, cols))
        } else {
            let views: Vec<ArrayView2<f32>> = ordered.iter().map(|l| l.data.view()).collect();
            stack(Axis(0), &views)?
        };

        let bands = data.len_of(Axis(0));
        if names.len() != bands {
            return Err(CubeError::NameCountMismatch {
                names: names.len(),
                bands,
            });
        }

        info!("Combined {} bands: {:?}", bands, names);
        Ok(CombinedLayers {
            data,
            names,
            legends,
        })
    }

    /// Combine and assemble a cube on `grid`.
    pub fn into_cube(self, grid: &Grid) -> Result<Cube> {
        let combined = self.combine()?;
        Cube::on_grid(combined.data, combined.names, combined.legends, grid)
    }
}
