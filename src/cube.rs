//! The assembled cube and its on-disk container.
//!
//! Container layout: the 8-byte magic `DATACUBE`, a little-endian `u32` format
//! version, a little-endian `u64` header length, the JSON header (shape, band
//! names, legends, CRS, transform, bounds) and finally the `[band, y, x]` payload
//! as little-endian `f32`.

use crate::error::{CubeError, Result};
use crate::grid::{Bounds, GeoTransform, Grid};
use crate::layer::Legend;
use log::{debug, info};
use ndarray::{Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

pub const MAGIC: &[u8; 8] = b"DATACUBE";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    shape: [usize; 3],
    names: Vec<String>,
    legends: BTreeMap<String, Legend>,
    crs: String,
    transform: GeoTransform,
    bounds: Bounds,
}

/// Stack of named bands sharing one grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Cube {
    data: Array3<f32>,
    names: Vec<String>,
    legends: BTreeMap<String, Legend>,
    crs: String,
    transform: GeoTransform,
    bounds: Bounds,
}

impl Cube {
    /// Assemble a cube; names must match bands 1:1 and be unique, and every
    /// legend must belong to a band.
    pub fn new(
        data: Array3<f32>,
        names: Vec<String>,
        legends: BTreeMap<String, Legend>,
        crs: impl Into<String>,
        transform: GeoTransform,
        bounds: Bounds,
    ) -> Result<Self> {
        let bands = data.len_of(Axis(0));
        if names.len() != bands {
            return Err(CubeError::NameCountMismatch {
                names: names.len(),
                bands,
            });
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(CubeError::DuplicateBandName(name.clone()));
            }
        }
        if let Some(orphan) = legends.keys().find(|k| !seen.contains(k.as_str())) {
            return Err(CubeError::BandNotFound(orphan.clone()));
        }

        Ok(Self {
            data,
            names,
            legends,
            crs: crs.into(),
            transform,
            bounds,
        })
    }

    /// Assemble a cube on `grid`.
    pub fn on_grid(
        data: Array3<f32>,
        names: Vec<String>,
        legends: BTreeMap<String, Legend>,
        grid: &Grid,
    ) -> Result<Self> {
        let (_, rows, cols) = data.dim();
        if (rows, cols) != grid.shape() {
            return Err(CubeError::ShapeMismatch {
                name: "cube".to_string(),
                expected: grid.shape(),
                actual: (rows, cols),
            });
        }
        Self::new(data, names, legends, grid.crs(), *grid.transform(), *grid.bounds())
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn legends(&self) -> &BTreeMap<String, Legend> {
        &self.legends
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn band_count(&self) -> usize {
        self.names.len()
    }

    /// `(bands, rows, cols)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Pixel-index coordinates along x.
    pub fn x_coords(&self) -> Vec<usize> {
        (0..self.data.len_of(Axis(2))).collect()
    }

    /// Pixel-index coordinates along y.
    pub fn y_coords(&self) -> Vec<usize> {
        (0..self.data.len_of(Axis(1))).collect()
    }

    pub fn band_index(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| CubeError::BandNotFound(name.to_string()))
    }

    pub fn band(&self, name: &str) -> Result<ArrayView2<'_, f32>> {
        let idx = self.band_index(name)?;
        Ok(self.data.index_axis(Axis(0), idx))
    }

    pub fn legend(&self, name: &str) -> Option<&Legend> {
        self.legends.get(name)
    }

    /// Sub-cube of the named bands, in the order given.
    pub fn select(&self, names: &[String]) -> Result<Cube> {
        let indices = names
            .iter()
            .map(|n| self.band_index(n))
            .collect::<Result<Vec<_>>>()?;
        let data = self.data.select(Axis(0), &indices);
        let legends = self
            .legends
            .iter()
            .filter(|(k, _)| names.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Cube::new(data, names.to_vec(), legends, self.crs.clone(), self.transform, self.bounds)
    }

    /// Write the container; the file only appears once fully written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let (bands, rows, cols) = self.shape();
        let header = Header {
            shape: [bands, rows, cols],
            names: self.names.clone(),
            legends: self.legends.clone(),
            crs: self.crs.clone(),
            transform: self.transform,
            bounds: self.bounds,
        };
        let header_json = serde_json::to_vec(&header)?;

        let partial = path.with_extension("partial");
        {
            let mut writer = BufWriter::new(File::create(&partial)?);
            writer.write_all(MAGIC)?;
            writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
            writer.write_all(&(header_json.len() as u64).to_le_bytes())?;
            writer.write_all(&header_json)?;
            for value in self.data.iter() {
                writer.write_all(&value.to_le_bytes())?;
            }
            writer.flush()?;
        }
        fs::rename(&partial, path)?;

        info!(
            "Saved cube {} ({} bands, {}x{})",
            path.display(),
            bands,
            rows,
            cols
        );
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Cube> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let invalid = |msg: &str| CubeError::InvalidCube(format!("{}: {}", path.display(), msg));

        if bytes.len() < 20 || &bytes[..8] != MAGIC {
            return Err(invalid("missing DATACUBE magic"));
        }
        let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        if version != FORMAT_VERSION {
            return Err(invalid(&format!("unsupported format version {}", version)));
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&bytes[12..20]);
        let header_len = usize::try_from(u64::from_le_bytes(len_bytes))
            .map_err(|_| invalid("header length overflow"))?;
        let payload_start = 20usize
            .checked_add(header_len)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| invalid("truncated header"))?;

        let mut header: Header = serde_json::from_slice(&bytes[20..payload_start])?;
        let [bands, rows, cols] = header.shape;
        let expected = bands
            .checked_mul(rows)
            .and_then(|n| n.checked_mul(cols))
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| invalid("shape overflow"))?;
        let payload = &bytes[payload_start..];
        if payload.len() != expected {
            return Err(invalid(&format!(
                "payload holds {} bytes, expected {}",
                payload.len(),
                expected
            )));
        }

        let values: Vec<f32> = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let data = Array3::from_shape_vec((bands, rows, cols), values)?;
        for legend in header.legends.values_mut() {
            legend.reindex();
        }
        debug!("Loaded cube {} with bands {:?}", path.display(), header.names);

        Cube::new(
            data,
            header.names,
            header.legends,
            header.crs,
            header.transform,
            header.bounds,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cube() -> Cube {
        let grid = Grid::from_bounds(Bounds::new(0.0, 0.0, 30.0, 20.0), 2, "EPSG:3857").unwrap();
        let data = Array3::from_shape_fn((3, 2, 3), |(b, r, c)| (b * 100 + r * 10 + c) as f32);
        let mut legends = BTreeMap::new();
        legends.insert("zones_landuse".to_string(), Legend::from_categories(["forest", "water"]));
        let names = vec![
            "zones_landuse".to_string(),
            "dem".to_string(),
            "TARGET_wells".to_string(),
        ];
        Cube::on_grid(data, names, legends, &grid).unwrap()
    }

    #[test]
    fn test_band_by_name() {
        let cube = sample_cube();
        assert_eq!(cube.band("dem").unwrap()[[1, 2]], 112.0);
        assert!(matches!(cube.band("nope"), Err(CubeError::BandNotFound(_))));
        assert_eq!(cube.legend("zones_landuse").unwrap().code("water"), Some(1));
        assert_eq!(cube.x_coords(), vec![0, 1, 2]);
        assert_eq!(cube.y_coords(), vec![0, 1]);
    }

    #[test]
    fn test_name_count_checked() {
        let err = Cube::new(
            Array3::zeros((2, 1, 1)),
            vec!["a".to_string()],
            BTreeMap::new(),
            "EPSG:3857",
            GeoTransform([0.0, 1.0, 0.0, 1.0, 0.0, -1.0]),
            Bounds::new(0.0, 0.0, 1.0, 1.0),
        )
        .unwrap_err();
        assert!(matches!(err, CubeError::NameCountMismatch { names: 1, bands: 2 }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Cube::new(
            Array3::zeros((2, 1, 1)),
            vec!["a".to_string(), "a".to_string()],
            BTreeMap::new(),
            "EPSG:3857",
            GeoTransform([0.0, 1.0, 0.0, 1.0, 0.0, -1.0]),
            Bounds::new(0.0, 0.0, 1.0, 1.0),
        )
        .unwrap_err();
        assert!(matches!(err, CubeError::DuplicateBandName(_)));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.dcube");
        let mut cube = sample_cube();
        cube.data[[1, 0, 0]] = f32::NAN;
        cube.save(&path).unwrap();
        assert!(!path.with_extension("partial").exists());

        let loaded = Cube::load(&path).unwrap();
        assert_eq!(loaded.names(), cube.names());
        assert_eq!(loaded.crs(), cube.crs());
        for (a, b) in loaded.transform().0.iter().zip(cube.transform().0) {
            assert!((a - b).abs() < 1e-9);
        }
        assert_eq!(loaded.bounds(), cube.bounds());
        assert_eq!(loaded.legends(), cube.legends());
        assert!(loaded.data()[[1, 0, 0]].is_nan());
        assert_eq!(loaded.data()[[2, 1, 2]], 212.0);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.dcube");
        fs::write(&path, b"NOTACUBE and some more bytes").unwrap();
        assert!(matches!(Cube::load(&path), Err(CubeError::InvalidCube(_))));
    }

    #[test]
    fn test_load_rejects_overflowing_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.dcube");
        let header = br#"{"shape":[4611686018427387904,4,1],"names":[],"legends":{},"crs":"EPSG:3857","transform":[0.0,1.0,0.0,1.0,0.0,-1.0],"bounds":{"minx":0.0,"miny":0.0,"maxx":1.0,"maxy":1.0}}"#;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(header.len() as u64).to_le_bytes());
        bytes.extend_from_slice(header);
        bytes.extend_from_slice(&[0u8; 16]);
        fs::write(&path, &bytes).unwrap();

        match Cube::load(&path) {
            Err(CubeError::InvalidCube(msg)) => assert!(msg.contains("shape overflow")),
            other => panic!("unexpected result {:?}", other.map(|c| c.shape())),
        }
    }

    #[test]
    fn test_select_keeps_order_and_legends() {
        let cube = sample_cube();
        let sub = cube
            .select(&["TARGET_wells".to_string(), "zones_landuse".to_string()])
            .unwrap();
        assert_eq!(sub.names(), &["TARGET_wells", "zones_landuse"]);
        assert_eq!(sub.band("TARGET_wells").unwrap()[[0, 1]], 201.0);
        assert_eq!(sub.legends().len(), 1);
        assert!(cube.select(&["missing".to_string()]).is_err());
    }
}
