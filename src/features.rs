//! Vector input: GeoJSON feature files and CSV point tables.

use crate::crs::reproject_geometries;
use crate::error::{CubeError, Result};
use geo::{BoundingRect, Geometry, Point};
use geojson::GeoJson;
use log::{debug, info};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// One geometry with its attribute table row.
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry,
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key).filter(|v| !v.is_null())
    }
}

/// Geometry family of a feature, used to dispatch rasterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
    Other,
}

pub fn geometry_kind(geometry: &Geometry<f64>) -> GeometryKind {
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => GeometryKind::Point,
        Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => GeometryKind::Line,
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
            GeometryKind::Polygon
        }
        Geometry::GeometryCollection(collection) => {
            let kinds: HashSet<GeometryKind> = collection.iter().map(geometry_kind).collect();
            if kinds.len() == 1 {
                kinds.into_iter().next().unwrap_or(GeometryKind::Other)
            } else {
                GeometryKind::Other
            }
        }
    }
}

/// Attribute column names in first-seen order across all features.
pub fn property_columns(features: &[Feature]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for feature in features {
        for key in feature.properties.keys() {
            if seen.insert(key.clone()) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

/// Read a GeoJSON FeatureCollection, Feature or bare Geometry.
/// Features without geometry are dropped.
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<Vec<Feature>> {
    let path = path.as_ref();
    debug!("Reading GeoJSON: {}", path.display());
    let text = fs::read_to_string(path)?;
    let geojson: GeoJson = text.parse()?;

    let raw_features = match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![geojson::Feature {
            geometry: Some(geometry),
            ..Default::default()
        }],
    };

    let mut features = Vec::with_capacity(raw_features.len());
    let mut dropped = 0usize;
    for raw in raw_features {
        let Some(geometry) = raw.geometry else {
            dropped += 1;
            continue;
        };
        let geometry = Geometry::<f64>::try_from(&geometry.value)?;
        features.push(Feature {
            geometry,
            properties: raw.properties.unwrap_or_default(),
        });
    }

    if dropped > 0 {
        debug!("Dropped {} features without geometry from {}", dropped, path.display());
    }
    info!("Read {} features from {}", features.len(), path.display());
    Ok(features)
}

/// Read a CSV table with point coordinates in `x_column` / `y_column`.
/// Remaining columns become properties: numbers where they parse, strings otherwise.
pub fn read_csv_points<P: AsRef<Path>>(path: P, x_column: &str, y_column: &str) -> Result<Vec<Feature>> {
    let path = path.as_ref();
    debug!("Reading CSV points: {}", path.display());
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let column_index = |name: &str| {
        headers.iter().position(|h| h == name).ok_or_else(|| {
            CubeError::Config(format!("column '{}' not found in {}", name, path.display()))
        })
    };
    let x_idx = column_index(x_column)?;
    let y_idx = column_index(y_column)?;

    let mut features = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let coordinate = |idx: usize| -> Result<f64> {
            record
                .get(idx)
                .and_then(|s| s.trim().parse::<f64>().ok())
                .ok_or_else(|| {
                    CubeError::Config(format!(
                        "row {} of {} has no numeric coordinate in column '{}'",
                        line + 1,
                        path.display(),
                        &headers[idx]
                    ))
                })
        };
        let point = Point::new(coordinate(x_idx)?, coordinate(y_idx)?);

        let mut properties = Map::new();
        for (idx, (name, raw)) in headers.iter().zip(record.iter()).enumerate() {
            if idx == x_idx || idx == y_idx {
                continue;
            }
            properties.insert(name.to_string(), parse_cell(raw));
        }
        features.push(Feature {
            geometry: Geometry::Point(point),
            properties,
        });
    }

    info!("Read {} points from {}", features.len(), path.display());
    Ok(features)
}

fn parse_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    match trimmed.parse::<f64>() {
        Ok(number) => serde_json::Number::from_f64(number)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Err(_) => Value::String(trimmed.to_string()),
    }
}

/// Reproject every feature geometry from `source` to `target`.
pub fn reproject_features(features: &mut [Feature], source: &str, target: &str) -> Result<()> {
    let mut geometries: Vec<Geometry<f64>> = features.iter().map(|f| f.geometry.clone()).collect();
    reproject_geometries(&mut geometries, source, target)?;
    for (feature, geometry) in features.iter_mut().zip(geometries) {
        feature.geometry = geometry;
    }
    Ok(())
}

/// Bounding rectangle of all feature geometries.
pub fn features_bounds(features: &[Feature]) -> Option<geo::Rect<f64>> {
    features
        .iter()
        .filter_map(|f| f.geometry.bounding_rect())
        .reduce(|a, b| {
            geo::Rect::new(
                geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_feature_collection() {
        let file = write_temp(
            ".geojson",
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"zone":"A","code":3},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
                {"type":"Feature","properties":{"zone":"B"},"geometry":null},
                {"type":"Feature","properties":{"kind":"x"},
                 "geometry":{"type":"Point","coordinates":[2,3]}}
            ]}"#,
        );
        let features = read_geojson(file.path()).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(geometry_kind(&features[0].geometry), GeometryKind::Polygon);
        assert_eq!(geometry_kind(&features[1].geometry), GeometryKind::Point);
        assert_eq!(features[0].property("zone"), Some(&Value::from("A")));
        assert_eq!(property_columns(&features), vec!["zone", "code", "kind"]);
    }

    #[test]
    fn test_property_columns_keep_insertion_order() {
        let point = Geometry::Point(Point::new(0.0, 0.0));
        let features = vec![
            Feature::new(point.clone()).with_property("zeta", 1).with_property("alpha", 2),
            Feature::new(point).with_property("mid", 3).with_property("zeta", 4),
        ];
        assert_eq!(property_columns(&features), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_read_bare_geometry() {
        let file = write_temp(
            ".geojson",
            r#"{"type":"LineString","coordinates":[[0,0],[4,4]]}"#,
        );
        let features = read_geojson(file.path()).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(geometry_kind(&features[0].geometry), GeometryKind::Line);
    }

    #[test]
    fn test_read_csv_points() {
        let file = write_temp(".csv", "LONG,LAT,MAG,NOTE\n1.5,2.5,10.25,ok\n3,4,,bad\n");
        let features = read_csv_points(file.path(), "LONG", "LAT").unwrap();
        assert_eq!(features.len(), 2);
        let p: Point<f64> = features[0].geometry.clone().try_into().unwrap();
        assert_eq!((p.x(), p.y()), (1.5, 2.5));
        assert_eq!(features[0].property("MAG").and_then(Value::as_f64), Some(10.25));
        assert_eq!(features[1].property("MAG"), None);
        assert_eq!(features[1].property("NOTE"), Some(&Value::from("bad")));
    }

    #[test]
    fn test_csv_missing_coordinate_column() {
        let file = write_temp(".csv", "a,b\n1,2\n");
        assert!(matches!(
            read_csv_points(file.path(), "x", "y"),
            Err(CubeError::Config(_))
        ));
    }

    #[test]
    fn test_features_bounds() {
        let features = vec![
            Feature::new(Geometry::Point(Point::new(1.0, 5.0))),
            Feature::new(Geometry::Point(Point::new(-2.0, 3.0))),
        ];
        let rect = features_bounds(&features).unwrap();
        assert_eq!((rect.min().x, rect.min().y), (-2.0, 3.0));
        assert_eq!((rect.max().x, rect.max().y), (1.0, 5.0));
    }
}
