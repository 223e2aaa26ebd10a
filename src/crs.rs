use crate::error::{CubeError, Result};
use geo::{Coord, Geometry, MapCoords};
use log::debug;
use proj4rs::adaptors::transform_xy;
use proj4rs::proj::Proj;

const WGS84_PROJ: &str = "+proj=longlat +datum=WGS84 +no_defs";
const WEB_MERCATOR_PROJ: &str =
    "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +nadgrids=@null +no_defs";

/// Resolve a CRS identifier to a PROJ.4 definition string.
///
/// Accepts `EPSG:4326`, `EPSG:3857`, WGS84 UTM zones (`EPSG:326xx` / `EPSG:327xx`)
/// and raw `+proj=` strings.
pub fn proj_definition(crs: &str) -> Result<String> {
    let trimmed = crs.trim();
    if trimmed.starts_with("+proj=") {
        return Ok(trimmed.to_string());
    }

    let code = epsg_code(trimmed)
        .ok_or_else(|| CubeError::Reprojection(format!("unrecognised CRS identifier '{}'", crs)))?;

    match code {
        4326 => Ok(WGS84_PROJ.to_string()),
        3857 | 900913 => Ok(WEB_MERCATOR_PROJ.to_string()),
        32601..=32660 => Ok(format!(
            "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs",
            code - 32600
        )),
        32701..=32760 => Ok(format!(
            "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
            code - 32700
        )),
        _ => Err(CubeError::Reprojection(format!(
            "EPSG:{} has no built-in definition",
            code
        ))),
    }
}

/// Parse `EPSG:nnnn` (case-insensitive) into its numeric code.
pub fn epsg_code(crs: &str) -> Option<u32> {
    let (authority, code) = crs.split_once(':')?;
    if !authority.eq_ignore_ascii_case("epsg") {
        return None;
    }
    code.trim().parse().ok()
}

/// Whether two CRS identifiers name the same reference system.
pub fn same_crs(a: &str, b: &str) -> bool {
    if a.trim().eq_ignore_ascii_case(b.trim()) {
        return true;
    }
    match (epsg_code(a), epsg_code(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Coordinate transform between two CRSs backed by proj4rs.
pub struct CrsTransform {
    source: Proj,
    target: Proj,
    source_geographic: bool,
    target_geographic: bool,
    label: String,
}

impl CrsTransform {
    /// Build a transform, or `None` when both CRSs are the same.
    pub fn between(source: &str, target: &str) -> Result<Option<Self>> {
        if same_crs(source, target) {
            return Ok(None);
        }

        let label = format!("{} -> {}", source, target);
        let source_proj = Proj::from_proj_string(&proj_definition(source)?)
            .map_err(|e| CubeError::Reprojection(format!("invalid source CRS {}: {:?}", source, e)))?;
        let target_proj = Proj::from_proj_string(&proj_definition(target)?)
            .map_err(|e| CubeError::Reprojection(format!("invalid target CRS {}: {:?}", target, e)))?;

        debug!("Built CRS transform {}", label);
        Ok(Some(Self {
            source_geographic: source_proj.is_latlong(),
            target_geographic: target_proj.is_latlong(),
            source: source_proj,
            target: target_proj,
            label,
        }))
    }

    /// Transform one coordinate; geographic CRSs are in degrees.
    pub fn transform_point(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let (x_in, y_in) = if self.source_geographic {
            (x.to_radians(), y.to_radians())
        } else {
            (x, y)
        };

        let (x_out, y_out) = transform_xy(&self.source, &self.target, x_in, y_in).map_err(|e| {
            CubeError::Reprojection(format!("{} failed at ({}, {}): {:?}", self.label, x, y, e))
        })?;

        if self.target_geographic {
            Ok((x_out.to_degrees(), y_out.to_degrees()))
        } else {
            Ok((x_out, y_out))
        }
    }

    pub fn transform_geometry(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>> {
        geometry.try_map_coords(|c: Coord<f64>| {
            let (x, y) = self.transform_point(c.x, c.y)?;
            Ok(Coord { x, y })
        })
    }
}

/// Reproject geometries from `source` into `target` in place; no-op for equal CRSs.
pub fn reproject_geometries(geometries: &mut [Geometry<f64>], source: &str, target: &str) -> Result<()> {
    if let Some(transform) = CrsTransform::between(source, target)? {
        for geometry in geometries.iter_mut() {
            *geometry = transform.transform_geometry(geometry)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, Point};

    const EPS: f64 = 1e-6;

    #[test]
    fn test_epsg_parsing() {
        assert_eq!(epsg_code("EPSG:3857"), Some(3857));
        assert_eq!(epsg_code("epsg:4326"), Some(4326));
        assert_eq!(epsg_code("+proj=longlat"), None);
        assert!(same_crs("EPSG:3857", "epsg:3857"));
        assert!(!same_crs("EPSG:3857", "EPSG:4326"));
    }

    #[test]
    fn test_same_crs_is_identity() {
        assert!(CrsTransform::between("EPSG:3857", "EPSG:3857").unwrap().is_none());
    }

    #[test]
    fn test_unknown_crs_fails() {
        assert!(matches!(
            proj_definition("EPSG:2230"),
            Err(CubeError::Reprojection(_))
        ));
        assert!(proj_definition("not a crs").is_err());
    }

    #[test]
    fn test_utm_definition() {
        let def = proj_definition("EPSG:32733").unwrap();
        assert!(def.contains("+zone=33"));
        assert!(def.contains("+south"));
    }

    #[test]
    fn test_wgs84_to_mercator_origin() {
        let t = CrsTransform::between("EPSG:4326", "EPSG:3857").unwrap().unwrap();
        let (x, y) = t.transform_point(0.0, 0.0).unwrap();
        assert!(x.abs() < EPS);
        assert!(y.abs() < EPS);
    }

    #[test]
    fn test_wgs84_mercator_roundtrip() {
        let forward = CrsTransform::between("EPSG:4326", "EPSG:3857").unwrap().unwrap();
        let back = CrsTransform::between("EPSG:3857", "EPSG:4326").unwrap().unwrap();
        for (lon, lat) in [(10.0, 51.5), (-122.4, 37.8), (139.7, 35.7)] {
            let (x, y) = forward.transform_point(lon, lat).unwrap();
            let (lon2, lat2) = back.transform_point(x, y).unwrap();
            assert!((lon - lon2).abs() < EPS, "lon {} != {}", lon, lon2);
            assert!((lat - lat2).abs() < EPS, "lat {} != {}", lat, lat2);
        }
    }

    #[test]
    fn test_reproject_geometry() {
        let mut geoms = vec![Geometry::Point(point!(x: 180.0, y: 0.0))];
        reproject_geometries(&mut geoms, "EPSG:4326", "EPSG:3857").unwrap();
        let p: Point<f64> = geoms[0].clone().try_into().unwrap();
        assert!((p.x() - 20037508.342789244).abs() < 1e-3);
    }
}
