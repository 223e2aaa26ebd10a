//! Raster input and output.
//!
//! GeoTIFF files are read with the pure-Rust `tiff` decoder (georeferencing from
//! ModelPixelScale + ModelTiepoint or ModelTransformation, EPSG code from the
//! GeoKey directory, nodata from the GDAL_NODATA tag). With the `gdal` feature
//! any GDAL-readable raster can be opened and a cube exported as a multi-band
//! float32 GeoTIFF.

use crate::crs::epsg_code;
use crate::error::{CubeError, Result};
use crate::grid::GeoTransform;
use log::{debug, info};
use ndarray::Array2;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

// GeoKey ids
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Storage type of the source band; decides the default nodata value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

/// One band of an input raster with its georeferencing.
#[derive(Debug, Clone)]
pub struct SourceRaster {
    pub data: Array2<f64>,
    pub geotransform: GeoTransform,
    pub crs: Option<String>,
    pub nodata: Option<f64>,
    pub sample_type: SampleType,
}

impl SourceRaster {
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// Declared nodata, or 0 for unsigned 8-bit bands and NaN otherwise.
    pub fn effective_nodata(&self) -> f64 {
        match self.nodata {
            Some(nodata) => nodata,
            None if self.sample_type == SampleType::UInt8 => 0.0,
            None => f64::NAN,
        }
    }
}

fn samples_to_f64(result: DecodingResult) -> (Vec<f64>, SampleType) {
    match result {
        DecodingResult::U8(v) => (v.into_iter().map(f64::from).collect(), SampleType::UInt8),
        DecodingResult::U16(v) => (v.into_iter().map(f64::from).collect(), SampleType::UInt16),
        DecodingResult::U32(v) => (v.into_iter().map(f64::from).collect(), SampleType::UInt32),
        DecodingResult::U64(v) => (v.into_iter().map(|x| x as f64).collect(), SampleType::UInt64),
        DecodingResult::I8(v) => (v.into_iter().map(f64::from).collect(), SampleType::Int8),
        DecodingResult::I16(v) => (v.into_iter().map(f64::from).collect(), SampleType::Int16),
        DecodingResult::I32(v) => (v.into_iter().map(f64::from).collect(), SampleType::Int32),
        DecodingResult::I64(v) => (v.into_iter().map(|x| x as f64).collect(), SampleType::Int64),
        DecodingResult::F32(v) => (v.into_iter().map(f64::from).collect(), SampleType::Float32),
        DecodingResult::F64(v) => (v, SampleType::Float64),
    }
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    if decoder.find_tag(Tag::ModelTransformationTag)?.is_some() {
        let m = decoder.get_tag_f64_vec(Tag::ModelTransformationTag)?;
        if m.len() < 8 {
            return Err(CubeError::Config(format!(
                "ModelTransformation tag has {} values, expected 16",
                m.len()
            )));
        }
        return Ok(GeoTransform([m[3], m[0], m[1], m[7], m[4], m[5]]));
    }

    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag)?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag)?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(CubeError::Config(
            "incomplete ModelPixelScale / ModelTiepoint tags".to_string(),
        ));
    }
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    let (sx, sy) = (scale[0], scale[1]);
    Ok(GeoTransform([x - i * sx, sx, 0.0, y + j * sy, 0.0, -sy]))
}

/// EPSG code from the GeoKey directory (projected first, then geographic).
fn read_epsg<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<Option<u32>> {
    if decoder.find_tag(Tag::GeoKeyDirectoryTag)?.is_none() {
        return Ok(None);
    }
    let keys = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag)?;
    if keys.len() < 4 {
        return Ok(None);
    }
    let count = keys[3] as usize;
    let mut geographic = None;
    let mut projected = None;
    for entry in keys[4..].chunks_exact(4).take(count) {
        // Only inline SHORT values (location 0) hold EPSG codes
        if entry[1] != 0 {
            continue;
        }
        match entry[0] {
            PROJECTED_CS_TYPE_GEO_KEY if entry[3] != 32767 => projected = Some(entry[3] as u32),
            GEOGRAPHIC_TYPE_GEO_KEY if entry[3] != 32767 => geographic = Some(entry[3] as u32),
            _ => {}
        }
    }
    Ok(projected.or(geographic))
}

fn read_nodata<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<Option<f64>> {
    if decoder.find_tag(Tag::GdalNodata)?.is_none() {
        return Ok(None);
    }
    let text = decoder.get_tag_ascii_string(Tag::GdalNodata)?;
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    match text.to_ascii_lowercase().as_str() {
        "nan" | "-nan" => Ok(Some(f64::NAN)),
        other => Ok(other.parse::<f64>().ok()),
    }
}

/// Read the first band of a GeoTIFF.
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<SourceRaster> {
    let path = path.as_ref();
    info!("Opening input raster: {}", path.display());
    let mut decoder = Decoder::new(File::open(path)?)?;

    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);
    if width == 0 || height == 0 {
        return Err(CubeError::Config(format!(
            "raster {} has zero size ({}x{})",
            path.display(),
            width,
            height
        )));
    }

    let geotransform = read_geotransform(&mut decoder)?;
    let crs = read_epsg(&mut decoder)?.map(|code| format!("EPSG:{}", code));
    let nodata = read_nodata(&mut decoder)?;

    let (samples, sample_type) = samples_to_f64(decoder.read_image()?);
    let per_pixel = samples.len() / (width * height);
    let values: Vec<f64> = if per_pixel > 1 {
        debug!("{} samples per pixel; keeping the first", per_pixel);
        samples.into_iter().step_by(per_pixel).collect()
    } else {
        samples
    };
    let data = Array2::from_shape_vec((height, width), values)?;

    debug!(
        "Raster {}x{} {:?}, crs={:?}, nodata={:?}, transform={:?}",
        width, height, sample_type, crs, nodata, geotransform.0
    );

    Ok(SourceRaster {
        data,
        geotransform,
        crs,
        nodata,
        sample_type,
    })
}

/// Read the first band of any raster, through GDAL when it is available.
pub fn read_raster<P: AsRef<Path>>(path: P) -> Result<SourceRaster> {
    #[cfg(feature = "gdal")]
    {
        gdal_io::read_input_raster(path.as_ref())
    }
    #[cfg(not(feature = "gdal"))]
    {
        read_geotiff(path)
    }
}

fn geokey_directory(crs: &str) -> Vec<u16> {
    let mut keys = vec![1, 1, 0, 1, GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA];
    let code = epsg_code(crs).and_then(|c| u16::try_from(c).ok());
    if let Some(code) = code {
        let geographic = code == 4326;
        keys[3] = 3;
        keys.extend_from_slice(&[
            GT_MODEL_TYPE_GEO_KEY,
            0,
            1,
            if geographic { MODEL_TYPE_GEOGRAPHIC } else { MODEL_TYPE_PROJECTED },
        ]);
        let key = if geographic { GEOGRAPHIC_TYPE_GEO_KEY } else { PROJECTED_CS_TYPE_GEO_KEY };
        keys.extend_from_slice(&[key, 0, 1, code]);
    }
    keys
}

/// Write one float32 band as a north-up GeoTIFF with NaN nodata.
pub fn write_geotiff<P: AsRef<Path>>(
    path: P,
    data: &Array2<f32>,
    transform: &GeoTransform,
    crs: &str,
) -> Result<()> {
    let path = path.as_ref();
    let (height, width) = data.dim();
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    let mut image = encoder.new_image::<Gray32Float>(width as u32, height as u32)?;

    let gt = transform.coefficients();
    let dir = image.encoder();
    dir.write_tag(Tag::ModelPixelScaleTag, &[gt[1], -gt[5], 0.0][..])?;
    dir.write_tag(Tag::ModelTiepointTag, &[0.0, 0.0, 0.0, gt[0], gt[3], 0.0][..])?;
    dir.write_tag(Tag::GeoKeyDirectoryTag, geokey_directory(crs).as_slice())?;
    dir.write_tag(Tag::GdalNodata, "nan")?;

    let pixels: Vec<f32> = data.iter().copied().collect();
    image.write_data(&pixels)?;
    debug!("Wrote {}x{} band to {}", width, height, path.display());
    Ok(())
}

#[cfg(feature = "gdal")]
pub mod gdal_io {
    use super::{SampleType, SourceRaster};
    use crate::crs::epsg_code;
    use crate::error::{CubeError, Result};
    use crate::grid::GeoTransform;
    use gdal::raster::{Buffer, GdalDataType, RasterBand};
    use gdal::spatial_ref::SpatialRef;
    use gdal::{Dataset, DriverManager, Metadata};
    use log::{debug, info};
    use ndarray::{Array2, Array3};
    use std::path::Path;

    fn sample_type(band: &RasterBand) -> SampleType {
        match band.band_type() {
            GdalDataType::UInt8 => SampleType::UInt8,
            GdalDataType::UInt16 => SampleType::UInt16,
            GdalDataType::Int16 => SampleType::Int16,
            GdalDataType::UInt32 => SampleType::UInt32,
            GdalDataType::Int32 => SampleType::Int32,
            GdalDataType::Float32 => SampleType::Float32,
            _ => SampleType::Float64,
        }
    }

    fn crs_of(dataset: &Dataset) -> Option<String> {
        let wkt = dataset.projection();
        if wkt.is_empty() {
            return None;
        }
        let srs = SpatialRef::from_wkt(&wkt).ok()?;
        match (srs.auth_name(), srs.auth_code()) {
            (Ok(name), Ok(code)) if name == "EPSG" => Some(format!("EPSG:{}", code)),
            _ => srs.to_proj4().ok(),
        }
    }

    /// Read the first band of a GDAL-readable raster.
    pub fn read_input_raster(path: &Path) -> Result<SourceRaster> {
        info!("Opening input raster: {}", path.display());
        let dataset = Dataset::open(path)?;
        let rasterband: RasterBand = dataset.rasterband(1)?;

        let width = rasterband.x_size();
        let height = rasterband.y_size();
        if width == 0 || height == 0 {
            return Err(CubeError::Config(format!(
                "raster {} has zero size ({}x{})",
                path.display(),
                width,
                height
            )));
        }

        let buffer = rasterband.read_as::<f64>((0, 0), (width, height), (width, height), None)?;
        let data_vec: Vec<f64> = buffer.into_iter().collect();
        let data = Array2::from_shape_vec((height, width), data_vec)?;

        let raster = SourceRaster {
            data,
            geotransform: GeoTransform(dataset.geo_transform()?),
            crs: crs_of(&dataset),
            nodata: rasterband.no_data_value(),
            sample_type: sample_type(&rasterband),
        };
        debug!("Raster {}x{} {:?}, crs={:?}", width, height, raster.sample_type, raster.crs);
        Ok(raster)
    }

    /// Write a `[band, y, x]` stack as a multi-band float32 GeoTIFF with band descriptions.
    pub fn write_multiband_output(
        path: &Path,
        bands: &Array3<f32>,
        names: &[String],
        transform: &GeoTransform,
        crs: &str,
    ) -> Result<()> {
        info!("Creating output raster: {}", path.display());
        let (count, height, width) = bands.dim();
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<f32, _>(path, width, height, count)?;

        dataset.set_geo_transform(&transform.coefficients())?;
        if let Some(code) = epsg_code(crs) {
            let srs = SpatialRef::from_epsg(code)?;
            dataset.set_spatial_ref(&srs)?;
        }

        for (i, name) in names.iter().enumerate() {
            let band_index = i + 1;
            debug!("Writing band {} ({})", band_index, name);
            let mut raster_band = dataset.rasterband(band_index)?;
            let values: Vec<f32> = bands.index_axis(ndarray::Axis(0), i).iter().copied().collect();
            let mut buffer = Buffer::new((width, height), values);
            raster_band.write((0, 0), (width, height), &mut buffer)?;
            raster_band.set_description(name)?;
            raster_band.set_no_data_value(Some(f64::NAN))?;
        }

        info!("Successfully wrote {} bands to output", count);
        Ok(())
    }
}
