//! Single-band raster representation.

use crate::geotransform::{Extent, GeoTransform};
use crate::tags::{GDAL_NODATA, GEO_ASCII_PARAMS, GEO_DOUBLE_PARAMS, GEO_KEY_DIRECTORY, SAMPLE_FORMAT};
use crate::{RasterError, Result};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tiff::decoder::ifd::Value;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::ColorType;

/// Raw GeoTIFF georeferencing keys, carried verbatim from input to output.
///
/// These describe the spatial reference system. They are never interpreted,
/// only copied, so a rewritten raster keeps the projection of its source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoKeys {
    /// GeoKeyDirectory (34735).
    pub directory: Option<Vec<u16>>,
    /// GeoDoubleParams (34736).
    pub double_params: Option<Vec<f64>>,
    /// GeoAsciiParams (34737).
    pub ascii_params: Option<String>,
}

/// ProjectedCSTypeGeoKey.
const PROJECTED_CS_TYPE: u16 = 3072;
/// GeographicTypeGeoKey.
const GEOGRAPHIC_TYPE: u16 = 2048;
/// Marker for a user-defined (non-EPSG) code.
const USER_DEFINED: u16 = 32767;

impl GeoKeys {
    /// EPSG code of the projected or geographic CRS, if the keys name one.
    pub fn epsg(&self) -> Option<u16> {
        let directory = self.directory.as_ref()?;
        // Header: version, revision, minor revision, number of keys
        let count = *directory.get(3)? as usize;
        let entries: Vec<&[u16]> = directory[4..].chunks_exact(4).take(count).collect();

        for wanted in [PROJECTED_CS_TYPE, GEOGRAPHIC_TYPE] {
            // Entry: key id, tag location (0 = inline), count, value
            let code = entries
                .iter()
                .find(|entry| entry[0] == wanted && entry[1] == 0)
                .map(|entry| entry[3]);
            if let Some(code) = code.filter(|&c| c != 0 && c != USER_DEFINED) {
                return Some(code);
            }
        }
        None
    }

    fn from_decoder<R: Read + Seek>(decoder: &mut Decoder<R>) -> Self {
        GeoKeys {
            directory: decoder.get_tag_u16_vec(GEO_KEY_DIRECTORY).ok(),
            double_params: decoder.get_tag_f64_vec(GEO_DOUBLE_PARAMS).ok(),
            ascii_params: decoder.get_tag_ascii_string(GEO_ASCII_PARAMS).ok(),
        }
    }
}

/// On-disk sample type of a raster band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    /// Unsigned integer of the given bit depth.
    UInt(u8),
    /// Signed integer of the given bit depth.
    Int(u8),
    /// IEEE float of the given bit depth.
    Float(u8),
}

impl SampleType {
    /// GDAL data type name, as used in VRT documents.
    pub fn gdal_name(&self) -> &'static str {
        match self {
            SampleType::UInt(8) => "Byte",
            SampleType::UInt(16) => "UInt16",
            SampleType::UInt(64) => "UInt64",
            SampleType::UInt(_) => "UInt32",
            SampleType::Int(8) => "Int8",
            SampleType::Int(16) => "Int16",
            SampleType::Int(64) => "Int64",
            SampleType::Int(_) => "Int32",
            SampleType::Float(64) => "Float64",
            SampleType::Float(_) => "Float32",
        }
    }
}

/// Grid and metadata of a raster, read without decoding pixel data.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterHeader {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel-to-world transform.
    pub geotransform: GeoTransform,
    /// No-data value, if the file declares one.
    pub nodata: Option<f64>,
    /// Sample type of the single band.
    pub sample_type: SampleType,
    /// Georeferencing keys.
    pub geokeys: GeoKeys,
}

impl RasterHeader {
    /// Read the header of a single-band GeoTIFF.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut decoder = open_decoder(path.as_ref())?;
        Self::from_decoder(&mut decoder)
    }

    fn from_decoder<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Self> {
        let (width, height) = decoder.dimensions()?;
        let sample_type = read_sample_type(decoder)?;
        let geotransform = GeoTransform::from_decoder(decoder)?;
        let nodata = read_nodata_value(decoder);
        let geokeys = GeoKeys::from_decoder(decoder);

        Ok(Self {
            width,
            height,
            geotransform,
            nodata,
            sample_type,
            geokeys,
        })
    }

    /// World-coordinate bounds of the raster.
    pub fn extent(&self) -> Extent {
        self.geotransform.extent(self.width, self.height)
    }
}

/// A single-band raster held fully in memory.
///
/// Values are stored as `f32` in row-major order (north to south, west to
/// east for north-up rasters) regardless of the on-disk sample type.
#[derive(Debug, Clone)]
pub struct Raster {
    data: Vec<f32>,
    width: u32,
    height: u32,
    geotransform: GeoTransform,
    /// No-data value (pixels equal to this are treated as missing).
    nodata: Option<f64>,
    geokeys: GeoKeys,
}

impl Raster {
    /// Create a raster from a pixel buffer.
    ///
    /// Fails if `data.len()` differs from `width * height`.
    pub fn new(
        width: u32,
        height: u32,
        geotransform: GeoTransform,
        nodata: Option<f64>,
        data: Vec<f32>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(RasterError::BufferSize {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            data,
            width,
            height,
            geotransform,
            nodata,
            geokeys: GeoKeys::default(),
        })
    }

    /// Attach georeferencing keys (spatial reference) to the raster.
    pub fn with_geokeys(mut self, geokeys: GeoKeys) -> Self {
        self.geokeys = geokeys;
        self
    }

    /// Load a raster from a single-band GeoTIFF file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut decoder = open_decoder(path.as_ref())?;

        let header = RasterHeader::from_decoder(&mut decoder)?;
        let data = decode_pixels(&mut decoder)?;

        Ok(Self::new(
            header.width,
            header.height,
            header.geotransform,
            header.nodata,
            data,
        )?
        .with_geokeys(header.geokeys))
    }

    /// Check whether a pixel value is the no-data sentinel.
    ///
    /// A NaN sentinel matches NaN pixels.
    pub fn is_nodata(&self, value: f32) -> bool {
        match self.nodata {
            Some(nodata) if nodata.is_nan() => value.is_nan(),
            Some(nodata) => value == nodata as f32,
            None => false,
        }
    }

    /// Get the value at a pixel, or `None` if outside the raster.
    pub fn get(&self, col: u32, row: u32) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.data.get((row as usize) * (self.width as usize) + col as usize).copied()
    }

    /// Get the dimensions of this raster in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Get the pixel-to-world transform.
    pub fn geotransform(&self) -> GeoTransform {
        self.geotransform
    }

    /// Get the no-data value.
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Get the georeferencing keys.
    pub fn geokeys(&self) -> &GeoKeys {
        &self.geokeys
    }

    /// Pixel values in row-major order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable pixel values in row-major order.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Replace the no-data value. Pixel values are left untouched.
    pub fn set_nodata(&mut self, nodata: Option<f64>) {
        self.nodata = nodata;
    }

    /// World-coordinate bounds of the raster.
    pub fn extent(&self) -> Extent {
        self.geotransform.extent(self.width, self.height)
    }
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path)?;
    let decoder = Decoder::new(BufReader::new(file))?;

    // Allow large elevation models: a 16000 x 16000 f32 raster is ~1 GB
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 1024 * 1024 * 1024;

    Ok(decoder.with_limits(limits))
}

fn read_sample_type<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<SampleType> {
    let bits = match decoder.colortype()? {
        ColorType::Gray(bits) => bits,
        other => {
            return Err(RasterError::UnsupportedDataType(format!(
                "{:?} (only single-band rasters are supported)",
                other
            )))
        }
    };

    // SampleFormat: 1 = unsigned, 2 = signed, 3 = IEEE float; absent means unsigned.
    // Stored once per sample, usually as a single SHORT.
    let format = match decoder.find_tag(SAMPLE_FORMAT)? {
        None => 1,
        Some(Value::List(values)) => match values.into_iter().next() {
            Some(first) => first.into_u32()?,
            None => 1,
        },
        Some(value) => value.into_u32()?,
    };

    match format {
        1 => Ok(SampleType::UInt(bits)),
        2 => Ok(SampleType::Int(bits)),
        3 => Ok(SampleType::Float(bits)),
        other => Err(RasterError::UnsupportedDataType(format!("SampleFormat {}", other))),
    }
}

/// Decode pixel data, widening every sample type to `f32`.
fn decode_pixels<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Vec<f32>> {
    let result = decoder.read_image()?;

    match result {
        DecodingResult::F32(data) => Ok(data),
        DecodingResult::F64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I16(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I32(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U16(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U32(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U8(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I8(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
    }
}

/// Read the no-data value from the GDAL_NODATA tag.
fn read_nodata_value<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(GDAL_NODATA).ok()?;
    parse_nodata(&text)
}

/// Parse a GDAL_NODATA string ("nan", "-9999", "-3.4028234663852886e+38").
pub(crate) fn parse_nodata(text: &str) -> Option<f64> {
    let text = text.trim_matches(char::from(0)).trim();
    if text.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    text.parse().ok()
}
