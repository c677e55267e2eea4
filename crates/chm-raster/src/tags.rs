//! GeoTIFF and GDAL private tags.
//!
//! `tiff` names all of these, and the decoder only finds a tag under its
//! named variant, never as `Tag::Unknown`.

use tiff::tags::Tag;

pub(crate) const SAMPLE_FORMAT: Tag = Tag::SampleFormat;
pub(crate) const MODEL_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
pub(crate) const MODEL_TIEPOINT: Tag = Tag::ModelTiepointTag;
pub(crate) const MODEL_TRANSFORMATION: Tag = Tag::ModelTransformationTag;
pub(crate) const GEO_KEY_DIRECTORY: Tag = Tag::GeoKeyDirectoryTag;
pub(crate) const GEO_DOUBLE_PARAMS: Tag = Tag::GeoDoubleParamsTag;
pub(crate) const GEO_ASCII_PARAMS: Tag = Tag::GeoAsciiParamsTag;
/// GDAL_NODATA, stored as an ASCII string.
pub(crate) const GDAL_NODATA: Tag = Tag::GdalNodata;
