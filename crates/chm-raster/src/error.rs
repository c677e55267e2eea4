//! Error types for the raster crate.

use thiserror::Error;

/// Errors that can occur when reading or writing rasters.
#[derive(Debug, Error)]
pub enum RasterError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding or encoding error.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Invalid GeoTIFF - missing or malformed georeferencing tags.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    /// Unsupported data type or band layout in the TIFF file.
    #[error("Unsupported TIFF data type: {0}")]
    UnsupportedDataType(String),

    /// Pixel buffer does not match the raster dimensions.
    #[error("Pixel buffer holds {actual} values, expected {expected} ({width}x{height})")]
    BufferSize {
        /// Raster width in pixels.
        width: u32,
        /// Raster height in pixels.
        height: u32,
        /// Expected number of values.
        expected: usize,
        /// Actual number of values.
        actual: usize,
    },
}

impl From<tempfile::PersistError> for RasterError {
    fn from(err: tempfile::PersistError) -> Self {
        RasterError::Io(err.error)
    }
}
