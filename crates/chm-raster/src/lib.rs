//! # chm-raster
//!
//! Single-band GeoTIFF raster reader and writer for elevation models.
//!
//! This crate provides the in-memory raster model used by the canopy height
//! pipeline:
//! - Decoding single-band GeoTIFFs of any integer or float sample type into `f32`
//! - Reading the pixel-to-world transform from ModelTiepoint/ModelPixelScale or
//!   ModelTransformation tags
//! - Carrying GeoKeys (spatial reference) and `GDAL_NODATA` through unchanged
//! - Reading headers without decoding pixels
//! - Writing Float32 GeoTIFFs atomically and deterministically
//!
//! ## Example
//!
//! ```no_run
//! use chm_raster::{write_geotiff, Raster};
//!
//! let dsm = Raster::from_file("site/dsm.max.tif")?;
//! let (width, height) = dsm.dimensions();
//! println!("{}x{} pixels, nodata {:?}", width, height, dsm.nodata());
//!
//! write_geotiff(&dsm, "site/copy.tif")?;
//! # Ok::<(), chm_raster::RasterError>(())
//! ```

mod error;
mod geotransform;
mod raster;
mod tags;
mod writer;

pub use error::RasterError;
pub use geotransform::{Extent, GeoTransform};
pub use raster::{GeoKeys, Raster, RasterHeader, SampleType};
pub use writer::{encode, format_nodata, write_geotiff};

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
