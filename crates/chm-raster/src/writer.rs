//! GeoTIFF writing.

use crate::geotransform::GeoTransformTags;
use crate::tags::{
    GDAL_NODATA, GEO_ASCII_PARAMS, GEO_DOUBLE_PARAMS, GEO_KEY_DIRECTORY, MODEL_PIXEL_SCALE,
    MODEL_TIEPOINT, MODEL_TRANSFORMATION,
};
use crate::{Raster, Result};
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use tiff::encoder::{colortype, TiffEncoder};

/// Write a raster as a single-band Float32 GeoTIFF.
///
/// The file is encoded into a temporary file in the destination directory and
/// renamed over `path` only once fully written and synced, so an existing
/// output is either replaced completely or left untouched. The encoded bytes
/// depend only on the raster, so rewriting identical data yields an identical
/// file.
pub fn write_geotiff<P: AsRef<Path>>(raster: &Raster, path: P) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".chm-")
        .suffix(".tif.partial")
        .tempfile_in(dir)?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        encode(raster, &mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }

    tmp.persist(path)?;
    Ok(())
}

/// Encode a raster as GeoTIFF into any seekable writer.
pub fn encode<W: Write + Seek>(raster: &Raster, writer: &mut W) -> Result<()> {
    let (width, height) = raster.dimensions();
    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image::<colortype::Gray32Float>(width, height)?;

    {
        let dir = image.encoder();

        match raster.geotransform().to_tags() {
            GeoTransformTags::TiepointScale { tiepoint, scale } => {
                dir.write_tag(MODEL_PIXEL_SCALE, &scale[..])?;
                dir.write_tag(MODEL_TIEPOINT, &tiepoint[..])?;
            }
            GeoTransformTags::Matrix(matrix) => {
                dir.write_tag(MODEL_TRANSFORMATION, &matrix[..])?;
            }
        }

        let geokeys = raster.geokeys();
        if let Some(directory) = &geokeys.directory {
            dir.write_tag(GEO_KEY_DIRECTORY, directory.as_slice())?;
        }
        if let Some(doubles) = &geokeys.double_params {
            dir.write_tag(GEO_DOUBLE_PARAMS, doubles.as_slice())?;
        }
        if let Some(ascii) = &geokeys.ascii_params {
            dir.write_tag(GEO_ASCII_PARAMS, ascii.as_str())?;
        }

        if let Some(nodata) = raster.nodata() {
            dir.write_tag(GDAL_NODATA, format_nodata(nodata).as_str())?;
        }
    }

    image.write_data(raster.data())?;
    Ok(())
}

/// Format a no-data value the way GDAL writes GDAL_NODATA.
pub fn format_nodata(nodata: f64) -> String {
    if nodata.is_nan() {
        "nan".to_string()
    } else {
        format!("{}", nodata)
    }
}
