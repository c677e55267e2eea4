//! Integration tests for chm-raster using synthesised GeoTIFF files.

use approx::assert_relative_eq;
use chm_raster::{
    write_geotiff, GeoKeys, GeoTransform, Raster, RasterError, RasterHeader, SampleType,
};
use std::fs::File;
use std::path::Path;
use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

/// UTM zone 10N keys, as written by GDAL for EPSG:32610.
fn utm_geokeys() -> GeoKeys {
    GeoKeys {
        directory: Some(vec![
            1, 1, 0, 3, //
            1024, 0, 1, 1, // GTModelType = projected
            1025, 0, 1, 1, // GTRasterType = PixelIsArea
            3072, 0, 1, 32610, // ProjectedCSType
        ]),
        double_params: None,
        ascii_params: Some("WGS 84 / UTM zone 10N|".to_string()),
    }
}

fn write_int16_tiff(path: &Path, width: u32, height: u32, data: &[i16], nodata: &str) {
    let file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(file).unwrap();
    let mut image = encoder.new_image::<colortype::GrayI16>(width, height).unwrap();
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &[1.0f64, 1.0, 0.0][..])
        .unwrap();
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &[0.0f64, 0.0, 0.0, 100.0, 200.0, 0.0][..])
        .unwrap();
    image.encoder().write_tag(Tag::GdalNodata, nodata).unwrap();
    image.write_data(data).unwrap();
}

#[test]
fn test_write_then_read_preserves_georeferencing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chm.tif");

    let gt = GeoTransform::north_up(512_000.0, 5_270_000.0, 0.5, 0.5);
    let raster = Raster::new(3, 2, gt, Some(-9999.0), vec![1.5, 2.5, -9999.0, 4.0, 5.0, 6.25])
        .unwrap()
        .with_geokeys(utm_geokeys());
    write_geotiff(&raster, &path).unwrap();

    let loaded = Raster::from_file(&path).unwrap();
    assert_eq!(loaded.dimensions(), (3, 2));
    assert!(loaded.geotransform().approx_eq(&gt, 1e-9));
    assert_eq!(loaded.nodata(), Some(-9999.0));
    assert_eq!(loaded.geokeys(), &utm_geokeys());
    assert_eq!(loaded.data(), raster.data());
    assert!(loaded.is_nodata(loaded.get(2, 0).unwrap()));
}

#[test]
fn test_rewrite_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chm.tif");
    let raster = Raster::new(
        2,
        2,
        GeoTransform::north_up(0.0, 2.0, 1.0, 1.0),
        Some(-9999.0),
        vec![0.0, 1.0, 2.0, 3.0],
    )
    .unwrap();

    write_geotiff(&raster, &path).unwrap();
    let first = std::fs::read(&path).unwrap();
    write_geotiff(&raster, &path).unwrap();
    let second = std::fs::read(&path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_integer_raster_is_widened() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dtm.tif");
    write_int16_tiff(&path, 2, 2, &[120, -32768, 130, 140], "-32768");

    let raster = Raster::from_file(&path).unwrap();
    assert_eq!(raster.data(), &[120.0, -32768.0, 130.0, 140.0]);
    assert!(raster.is_nodata(raster.get(1, 0).unwrap()));
    assert_relative_eq!(raster.geotransform().origin_x(), 100.0);
    assert_relative_eq!(raster.geotransform().origin_y(), 200.0);
    assert_relative_eq!(raster.geotransform().pixel_height(), -1.0);
}

#[test]
fn test_written_raster_header_is_float32() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chm.tif");
    let gt = GeoTransform::north_up(10.0, 20.0, 0.5, 0.5);
    let raster = Raster::new(2, 2, gt, Some(-9999.0), vec![-1.5, 0.25, -9999.0, 3.0])
        .unwrap()
        .with_geokeys(utm_geokeys());
    write_geotiff(&raster, &path).unwrap();

    let header = RasterHeader::from_file(&path).unwrap();
    assert_eq!(header.sample_type, SampleType::Float(32));
    assert_eq!(header.sample_type.gdal_name(), "Float32");
    assert_eq!(header.nodata, Some(-9999.0));
    assert!(header.geotransform.approx_eq(&gt, 1e-9));
    assert_eq!(header.geokeys.epsg(), Some(32610));
}

#[test]
fn test_header_reads_without_pixels() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dtm.tif");
    write_int16_tiff(&path, 4, 3, &[0; 12], "-1");

    let header = RasterHeader::from_file(&path).unwrap();
    assert_eq!((header.width, header.height), (4, 3));
    assert_eq!(header.sample_type, SampleType::Int(16));
    assert_eq!(header.nodata, Some(-1.0));

    let extent = header.extent();
    assert_relative_eq!(extent.min_x, 100.0);
    assert_relative_eq!(extent.max_x, 104.0);
    assert_relative_eq!(extent.min_y, 197.0);
    assert_relative_eq!(extent.max_y, 200.0);
}

#[test]
fn test_multiband_raster_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rgb.tif");
    {
        let file = File::create(&path).unwrap();
        let mut encoder = TiffEncoder::new(file).unwrap();
        encoder
            .write_image::<colortype::RGB8>(1, 1, &[10, 20, 30])
            .unwrap();
    }

    let err = Raster::from_file(&path).unwrap_err();
    assert!(matches!(err, RasterError::UnsupportedDataType(_)), "got {err}");
}

#[test]
fn test_missing_georeferencing_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plain.tif");
    {
        let file = File::create(&path).unwrap();
        let mut encoder = TiffEncoder::new(file).unwrap();
        encoder
            .write_image::<colortype::Gray32Float>(1, 1, &[1.0])
            .unwrap();
    }

    let err = Raster::from_file(&path).unwrap_err();
    assert!(matches!(err, RasterError::InvalidGeoTiff(_)), "got {err}");
}
