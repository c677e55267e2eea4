//! Virtual mosaics of per-feature height rasters.
//!
//! A mosaic is written as a GDAL VRT document that references each source
//! GeoTIFF by file name and places it in a common grid. No pixel data is
//! copied, so the mosaic is cheap to build and always reflects its sources.
//!
//! Sources are painted in the order given: where extents overlap, the last
//! source with a valid (non no-data) pixel wins.

use crate::error::MergeError;
use chm_raster::{format_nodata, GeoKeys, GeoTransform, Raster, RasterHeader};
use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Maximum misalignment of a source origin, in pixels, before it counts as
/// off-grid.
const ALIGNMENT_TOLERANCE_PX: f64 = 1e-4;

/// Maximum relative difference between source pixel sizes.
const PIXEL_SIZE_TOLERANCE: f64 = 1e-9;

type MergeResult<T> = std::result::Result<T, MergeError>;

/// One source raster placed in the mosaic grid.
#[derive(Debug, Clone, PartialEq)]
pub struct MosaicSource {
    /// Source file.
    pub path: PathBuf,
    /// Source header.
    pub header: RasterHeader,
    /// Column of the source's top-left pixel in the mosaic.
    pub x_offset: u32,
    /// Row of the source's top-left pixel in the mosaic.
    pub y_offset: u32,
}

/// A mosaic of aligned single-band rasters.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualMosaic {
    width: u32,
    height: u32,
    geotransform: GeoTransform,
    nodata: Option<f64>,
    data_type: &'static str,
    geokeys: GeoKeys,
    sources: Vec<MosaicSource>,
}

impl VirtualMosaic {
    /// Lay out `paths` on a common grid covering the union of their extents.
    ///
    /// Every source must exist, be north-up, share the first source's pixel
    /// size and sit on whole-pixel offsets from it; nothing is resampled.
    pub fn build(paths: &[PathBuf]) -> MergeResult<Self> {
        if paths.is_empty() {
            return Err(MergeError::NoSources);
        }

        let mut headers = Vec::with_capacity(paths.len());
        for path in paths {
            if !path.is_file() {
                return Err(MergeError::MissingSource(path.clone()));
            }
            let header = RasterHeader::from_file(path).map_err(|source| MergeError::Source {
                path: path.clone(),
                source,
            })?;
            headers.push((path, header));
        }

        let reference = headers[0].1.geotransform;
        let (pixel_width, pixel_height) = (reference.pixel_width(), reference.pixel_height());

        let mut extent = None;
        for (path, header) in &headers {
            let gt = header.geotransform;
            if !gt.is_north_up() {
                return Err(incompatible(path, "only north-up rasters can be mosaicked"));
            }
            let size_differs = (gt.pixel_width() - pixel_width).abs()
                > PIXEL_SIZE_TOLERANCE * pixel_width.abs()
                || (gt.pixel_height() - pixel_height).abs()
                    > PIXEL_SIZE_TOLERANCE * pixel_height.abs();
            if size_differs {
                return Err(incompatible(
                    path,
                    &format!(
                        "pixel size {}x{} differs from {}x{}",
                        gt.pixel_width(),
                        gt.pixel_height(),
                        pixel_width,
                        pixel_height
                    ),
                ));
            }
            let source_extent = header.extent();
            extent = Some(match extent {
                None => source_extent,
                Some(e) => source_extent.union(&e),
            });
        }
        // Non-empty input guarantees an extent
        let extent = extent.ok_or(MergeError::NoSources)?;

        let geotransform = GeoTransform([
            extent.min_x,
            pixel_width,
            0.0,
            extent.max_y,
            0.0,
            pixel_height,
        ]);
        let width = ((extent.max_x - extent.min_x) / pixel_width).round() as u32;
        let height = ((extent.max_y - extent.min_y) / -pixel_height).round() as u32;

        let mut sources = Vec::with_capacity(headers.len());
        for (path, header) in &headers {
            let gt = header.geotransform;
            let x = (gt.origin_x() - extent.min_x) / pixel_width;
            let y = (gt.origin_y() - extent.max_y) / pixel_height;
            if (x - x.round()).abs() > ALIGNMENT_TOLERANCE_PX
                || (y - y.round()).abs() > ALIGNMENT_TOLERANCE_PX
            {
                return Err(incompatible(
                    path,
                    &format!("origin is offset by a fraction of a pixel ({:.6}, {:.6})", x, y),
                ));
            }
            sources.push(MosaicSource {
                path: (*path).clone(),
                header: header.clone(),
                x_offset: x.round() as u32,
                y_offset: y.round() as u32,
            });
        }

        let first = &headers[0].1;
        let data_type = if headers.iter().all(|(_, h)| h.sample_type == first.sample_type) {
            first.sample_type.gdal_name()
        } else {
            "Float32"
        };

        debug!(width, height, sources = sources.len(), "Built mosaic layout");
        Ok(Self {
            width,
            height,
            geotransform,
            nodata: first.nodata,
            data_type,
            geokeys: first.geokeys.clone(),
            sources,
        })
    }

    /// Mosaic dimensions in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Mosaic pixel-to-world transform.
    pub fn geotransform(&self) -> GeoTransform {
        self.geotransform
    }

    /// Sources in painting order.
    pub fn sources(&self) -> &[MosaicSource] {
        &self.sources
    }

    /// Render the mosaic as a GDAL VRT document to be saved in `vrt_dir`.
    ///
    /// Sources in `vrt_dir` are referenced relative to the VRT so the
    /// directory can be moved as a whole. The output depends only on the
    /// sources and their order.
    pub fn to_vrt(&self, vrt_dir: &Path) -> String {
        let mut xml = String::new();
        // Writing to a String cannot fail
        let _ = self.write_vrt(&mut xml, vrt_dir);
        xml
    }

    fn write_vrt(&self, out: &mut impl fmt::Write, vrt_dir: &Path) -> fmt::Result {
        let gt = self.geotransform.0;

        writeln!(
            out,
            r#"<VRTDataset rasterXSize="{}" rasterYSize="{}">"#,
            self.width, self.height
        )?;
        if let Some(epsg) = self.geokeys.epsg() {
            writeln!(out, "  <SRS>EPSG:{}</SRS>", epsg)?;
        }
        writeln!(
            out,
            "  <GeoTransform>{}, {}, {}, {}, {}, {}</GeoTransform>",
            gt[0], gt[1], gt[2], gt[3], gt[4], gt[5]
        )?;
        writeln!(out, r#"  <VRTRasterBand dataType="{}" band="1">"#, self.data_type)?;
        if let Some(nodata) = self.nodata {
            writeln!(out, "    <NoDataValue>{}</NoDataValue>", format_nodata(nodata))?;
        }

        for source in &self.sources {
            let (name, relative) = source_reference(&source.path, vrt_dir);
            let (w, h) = (source.header.width, source.header.height);
            writeln!(out, "    <ComplexSource>")?;
            writeln!(
                out,
                r#"      <SourceFilename relativeToVRT="{}">{}</SourceFilename>"#,
                u8::from(relative),
                escape_xml(&name)
            )?;
            writeln!(out, "      <SourceBand>1</SourceBand>")?;
            writeln!(out, r#"      <SrcRect xOff="0" yOff="0" xSize="{}" ySize="{}" />"#, w, h)?;
            writeln!(
                out,
                r#"      <DstRect xOff="{}" yOff="{}" xSize="{}" ySize="{}" />"#,
                source.x_offset, source.y_offset, w, h
            )?;
            if let Some(nodata) = source.header.nodata {
                writeln!(out, "      <NODATA>{}</NODATA>", format_nodata(nodata))?;
            }
            writeln!(out, "    </ComplexSource>")?;
        }

        writeln!(out, "  </VRTRasterBand>")?;
        writeln!(out, "</VRTDataset>")
    }

    /// Materialise the mosaic in memory by painting every source in order.
    ///
    /// Pixels not covered by any valid source hold the mosaic's no-data value
    /// (or zero when there is none), as GDAL would return them.
    pub fn compose(&self) -> MergeResult<Raster> {
        let fill = self.nodata.map(|n| n as f32).unwrap_or(0.0);
        let mut mosaic = Raster::new(
            self.width,
            self.height,
            self.geotransform,
            self.nodata,
            vec![fill; self.width as usize * self.height as usize],
        )
        .map_err(|source| MergeError::Source {
            path: PathBuf::new(),
            source,
        })?
        .with_geokeys(self.geokeys.clone());

        let stride = self.width as usize;
        for placed in &self.sources {
            let source = Raster::from_file(&placed.path).map_err(|source| MergeError::Source {
                path: placed.path.clone(),
                source,
            })?;
            let (w, h) = source.dimensions();
            let data = mosaic.data_mut();
            for row in 0..h {
                for col in 0..w {
                    let value = source.data()[row as usize * w as usize + col as usize];
                    if source.is_nodata(value) {
                        continue;
                    }
                    let x = (placed.x_offset + col) as usize;
                    let y = (placed.y_offset + row) as usize;
                    data[y * stride + x] = value;
                }
            }
        }

        Ok(mosaic)
    }
}

/// Builds mosaics of per-feature outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MosaicMerger;

impl MosaicMerger {
    /// Create a merger.
    pub fn new() -> Self {
        Self
    }

    /// Merge `sources` into a VRT at `target` and return the merged path.
    ///
    /// A lone source that already sits at `target` is returned as-is. The VRT
    /// is written atomically and overwritten deterministically on reruns.
    pub fn merge(&self, sources: &[PathBuf], target: &Path) -> MergeResult<PathBuf> {
        match sources {
            [] => Err(MergeError::NoSources),
            [single] if single == target => {
                if !single.is_file() {
                    return Err(MergeError::MissingSource(single.clone()));
                }
                debug!(path = %single.display(), "Source is the target, no mosaic needed");
                Ok(single.clone())
            }
            _ => {
                let mosaic = VirtualMosaic::build(sources)?;
                let dir = parent_dir(target);
                write_atomic(target, mosaic.to_vrt(dir).as_bytes()).map_err(|source| {
                    MergeError::Write {
                        path: target.to_path_buf(),
                        source,
                    }
                })?;

                let (width, height) = mosaic.dimensions();
                info!(
                    path = %target.display(),
                    sources = sources.len(),
                    "Wrote {}x{} mosaic",
                    width,
                    height
                );
                Ok(target.to_path_buf())
            }
        }
    }
}

fn incompatible(path: &Path, reason: &str) -> MergeError {
    MergeError::Incompatible {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// File name relative to `vrt_dir` when the source lives there, else the path as given.
fn source_reference(path: &Path, vrt_dir: &Path) -> (String, bool) {
    if parent_dir(path) == vrt_dir {
        if let Some(name) = path.file_name() {
            return (name.to_string_lossy().into_owned(), true);
        }
    }
    (path.to_string_lossy().into_owned(), false)
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn write_atomic(target: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".chm-")
        .suffix(".vrt.partial")
        .tempfile_in(parent_dir(target))?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }

    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chm_raster::write_geotiff;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, origin: (f64, f64), w: u32, h: u32, value: f32) -> PathBuf {
        let path = dir.join(name);
        let raster = Raster::new(
            w,
            h,
            GeoTransform::north_up(origin.0, origin.1, 1.0, 1.0),
            Some(-9999.0),
            vec![value; (w * h) as usize],
        )
        .unwrap();
        write_geotiff(&raster, &path).unwrap();
        path
    }

    #[test]
    fn test_layout_offsets() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a.tif", (0.0, 10.0), 4, 4, 1.0);
        let b = write(dir.path(), "b.tif", (6.0, 4.0), 2, 3, 2.0);

        let mosaic = VirtualMosaic::build(&[a, b]).unwrap();
        assert_eq!(mosaic.dimensions(), (8, 9));
        assert_eq!(mosaic.geotransform().origin_x(), 0.0);
        assert_eq!(mosaic.geotransform().origin_y(), 10.0);
        assert_eq!((mosaic.sources()[0].x_offset, mosaic.sources()[0].y_offset), (0, 0));
        assert_eq!((mosaic.sources()[1].x_offset, mosaic.sources()[1].y_offset), (6, 6));
    }

    #[test]
    fn test_vrt_document() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "feature-0_chm.tif", (0.0, 2.0), 2, 2, 1.0);
        let b = write(dir.path(), "feature-1_chm.tif", (2.0, 2.0), 2, 2, 2.0);

        let xml = VirtualMosaic::build(&[a, b]).unwrap().to_vrt(dir.path());
        assert!(xml.starts_with(r#"<VRTDataset rasterXSize="4" rasterYSize="2">"#));
        assert!(xml.contains("<GeoTransform>0, 1, 0, 2, 0, -1</GeoTransform>"));
        assert!(xml.contains(r#"<VRTRasterBand dataType="Float32" band="1">"#));
        assert!(xml.contains("<NoDataValue>-9999</NoDataValue>"));
        assert!(xml.contains(r#"<SourceFilename relativeToVRT="1">feature-0_chm.tif</SourceFilename>"#));
        assert!(xml.contains(r#"<DstRect xOff="2" yOff="0" xSize="2" ySize="2" />"#));
        let first = xml.find("feature-0_chm.tif").unwrap();
        let second = xml.find("feature-1_chm.tif").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_sources_outside_vrt_dir_are_absolute() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let a = write(dir.path(), "a.tif", (0.0, 1.0), 1, 1, 1.0);
        let b = write(other.path(), "b.tif", (1.0, 1.0), 1, 1, 1.0);

        let xml = VirtualMosaic::build(&[a, b.clone()]).unwrap().to_vrt(dir.path());
        assert!(xml.contains(&format!(
            r#"<SourceFilename relativeToVRT="0">{}</SourceFilename>"#,
            b.display()
        )));
    }

    #[test]
    fn test_misaligned_source_rejected() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a.tif", (0.0, 2.0), 2, 2, 1.0);
        let b = write(dir.path(), "b.tif", (2.5, 2.0), 2, 2, 1.0);
        assert!(matches!(
            VirtualMosaic::build(&[a, b]),
            Err(MergeError::Incompatible { .. })
        ));
    }

    #[test]
    fn test_missing_source_rejected() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a.tif", (0.0, 2.0), 2, 2, 1.0);
        let gone = dir.path().join("gone.tif");
        assert!(matches!(
            MosaicMerger::new().merge(&[a, gone], &dir.path().join("chm.vrt")),
            Err(MergeError::MissingSource(_))
        ));
    }

    #[test]
    fn test_merge_empty_fails() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            MosaicMerger::new().merge(&[], &dir.path().join("chm.vrt")),
            Err(MergeError::NoSources)
        ));
    }

    #[test]
    fn test_source_at_target_is_noop() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "chm.tif", (0.0, 2.0), 2, 2, 1.0);
        let before = std::fs::read(&a).unwrap();
        let merged = MosaicMerger::new().merge(&[a.clone()], &a).unwrap();
        assert_eq!(merged, a);
        assert_eq!(std::fs::read(&a).unwrap(), before);
    }

    #[test]
    fn test_single_feature_still_gets_mosaic() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "feature-0_chm.tif", (0.0, 2.0), 2, 2, 1.0);
        let target = dir.path().join("chm.tif");
        let merged = MosaicMerger::new().merge(&[a], &target).unwrap();
        assert_eq!(merged, target);
        let xml = std::fs::read_to_string(&target).unwrap();
        assert!(xml.starts_with("<VRTDataset"));
        assert!(xml.contains("feature-0_chm.tif"));
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a&b<c>\"d'"), "a&amp;b&lt;c&gt;&quot;d&apos;");
    }
}
