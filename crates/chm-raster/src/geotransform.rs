//! Affine pixel-to-world mapping.

use crate::tags::{MODEL_PIXEL_SCALE, MODEL_TIEPOINT, MODEL_TRANSFORMATION};
use crate::{RasterError, Result};
use std::io::{Read, Seek};
use tiff::decoder::Decoder;

/// Affine transform from pixel/line to world coordinates, in GDAL order.
///
/// `x = origin_x + col * pixel_width + row * row_rotation`
/// `y = origin_y + col * col_rotation + row * pixel_height`
///
/// For north-up rasters both rotation terms are zero and `pixel_height` is
/// negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

/// World-coordinate bounding box of a raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    /// Minimum x (west edge).
    pub min_x: f64,
    /// Minimum y (south edge).
    pub min_y: f64,
    /// Maximum x (east edge).
    pub max_x: f64,
    /// Maximum y (north edge).
    pub max_y: f64,
}

impl Extent {
    /// Smallest extent covering both `self` and `other`.
    pub fn union(&self, other: &Extent) -> Extent {
        Extent {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

impl GeoTransform {
    /// North-up transform with square-or-not pixels.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        GeoTransform([origin_x, pixel_width, 0.0, origin_y, 0.0, -pixel_height.abs()])
    }

    /// World x of the top-left corner.
    pub fn origin_x(&self) -> f64 {
        self.0[0]
    }

    /// World y of the top-left corner.
    pub fn origin_y(&self) -> f64 {
        self.0[3]
    }

    /// Pixel width in world units.
    pub fn pixel_width(&self) -> f64 {
        self.0[1]
    }

    /// Pixel height in world units (negative for north-up rasters).
    pub fn pixel_height(&self) -> f64 {
        self.0[5]
    }

    /// True when the transform has no rotation and rows run north to south.
    pub fn is_north_up(&self) -> bool {
        self.0[2] == 0.0 && self.0[4] == 0.0 && self.0[1] > 0.0 && self.0[5] < 0.0
    }

    /// Compare every coefficient within an absolute tolerance.
    pub fn approx_eq(&self, other: &GeoTransform, tolerance: f64) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    /// Map a (fractional) pixel position to world coordinates.
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        let [ox, pw, rr, oy, cr, ph] = self.0;
        (ox + col * pw + row * rr, oy + col * cr + row * ph)
    }

    /// Bounding box of a `width` x `height` raster under this transform.
    pub fn extent(&self, width: u32, height: u32) -> Extent {
        let corners = [
            self.pixel_to_world(0.0, 0.0),
            self.pixel_to_world(width as f64, 0.0),
            self.pixel_to_world(0.0, height as f64),
            self.pixel_to_world(width as f64, height as f64),
        ];
        let mut extent = Extent {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for (x, y) in corners {
            extent.min_x = extent.min_x.min(x);
            extent.min_y = extent.min_y.min(y);
            extent.max_x = extent.max_x.max(x);
            extent.max_y = extent.max_y.max(y);
        }
        extent
    }

    /// Read the transform from GeoTIFF tags.
    ///
    /// ModelTransformation takes precedence; otherwise a ModelTiepoint and
    /// ModelPixelScale pair is required.
    pub(crate) fn from_decoder<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Self> {
        if let Ok(m) = decoder.get_tag_f64_vec(MODEL_TRANSFORMATION) {
            if m.len() >= 16 {
                return Ok(GeoTransform([m[3], m[0], m[1], m[7], m[4], m[5]]));
            }
            return Err(RasterError::InvalidGeoTiff(format!(
                "ModelTransformation has {} values, expected 16",
                m.len()
            )));
        }

        let tiepoint = decoder.get_tag_f64_vec(MODEL_TIEPOINT);
        let pixel_scale = decoder.get_tag_f64_vec(MODEL_PIXEL_SCALE);

        match (tiepoint, pixel_scale) {
            (Ok(tiepoint), Ok(scale)) if tiepoint.len() >= 6 && scale.len() >= 2 => {
                // Tiepoint format: [i, j, k, x, y, z] maps pixel (i, j) to world (x, y)
                let (i, j) = (tiepoint[0], tiepoint[1]);
                let (x, y) = (tiepoint[3], tiepoint[4]);
                let (sx, sy) = (scale[0], scale[1]);
                Ok(GeoTransform([x - i * sx, sx, 0.0, y + j * sy, 0.0, -sy]))
            }
            (Ok(_), Ok(_)) => Err(RasterError::InvalidGeoTiff(
                "ModelTiepoint or ModelPixelScale is truncated".to_string(),
            )),
            _ => Err(RasterError::InvalidGeoTiff(
                "no ModelTransformation or ModelTiepoint/ModelPixelScale tags".to_string(),
            )),
        }
    }

    /// Tag payloads describing this transform.
    ///
    /// Returns `(tiepoint, pixel_scale)` for rotation-free transforms and the
    /// 4x4 ModelTransformation matrix otherwise.
    pub(crate) fn to_tags(&self) -> GeoTransformTags {
        let [ox, pw, rr, oy, cr, ph] = self.0;
        if rr == 0.0 && cr == 0.0 {
            GeoTransformTags::TiepointScale {
                tiepoint: [0.0, 0.0, 0.0, ox, oy, 0.0],
                scale: [pw, -ph, 0.0],
            }
        } else {
            GeoTransformTags::Matrix([
                pw, rr, 0.0, ox, //
                cr, ph, 0.0, oy, //
                0.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ])
        }
    }
}

/// Encoded form of a [`GeoTransform`].
pub(crate) enum GeoTransformTags {
    TiepointScale { tiepoint: [f64; 6], scale: [f64; 3] },
    Matrix([f64; 16]),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_north_up() {
        let gt = GeoTransform::north_up(500_000.0, 4_200_000.0, 1.0, 1.0);
        let extent = gt.extent(100, 50);
        assert_eq!(extent.min_x, 500_000.0);
        assert_eq!(extent.max_x, 500_100.0);
        assert_eq!(extent.min_y, 4_199_950.0);
        assert_eq!(extent.max_y, 4_200_000.0);
        assert!(gt.is_north_up());
    }

    #[test]
    fn test_approx_eq_tolerance() {
        let a = GeoTransform::north_up(10.0, 20.0, 0.5, 0.5);
        let mut b = a;
        b.0[0] += 5e-7;
        assert!(a.approx_eq(&b, 1e-6));
        b.0[0] += 1e-5;
        assert!(!a.approx_eq(&b, 1e-6));
    }

    #[test]
    fn test_rotated_transform_uses_matrix() {
        let gt = GeoTransform([0.0, 1.0, 0.1, 10.0, 0.1, -1.0]);
        assert!(!gt.is_north_up());
        match gt.to_tags() {
            GeoTransformTags::Matrix(m) => {
                assert_eq!(m[3], 0.0);
                assert_eq!(m[7], 10.0);
                assert_eq!(m[1], 0.1);
            }
            GeoTransformTags::TiepointScale { .. } => panic!("expected matrix form"),
        }
    }

    #[test]
    fn test_extent_union() {
        let a = Extent { min_x: 0.0, min_y: 0.0, max_x: 10.0, max_y: 10.0 };
        let b = Extent { min_x: 5.0, min_y: -5.0, max_x: 20.0, max_y: 5.0 };
        let u = a.union(&b);
        assert_eq!(u, Extent { min_x: 0.0, min_y: -5.0, max_x: 20.0, max_y: 10.0 });
    }
}
