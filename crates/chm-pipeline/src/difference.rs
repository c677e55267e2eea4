//! Pixel-wise DSM minus DTM.

use crate::config::{DEFAULT_GRID_TOLERANCE, DEFAULT_NODATA};
use crate::error::GridMismatch;
use crate::{PipelineError, RasterPairKey, Result};
use chm_raster::Raster;
use std::path::Path;
use tracing::debug;

/// Settings for [`compute_difference`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifferenceOptions {
    /// Sentinel written where either input has no data.
    pub nodata: f64,
    /// Maximum absolute difference between geotransform coefficients.
    pub grid_tolerance: f64,
}

impl Default for DifferenceOptions {
    fn default() -> Self {
        Self {
            nodata: DEFAULT_NODATA,
            grid_tolerance: DEFAULT_GRID_TOLERANCE,
        }
    }
}

/// Height above ground: DSM minus DTM on the inputs' grid.
#[derive(Debug, Clone)]
pub struct HeightRaster {
    raster: Raster,
    nodata_pixels: usize,
}

impl HeightRaster {
    /// The height raster, carrying the DTM's georeferencing and the sentinel.
    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    /// Number of pixels set to the no-data sentinel.
    pub fn nodata_pixels(&self) -> usize {
        self.nodata_pixels
    }
}

/// Check that two rasters are co-registered.
pub fn check_grid(dsm: &Raster, dtm: &Raster, tolerance: f64) -> std::result::Result<(), GridMismatch> {
    if dsm.dimensions() != dtm.dimensions() {
        return Err(GridMismatch::Dimensions {
            dsm: dsm.dimensions(),
            dtm: dtm.dimensions(),
        });
    }
    if !dsm.geotransform().approx_eq(&dtm.geotransform(), tolerance) {
        return Err(GridMismatch::GeoTransform {
            dsm: dsm.geotransform(),
            dtm: dtm.geotransform(),
            tolerance,
        });
    }
    Ok(())
}

/// Compute DSM - DTM for a co-registered pair.
///
/// A pixel is no-data in the output when it is no-data (or NaN) in either
/// input. Arithmetic is done in `f64` so wide integer elevation ranges
/// cannot overflow. Grids that differ are rejected, never resampled.
pub fn compute_difference(
    key: &RasterPairKey,
    dsm: &Raster,
    dtm: &Raster,
    options: &DifferenceOptions,
) -> Result<HeightRaster> {
    check_grid(dsm, dtm, options.grid_tolerance).map_err(|mismatch| {
        PipelineError::GridMismatch {
            key: key.clone(),
            mismatch,
        }
    })?;

    let sentinel = options.nodata as f32;
    let mut nodata_pixels = 0;

    // The output inherits the DTM's grid and spatial reference
    let mut raster = dtm.clone();
    raster.set_nodata(Some(options.nodata));

    for ((out, &surface), &terrain) in raster.data_mut().iter_mut().zip(dsm.data()).zip(dtm.data()) {
        if dsm.is_nodata(surface) || dtm.is_nodata(terrain) || surface.is_nan() || terrain.is_nan() {
            nodata_pixels += 1;
            *out = sentinel;
        } else {
            *out = (surface as f64 - terrain as f64) as f32;
        }
    }

    Ok(HeightRaster {
        raster,
        nodata_pixels,
    })
}

/// Loads DSM/DTM pairs from disk and differences them.
#[derive(Debug, Clone, Default)]
pub struct DifferenceComputer {
    options: DifferenceOptions,
}

impl DifferenceComputer {
    /// Create a computer with the given options.
    pub fn new(options: DifferenceOptions) -> Self {
        Self { options }
    }

    /// Read both rasters and compute their difference.
    ///
    /// Both inputs are dropped once the height raster is built.
    pub fn compute(&self, key: &RasterPairKey, dsm_path: &Path, dtm_path: &Path) -> Result<HeightRaster> {
        let read = |path: &Path| {
            Raster::from_file(path).map_err(|source| PipelineError::Read {
                key: key.clone(),
                path: path.to_path_buf(),
                source,
            })
        };

        let dsm = read(dsm_path)?;
        let dtm = read(dtm_path)?;
        let height = compute_difference(key, &dsm, &dtm, &self.options)?;

        debug!(
            %key,
            nodata_pixels = height.nodata_pixels(),
            "Computed height raster"
        );
        Ok(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chm_raster::GeoTransform;

    fn raster(values: Vec<f32>, nodata: Option<f64>) -> Raster {
        Raster::new(3, 2, GeoTransform::north_up(100.0, 50.0, 1.0, 1.0), nodata, values).unwrap()
    }

    #[test]
    fn test_constant_difference() {
        let dsm = raster(vec![100.0; 6], None);
        let dtm = raster(vec![20.0; 6], None);
        let height =
            compute_difference(&RasterPairKey::WholeArea, &dsm, &dtm, &DifferenceOptions::default())
                .unwrap();
        assert!(height.raster().data().iter().all(|&v| v == 80.0));
        assert_eq!(height.nodata_pixels(), 0);
        assert_eq!(height.raster().nodata(), Some(DEFAULT_NODATA));
    }

    #[test]
    fn test_pixelwise_difference() {
        let dsm = raster(vec![10.0, 11.5, 12.0, 13.0, 14.0, 15.25], None);
        let dtm = raster(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], None);
        let height =
            compute_difference(&RasterPairKey::WholeArea, &dsm, &dtm, &DifferenceOptions::default())
                .unwrap();
        assert_eq!(height.raster().data(), &[9.0, 9.5, 9.0, 9.0, 9.0, 9.25]);
    }

    #[test]
    fn test_nodata_in_either_input() {
        let dsm = raster(vec![-1.0, 30.0, 30.0, 30.0, 30.0, 30.0], Some(-1.0));
        let dtm = raster(vec![10.0, 10.0, -32768.0, 10.0, 10.0, 10.0], Some(-32768.0));
        let options = DifferenceOptions {
            nodata: -9999.0,
            ..DifferenceOptions::default()
        };
        let height = compute_difference(&RasterPairKey::WholeArea, &dsm, &dtm, &options).unwrap();
        assert_eq!(
            height.raster().data(),
            &[-9999.0, 20.0, -9999.0, 20.0, 20.0, 20.0]
        );
        assert_eq!(height.nodata_pixels(), 2);
    }

    #[test]
    fn test_dsm_without_nodata_dtm_with_nodata() {
        let dsm = raster(vec![50.0; 6], None);
        let mut values = vec![5.0; 6];
        values[4] = -9999.0;
        let dtm = raster(values, Some(-9999.0));
        let height =
            compute_difference(&RasterPairKey::WholeArea, &dsm, &dtm, &DifferenceOptions::default())
                .unwrap();
        let data = height.raster().data();
        assert_eq!(data[4], -9999.0);
        assert!(data.iter().enumerate().all(|(i, &v)| i == 4 || v == 45.0));
    }

    #[test]
    fn test_nan_pixels_become_nodata() {
        let dsm = raster(vec![f32::NAN, 2.0, 2.0, 2.0, 2.0, 2.0], None);
        let dtm = raster(vec![1.0; 6], None);
        let height =
            compute_difference(&RasterPairKey::WholeArea, &dsm, &dtm, &DifferenceOptions::default())
                .unwrap();
        assert_eq!(height.raster().data()[0], -9999.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let dsm = raster(vec![1.0; 6], None);
        let dtm = Raster::new(2, 3, dsm.geotransform(), None, vec![1.0; 6]).unwrap();
        let err =
            compute_difference(&RasterPairKey::WholeArea, &dsm, &dtm, &DifferenceOptions::default())
                .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::GridMismatch {
                mismatch: GridMismatch::Dimensions { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_geotransform_mismatch() {
        let dsm = raster(vec![1.0; 6], None);
        let shifted = Raster::new(
            3,
            2,
            GeoTransform::north_up(100.5, 50.0, 1.0, 1.0),
            None,
            vec![1.0; 6],
        )
        .unwrap();
        let err = compute_difference(
            &RasterPairKey::WholeArea,
            &dsm,
            &shifted,
            &DifferenceOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::GridMismatch {
                mismatch: GridMismatch::GeoTransform { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_geotransform_within_tolerance() {
        let dsm = raster(vec![3.0; 6], None);
        let nudged = Raster::new(
            3,
            2,
            GeoTransform::north_up(100.0 + 1e-9, 50.0, 1.0, 1.0),
            None,
            vec![1.0; 6],
        )
        .unwrap();
        assert!(compute_difference(
            &RasterPairKey::WholeArea,
            &dsm,
            &nudged,
            &DifferenceOptions::default()
        )
        .is_ok());
    }
}
