//! Pipeline configuration.

use crate::features::{FeatureSource, ShapefileFeatures, StaticFeatures};
use crate::key::validate_component;
use crate::{FeatureKey, PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default DSM file name (or per-feature suffix).
pub const DEFAULT_DSM_PATTERN: &str = "dsm.max.tif";

/// Default DTM file name (or per-feature suffix).
pub const DEFAULT_DTM_PATTERN: &str = "dtm.idw.tif";

/// Default output file name.
pub const DEFAULT_OUTPUT_NAME: &str = "chm.tif";

/// Default no-data sentinel written to height rasters.
pub const DEFAULT_NODATA: f64 = -9999.0;

/// Default tolerance on geotransform coefficients when checking co-registration.
pub const DEFAULT_GRID_TOLERANCE: f64 = 1e-6;

/// What to do when a single pair fails to resolve, compute or write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the run at the first failure. A partial mosaic is worse than none.
    #[default]
    Abort,
    /// Log and skip the failing pair, merging whatever succeeded.
    Skip,
}

/// Where feature identifiers come from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSelection {
    /// No features: process the single whole-area pair.
    #[default]
    None,
    /// Features of a site shapefile.
    Shapefile(PathBuf),
    /// An explicit list of feature keys.
    Keys(Vec<FeatureKey>),
}

impl FeatureSelection {
    /// Enumerate the selected feature keys (empty for [`FeatureSelection::None`]).
    pub fn feature_keys(&self) -> Result<Vec<FeatureKey>> {
        match self {
            FeatureSelection::None => Ok(Vec::new()),
            FeatureSelection::Shapefile(path) => ShapefileFeatures::new(path).feature_keys(),
            FeatureSelection::Keys(keys) => StaticFeatures::new(keys.clone()).feature_keys(),
        }
    }
}

/// Everything a pipeline run needs. No process-wide state is consulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the input DEMs; outputs are written here too.
    pub dem_dir: PathBuf,
    /// DSM file name, or per-feature suffix.
    pub dsm_pattern: String,
    /// DTM file name, or per-feature suffix.
    pub dtm_pattern: String,
    /// Output file name, or per-feature suffix.
    pub output_name: String,
    /// Feature identifiers to process.
    pub features: FeatureSelection,
    /// Whether to request a hillshade of the merged result.
    pub hillshade: bool,
    /// Per-pair failure handling.
    pub failure_policy: FailurePolicy,
    /// No-data sentinel written to height rasters.
    pub nodata: f64,
    /// Maximum absolute difference between DSM and DTM geotransform coefficients.
    pub grid_tolerance: f64,
    /// Worker threads for the computing stage (0 = one per CPU).
    pub jobs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dem_dir: PathBuf::from("."),
            dsm_pattern: DEFAULT_DSM_PATTERN.to_string(),
            dtm_pattern: DEFAULT_DTM_PATTERN.to_string(),
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
            features: FeatureSelection::None,
            hillshade: false,
            failure_policy: FailurePolicy::Abort,
            nodata: DEFAULT_NODATA,
            grid_tolerance: DEFAULT_GRID_TOLERANCE,
            jobs: 0,
        }
    }
}

impl PipelineConfig {
    /// Default configuration for a DEM directory.
    pub fn new<P: AsRef<Path>>(dem_dir: P) -> Self {
        Self {
            dem_dir: dem_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Load a configuration from a YAML file. Missing fields take defaults.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse a configuration from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Check that names are plain file names and numeric settings are usable.
    pub fn validate(&self) -> Result<()> {
        validate_component(&self.dsm_pattern)?;
        validate_component(&self.dtm_pattern)?;
        validate_component(&self.output_name)?;

        if self.dsm_pattern == self.output_name || self.dtm_pattern == self.output_name {
            return Err(PipelineError::Config(format!(
                "output name {:?} would overwrite an input",
                self.output_name
            )));
        }
        if !self.nodata.is_finite() {
            return Err(PipelineError::Config(format!(
                "nodata must be finite, got {}",
                self.nodata
            )));
        }
        if self.grid_tolerance.is_nan() || self.grid_tolerance < 0.0 {
            return Err(PipelineError::Config(format!(
                "grid tolerance must be non-negative, got {}",
                self.grid_tolerance
            )));
        }
        Ok(())
    }
}
