//! Raster pair keys and validated file-name building.

use crate::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Identifier of one shapefile feature, usable as a file-name prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeatureKey(String);

impl FeatureKey {
    /// Validate and wrap a feature identifier.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_component(&name)?;
        Ok(FeatureKey(name))
    }

    /// Key for the `index`-th feature of a shapefile (`feature-{index}`).
    pub fn indexed(index: usize) -> Self {
        FeatureKey(format!("feature-{}", index))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FeatureKey {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self> {
        FeatureKey::new(value)
    }
}

impl From<FeatureKey> for String {
    fn from(key: FeatureKey) -> Self {
        key.0
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one DSM/DTM pair within a pipeline run.
///
/// Ordering is the deterministic processing and mosaic order: the whole-area
/// key first, then features lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterPairKey {
    /// The single pair used when no shapefile is given.
    WholeArea,
    /// A pair belonging to one shapefile feature.
    Feature(FeatureKey),
}

impl RasterPairKey {
    /// Build `dir/{name}` for the whole area or `dir/{key}_{name}` for a feature.
    ///
    /// `name` must be a plain file name; anything that could escape `dir` is
    /// rejected. Distinct keys always map to distinct paths.
    pub fn file_path(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        validate_component(name)?;
        Ok(match self {
            RasterPairKey::WholeArea => dir.join(name),
            RasterPairKey::Feature(key) => dir.join(format!("{}_{}", key, name)),
        })
    }
}

impl fmt::Display for RasterPairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RasterPairKey::WholeArea => f.write_str("whole-area"),
            RasterPairKey::Feature(key) => write!(f, "{}", key),
        }
    }
}

/// Reject anything that is not a single, plain path component.
pub(crate) fn validate_component(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name == "." || name == ".." {
        Some("must not be a relative directory reference")
    } else if name.contains(['/', '\\']) {
        Some("must not contain path separators")
    } else if name.contains('\0') {
        Some("must not contain NUL")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(PipelineError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
