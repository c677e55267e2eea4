//! Resolution of DSM/DTM file pairs per feature.

use crate::config::FailurePolicy;
use crate::paths::input_path;
use crate::{FeatureKey, PipelineError, RasterPairKey, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A resolved DSM/DTM pair whose files exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPair {
    /// Pair key.
    pub key: RasterPairKey,
    /// DSM path.
    pub dsm: PathBuf,
    /// DTM path.
    pub dtm: PathBuf,
}

/// A pair left out of the run under [`FailurePolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPair {
    /// Pair key.
    pub key: RasterPairKey,
    /// Why it was skipped.
    pub reason: String,
}

/// Outcome of resolving every key of a run.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Pairs whose inputs exist, in key order.
    pub pairs: Vec<RasterPair>,
    /// Keys skipped because an input was missing, in key order.
    pub skipped: Vec<SkippedPair>,
}

/// Maps feature keys to DSM/DTM paths inside a DEM directory.
#[derive(Debug, Clone)]
pub struct PairResolver {
    directory: PathBuf,
    dsm_pattern: String,
    dtm_pattern: String,
}

impl PairResolver {
    /// Create a resolver for `directory` with the given file-name patterns.
    pub fn new<P: AsRef<Path>>(directory: P, dsm_pattern: &str, dtm_pattern: &str) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            dsm_pattern: dsm_pattern.to_string(),
            dtm_pattern: dtm_pattern.to_string(),
        }
    }

    /// Keys for a run: the whole-area key when `features` is empty, else one
    /// key per feature, sorted.
    pub fn keys_for(features: &[FeatureKey]) -> Vec<RasterPairKey> {
        if features.is_empty() {
            return vec![RasterPairKey::WholeArea];
        }
        let mut keys: Vec<RasterPairKey> =
            features.iter().cloned().map(RasterPairKey::Feature).collect();
        keys.sort();
        keys
    }

    /// Resolve the DSM/DTM paths of a single key, checking both exist.
    pub fn resolve_key(&self, key: &RasterPairKey) -> Result<RasterPair> {
        let dsm = input_path(&self.directory, key, &self.dsm_pattern)?;
        let dtm = input_path(&self.directory, key, &self.dtm_pattern)?;

        for path in [&dsm, &dtm] {
            if !path.is_file() {
                return Err(PipelineError::MissingInput {
                    key: key.clone(),
                    path: path.clone(),
                });
            }
        }

        debug!(%key, dsm = %dsm.display(), dtm = %dtm.display(), "Resolved pair");
        Ok(RasterPair {
            key: key.clone(),
            dsm,
            dtm,
        })
    }

    /// Resolve every pair of a run.
    ///
    /// Under [`FailurePolicy::Abort`] the first missing input (in key order)
    /// is returned as an error. Under [`FailurePolicy::Skip`] missing pairs are
    /// logged and recorded in [`Resolution::skipped`]. Invalid names are
    /// always fatal.
    pub fn resolve(&self, features: &[FeatureKey], policy: FailurePolicy) -> Result<Resolution> {
        let mut resolution = Resolution::default();

        for key in Self::keys_for(features) {
            match self.resolve_key(&key) {
                Ok(pair) => resolution.pairs.push(pair),
                Err(err @ PipelineError::MissingInput { .. }) if policy == FailurePolicy::Skip => {
                    warn!(%key, "Skipping pair: {}", err);
                    resolution.skipped.push(SkippedPair {
                        key,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        Ok(resolution)
    }
}
