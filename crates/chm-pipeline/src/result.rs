//! Results of a pipeline run.

use crate::resolver::SkippedPair;
use crate::RasterPairKey;
use serde::Serialize;
use std::path::PathBuf;

/// One written height raster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairOutput {
    /// Pair key.
    pub key: RasterPairKey,
    /// Written GeoTIFF.
    pub path: PathBuf,
}

/// Everything a completed run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineResult {
    /// Height rasters in key order.
    pub outputs: Vec<PairOutput>,
    /// Pairs left out under the skip policy, in key order.
    pub skipped: Vec<SkippedPair>,
    /// The mosaic, or the sole output when there was only one.
    pub merged: Option<PathBuf>,
    /// Hillshade of the merged result, when requested and successful.
    pub hillshade: Option<PathBuf>,
    /// Why the hillshade failed, when requested and unsuccessful.
    pub hillshade_error: Option<String>,
}

impl PipelineResult {
    /// Paths of the written height rasters, in key order.
    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.outputs.iter().map(|o| o.path.clone()).collect()
    }
}
