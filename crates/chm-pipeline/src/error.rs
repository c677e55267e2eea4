//! Error types for the canopy height pipeline.

use crate::RasterPairKey;
use chm_raster::{GeoTransform, RasterError};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// How a DSM/DTM pair failed the co-registration check.
#[derive(Debug, Clone, PartialEq)]
pub enum GridMismatch {
    /// Width or height differ.
    Dimensions {
        /// DSM (width, height).
        dsm: (u32, u32),
        /// DTM (width, height).
        dtm: (u32, u32),
    },
    /// Geotransform coefficients differ by more than the tolerance.
    GeoTransform {
        /// DSM transform.
        dsm: GeoTransform,
        /// DTM transform.
        dtm: GeoTransform,
        /// Tolerance that was exceeded.
        tolerance: f64,
    },
}

impl fmt::Display for GridMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridMismatch::Dimensions { dsm, dtm } => write!(
                f,
                "DSM is {}x{} pixels but DTM is {}x{}",
                dsm.0, dsm.1, dtm.0, dtm.1
            ),
            GridMismatch::GeoTransform { dsm, dtm, tolerance } => write!(
                f,
                "geotransforms differ beyond {}: DSM {:?}, DTM {:?}",
                tolerance, dsm.0, dtm.0
            ),
        }
    }
}

/// Errors raised while building a virtual mosaic.
#[derive(Debug, Error)]
pub enum MergeError {
    /// No source rasters were supplied.
    #[error("no source rasters to merge")]
    NoSources,

    /// A source raster disappeared before the merge.
    #[error("mosaic source {0} does not exist")]
    MissingSource(PathBuf),

    /// A source raster header could not be read.
    #[error("cannot read mosaic source {path}: {source}")]
    Source {
        /// Source path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: RasterError,
    },

    /// Sources do not share a north-up grid that can be mosaicked without resampling.
    #[error("mosaic source {path} is incompatible: {reason}")]
    Incompatible {
        /// Offending source path.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// The mosaic document could not be written.
    #[error("cannot write mosaic {path}: {source}")]
    Write {
        /// Mosaic path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the external hillshade collaborator.
#[derive(Debug, Error)]
pub enum HillshadeError {
    /// The tool could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program name or path.
        program: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The tool ran but reported failure.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        /// Program name or path.
        program: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The tool succeeded but produced no output file.
    #[error("hillshade output {0} was not created")]
    MissingOutput(PathBuf),
}

/// Errors that can occur while running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A resolved DSM or DTM path does not exist.
    #[error("missing input for {key}: {} does not exist", path.display())]
    MissingInput {
        /// Pair key.
        key: RasterPairKey,
        /// Missing path.
        path: PathBuf,
    },

    /// DSM and DTM are not on the same pixel grid.
    #[error("grid mismatch for {key}: {mismatch}")]
    GridMismatch {
        /// Pair key.
        key: RasterPairKey,
        /// What differs.
        mismatch: GridMismatch,
    },

    /// An input raster could not be read.
    #[error("failed to read {} for {key}: {source}", path.display())]
    Read {
        /// Pair key.
        key: RasterPairKey,
        /// Input path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: RasterError,
    },

    /// A height raster could not be persisted.
    #[error("failed to write {} for {key}: {source}", path.display())]
    Write {
        /// Pair key.
        key: RasterPairKey,
        /// Output path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: RasterError,
    },

    /// The per-feature outputs could not be merged.
    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),

    /// A file-name component was rejected.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName {
        /// Rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Feature identifiers could not be obtained.
    #[error("cannot read features from {}: {reason}", path.display())]
    FeatureSource {
        /// Shapefile or index path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Configuration is invalid or unreadable.
    #[error("configuration error: {0}")]
    Config(String),

    /// The run was cancelled before completion.
    #[error("pipeline cancelled")]
    Cancelled,

    /// The worker pool could not be created.
    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl PipelineError {
    /// Key of the pair this error belongs to, if it is a per-pair error.
    pub fn key(&self) -> Option<&RasterPairKey> {
        match self {
            PipelineError::MissingInput { key, .. }
            | PipelineError::GridMismatch { key, .. }
            | PipelineError::Read { key, .. }
            | PipelineError::Write { key, .. } => Some(key),
            _ => None,
        }
    }
}
