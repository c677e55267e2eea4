//! # chm-pipeline
//!
//! Canopy height models from co-registered surface and terrain rasters.
//!
//! A run resolves one DSM/DTM pair per feature (or a single whole-area pair),
//! writes DSM minus DTM for each, merges the outputs into a GDAL virtual
//! mosaic and optionally hands the result to an external hillshade tool.
//!
//! ## Example
//!
//! ```no_run
//! use chm_pipeline::{Pipeline, PipelineConfig};
//!
//! let mut config = PipelineConfig::new("data/site-42");
//! config.hillshade = true;
//!
//! let result = Pipeline::new(config).run()?;
//! for output in &result.outputs {
//!     println!("{} -> {}", output.key, output.path.display());
//! }
//! # Ok::<(), chm_pipeline::PipelineError>(())
//! ```

pub mod config;
pub mod difference;
mod error;
pub mod features;
pub mod hillshade;
mod key;
pub mod metric_defs;
pub mod mosaic;
pub mod orchestrator;
pub mod paths;
pub mod resolver;
mod result;

pub use config::{FailurePolicy, FeatureSelection, PipelineConfig};
pub use difference::{compute_difference, DifferenceComputer, DifferenceOptions, HeightRaster};
pub use error::{GridMismatch, HillshadeError, MergeError, PipelineError};
pub use features::{FeatureSource, ShapefileFeatures, StaticFeatures};
pub use hillshade::{GdalDemHillshade, HillshadeGenerator};
pub use key::{FeatureKey, RasterPairKey};
pub use mosaic::{MosaicMerger, VirtualMosaic};
pub use orchestrator::{Pipeline, PipelineState};
pub use resolver::{PairResolver, RasterPair, Resolution, SkippedPair};
pub use result::{PairOutput, PipelineResult};

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
