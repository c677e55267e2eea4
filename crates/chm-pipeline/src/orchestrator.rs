//! Sequencing of a full canopy height run.
//!
//! ```text
//! Idle -> Resolving -> Computing -> Merging -> [Hillshading] -> Done
//!                                                       \-> Failed (from any state)
//! ```
//!
//! Pairs are independent and are computed on a rayon pool. Whatever order
//! they finish in, outputs are merged in key order so reruns produce the same
//! mosaic.

use crate::config::{FailurePolicy, PipelineConfig};
use crate::difference::{DifferenceComputer, DifferenceOptions};
use crate::features::ordered_unique;
use crate::hillshade::{GdalDemHillshade, HillshadeGenerator};
use crate::metric_defs::{PAIRS_COMPUTED, PAIRS_SKIPPED, PAIR_DURATION};
use crate::mosaic::MosaicMerger;
use crate::paths::{mosaic_path, output_path};
use crate::resolver::{PairResolver, RasterPair, SkippedPair};
use crate::result::{PairOutput, PipelineResult};
use crate::{PipelineError, Result};
use chm_raster::write_geotiff;
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Not started.
    Idle,
    /// Enumerating DSM/DTM pairs.
    Resolving,
    /// Differencing and writing pairs.
    Computing,
    /// Building the mosaic.
    Merging,
    /// Waiting on the hillshade tool.
    Hillshading,
    /// Finished successfully.
    Done,
    /// Stopped on a fatal error.
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Resolving => "resolving",
            PipelineState::Computing => "computing",
            PipelineState::Merging => "merging",
            PipelineState::Hillshading => "hillshading",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A configured canopy height run.
pub struct Pipeline {
    config: PipelineConfig,
    hillshade: Box<dyn HillshadeGenerator>,
    cancel: Arc<AtomicBool>,
    state: PipelineState,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a pipeline that uses `gdaldem` for hillshades.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            hillshade: Box::new(GdalDemHillshade::default()),
            cancel: Arc::new(AtomicBool::new(false)),
            state: PipelineState::Idle,
        }
    }

    /// Replace the hillshade collaborator.
    pub fn with_hillshade_generator<G>(mut self, generator: G) -> Self
    where
        G: HillshadeGenerator + 'static,
    {
        self.hillshade = Box::new(generator);
        self
    }

    /// Share a cancellation flag. Setting it stops the run before the next
    /// pair starts and before merging.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// The flag that cancels this pipeline.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current stage.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Execute the run to completion.
    ///
    /// Height rasters already written stay on disk whatever the outcome.
    /// A hillshade failure is recorded in the result, not returned.
    pub fn run(&mut self) -> Result<PipelineResult> {
        match self.execute() {
            Ok(result) => {
                self.transition(PipelineState::Done);
                Ok(result)
            }
            Err(err) => {
                error!(state = %self.state, "Pipeline failed: {}", err);
                self.transition(PipelineState::Failed);
                Err(err)
            }
        }
    }

    fn execute(&mut self) -> Result<PipelineResult> {
        self.config.validate()?;
        let policy = self.config.failure_policy;

        self.transition(PipelineState::Resolving);
        let features = ordered_unique(self.config.features.feature_keys()?)?;
        let resolver = PairResolver::new(
            &self.config.dem_dir,
            &self.config.dsm_pattern,
            &self.config.dtm_pattern,
        );
        let resolution = resolver.resolve(&features, policy)?;
        let mut skipped = resolution.skipped;
        metrics::counter!(PAIRS_SKIPPED).increment(skipped.len() as u64);
        info!(
            pairs = resolution.pairs.len(),
            skipped = skipped.len(),
            "Resolved DSM/DTM pairs"
        );

        self.transition(PipelineState::Computing);
        let outcomes = self.compute_all(&resolution.pairs)?;
        self.check_cancelled()?;

        let mut outputs = Vec::with_capacity(outcomes.len());
        for (pair, outcome) in resolution.pairs.iter().zip(outcomes) {
            match outcome {
                Some(Ok(path)) => outputs.push(PairOutput {
                    key: pair.key.clone(),
                    path,
                }),
                Some(Err(err)) if policy == FailurePolicy::Skip => {
                    warn!(key = %pair.key, "Skipping pair: {}", err);
                    metrics::counter!(PAIRS_SKIPPED).increment(1);
                    skipped.push(SkippedPair {
                        key: pair.key.clone(),
                        reason: err.to_string(),
                    });
                }
                Some(Err(err)) => return Err(err),
                // Halted after an earlier failure; that failure is reported instead
                None => {}
            }
        }
        outputs.sort_by(|a, b| a.key.cmp(&b.key));
        skipped.sort_by(|a, b| a.key.cmp(&b.key));

        self.check_cancelled()?;
        self.transition(PipelineState::Merging);
        let target = mosaic_path(&self.config.dem_dir, &self.config.output_name)?;
        let sources: Vec<PathBuf> = outputs.iter().map(|o| o.path.clone()).collect();
        let merged = MosaicMerger::new().merge(&sources, &target)?;

        let mut result = PipelineResult {
            outputs,
            skipped,
            merged: Some(merged),
            hillshade: None,
            hillshade_error: None,
        };

        if self.config.hillshade {
            self.transition(PipelineState::Hillshading);
            if let Some(merged) = result.merged.as_deref() {
                match self.hillshade.generate(merged) {
                    Ok(path) => result.hillshade = Some(path),
                    Err(err) => {
                        warn!("Hillshade failed: {}", err);
                        result.hillshade_error = Some(err.to_string());
                    }
                }
            }
        }

        Ok(result)
    }

    /// Compute every pair on a worker pool. Results line up with `pairs`;
    /// `None` marks a pair that was never started.
    fn compute_all(&self, pairs: &[RasterPair]) -> Result<Vec<Option<Result<PathBuf>>>> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if self.config.jobs > 0 {
            builder = builder.num_threads(self.config.jobs);
        }
        let pool = builder.build()?;
        debug!(threads = pool.current_num_threads(), "Started worker pool");

        let computer = DifferenceComputer::new(DifferenceOptions {
            nodata: self.config.nodata,
            grid_tolerance: self.config.grid_tolerance,
        });
        let abort_on_error = self.config.failure_policy == FailurePolicy::Abort;
        let halt = AtomicBool::new(false);
        let cancel = self.cancel.as_ref();
        let dem_dir = self.config.dem_dir.as_path();
        let output_name = self.config.output_name.as_str();

        let outcomes: Vec<Option<Result<PathBuf>>> = pool.install(|| {
            pairs
                .par_iter()
                .map(|pair| {
                    if cancel.load(Ordering::SeqCst) || halt.load(Ordering::SeqCst) {
                        debug!(key = %pair.key, "Not starting pair");
                        return None;
                    }
                    let outcome = process_pair(&computer, pair, dem_dir, output_name);
                    if outcome.is_err() && abort_on_error {
                        halt.store(true, Ordering::SeqCst);
                    }
                    Some(outcome)
                })
                .collect()
        });
        Ok(outcomes)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            warn!(state = %self.state, "Pipeline cancelled");
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = %self.state, to = %next, "Pipeline state change");
        self.state = next;
    }
}

/// Read, difference and write one pair.
fn process_pair(
    computer: &DifferenceComputer,
    pair: &RasterPair,
    dem_dir: &Path,
    output_name: &str,
) -> Result<PathBuf> {
    let started = Instant::now();
    let output = output_path(dem_dir, &pair.key, output_name)?;
    let height = computer.compute(&pair.key, &pair.dsm, &pair.dtm)?;

    write_geotiff(height.raster(), &output).map_err(|source| PipelineError::Write {
        key: pair.key.clone(),
        path: output.clone(),
        source,
    })?;

    metrics::histogram!(PAIR_DURATION).record(started.elapsed().as_secs_f64());
    metrics::counter!(PAIRS_COMPUTED).increment(1);
    info!(
        key = %pair.key,
        path = %output.display(),
        nodata_pixels = height.nodata_pixels(),
        "Wrote height raster"
    );
    Ok(output)
}
