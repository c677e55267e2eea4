//! Command-line front end for the canopy height model pipeline.
//!
//! The binary parses [`Cli`], initialises logging, wires Ctrl-C to the
//! pipeline's cancellation flag and calls [`run`].

mod cli;
mod report;

pub use cli::Cli;
pub use report::RunReport;

use chm_pipeline::{Pipeline, PipelineError, PipelineResult};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Errors surfaced by the runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The pipeline failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The report could not be serialised.
    #[error("failed to serialise report: {0}")]
    Json(#[from] serde_json::Error),

    /// The report could not be written.
    #[error("failed to write report {}: {source}", path.display())]
    Report {
        /// Report path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The Ctrl-C handler could not be installed.
    #[error("failed to install interrupt handler: {0}")]
    Interrupt(#[from] ctrlc::Error),
}

/// Install a stderr subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed (tests, embedding)
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Set `cancel` when the process receives Ctrl-C.
///
/// Can only succeed once per process.
pub fn install_interrupt_handler(cancel: Arc<AtomicBool>) -> Result<(), RunnerError> {
    ctrlc::set_handler(move || {
        if !cancel.swap(true, Ordering::SeqCst) {
            warn!("Interrupted; finishing pairs in progress, no mosaic will be written");
        }
    })?;
    Ok(())
}

/// Run the pipeline described by `cli`.
///
/// When `--report` is given the report is written whether or not the run
/// succeeds. If the run failed, its error is returned even when the report
/// cannot be written.
pub fn run(cli: Cli, cancel: Arc<AtomicBool>) -> Result<PipelineResult, RunnerError> {
    let report_path = cli.report.clone();
    let config = cli.into_config()?;
    chm_pipeline::metric_defs::describe_metrics();

    info!(dem_dir = %config.dem_dir.display(), "Creating canopy height model");
    let started_at = Utc::now();
    let mut pipeline = Pipeline::new(config).with_cancel_flag(cancel);
    let outcome = pipeline.run();
    let finished_at = Utc::now();

    if let Some(path) = report_path {
        let (result, error) = match &outcome {
            Ok(result) => (Some(result.clone()), None),
            Err(err) => (None, Some(err.to_string())),
        };
        let report = RunReport {
            started_at,
            finished_at,
            config: pipeline.config().clone(),
            result,
            error,
        };
        match report.write(&path) {
            Ok(()) => info!(path = %path.display(), "Wrote run report"),
            Err(err) if outcome.is_err() => warn!("{}", err),
            Err(err) => return Err(err),
        }
    }

    let result = outcome?;
    summarize(&result);
    Ok(result)
}

fn summarize(result: &PipelineResult) {
    for output in &result.outputs {
        info!(key = %output.key, "Wrote {}", output.path.display());
    }
    for skipped in &result.skipped {
        warn!(key = %skipped.key, "Skipped: {}", skipped.reason);
    }
    if let Some(merged) = &result.merged {
        info!("Canopy height model: {}", merged.display());
    }
    if let Some(hillshade) = &result.hillshade {
        info!("Hillshade: {}", hillshade.display());
    }
    if let Some(err) = &result.hillshade_error {
        warn!("Hillshade not created: {}", err);
    }
}
