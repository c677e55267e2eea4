//! JSON report of a run.

use crate::RunnerError;
use chm_pipeline::{PipelineConfig, PipelineResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// What a run was asked to do and what came of it.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Effective configuration.
    pub config: PipelineConfig,
    /// Result of a successful run.
    pub result: Option<PipelineResult>,
    /// Fatal error of a failed run.
    pub error: Option<String>,
}

impl RunReport {
    /// Write the report as pretty-printed JSON.
    pub fn write(&self, path: &Path) -> Result<(), RunnerError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| RunnerError::Report {
            path: path.to_path_buf(),
            source,
        })
    }
}
