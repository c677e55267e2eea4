//! Command-line arguments.

use crate::RunnerError;
use chm_pipeline::{FailurePolicy, FeatureKey, FeatureSelection, PipelineConfig};
use clap::Parser;
use std::path::PathBuf;

/// Create a canopy height model (DSM - DTM) from a directory of DEMs.
///
/// Options left unset fall back to the `--config` file, then to built-in
/// defaults.
#[derive(Parser, Debug, Clone)]
#[command(name = "chm", version)]
pub struct Cli {
    /// Directory holding the DSM/DTM rasters; outputs are written here too
    pub demdir: PathBuf,

    /// Site shapefile; one DSM/DTM pair is processed per feature
    #[arg(short, long, conflicts_with = "features")]
    pub site: Option<PathBuf>,

    /// Explicit feature keys, comma separated, instead of a shapefile
    #[arg(long, value_delimiter = ',')]
    pub features: Vec<String>,

    /// DSM file name, or per-feature suffix [default: dsm.max.tif]
    #[arg(long)]
    pub dsm: Option<String>,

    /// DTM file name, or per-feature suffix [default: dtm.idw.tif]
    #[arg(long)]
    pub dtm: Option<String>,

    /// Output file name, or per-feature suffix [default: chm.tif]
    #[arg(long)]
    pub fout: Option<String>,

    /// Generate a hillshade of the merged result with gdaldem
    #[arg(long, default_value_t = false)]
    pub hillshade: bool,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Skip pairs that are missing or fail instead of aborting the run
    #[arg(long, default_value_t = false)]
    pub skip_missing: bool,

    /// Worker threads for differencing (0 = one per CPU)
    #[arg(long)]
    pub jobs: Option<usize>,

    /// No-data value written to height rasters
    #[arg(long, allow_negative_numbers = true)]
    pub nodata: Option<f64>,

    /// YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write a JSON report of the run to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl Cli {
    /// Build the pipeline configuration: config file first, flags on top.
    pub fn into_config(self) -> Result<PipelineConfig, RunnerError> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_yaml_file(path)?,
            None => PipelineConfig::default(),
        };

        config.dem_dir = self.demdir;
        if let Some(site) = self.site {
            config.features = FeatureSelection::Shapefile(site);
        } else if !self.features.is_empty() {
            let keys = self
                .features
                .into_iter()
                .map(FeatureKey::new)
                .collect::<Result<Vec<_>, _>>()?;
            config.features = FeatureSelection::Keys(keys);
        }

        if let Some(dsm) = self.dsm {
            config.dsm_pattern = dsm;
        }
        if let Some(dtm) = self.dtm {
            config.dtm_pattern = dtm;
        }
        if let Some(fout) = self.fout {
            config.output_name = fout;
        }
        if self.hillshade {
            config.hillshade = true;
        }
        if self.skip_missing {
            config.failure_policy = FailurePolicy::Skip;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(nodata) = self.nodata {
            config.nodata = nodata;
        }

        Ok(config)
    }
}
