//! Hillshade generation through an external DEM tool.
//!
//! The pipeline only knows the [`HillshadeGenerator`] trait; the default
//! implementation shells out to `gdaldem`. Tests substitute their own.

use crate::error::HillshadeError;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Default DEM processing program.
pub const DEFAULT_GDALDEM: &str = "gdaldem";

/// Produces a hillshade raster from a height raster or mosaic.
pub trait HillshadeGenerator: Send + Sync {
    /// Generate a hillshade of `input` and return the path of the result.
    fn generate(&self, input: &Path) -> Result<PathBuf, HillshadeError>;
}

/// Output path of the hillshade of `input`: `{stem}_hillshade.tif` next to it.
pub fn hillshade_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{}_hillshade.tif", stem))
}

/// Runs `gdaldem hillshade <input> <output>`.
#[derive(Debug, Clone)]
pub struct GdalDemHillshade {
    program: String,
}

impl Default for GdalDemHillshade {
    fn default() -> Self {
        Self::new(DEFAULT_GDALDEM)
    }
}

impl GdalDemHillshade {
    /// Use `program` (a name on `PATH` or a full path) instead of `gdaldem`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl HillshadeGenerator for GdalDemHillshade {
    fn generate(&self, input: &Path) -> Result<PathBuf, HillshadeError> {
        let output = hillshade_path(input);
        debug!(program = %self.program, input = %input.display(), output = %output.display(), "Running hillshade");

        let result = Command::new(&self.program)
            .arg("hillshade")
            .arg(input)
            .arg(&output)
            .output()
            .map_err(|source| HillshadeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(HillshadeError::Failed {
                program: self.program.clone(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        if !output.is_file() {
            return Err(HillshadeError::MissingOutput(output));
        }

        info!(path = %output.display(), "Wrote hillshade");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hillshade_path() {
        assert_eq!(
            hillshade_path(Path::new("/data/site/chm.vrt")),
            PathBuf::from("/data/site/chm_hillshade.tif")
        );
        assert_eq!(
            hillshade_path(Path::new("chm.tif")),
            PathBuf::from("chm_hillshade.tif")
        );
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let generator = GdalDemHillshade::new("chm-test-no-such-program");
        let err = generator.generate(Path::new("chm.tif")).unwrap_err();
        assert!(matches!(err, HillshadeError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program_is_failed_error() {
        // `false` ignores its arguments and exits 1
        let generator = GdalDemHillshade::new("false");
        let err = generator.generate(Path::new("chm.tif")).unwrap_err();
        assert!(matches!(err, HillshadeError::Failed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_success_without_output_is_reported() {
        let generator = GdalDemHillshade::new("true");
        let dir = tempfile::TempDir::new().unwrap();
        let err = generator.generate(&dir.path().join("chm.tif")).unwrap_err();
        assert!(matches!(err, HillshadeError::MissingOutput(_)));
    }
}
