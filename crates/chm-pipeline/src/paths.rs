//! File-name building for inputs, outputs and the mosaic.
//!
//! All names in a run are built here so every path is validated the same way
//! and distinct keys never collide in the output directory.

use crate::{RasterPairKey, Result};
use std::path::{Path, PathBuf};

/// Path of the DSM or DTM for `key`, given its file-name pattern.
pub fn input_path(dir: &Path, key: &RasterPairKey, pattern: &str) -> Result<PathBuf> {
    key.file_path(dir, pattern)
}

/// Path of the height raster written for `key`.
pub fn output_path(dir: &Path, key: &RasterPairKey, output_name: &str) -> Result<PathBuf> {
    key.file_path(dir, output_name)
}

/// Path of the merged result: `dir/{output_name}`, the whole-area output path.
///
/// In feature mode the virtual mosaic is written here under the output name
/// itself, whatever its extension.
pub fn mosaic_path(dir: &Path, output_name: &str) -> Result<PathBuf> {
    output_path(dir, &RasterPairKey::WholeArea, output_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FeatureKey;
    use std::collections::BTreeSet;

    #[test]
    fn test_output_paths_are_unique_per_key() {
        let dir = Path::new("/data/site");
        let keys = [
            RasterPairKey::WholeArea,
            RasterPairKey::Feature(FeatureKey::indexed(0)),
            RasterPairKey::Feature(FeatureKey::indexed(1)),
        ];
        let paths: Vec<PathBuf> = keys
            .iter()
            .map(|k| output_path(dir, k, "chm.tif").unwrap())
            .collect();
        let unique: BTreeSet<&PathBuf> = paths.iter().collect();
        assert_eq!(unique.len(), paths.len());
        assert_eq!(paths[1], PathBuf::from("/data/site/feature-0_chm.tif"));
    }

    #[test]
    fn test_input_path_rejects_traversal() {
        let dir = Path::new("/data/site");
        assert!(input_path(dir, &RasterPairKey::WholeArea, "../dsm.tif").is_err());
        assert!(input_path(dir, &RasterPairKey::WholeArea, "a/dsm.tif").is_err());
    }

    #[test]
    fn test_mosaic_path() {
        let dir = Path::new("dems");
        assert_eq!(mosaic_path(dir, "chm.tif").unwrap(), PathBuf::from("dems/chm.tif"));
        assert_eq!(
            mosaic_path(dir, "chm.tif").unwrap(),
            output_path(dir, &RasterPairKey::WholeArea, "chm.tif").unwrap()
        );
        assert!(mosaic_path(dir, "..").is_err());
    }
}
