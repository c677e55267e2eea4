//! Sources of feature identifiers.
//!
//! Only identifiers are consumed from a site shapefile; geometry and
//! attributes are never read.

use crate::{FeatureKey, PipelineError, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Size of the shapefile main and index file headers in bytes.
const SHX_HEADER_LEN: u64 = 100;

/// Size of one shapefile index record (offset + content length, two i32s).
const SHX_RECORD_LEN: u64 = 8;

/// Something that can enumerate the features of a site.
pub trait FeatureSource {
    /// Feature keys in any order. Duplicates are an error.
    fn feature_keys(&self) -> Result<Vec<FeatureKey>>;
}

/// Features of an ESRI shapefile, keyed `feature-0` .. `feature-{n-1}`.
///
/// The record count is taken from the `.shx` index that accompanies every
/// shapefile: a 100-byte header followed by one 8-byte entry per record.
#[derive(Debug, Clone)]
pub struct ShapefileFeatures {
    path: PathBuf,
}

impl ShapefileFeatures {
    /// Create a source for the shapefile at `path` (`.shp` or `.shx`).
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the index file that is actually read.
    pub fn index_path(&self) -> PathBuf {
        self.path.with_extension("shx")
    }

    /// Number of records in the shapefile.
    pub fn record_count(&self) -> Result<usize> {
        let index = self.index_path();
        let len = std::fs::metadata(&index)
            .map_err(|e| PipelineError::FeatureSource {
                path: index.clone(),
                reason: e.to_string(),
            })?
            .len();

        if len < SHX_HEADER_LEN || (len - SHX_HEADER_LEN) % SHX_RECORD_LEN != 0 {
            return Err(PipelineError::FeatureSource {
                path: index,
                reason: format!("{} bytes is not a valid shapefile index length", len),
            });
        }

        Ok(((len - SHX_HEADER_LEN) / SHX_RECORD_LEN) as usize)
    }
}

impl FeatureSource for ShapefileFeatures {
    fn feature_keys(&self) -> Result<Vec<FeatureKey>> {
        let count = self.record_count()?;
        Ok((0..count).map(FeatureKey::indexed).collect())
    }
}

/// An explicit list of feature keys.
#[derive(Debug, Clone, Default)]
pub struct StaticFeatures {
    keys: Vec<FeatureKey>,
}

impl StaticFeatures {
    /// Wrap a list of already validated keys.
    pub fn new(keys: Vec<FeatureKey>) -> Self {
        Self { keys }
    }

    /// Validate and wrap a list of names.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = names
            .into_iter()
            .map(FeatureKey::new)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { keys })
    }
}

impl FeatureSource for StaticFeatures {
    fn feature_keys(&self) -> Result<Vec<FeatureKey>> {
        Ok(self.keys.clone())
    }
}

/// Sort keys into processing order, rejecting duplicates.
pub fn ordered_unique(keys: Vec<FeatureKey>) -> Result<Vec<FeatureKey>> {
    let mut seen = BTreeSet::new();
    for key in keys {
        if !seen.insert(key.clone()) {
            return Err(PipelineError::InvalidName {
                name: key.to_string(),
                reason: "feature key appears more than once",
            });
        }
    }
    Ok(seen.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_shx(dir: &Path, records: usize) -> PathBuf {
        let shp = dir.join("site.shp");
        let mut bytes = vec![0u8; SHX_HEADER_LEN as usize];
        // File code 9994, big-endian
        bytes[0..4].copy_from_slice(&9994i32.to_be_bytes());
        let words = (SHX_HEADER_LEN as usize + records * SHX_RECORD_LEN as usize) / 2;
        bytes[24..28].copy_from_slice(&(words as i32).to_be_bytes());
        bytes.extend(std::iter::repeat(0u8).take(records * SHX_RECORD_LEN as usize));
        std::fs::write(shp.with_extension("shx"), bytes).unwrap();
        shp
    }

    #[test]
    fn test_shapefile_record_count() {
        let dir = TempDir::new().unwrap();
        let shp = write_shx(dir.path(), 3);
        let source = ShapefileFeatures::new(&shp);
        assert_eq!(source.record_count().unwrap(), 3);

        let keys: Vec<String> = source
            .feature_keys()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(keys, vec!["feature-0", "feature-1", "feature-2"]);
    }

    #[test]
    fn test_shapefile_without_index_fails() {
        let dir = TempDir::new().unwrap();
        let source = ShapefileFeatures::new(dir.path().join("site.shp"));
        assert!(matches!(
            source.feature_keys(),
            Err(PipelineError::FeatureSource { .. })
        ));
    }

    #[test]
    fn test_truncated_index_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("site.shx"), vec![0u8; 104]).unwrap();
        let source = ShapefileFeatures::new(dir.path().join("site.shp"));
        assert!(source.record_count().is_err());
    }

    #[test]
    fn test_ordered_unique() {
        let keys = StaticFeatures::from_names(["b", "a", "c"])
            .unwrap()
            .feature_keys()
            .unwrap();
        let ordered = ordered_unique(keys).unwrap();
        let names: Vec<&str> = ordered.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let dup = StaticFeatures::from_names(["a", "a"]).unwrap().feature_keys().unwrap();
        assert!(ordered_unique(dup).is_err());
    }

    #[test]
    fn test_static_rejects_bad_names() {
        assert!(StaticFeatures::from_names(["ok", "../bad"]).is_err());
    }
}
