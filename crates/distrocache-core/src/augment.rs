//! Repository-level metadata computed from an extracted tree.

use std::{path::Path, sync::Arc};

use distrocache_config::error::ConfigError;
use distrocache_utils::{error::HashError, hash::tree_digest};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum AugmentError {
    #[error(transparent)]
    Hash(#[from] HashError),

    #[error("{0}")]
    Other(String),
}

/// Adds fields to a repository state's metadata.
pub trait Augmenter: Send + Sync {
    fn name(&self) -> &'static str;

    fn augment(&self, root: &Path, metadata: &mut Map<String, Value>) -> Result<(), AugmentError>;
}

/// Records a digest over every file in the tree and the number of files.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentDigest;

impl Augmenter for ContentDigest {
    fn name(&self) -> &'static str {
        "content_digest"
    }

    fn augment(&self, root: &Path, metadata: &mut Map<String, Value>) -> Result<(), AugmentError> {
        let digest = tree_digest(root)?;
        metadata.insert("content_blake3".to_string(), Value::String(digest.hex));
        metadata.insert("file_count".to_string(), Value::from(digest.file_count));
        Ok(())
    }
}

/// Builds augmenters from their configured names, preserving order.
pub fn from_names(names: &[String]) -> Result<Vec<Arc<dyn Augmenter>>, ConfigError> {
    names
        .iter()
        .map(|name| {
            match name.as_str() {
                "content_digest" => Ok(Arc::new(ContentDigest) as Arc<dyn Augmenter>),
                other => Err(ConfigError::UnknownAugmenter(other.to_string())),
            }
        })
        .collect()
}

/// Runs each augmenter in order. A failing augmenter is logged and its
/// partial output discarded; the remaining ones still run.
pub fn run_augmenters(
    augmenters: &[Arc<dyn Augmenter>],
    root: &Path,
    repository: &str,
) -> Map<String, Value> {
    let mut metadata = Map::new();
    for augmenter in augmenters {
        let mut scratch = metadata.clone();
        match augmenter.augment(root, &mut scratch) {
            Ok(()) => {
                debug!(augmenter = augmenter.name(), repository, "augmented repository");
                metadata = scratch;
            }
            Err(err) => {
                warn!(
                    augmenter = augmenter.name(),
                    repository,
                    error = %err,
                    "repository augmenter failed, skipping"
                );
            }
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl Augmenter for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn augment(&self, _: &Path, metadata: &mut Map<String, Value>) -> Result<(), AugmentError> {
            metadata.insert("half_written".to_string(), Value::Bool(true));
            Err(AugmentError::Other("broken".to_string()))
        }
    }

    #[test]
    fn test_from_names() {
        let augmenters = from_names(&["content_digest".to_string()]).unwrap();
        assert_eq!(augmenters[0].name(), "content_digest");

        assert!(matches!(
            from_names(&["nope".to_string()]),
            Err(ConfigError::UnknownAugmenter(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_failing_augmenter_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.xml"), "<package/>").unwrap();
        std::fs::write(dir.path().join("README.md"), "hello").unwrap();

        let augmenters: Vec<Arc<dyn Augmenter>> = vec![Arc::new(Failing), Arc::new(ContentDigest)];
        let metadata = run_augmenters(&augmenters, dir.path(), "pkgA");

        assert!(!metadata.contains_key("half_written"));
        assert_eq!(metadata["file_count"], Value::from(2));
        assert_eq!(metadata["content_blake3"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn test_digest_tracks_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), "one").unwrap();
        let augmenters: Vec<Arc<dyn Augmenter>> = vec![Arc::new(ContentDigest)];

        let before = run_augmenters(&augmenters, dir.path(), "pkgA");
        std::fs::write(dir.path().join("a"), "two").unwrap();
        let after = run_augmenters(&augmenters, dir.path(), "pkgA");
        assert_ne!(before["content_blake3"], after["content_blake3"]);
    }
}
