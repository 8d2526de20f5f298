//! Loading the list of repositories that make up a set.

use std::{collections::BTreeMap, sync::Arc};

use distrocache_config::distro::DistroSettings;
use distrocache_fetch::Fetcher;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    error::{DistroError, Result},
    model::{set_name, ManifestEntry},
};

/// The manifest of one set at one version of the distro repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Commit of the distro repository the entries were read from.
    pub version: String,
    /// The set reference names a branch, so the set will move.
    pub floating: bool,
    pub entries: Vec<ManifestEntry>,
}

/// Produces manifests for sets. Implementations may block.
pub trait ManifestSource: Send + Sync {
    fn load(&self, distribution: &str, set_ref: &str) -> Result<Manifest>;
}

/// Reads `distribution.yaml` files from a rosdistro-style repository.
pub struct RosDistroSource {
    fetcher: Arc<dyn Fetcher>,
    settings: DistroSettings,
}

impl RosDistroSource {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: DistroSettings) -> Self {
        Self { fetcher, settings }
    }
}

impl ManifestSource for RosDistroSource {
    fn load(&self, distribution: &str, set_ref: &str) -> Result<Manifest> {
        let reference = set_name(set_ref);
        let kind = self.settings.kind();
        let repository = &self.settings.repository;

        let resolved = self
            .fetcher
            .resolve_ref(kind, repository, reference)
            .map_err(|source| {
                DistroError::RefResolution {
                    url: repository.clone(),
                    reference: reference.to_string(),
                    source,
                }
            })?;

        let file = self.settings.distribution_file(distribution);
        debug!(
            distribution,
            reference,
            version = %resolved.version,
            file = %file,
            "loading distribution file"
        );
        let content = self
            .fetcher
            .get_file(kind, repository, &resolved.version, &file)
            .map_err(|source| {
                DistroError::Fetch {
                    name: file.clone(),
                    version: resolved.version.clone(),
                    source,
                }
            })?;

        Ok(Manifest {
            floating: resolved.is_floating() || self.settings.is_branch(reference),
            version: resolved.version,
            entries: parse_distribution(&content)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DistributionFile {
    #[serde(default)]
    repositories: BTreeMap<String, RepositoryEntry>,
}

#[derive(Debug, Deserialize)]
struct RepositoryEntry {
    source: Option<SourceEntry>,
}

#[derive(Debug, Deserialize)]
struct SourceEntry {
    #[serde(rename = "type")]
    kind: String,
    url: String,
    version: Option<String>,
}

/// Parses the `repositories` table of a distribution file into entries
/// ordered by repository name. Repositories without a source are skipped.
pub fn parse_distribution(content: &[u8]) -> Result<Vec<ManifestEntry>> {
    let file: DistributionFile =
        serde_yaml::from_slice(content).map_err(|e| DistroError::Manifest(e.to_string()))?;

    let mut entries = Vec::with_capacity(file.repositories.len());
    for (name, repository) in file.repositories {
        let Some(source) = repository.source else {
            continue;
        };
        let Some(version) = source.version else {
            warn!(repository = %name, "source has no version, skipping");
            continue;
        };
        entries.push(ManifestEntry {
            name,
            kind: source.kind,
            url: source.url,
            reference: version,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use distrocache_fetch::{
        error::Result as FetchResult, ExtractedTree, FetchError, RefTarget, ResolvedRef,
    };

    use super::*;

    const DISTRIBUTION: &str = r#"---
release_platforms:
  ubuntu: [jammy]
repositories:
  rclcpp:
    doc:
      type: git
      url: https://github.com/ros2/rclcpp.git
      version: humble
    source:
      type: git
      url: https://github.com/ros2/rclcpp.git
      version: humble
    status: maintained
  ament_cmake:
    source:
      type: git
      url: https://github.com/ament/ament_cmake.git
      version: 1.3.0
  release_only:
    release:
      url: https://github.com/ros2-gbp/release_only-release.git
type: distribution
version: 2
"#;

    const DISTRO_SHA: &str = "cccccccccccccccccccccccccccccccccccccccc";

    struct FakeDistroRepo {
        target: RefTarget,
        requested: Mutex<Vec<String>>,
    }

    impl Fetcher for FakeDistroRepo {
        fn resolve_ref(&self, _: &str, url: &str, reference: &str) -> FetchResult<ResolvedRef> {
            self.requested.lock().unwrap().push(reference.to_string());
            if reference == "missing" {
                return Err(FetchError::RefNotFound {
                    url: url.to_string(),
                    reference: reference.to_string(),
                });
            }
            Ok(ResolvedRef {
                version: DISTRO_SHA.to_string(),
                target: self.target,
            })
        }

        fn fetch(&self, _: &str, _: &str, _: &str) -> FetchResult<ExtractedTree> {
            unreachable!("manifests are read with get_file")
        }

        fn get_file(
            &self,
            _: &str,
            url: &str,
            version: &str,
            path: &str,
        ) -> FetchResult<Vec<u8>> {
            assert_eq!(version, DISTRO_SHA);
            match path {
                "humble/distribution.yaml" => Ok(DISTRIBUTION.as_bytes().to_vec()),
                _ => {
                    Err(FetchError::NotFound {
                        url: format!("{url}/{path}"),
                    })
                }
            }
        }
    }

    fn source(target: RefTarget) -> (Arc<FakeDistroRepo>, RosDistroSource) {
        let fake = Arc::new(FakeDistroRepo {
            target,
            requested: Mutex::new(Vec::new()),
        });
        let source = RosDistroSource::new(fake.clone(), DistroSettings::default());
        (fake, source)
    }

    #[test]
    fn test_parse_distribution() {
        let entries = parse_distribution(DISTRIBUTION.as_bytes()).unwrap();
        assert_eq!(
            entries,
            vec![
                ManifestEntry::new(
                    "ament_cmake",
                    "git",
                    "https://github.com/ament/ament_cmake.git",
                    "1.3.0"
                ),
                ManifestEntry::new(
                    "rclcpp",
                    "git",
                    "https://github.com/ros2/rclcpp.git",
                    "humble"
                ),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_distribution(b"repositories: [1, 2").unwrap_err();
        assert!(matches!(err, DistroError::Manifest(_)));
    }

    #[test]
    fn test_load_branch_is_floating() {
        let (fake, source) = source(RefTarget::Branch);
        let manifest = source.load("humble", "refs/heads/humble").unwrap();

        assert!(manifest.floating);
        assert_eq!(manifest.version, DISTRO_SHA);
        assert_eq!(manifest.entries.len(), 2);
        assert_eq!(*fake.requested.lock().unwrap(), ["heads/humble"]);
    }

    #[test]
    fn test_load_tag_is_frozen() {
        let (_, source) = source(RefTarget::Tag);
        let manifest = source.load("humble", "humble/2024-01-22").unwrap();
        assert!(!manifest.floating);
    }

    #[test]
    fn test_load_errors() {
        let (_, source) = source(RefTarget::Tag);
        let err = source.load("humble", "missing").unwrap_err();
        assert!(matches!(err, DistroError::RefResolution { .. }));
        assert!(err.is_not_found());

        let err = source.load("kinetic", "master").unwrap_err();
        assert!(matches!(err, DistroError::Fetch { .. }));
        assert!(err.is_not_found());
    }
}
