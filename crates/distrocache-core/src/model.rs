//! Repository states, sets and the snapshot document served to clients.

use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One `(name, type, url, ref)` line of a distribution manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    /// Branch, tag or commit hash as written in the manifest.
    #[serde(rename = "version")]
    pub reference: String,
}

impl ManifestEntry {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        url: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            url: url.into(),
            reference: reference.into(),
        }
    }
}

/// The tuple that identifies a repository state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoKey {
    pub name: String,
    pub kind: String,
    pub url: String,
    pub version: String,
}

impl RepoKey {
    pub fn new(entry: &ManifestEntry, version: impl Into<String>) -> Self {
        Self {
            name: entry.name.clone(),
            kind: entry.kind.clone(),
            url: entry.url.clone(),
            version: version.into(),
        }
    }
}

/// A package found inside a repository.
///
/// Fields not listed here are carried through untouched in `extra`, so
/// descriptors produced by external discovery programs survive a round trip
/// through the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Location of the package relative to the repository root.
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Dependency names keyed by category (`build`, `run`, `test`).
    #[serde(default)]
    pub depends: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A repository at one immutable version. Never modified once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoState {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub version: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub package_descriptors: Vec<PackageDescriptor>,
}

impl RepoState {
    pub fn key(&self) -> RepoKey {
        RepoKey {
            name: self.name.clone(),
            kind: self.kind.clone(),
            url: self.url.clone(),
            version: self.version.clone(),
        }
    }
}

/// Identity and freshness of a named set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetInfo {
    pub distribution: String,
    pub name: String,
    /// `None` for frozen sets; otherwise when the floating name was last resolved.
    pub last_updated: Option<DateTime<Utc>>,
}

impl SetInfo {
    pub fn is_frozen(&self) -> bool {
        self.last_updated.is_none()
    }

    /// Whether a floating set should be resolved again. `interval` of `None`
    /// disables refreshing; a zero interval refreshes on every request.
    pub fn is_stale(&self, interval: Option<Duration>, now: DateTime<Utc>) -> bool {
        let (Some(updated), Some(interval)) = (self.last_updated, interval) else {
            return false;
        };
        match chrono::Duration::from_std(interval) {
            Ok(interval) => now - updated >= interval,
            Err(_) => false,
        }
    }
}

/// Strips a leading `refs/` so `refs/heads/x` and `heads/x` name the same set.
pub fn set_name(set_ref: &str) -> &str {
    set_ref.strip_prefix("refs/").unwrap_or(set_ref)
}

/// A request to materialise one set from manifest entries.
#[derive(Debug, Clone)]
pub struct SetRequest {
    pub distribution: String,
    pub name: String,
    /// The set name follows a moving target and should carry a timestamp.
    pub floating: bool,
    pub entries: Vec<ManifestEntry>,
}

/// The resolved response document: a set plus its member repository states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub set: SetInfo,
    pub repo_states: Vec<RepoState>,
}

impl Snapshot {
    /// Keeps only the listed metadata keys on repositories and packages.
    pub fn with_metadata(mut self, inclusions: &[String]) -> Self {
        let keep = |metadata: &mut Map<String, Value>| {
            metadata.retain(|key, _| inclusions.iter().any(|k| k == key));
        };
        for state in &mut self.repo_states {
            keep(&mut state.metadata);
            for package in &mut state.package_descriptors {
                keep(&mut package.metadata);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn state(metadata: Value) -> RepoState {
        RepoState {
            name: "pkgA".into(),
            kind: "git".into(),
            url: "https://x/a".into(),
            version: "abc123".into(),
            metadata: metadata.as_object().cloned().unwrap_or_default(),
            package_descriptors: vec![],
        }
    }

    #[test]
    fn test_staleness() {
        let updated = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let floating = SetInfo {
            distribution: "humble".into(),
            name: "heads/humble".into(),
            last_updated: Some(updated),
        };
        let later = updated + chrono::Duration::minutes(10);

        assert!(floating.is_stale(Some(Duration::from_secs(300)), later));
        assert!(!floating.is_stale(Some(Duration::from_secs(3600)), later));
        assert!(floating.is_stale(Some(Duration::ZERO), updated));
        assert!(!floating.is_stale(None, later));

        let frozen = SetInfo {
            last_updated: None,
            ..floating
        };
        assert!(frozen.is_frozen());
        assert!(!frozen.is_stale(Some(Duration::ZERO), later));
    }

    #[test]
    fn test_set_name() {
        assert_eq!(set_name("refs/heads/rolling"), "heads/rolling");
        assert_eq!(set_name("humble/2024-01-01"), "humble/2024-01-01");
    }

    #[test]
    fn test_with_metadata_filters_keys() {
        let snapshot = Snapshot {
            set: SetInfo {
                distribution: "humble".into(),
                name: "humble".into(),
                last_updated: None,
            },
            repo_states: vec![state(json!({"content_blake3": "ff", "file_count": 3}))],
        };

        let filtered = snapshot.clone().with_metadata(&["file_count".to_string()]);
        assert_eq!(
            Value::Object(filtered.repo_states[0].metadata.clone()),
            json!({"file_count": 3})
        );

        let bare = snapshot.with_metadata(&[]);
        assert!(bare.repo_states[0].metadata.is_empty());
    }

    #[test]
    fn test_descriptor_passthrough() {
        let raw = json!({
            "name": "rclcpp",
            "type": "ros.ament_cmake",
            "path": "rclcpp",
            "depends": {"build": ["rcl"], "run": ["rcl"]},
            "maintainers": ["someone"]
        });
        let descriptor: PackageDescriptor = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(descriptor.depends["build"], vec!["rcl"]);
        assert_eq!(descriptor.extra["maintainers"], json!(["someone"]));
        assert_eq!(serde_json::to_value(&descriptor).unwrap(), raw);
    }

    #[test]
    fn test_document_shape() {
        let snapshot = Snapshot {
            set: SetInfo {
                distribution: "humble".into(),
                name: "humble".into(),
                last_updated: None,
            },
            repo_states: vec![state(json!({}))],
        };
        let doc = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(doc["set"]["last_updated"], Value::Null);
        assert_eq!(doc["repo_states"][0]["type"], "git");
        assert_eq!(doc["repo_states"][0]["package_descriptors"], json!([]));
    }
}
