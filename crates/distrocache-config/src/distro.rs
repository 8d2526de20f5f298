use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

pub const DEFAULT_DISTRO_REPOSITORY: &str = "https://github.com/ros/rosdistro";
pub const DEFAULT_DISTRIBUTION_FILE: &str = "{distribution}/distribution.yaml";

/// Where distribution manifests come from
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DistroSettings {
    /// URL of the rosdistro-style repository holding the manifests.
    /// Default: https://github.com/ros/rosdistro
    pub repository: String,

    /// Source-control kind of the distro repository.
    /// Default: "git"
    #[serde(rename = "type")]
    pub kind: Option<String>,

    /// Path of a distribution's manifest inside the distro repository.
    /// `{distribution}` is replaced by the requested distribution name.
    /// Default: "{distribution}/distribution.yaml"
    pub distribution_file: Option<String>,

    /// Distributions that may be requested. Empty allows any.
    pub distributions: Option<Vec<String>>,

    /// Refs of the distro repository that are always treated as branches,
    /// skipping the tag-or-branch lookup.
    pub branches: Option<Vec<String>>,
}

impl Default for DistroSettings {
    fn default() -> Self {
        Self {
            repository: DEFAULT_DISTRO_REPOSITORY.to_string(),
            kind: Some("git".to_string()),
            distribution_file: Some(DEFAULT_DISTRIBUTION_FILE.to_string()),
            distributions: None,
            branches: None,
        }
    }
}

impl DistroSettings {
    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or("git")
    }

    /// Path of the manifest for `distribution` inside the distro repository.
    pub fn distribution_file(&self, distribution: &str) -> String {
        self.distribution_file
            .as_deref()
            .unwrap_or(DEFAULT_DISTRIBUTION_FILE)
            .replace("{distribution}", distribution)
    }

    pub fn is_allowed(&self, distribution: &str) -> bool {
        match &self.distributions {
            Some(list) if !list.is_empty() => list.iter().any(|d| d == distribution),
            _ => true,
        }
    }

    pub fn is_branch(&self, reference: &str) -> bool {
        self.branches
            .as_ref()
            .is_some_and(|branches| branches.iter().any(|b| b == reference))
    }

    pub(crate) fn resolve(&mut self) -> Result<()> {
        if self.repository.trim().is_empty() {
            return Err(ConfigError::MissingRepository);
        }
        self.kind.get_or_insert_with(|| "git".to_string());

        let template = self
            .distribution_file
            .get_or_insert_with(|| DEFAULT_DISTRIBUTION_FILE.to_string());
        if !template.contains("{distribution}") {
            return Err(ConfigError::InvalidDistributionFile(template.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_file_template() {
        let settings = DistroSettings::default();
        assert_eq!(
            settings.distribution_file("humble"),
            "humble/distribution.yaml"
        );
    }

    #[test]
    fn test_allow_list() {
        let mut settings = DistroSettings::default();
        assert!(settings.is_allowed("anything"));

        settings.distributions = Some(vec!["noetic".into(), "humble".into()]);
        assert!(settings.is_allowed("humble"));
        assert!(!settings.is_allowed("melodic"));
    }

    #[test]
    fn test_resolve_rejects_template_without_placeholder() {
        let mut settings = DistroSettings {
            distribution_file: Some("distribution.yaml".into()),
            ..Default::default()
        };
        assert!(matches!(
            settings.resolve(),
            Err(ConfigError::InvalidDistributionFile(_))
        ));
    }

    #[test]
    fn test_resolve_rejects_empty_repository() {
        let mut settings = DistroSettings {
            repository: "  ".into(),
            ..Default::default()
        };
        assert!(matches!(
            settings.resolve(),
            Err(ConfigError::MissingRepository)
        ));
    }
}
