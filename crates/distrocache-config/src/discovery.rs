use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

pub const KNOWN_AUGMENTERS: &[&str] = &["content_digest"];

/// How packages are discovered inside a fetched repository tree
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DiscoverySettings {
    /// Discovery backend: "package_xml" or "command"
    /// Default: "package_xml"
    pub backend: Option<DiscoveryBackend>,

    /// Program and arguments for the "command" backend. The tree path is
    /// appended as the final argument and the program must print a JSON array
    /// of package descriptors.
    pub command: Option<Vec<String>>,

    /// Repository augmenters run after discovery, in order.
    /// Default: ["content_digest"]
    pub augmenters: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryBackend {
    /// Walk the tree looking for package.xml manifests
    #[default]
    PackageXml,
    /// Delegate to an external program
    Command,
}

impl DiscoverySettings {
    pub fn backend(&self) -> DiscoveryBackend {
        self.backend.clone().unwrap_or_default()
    }

    pub fn augmenters(&self) -> Vec<String> {
        self.augmenters
            .clone()
            .unwrap_or_else(|| vec!["content_digest".to_string()])
    }

    pub(crate) fn resolve(&mut self) -> Result<()> {
        if self.backend() == DiscoveryBackend::Command
            && self.command.as_ref().is_none_or(|argv| argv.is_empty())
        {
            return Err(ConfigError::MissingDiscoveryCommand);
        }

        let augmenters = self
            .augmenters
            .get_or_insert_with(|| vec!["content_digest".to_string()]);
        if let Some(unknown) = augmenters
            .iter()
            .find(|name| !KNOWN_AUGMENTERS.contains(&name.as_str()))
        {
            return Err(ConfigError::UnknownAugmenter(unknown.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_backend_requires_program() {
        let mut settings = DiscoverySettings {
            backend: Some(DiscoveryBackend::Command),
            command: Some(vec![]),
            augmenters: None,
        };
        assert!(matches!(
            settings.resolve(),
            Err(ConfigError::MissingDiscoveryCommand)
        ));

        settings.command = Some(vec!["discover-packages".into()]);
        assert!(settings.resolve().is_ok());
    }

    #[test]
    fn test_unknown_augmenter() {
        let mut settings = DiscoverySettings {
            augmenters: Some(vec!["bogus".into()]),
            ..Default::default()
        };
        assert!(matches!(
            settings.resolve(),
            Err(ConfigError::UnknownAugmenter(name)) if name == "bogus"
        ));
    }

    #[test]
    fn test_defaults() {
        let settings = DiscoverySettings::default();
        assert_eq!(settings.backend(), DiscoveryBackend::PackageXml);
        assert_eq!(settings.augmenters(), vec!["content_digest".to_string()]);
    }
}
