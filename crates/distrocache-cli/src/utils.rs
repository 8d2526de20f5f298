use std::{
    fmt::Display,
    sync::{LazyLock, PoisonError, RwLock},
};

use clap::ValueEnum;
use distrocache_core::Snapshot;
use nu_ansi_term::Color;

use crate::error::{CliError, CliResult};

pub static COLOR: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(true));

pub fn set_color(enabled: bool) {
    *COLOR.write().unwrap_or_else(PoisonError::into_inner) = enabled;
}

pub struct Colored<T: Display>(pub Color, pub T);

impl<T: Display> Display for Colored<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let color = COLOR.read().unwrap_or_else(PoisonError::into_inner);
        if *color {
            write!(f, "{}", self.0.prefix())?;
            self.1.fmt(f)?;
            write!(f, "{}", self.0.suffix())
        } else {
            self.1.fmt(f)
        }
    }
}

/// Serialization of a snapshot document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

impl OutputFormat {
    /// Splits `name.json` or `name.yaml` into the name and its format.
    pub fn split_extension(path: &str) -> Option<(&str, Self)> {
        if let Some(name) = path.strip_suffix(".json") {
            Some((name, OutputFormat::Json))
        } else {
            path.strip_suffix(".yaml").map(|name| (name, OutputFormat::Yaml))
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Json => "application/json",
            OutputFormat::Yaml => "application/yaml",
        }
    }

    /// YAML is offered as a download; JSON is shown inline.
    pub fn content_disposition(self, filename: &str) -> String {
        match self {
            OutputFormat::Json => format!("inline; filename=\"{filename}\""),
            OutputFormat::Yaml => format!("attachment; filename=\"{filename}\""),
        }
    }

    pub fn render(self, snapshot: &Snapshot) -> CliResult<String> {
        match self {
            OutputFormat::Json => {
                serde_json::to_string_pretty(snapshot).map_err(|e| CliError::Encode(e.to_string()))
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(snapshot).map_err(|e| CliError::Encode(e.to_string()))
            }
        }
    }
}

/// Joins an error with all of its sources.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use distrocache_core::SetInfo;

    use super::*;

    #[test]
    fn test_split_extension() {
        assert_eq!(
            OutputFormat::split_extension("heads/rolling.yaml"),
            Some(("heads/rolling", OutputFormat::Yaml))
        );
        assert_eq!(
            OutputFormat::split_extension("2024-01-22.json"),
            Some(("2024-01-22", OutputFormat::Json))
        );
        assert_eq!(OutputFormat::split_extension("rolling.xml"), None);
        assert_eq!(OutputFormat::split_extension("rolling"), None);
    }

    #[test]
    fn test_render_document_shape() {
        let snapshot = Snapshot {
            set: SetInfo {
                distribution: "humble".into(),
                name: "tags/2024-01-22".into(),
                last_updated: None,
            },
            repo_states: vec![],
        };

        let json: serde_json::Value =
            serde_json::from_str(&OutputFormat::Json.render(&snapshot).unwrap()).unwrap();
        assert_eq!(json["set"]["name"], "tags/2024-01-22");
        assert!(json["set"]["last_updated"].is_null());
        assert!(json["repo_states"].as_array().unwrap().is_empty());

        let yaml = OutputFormat::Yaml.render(&snapshot).unwrap();
        assert!(yaml.contains("distribution: humble"));
    }

    #[test]
    fn test_error_chain() {
        let inner = std::io::Error::other("connection reset");
        let outer = CliError::Serve(inner);
        assert_eq!(error_chain(&outer), "HTTP server failed: connection reset");
    }
}
