use distrocache_utils::error::PathError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(distrocache_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(distrocache_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Invalid interval `{value}` for `{field}`")]
    #[diagnostic(
        code(distrocache_config::invalid_interval),
        help("Use a duration like `30s`, `5m`, `1h30m`, or one of `always`/`never`")
    )]
    InvalidInterval { field: &'static str, value: String },

    #[error("Distro repository URL is empty")]
    #[diagnostic(
        code(distrocache_config::missing_repository),
        help("Set `distro.repository` to the URL of your rosdistro repository")
    )]
    MissingRepository,

    #[error("Invalid distribution file template: {0}")]
    #[diagnostic(
        code(distrocache_config::invalid_distribution_file),
        help("The template must contain the `{{distribution}}` placeholder")
    )]
    InvalidDistributionFile(String),

    #[error("Discovery backend `command` requires a program to run")]
    #[diagnostic(
        code(distrocache_config::missing_discovery_command),
        help("Set `discovery.command` to the program and arguments to run")
    )]
    MissingDiscoveryCommand,

    #[error("Unknown repository augmenter: {0}")]
    #[diagnostic(
        code(distrocache_config::unknown_augmenter),
        help("Available augmenters: content_digest")
    )]
    UnknownAugmenter(String),

    #[error("`fetch_concurrency` must be greater than zero")]
    #[diagnostic(code(distrocache_config::invalid_concurrency))]
    InvalidConcurrency,

    #[error("IO error: {0}")]
    #[diagnostic(code(distrocache_config::io))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(distrocache_config::path))]
    Path(#[from] PathError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
