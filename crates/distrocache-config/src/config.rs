use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use distrocache_utils::{
    path::{resolve_path, xdg_config_home, xdg_data_home},
    time::parse_interval,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    discovery::DiscoverySettings,
    distro::DistroSettings,
    error::{ConfigError, Result},
    http::HttpSettings,
};

/// Application's configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Path where the cache database is stored.
    /// Default: $XDG_DATA_HOME/distrocache/distro.db
    pub database_path: Option<String>,

    /// Parent directory for temporary extraction directories.
    /// Default: the system temporary directory
    pub work_dir: Option<String>,

    /// How long a set resolved from a branch stays fresh before it is
    /// re-resolved. Accepts a duration, "always" or "never".
    /// Default: "5m"
    pub refresh_interval: Option<String>,

    /// Maximum number of repository archives downloaded at once.
    /// Default: 8
    pub fetch_concurrency: Option<usize>,

    /// Repository metadata keys exposed in snapshot responses.
    /// Default: []
    pub metadata_inclusions: Option<Vec<String>>,

    #[serde(default)]
    pub distro: DistroSettings,

    #[serde(default)]
    pub discovery: DiscoverySettings,

    #[serde(default)]
    pub http: HttpSettings,
}

/// Location of the configuration file: `$DISTROCACHE_CONFIG`, else
/// `$XDG_CONFIG_HOME/distrocache/config.toml`.
pub fn default_config_path() -> PathBuf {
    match std::env::var("DISTROCACHE_CONFIG") {
        Ok(path_str) => PathBuf::from(path_str),
        Err(_) => xdg_config_home().join("distrocache").join("config.toml"),
    }
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            refresh_interval: Some("5m".to_string()),
            fetch_concurrency: Some(8),
            metadata_inclusions: Some(Vec::new()),
            ..Self::default()
        }
    }

    /// Loads the configuration from `path`, or from [`default_config_path`]
    /// when `None`. A missing file yields the default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

        let mut config = match fs::read_to_string(&config_path) {
            Ok(content) => {
                debug!(path = %config_path.display(), "loading configuration");
                toml::from_str(&content)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %config_path.display(), "no configuration file, using defaults");
                Self::default_config()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;

        Ok(config)
    }

    pub fn resolve(&mut self) -> Result<()> {
        let interval = self.refresh_interval.get_or_insert_with(|| "5m".to_string());
        if parse_refresh_interval(interval).is_none() {
            return Err(ConfigError::InvalidInterval {
                field: "refresh_interval",
                value: interval.clone(),
            });
        }

        if *self.fetch_concurrency.get_or_insert(8) == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        self.metadata_inclusions.get_or_insert_with(Vec::new);

        self.distro.resolve()?;
        self.discovery.resolve()?;
        self.http.resolve()?;

        Ok(())
    }

    pub fn get_database_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("DISTROCACHE_DB") {
            return Ok(resolve_path(&env_path)?);
        }
        if let Some(database_path) = &self.database_path {
            return Ok(resolve_path(database_path)?);
        }
        Ok(xdg_data_home().join("distrocache").join("distro.db"))
    }

    pub fn get_work_dir(&self) -> Result<PathBuf> {
        match &self.work_dir {
            Some(dir) => Ok(resolve_path(dir)?),
            None => Ok(std::env::temp_dir()),
        }
    }

    /// Staleness window for floating sets; `None` means never refresh.
    pub fn get_refresh_interval(&self) -> Option<Duration> {
        parse_refresh_interval(self.refresh_interval.as_deref().unwrap_or("5m"))
            .unwrap_or(Some(Duration::from_secs(300)))
    }

    pub fn get_fetch_concurrency(&self) -> usize {
        self.fetch_concurrency.unwrap_or(8).max(1)
    }

    pub fn get_metadata_inclusions(&self) -> Vec<String> {
        self.metadata_inclusions.clone().unwrap_or_default()
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// `Some(None)` for "never", `Some(Some(ZERO))` for "always", `None` if malformed.
fn parse_refresh_interval(value: &str) -> Option<Option<Duration>> {
    match value {
        "always" => Some(Some(Duration::ZERO)),
        "never" => Some(None),
        value => parse_interval(value).map(Some),
    }
}
