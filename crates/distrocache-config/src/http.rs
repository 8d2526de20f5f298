use std::time::Duration;

use distrocache_utils::time::parse_interval;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Outbound HTTP settings
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct HttpSettings {
    /// User-Agent header sent with every request.
    /// Default: "distrocache/<version>"
    pub user_agent: Option<String>,

    /// Per-request timeout.
    /// Default: "5m"
    pub timeout: Option<String>,

    /// Resolve refs through the GitHub/GitLab REST APIs instead of
    /// `git ls-remote` where possible.
    /// Default: true
    pub use_host_api: Option<bool>,
}

impl HttpSettings {
    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("distrocache/{}", env!("CARGO_PKG_VERSION")))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
            .as_deref()
            .and_then(parse_interval)
            .unwrap_or(Duration::from_secs(300))
    }

    pub fn use_host_api(&self) -> bool {
        self.use_host_api.unwrap_or(true)
    }

    pub(crate) fn resolve(&mut self) -> Result<()> {
        if let Some(value) = &self.timeout {
            if parse_interval(value).is_none() {
                return Err(ConfigError::InvalidInterval {
                    field: "http.timeout",
                    value: value.clone(),
                });
            }
        }
        self.use_host_api.get_or_insert(true);
        Ok(())
    }
}
