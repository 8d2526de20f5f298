//! The process-wide HTTP agent used for archives, raw files and host APIs.

use std::{
    sync::{LazyLock, PoisonError, RwLock},
    time::Duration,
};

use ureq::{typestate::WithoutBody, Agent, RequestBuilder};

/// A header carrying a host access token, e.g. `("PRIVATE-TOKEN", token)`.
pub type AuthHeader = (&'static str, String);

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub user_agent: Option<String>,
    /// Applies to the whole request including the body, so it bounds
    /// archive downloads too.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: Some(concat!("distrocache/", env!("CARGO_PKG_VERSION")).into()),
            timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn build(&self) -> Agent {
        let mut config = Agent::config_builder().timeout_global(self.timeout);

        if let Some(user_agent) = &self.user_agent {
            config = config.user_agent(user_agent);
        }

        config.build().into()
    }
}

struct SharedClient {
    agent: Agent,
    config: ClientConfig,
}

static SHARED_CLIENT: LazyLock<RwLock<SharedClient>> = LazyLock::new(|| {
    let config = ClientConfig::default();
    RwLock::new(SharedClient {
        agent: config.build(),
        config,
    })
});

/// Starts a GET request on the shared agent, attaching `auth` when given.
pub fn get(url: &str, auth: Option<&AuthHeader>) -> RequestBuilder<WithoutBody> {
    let client = SHARED_CLIENT.read().unwrap_or_else(PoisonError::into_inner);
    let req = client.agent.get(url);
    match auth {
        Some((name, value)) => req.header(*name, value),
        None => req,
    }
}

/// Updates the shared HTTP client configuration and rebuilds the agent.
///
/// ```
/// use std::time::Duration;
/// use distrocache_fetch::http_client::configure_http_client;
///
/// configure_http_client(|cfg| {
///     cfg.user_agent = Some("my-mirror/1.0".to_string());
///     cfg.timeout = Some(Duration::from_secs(60));
/// });
/// ```
pub fn configure_http_client<F>(updater: F)
where
    F: FnOnce(&mut ClientConfig),
{
    let mut client = SHARED_CLIENT.write().unwrap_or_else(PoisonError::into_inner);
    let mut config = client.config.clone();
    updater(&mut config);
    client.agent = config.build();
    client.config = config;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert!(config
            .user_agent
            .as_deref()
            .is_some_and(|ua| ua.starts_with("distrocache/")));
        assert!(config.timeout.is_none());
    }

    #[test]
    fn test_configure_http_client() {
        configure_http_client(|cfg| {
            cfg.user_agent = Some("custom-agent/1.0".to_string());
            cfg.timeout = Some(Duration::from_secs(10));
        });

        let client = SHARED_CLIENT.read().unwrap();
        assert_eq!(client.config.user_agent.as_deref(), Some("custom-agent/1.0"));
        assert_eq!(client.config.timeout, Some(Duration::from_secs(10)));
    }
}
