//! Session configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::challenge::DEFAULT_AUTH_REALM;
use crate::retry::BackoffStrategy;
use crate::{Result, SessionError};

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Route prepended to relative request URLs.
    pub app_route: Option<String>,
    /// Default request timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Default retry budget for requests sent without an explicit one.
    pub auto_retries: u32,
    /// Delay strategy between automatic retries.
    pub backoff: BackoffStrategy,
    /// Whether network metadata is handed to the telemetry sink.
    pub record_network_metadata: bool,
    /// Value of the analytics metadata header.
    pub analytics_metadata: Option<String>,
    /// Realm marker identifying challenges from the protected backend.
    pub auth_realm: String,
    /// Idle timeout of pooled connections.
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// User agent string.
    pub user_agent: String,
    /// Enable gzip compression.
    pub gzip: bool,
    /// Enable brotli compression.
    pub brotli: bool,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            app_route: None,
            timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
            auto_retries: 0,
            backoff: BackoffStrategy::None,
            record_network_metadata: false,
            analytics_metadata: None,
            auth_realm: DEFAULT_AUTH_REALM.to_string(),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 32,
            user_agent: format!("bluepic-session/{}", env!("CARGO_PKG_VERSION")),
            gzip: true,
            brotli: true,
            max_redirects: 10,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration builder.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Load overrides from `<PREFIX>_*` environment variables.
    ///
    /// Reads `APP_ROUTE`, `TIMEOUT_SECS`, `AUTO_RETRIES`, `RECORD_METADATA`
    /// and `AUTH_REALM`. Missing variables keep their defaults.
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_lookup(prefix, |key| env::var(key).ok())
    }

    fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}_{}", prefix, name));
        let mut config = Self::default();

        if let Some(route) = var("APP_ROUTE") {
            config.app_route = Some(route);
        }
        if let Some(secs) = var("TIMEOUT_SECS") {
            config.timeout = Duration::from_secs(parse_value("TIMEOUT_SECS", &secs)?);
        }
        if let Some(retries) = var("AUTO_RETRIES") {
            config.auto_retries = parse_value("AUTO_RETRIES", &retries)?;
        }
        if let Some(record) = var("RECORD_METADATA") {
            config.record_network_metadata = parse_value("RECORD_METADATA", &record)?;
        }
        if let Some(realm) = var("AUTH_REALM") {
            config.auth_realm = realm;
        }

        Ok(config)
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| SessionError::Config(format!("invalid value for {}: {:?}", name, raw)))
}

/// Builder for session configuration.
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Set the route prepended to relative URLs.
    pub fn app_route(mut self, route: impl Into<String>) -> Self {
        self.config.app_route = Some(route.into());
        self
    }

    /// Set the default request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the default retry budget.
    pub fn auto_retries(mut self, retries: u32) -> Self {
        self.config.auto_retries = retries;
        self
    }

    /// Set the backoff between retries.
    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Enable or disable network metadata recording.
    pub fn record_network_metadata(mut self, enable: bool) -> Self {
        self.config.record_network_metadata = enable;
        self
    }

    /// Set the analytics metadata header value.
    pub fn analytics_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.config.analytics_metadata = Some(metadata.into());
        self
    }

    /// Set the challenge realm marker.
    pub fn auth_realm(mut self, realm: impl Into<String>) -> Self {
        self.config.auth_realm = realm.into();
        self
    }

    /// Set the connection pool idle timeout.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum idle connections per host.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Enable or disable gzip compression.
    pub fn gzip(mut self, enable: bool) -> Self {
        self.config.gzip = enable;
        self
    }

    /// Enable or disable brotli compression.
    pub fn brotli(mut self, enable: bool) -> Self {
        self.config.brotli = enable;
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SessionConfig {
        self.config
    }
}
