//! Connector configuration
//!
//! Read once at startup (usually from the environment) and handed to the
//! components by value. Nothing below this module looks up settings on its own.

use crate::error::ConnectorError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application name used as the client identity prefix
pub const DEFAULT_APP_NAME: &str = "COMFY_SERVERLESS";

/// Service address used when none is configured
pub const DEFAULT_SERVER_ADDRESS: &str = "localhost:7777";

/// Reference job graph used by the readiness probe
pub const DEFAULT_TEST_PAYLOAD: &str = "test_payload.json";

/// Connector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Prefix of the generated client identity
    pub app_name: String,
    /// Service `host:port`, without scheme
    pub server_address: String,
    /// Use `https`/`wss` instead of `http`/`ws`
    pub secure: bool,
    /// Readiness checks before giving up
    pub readiness_attempts: u32,
    /// Pause between readiness checks
    pub readiness_delay: Duration,
    /// Upper bound on waiting for a job's completion signal
    pub completion_timeout: Option<Duration>,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Reference job graph for the readiness probe
    pub test_payload: PathBuf,
}

impl ConnectorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configuration from process environment variables
    ///
    /// Recognized: `APP_NAME`, `COMFY_SERVER_ADDRESS`, `COMFY_SECURE`,
    /// `MAX_COMFY_START_ATTEMPTS`, `COMFY_START_ATTEMPTS_SLEEP`, `TEST_PAYLOAD`,
    /// `COMFY_COMPLETION_TIMEOUT`, `COMFY_REQUEST_TIMEOUT`. Durations are in
    /// seconds; a completion timeout of `0` disables the bound.
    pub fn from_env() -> Result<Self, ConnectorError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConnectorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(app_name) = lookup("APP_NAME") {
            config.app_name = app_name;
        }
        if let Some(address) = lookup("COMFY_SERVER_ADDRESS") {
            config.server_address = address;
        }
        if let Some(secure) = lookup("COMFY_SECURE") {
            config.secure = parse_flag("COMFY_SECURE", &secure)?;
        }
        if let Some(attempts) = lookup("MAX_COMFY_START_ATTEMPTS") {
            config.readiness_attempts = parse_value("MAX_COMFY_START_ATTEMPTS", &attempts)?;
        }
        if let Some(delay) = lookup("COMFY_START_ATTEMPTS_SLEEP") {
            config.readiness_delay = parse_seconds("COMFY_START_ATTEMPTS_SLEEP", &delay)?;
        }
        if let Some(path) = lookup("TEST_PAYLOAD") {
            config.test_payload = PathBuf::from(path);
        }
        if let Some(timeout) = lookup("COMFY_COMPLETION_TIMEOUT") {
            let timeout = parse_seconds("COMFY_COMPLETION_TIMEOUT", &timeout)?;
            config.completion_timeout = (!timeout.is_zero()).then_some(timeout);
        }
        if let Some(timeout) = lookup("COMFY_REQUEST_TIMEOUT") {
            config.request_timeout = parse_seconds("COMFY_REQUEST_TIMEOUT", &timeout)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the connector cannot work with
    pub fn validate(&self) -> Result<(), ConnectorError> {
        if self.server_address.trim().is_empty() {
            return Err(ConnectorError::Config("server address is empty".into()));
        }
        if self.server_address.contains("://") {
            return Err(ConnectorError::Config(format!(
                "server address '{}' must be host:port without a scheme",
                self.server_address
            )));
        }
        if self.readiness_attempts == 0 {
            return Err(ConnectorError::Config(
                "readiness attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Base URL for HTTP endpoints
    #[must_use]
    pub fn http_base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}", self.server_address)
    }

    /// Event stream URL scoped to one client identity
    #[must_use]
    pub fn ws_url(&self, client_id: &str) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}/ws?clientId={client_id}", self.server_address)
    }

    /// With server address
    #[inline]
    #[must_use]
    pub fn with_server_address(mut self, address: impl Into<String>) -> Self {
        self.server_address = address.into();
        self
    }

    /// With application name
    #[inline]
    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// With TLS on or off
    #[inline]
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// With readiness retry policy
    #[inline]
    #[must_use]
    pub fn with_readiness(mut self, attempts: u32, delay: Duration) -> Self {
        self.readiness_attempts = attempts;
        self.readiness_delay = delay;
        self
    }

    /// With completion timeout (`None` waits indefinitely)
    #[inline]
    #[must_use]
    pub fn with_completion_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.completion_timeout = timeout;
        self
    }

    /// With reference job graph path
    #[inline]
    #[must_use]
    pub fn with_test_payload(mut self, path: impl Into<PathBuf>) -> Self {
        self.test_payload = path.into();
        self
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            secure: false,
            readiness_attempts: 10,
            readiness_delay: Duration::from_secs(1),
            completion_timeout: Some(Duration::from_secs(600)),
            request_timeout: Duration::from_secs(30),
            test_payload: PathBuf::from(DEFAULT_TEST_PAYLOAD),
        }
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConnectorError> {
    raw.trim()
        .parse()
        .map_err(|_| ConnectorError::Config(format!("{key}: cannot parse '{raw}'")))
}

fn parse_seconds(key: &str, raw: &str) -> Result<Duration, ConnectorError> {
    let seconds: f64 = parse_value(key, raw)?;
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| ConnectorError::Config(format!("{key}: '{raw}' is not a valid duration")))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConnectorError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConnectorError::Config(format!("{key}: '{raw}' is not a boolean"))),
    }
}
