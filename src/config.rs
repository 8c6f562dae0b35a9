//! Engine configuration: profile service location and timeout policy.
//! Supports defaults and overrides via environment variables.

use std::env;
use std::time::Duration;

use reqwest::Url;

use crate::error::{SessionError, SessionResult};

pub const ENV_PROFILE_URL: &str = "CLASSROOM_PROFILE_URL";
pub const ENV_PROFILE_PATH: &str = "CLASSROOM_PROFILE_PATH";
pub const ENV_SELECT_ROLE_PATH: &str = "CLASSROOM_SELECT_ROLE_PATH";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "CLASSROOM_REQUEST_TIMEOUT_MS";
pub const ENV_CREDENTIAL_TIMEOUT_MS: &str = "CLASSROOM_CREDENTIAL_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub profile_base_url: String,
    pub profile_path: String,
    pub select_role_path: String,
    /// Upper bound for every profile service request (each attempt, including the retry).
    pub request_timeout: Duration,
    pub credential_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile_base_url: "http://127.0.0.1:7880".to_string(),
            profile_path: "/profile".to_string(),
            select_role_path: "/select-role".to_string(),
            request_timeout: Duration::from_secs(10),
            credential_timeout: Duration::from_secs(10),
        }
    }
}

fn parse_millis_env(name: &str) -> SessionResult<Option<Duration>> {
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| SessionError::config(format!("{} must be a whole number of milliseconds, got '{}'", name, val))),
        Err(_) => Ok(None),
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl EngineConfig {
    pub fn with_base_url<S: Into<String>>(base: S) -> Self {
        Self { profile_base_url: base.into(), ..Self::default() }
    }

    /// Defaults overridden by `CLASSROOM_*` variables, then validated.
    pub fn from_env() -> SessionResult<Self> {
        let mut cfg = Self::default();
        if let Some(v) = non_empty_env(ENV_PROFILE_URL) { cfg.profile_base_url = v; }
        if let Some(v) = non_empty_env(ENV_PROFILE_PATH) { cfg.profile_path = v; }
        if let Some(v) = non_empty_env(ENV_SELECT_ROLE_PATH) { cfg.select_role_path = v; }
        if let Some(d) = parse_millis_env(ENV_REQUEST_TIMEOUT_MS)? { cfg.request_timeout = d; }
        if let Some(d) = parse_millis_env(ENV_CREDENTIAL_TIMEOUT_MS)? { cfg.credential_timeout = d; }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> SessionResult<()> {
        self.base_url()?;
        for p in [&self.profile_path, &self.select_role_path] {
            if !p.starts_with('/') {
                return Err(SessionError::config(format!("endpoint path '{}' must start with '/'", p)));
            }
        }
        if self.request_timeout.is_zero() || self.credential_timeout.is_zero() {
            return Err(SessionError::config("timeouts must be greater than zero"));
        }
        Ok(())
    }

    pub fn base_url(&self) -> SessionResult<Url> {
        let url = Url::parse(&self.profile_base_url)
            .map_err(|e| SessionError::config(format!("invalid profile service URL '{}': {}", self.profile_base_url, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(SessionError::config(format!("unsupported profile service scheme '{}'", other))),
        }
    }
}
