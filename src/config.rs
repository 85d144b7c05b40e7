//! Settings file support
//!
//! Parses the TOML settings file and applies environment variable overrides.

use crate::error::ConfigError;
use crate::fetch::{QuotaLimiter, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.company-information.service.gov.uk";

/// Environment variable for the registry API key
pub const ENV_API_KEY: &str = "REGISTRY_API_KEY";

/// Environment variable for the registry base url
pub const ENV_BASE_URL: &str = "REGISTRY_BASE_URL";

/// Environment variable for the database host
pub const ENV_DB_HOST: &str = "REGISTRY_DB_HOST";

/// Environment variable for the database password
pub const ENV_DB_PASSWORD: &str = "REGISTRY_DB_PASSWORD";

/// Registry API section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub base_url: String,
    pub api_key: Option<String>,
    /// File holding the API key, used when `api_key` is unset
    pub api_key_file: Option<PathBuf>,
    /// The registry allows 600 calls per five minutes
    pub calls_per_window: u32,
    pub window_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            api_key_file: None,
            calls_per_window: 600,
            window_secs: 300,
            max_attempts: 10,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            timeout_secs: 30,
        }
    }
}

impl RegistrySettings {
    /// Resolve the API key, reading `api_key_file` if needed
    pub fn api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.trim().to_string());
        }
        if let Some(path) = &self.api_key_file {
            let key = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let key = key.trim();
            if !key.is_empty() {
                return Ok(key.to_string());
            }
        }
        Err(ConfigError::MissingApiKey)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    pub fn limiter(&self) -> QuotaLimiter {
        QuotaLimiter::new(self.calls_per_window, Duration::from_secs(self.window_secs))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// PostgreSQL section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Schema created if missing and pinned for every statement
    pub schema: Option<String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "registry".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            schema: None,
        }
    }
}

/// Main settings structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl Settings {
    /// Load settings from `path`, or defaults when no path is given,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Self::parse(&content)?
            }
            None => Self::default(),
        };

        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::InvalidSettings(format!("failed to parse settings: {}", e)))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_API_KEY) {
            self.registry.api_key = Some(key);
        }
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.registry.base_url = url;
        }
        if let Some(host) = lookup(ENV_DB_HOST) {
            self.database.host = host;
        }
        if let Some(password) = lookup(ENV_DB_PASSWORD) {
            self.database.password = password;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.calls_per_window == 0 {
            return Err(ConfigError::InvalidSettings(
                "registry.calls_per_window must be at least 1".to_string(),
            ));
        }
        if self.registry.window_secs == 0 {
            return Err(ConfigError::InvalidSettings(
                "registry.window_secs must be at least 1".to_string(),
            ));
        }
        if self.registry.base_delay_ms > self.registry.max_delay_ms {
            return Err(ConfigError::InvalidSettings(
                "registry.base_delay_ms exceeds registry.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}
