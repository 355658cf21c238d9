//! Tool configuration.
//!
//! Defaults are built in; a JSON file may override any field and `APPIX_*`
//! environment variables override the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::RetryConfig;
use crate::errors::ConfigError;

/// Default location of the config file, relative to the home directory.
pub const CONFIG_DIR_NAME: &str = ".appix";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "APPIX_";

/// Configuration for pushing and watching apps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppixConfig {
    /// Catalog upload endpoint per target environment.
    #[serde(default = "default_catalog_uris")]
    pub catalog_uris: HashMap<String, String>,
    /// Selected target environment.
    #[serde(default = "default_target_env")]
    pub target_env: String,
    /// Credential file holding the refresh secret.
    #[serde(default = "default_auth_file_path")]
    pub auth_file_path: PathBuf,
    /// API key appended to the refresh token URL.
    #[serde(default)]
    pub api_key: String,
    /// Identity provider token endpoint, without the API key.
    #[serde(default = "default_refresh_token_url")]
    pub refresh_token_url: String,
    /// Upload retry behaviour.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Per-attempt upload timeout in seconds.
    #[serde(default = "default_upload_timeout_seconds")]
    pub upload_timeout_seconds: u64,
    /// Tokens closer than this to expiry are refreshed.
    #[serde(default = "default_token_safety_margin_seconds")]
    pub token_safety_margin_seconds: i64,
    /// Quiet period after a file change before a push starts.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_catalog_uris() -> HashMap<String, String> {
    HashMap::from([("local".to_string(), "http://localhost:5000/".to_string())])
}

fn default_target_env() -> String {
    "local".to_string()
}

fn default_auth_file_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join("auth.json")
}

fn default_refresh_token_url() -> String {
    "https://securetoken.googleapis.com/v1/token?key=".to_string()
}

fn default_upload_timeout_seconds() -> u64 {
    180
}

fn default_token_safety_margin_seconds() -> i64 {
    60
}

fn default_debounce_ms() -> u64 {
    100
}

impl Default for AppixConfig {
    fn default() -> Self {
        Self {
            catalog_uris: default_catalog_uris(),
            target_env: default_target_env(),
            auth_file_path: default_auth_file_path(),
            api_key: String::new(),
            refresh_token_url: default_refresh_token_url(),
            retry: RetryConfig::default(),
            upload_timeout_seconds: default_upload_timeout_seconds(),
            token_safety_margin_seconds: default_token_safety_margin_seconds(),
            debounce_ms: default_debounce_ms(),
            verbose: false,
        }
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl AppixConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location (`~/.appix/config.json`).
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME).join("config.json"))
    }

    /// Loads the configuration.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used when present. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Reads a JSON config file; missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading config");
        let data = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `APPIX_*` overrides obtained through `lookup`.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((_, value)) = var("TARGET_ENV") {
            self.target_env = value;
        }
        if let Some((_, value)) = var("CATALOG_URL") {
            self.catalog_uris.insert(self.target_env.clone(), value);
        }
        if let Some((_, value)) = var("AUTH_FILE") {
            self.auth_file_path = PathBuf::from(value);
        }
        if let Some((_, value)) = var("API_KEY") {
            self.api_key = value;
        }
        if let Some((_, value)) = var("REFRESH_TOKEN_URL") {
            self.refresh_token_url = value;
        }
        if let Some((key, value)) = var("MAX_RETRY_ATTEMPTS") {
            self.retry.max_attempts = parse_override(&key, &value)?;
        }
        if let Some((key, value)) = var("UPLOAD_TIMEOUT_SECONDS") {
            self.upload_timeout_seconds = parse_override(&key, &value)?;
        }
        if let Some((key, value)) = var("DEBOUNCE_MS") {
            self.debounce_ms = parse_override(&key, &value)?;
        }
        if let Some((key, value)) = var("VERBOSE") {
            self.verbose = parse_override(&key, &value)?;
        }
        Ok(self)
    }

    /// Selects the target environment.
    #[must_use]
    pub fn with_target_env(mut self, env: impl Into<String>) -> Self {
        self.target_env = env.into();
        self
    }

    /// Sets the catalog URI for an environment.
    #[must_use]
    pub fn with_catalog_uri(mut self, env: impl Into<String>, uri: impl Into<String>) -> Self {
        self.catalog_uris.insert(env.into(), uri.into());
        self
    }

    /// Sets the credential file.
    #[must_use]
    pub fn with_auth_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.auth_file_path = path.into();
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets verbose logging.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Returns the catalog URI of the selected target environment.
    pub fn catalog_url(&self) -> Result<&str, ConfigError> {
        self.catalog_uris
            .get(&self.target_env)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::UnknownTarget(self.target_env.clone()))
    }

    /// Debounce window as a duration.
    #[must_use]
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}
