use crate::error::ConfigError;
use crate::transfer::DEFAULT_CHUNK_SIZE;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "sockbridge";
const APP_NAME: &str = "sockbridge";
const CONFIG_FILE: &str = "config.json";

/// Overrides the config directory (tests, portable installs)
pub const CONFIG_DIR_ENV: &str = "SOCKBRIDGE_CONFIG_DIR";
/// Overrides `server_url`
pub const SERVER_URL_ENV: &str = "SOCKBRIDGE_URL";

/// Backend address used when nothing else is configured
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:5384";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub chunk_size: usize,
    /// Default deadline for correlated replies. `None` waits forever.
    pub reply_timeout_ms: Option<u64>,
    pub show_progress: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            reply_timeout_ms: None,
            show_progress: true,
        }
    }
}

impl ClientConfig {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Some(PathBuf::from(dir).join(CONFIG_FILE));
        }

        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load config from disk (or defaults), then apply `.env` and
    /// environment overrides
    pub fn load() -> Self {
        // A missing .env is normal
        let _ = dotenvy::dotenv();

        let mut config = match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        };

        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            tracing::debug!("{} overrides server_url", SERVER_URL_ENV);
            config.server_url = url;
        }
        config
    }

    /// Read `path`; a missing or unreadable file yields defaults
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        match Self::config_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Parse and check `server_url`
    pub fn server_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.server_url).map_err(|source| ConfigError::Url {
            url: self.server_url.clone(),
            source,
        })?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(ConfigError::Scheme(other.to_string())),
        }
    }
}
