use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{BaseDirs, ProjectDirs};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::api::client::DEFAULT_TIMEOUT;
use crate::api::models::UserId;
use crate::credential::Credential;
use crate::error::ConfigError;
use crate::transport::TransportConfig;
use crate::utils::socket_url_for;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 0 retries forever.
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        let defaults = TransportConfig::default();
        Self {
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            max_attempts: defaults.max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppState {
    /// REST root, e.g. `https://chat.example.com/api`.
    pub base_url: String,
    /// Derived from `base_url` when unset.
    pub socket_url: Option<String>,
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub request_timeout_secs: u64,
    pub reconnect: ReconnectSettings,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            socket_url: None,
            token: None,
            user_id: None,
            request_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            reconnect: ReconnectSettings::default(),
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    // TOML is the format going forward; a JSON file left by older builds is
    // converted on first load.
    fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("murmur.toml"))
    }

    fn legacy_json_path() -> Option<PathBuf> {
        let proj = ProjectDirs::from("org", "murmur", "Murmur")?;
        Some(proj.config_dir().join("state.json"))
    }

    /// Reads the user's config, falling back to the legacy JSON file and then
    /// to defaults. Never fails; problems are logged.
    pub fn load() -> Self {
        if let Some(path) = Self::toml_path().filter(|p| p.exists()) {
            match Self::load_from(&path) {
                Ok(state) => return state,
                Err(err) => warn!("ignoring {}: {err}", path.display()),
            }
        }

        if let Some(legacy) = Self::legacy_json_path().filter(|p| p.exists()) {
            match Self::load_legacy(&legacy) {
                Ok(state) => {
                    if let Err(err) = state.save() {
                        warn!("could not migrate legacy config: {err}");
                    }
                    return state;
                }
                Err(err) => warn!("ignoring {}: {err}", legacy.display()),
            }
        }

        Self::new()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    fn load_legacy(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::toml_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!("config written to {}", path.display());
        Ok(())
    }

    /// Everything needed to reach the server as a known user.
    pub fn is_complete(&self) -> bool {
        !self.base_url.trim().is_empty() && self.credential().is_some() && self.current_user().is_some()
    }

    pub fn credential(&self) -> Option<Credential> {
        self.token.as_deref().filter(|t| !t.is_empty()).map(Credential::new)
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.user_id.as_deref().filter(|u| !u.is_empty()).map(UserId::from)
    }

    pub fn socket_url(&self) -> Option<String> {
        match self.socket_url.as_deref().filter(|u| !u.is_empty()) {
            Some(explicit) => Some(explicit.to_string()),
            None => socket_url_for(&self.base_url),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            max_attempts: self.reconnect.max_attempts,
        }
    }
}
