//! Client settings
//!
//! Settings are layered: built-in defaults, then an optional file (TOML,
//! YAML or JSON by extension), then `APIMART_*` environment variables.

use crate::error::{CoreError, CoreResult, write_state_file};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "APIMART";
pub const TOKENS_FILE: &str = "tokens.json";

/// Settings for the marketplace client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Backend base URL, without the `/api/v1` suffix
    pub api_base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// How long the current user stays cached
    pub user_cache_ttl_secs: u64,

    /// How long downloaded avatar bytes are reused
    pub avatar_cache_ttl_secs: u64,

    /// Directory for tokens and preferences
    pub state_dir: PathBuf,

    pub user_agent: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
            user_cache_ttl_secs: 5 * 60,
            avatar_cache_ttl_secs: 30 * 60,
            state_dir: default_state_dir(),
            user_agent: format!("apimart-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// `$APIMART_STATE_DIR`, or `apimart` under the platform data directory
pub fn default_state_dir() -> PathBuf {
    std::env::var("APIMART_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("apimart")
        })
}

impl ClientSettings {
    /// Load settings with defaults, an optional file and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting settings are invalid
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("api_base_url", defaults.api_base_url)?
            .set_default("timeout_secs", defaults.timeout_secs)?
            .set_default("user_cache_ttl_secs", defaults.user_cache_ttl_secs)?
            .set_default("avatar_cache_ttl_secs", defaults.avatar_cache_ttl_secs)?
            .set_default("state_dir", defaults.state_dir.to_string_lossy().to_string())?
            .set_default("user_agent", defaults.user_agent)?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings: Self = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> CoreResult<()> {
        match url::Url::parse(&self.api_base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(CoreError::invalid_settings(format!(
                    "api_base_url: unsupported scheme '{}'",
                    url.scheme()
                )));
            }
            Err(e) => {
                return Err(CoreError::invalid_settings(format!(
                    "api_base_url: invalid URL - {e}"
                )));
            }
        }
        if self.timeout_secs == 0 {
            return Err(CoreError::invalid_settings(
                "timeout_secs: must be greater than zero",
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(CoreError::invalid_settings("user_agent: cannot be empty"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn user_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.user_cache_ttl_secs)
    }

    pub fn avatar_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.avatar_cache_ttl_secs)
    }

    pub fn token_file(&self) -> PathBuf {
        self.state_dir.join(TOKENS_FILE)
    }

    /// Write these settings as JSON to `path`
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| CoreError::malformed(path, e))?;
        write_state_file(path, &content)
    }
}
