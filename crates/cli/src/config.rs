//! CLI configuration utilities

use anyhow::{Context, Result, bail};
use apimart_core::ClientSettings;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";

/// Settings from defaults, an optional file and `APIMART_*` variables
pub fn load_settings(path: Option<&Path>, state_dir: Option<PathBuf>) -> Result<ClientSettings> {
    let mut settings = ClientSettings::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load settings from {}", path.display()),
        None => "Failed to load settings".to_string(),
    })?;
    if let Some(state_dir) = state_dir {
        settings.state_dir = state_dir;
    }
    Ok(settings)
}

/// Default location for a generated settings file
pub fn default_config_path(settings: &ClientSettings) -> PathBuf {
    settings.state_dir.join(CONFIG_FILE)
}

/// Write `settings` to `path`, refusing to overwrite unless `force` is set
pub fn write_settings(settings: &ClientSettings, path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    settings
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}
