//! Persisted display preferences (language and theme)

use crate::error::{CoreError, CoreResult, write_state_file};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const PREFERENCES_FILE: &str = "preferences.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Zh,
}

impl Default for Language {
    fn default() -> Self {
        Self::En
    }
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }

    /// Value for the `Accept-Language` header
    pub fn accept_language(&self) -> &'static str {
        match self {
            Self::En => "en-US,en;q=0.9",
            Self::Zh => "zh-CN,zh;q=0.9",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "en-us" | "english" => Ok(Self::En),
            "zh" | "zh-cn" | "chinese" => Ok(Self::Zh),
            other => Err(format!("unsupported language '{other}'")),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    System,
}

impl Default for Theme {
    fn default() -> Self {
        Self::System
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "system" | "auto" => Ok(Self::System),
            other => Err(format!("unknown theme '{other}'")),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub theme: Theme,
}

/// JSON file holding [`Preferences`]
#[derive(Debug, Clone)]
pub struct PreferencesStore {
    path: PathBuf,
}

impl PreferencesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the conventional file name inside `state_dir`
    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(PREFERENCES_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load preferences; a missing file yields the defaults
    pub fn load(&self) -> CoreResult<Preferences> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| CoreError::malformed(&self.path, e))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Preferences::default()),
            Err(e) => Err(CoreError::state_file(&self.path, e)),
        }
    }

    pub fn save(&self, preferences: &Preferences) -> CoreResult<()> {
        let content = serde_json::to_string_pretty(preferences)
            .map_err(|e| CoreError::malformed(&self.path, e))?;
        write_state_file(&self.path, &content)
    }

    /// Load, apply `f`, save, and return the new value
    pub fn update<F>(&self, f: F) -> CoreResult<Preferences>
    where
        F: FnOnce(&mut Preferences),
    {
        let mut preferences = self.load()?;
        f(&mut preferences);
        self.save(&preferences)?;
        Ok(preferences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferencesStore::in_dir(dir.path());
        let prefs = store.load().unwrap();
        assert_eq!(prefs.language, Language::En);
        assert_eq!(prefs.theme, Theme::System);
    }

    #[test]
    fn update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferencesStore::in_dir(&dir.path().join("nested"));
        store
            .update(|p| {
                p.language = Language::Zh;
                p.theme = Theme::Dark;
            })
            .unwrap();

        let reloaded = PreferencesStore::new(store.path()).load().unwrap();
        assert_eq!(reloaded.language, Language::Zh);
        assert_eq!(reloaded.theme, Theme::Dark);
    }

    #[test]
    fn corrupt_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferencesStore::in_dir(dir.path());
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(matches!(store.load(), Err(CoreError::Malformed { .. })));
    }

    #[test]
    fn parses_aliases() {
        assert_eq!("zh-CN".parse::<Language>(), Ok(Language::Zh));
        assert_eq!("auto".parse::<Theme>(), Ok(Theme::System));
        assert!("fr".parse::<Language>().is_err());
    }
}
