//! Apimart core types and utilities

pub mod config;
pub mod error;
pub mod preferences;
pub mod types;
pub mod validation;

pub use config::ClientSettings;
pub use error::{CoreError, CoreResult};
pub use preferences::{Language, Preferences, PreferencesStore, Theme};
pub use types::*;
pub use validation::{Validate, ValidationErrors};
