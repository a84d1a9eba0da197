//! Shared application settings
//!
//! The small set of preferences shared between the application and the
//! tunnel process: which account is currently active and when it expires.
//! Stored as a TOML document in the shared container directory.

use crate::error::StoreResult;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings file name inside the shared container
const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Shared application preferences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    /// The currently logged-in account, if any
    pub account_token: Option<String>,
    /// When the account's paid time runs out, when known
    pub account_expiry: Option<DateTime<Utc>>,
}

impl AppSettings {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> StoreResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let settings = toml::from_str(&text).unwrap_or_else(|error| {
                    tracing::warn!("Discarding malformed settings file: {}", error);
                    Self::default()
                });
                Ok(settings)
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(error.into()),
        }
    }

    /// Write settings to `path`, creating parent directories as needed
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|error| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())
        })?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

/// Default settings file location inside the shared container directory
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("borealvpn").join(SETTINGS_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AppSettings::load(&dir.path().join("settings.toml")).unwrap();
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let settings = AppSettings {
            account_token: Some("1234567890".into()),
            account_expiry: Some(Utc::now()),
        };
        settings.save(&path).unwrap();

        let loaded = AppSettings::load(&path).unwrap();
        assert_eq!(loaded.account_token.as_deref(), Some("1234567890"));
    }

    #[test]
    fn test_malformed_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "account_token = [nonsense").unwrap();

        let settings = AppSettings::load(&path).unwrap();
        assert!(settings.account_token.is_none());
    }
}
