//! Per-app development settings.
//!
//! The settings file lives inside the app directory but is never packed. It
//! holds the session id used to preview pushed changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::SettingsError;

/// File name of the development settings file.
pub const DEV_FILE_NAME: &str = ".appixDevSettings";

/// Development settings stored alongside an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevelopmentSettings {
    /// Session the pushed changes are previewed under.
    #[serde(rename = "SessionID", default)]
    pub session_id: String,
}

impl DevelopmentSettings {
    /// Creates settings with a fresh random session id.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
        }
    }

    /// Returns the settings file location for `app_dir`.
    #[must_use]
    pub fn path_in(app_dir: &Path) -> PathBuf {
        app_dir.join(DEV_FILE_NAME)
    }

    /// Reads the settings of the app in `app_dir`.
    pub fn read(app_dir: &Path) -> Result<Self, SettingsError> {
        let path = Self::path_in(app_dir);
        debug!(path = %path.display(), "Reading development settings");

        let data = std::fs::read(&path).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Reads the settings if the file exists.
    pub fn read_optional(app_dir: &Path) -> Result<Option<Self>, SettingsError> {
        if Self::path_in(app_dir).is_file() {
            Self::read(app_dir).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Writes the settings into `app_dir`.
    pub fn write(&self, app_dir: &Path) -> Result<(), SettingsError> {
        let path = Self::path_in(app_dir);
        debug!(path = %path.display(), "Writing development settings");

        let data = serde_json::to_vec(self)?;
        std::fs::write(&path, data).map_err(|source| SettingsError::Io { path, source })
    }

    /// Reads the settings, creating and writing a fresh set if none exist.
    pub fn read_or_create(app_dir: &Path) -> Result<Self, SettingsError> {
        if let Some(settings) = Self::read_optional(app_dir)? {
            return Ok(settings);
        }

        let settings = Self::generate();
        settings.write(app_dir)?;
        info!(session_id = %settings.session_id, "Created development settings");
        Ok(settings)
    }
}
