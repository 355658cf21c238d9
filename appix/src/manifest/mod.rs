//! The `app.manifest` file.
//!
//! The manifest is loaded fresh for every push and never mutated.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ManifestError;
use crate::stages::StageDefinition;

/// File name of the manifest inside the app directory.
pub const MANIFEST_FILE_NAME: &str = "app.manifest";

/// Parsed and validated app manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Application name.
    #[serde(default)]
    pub name: String,
    /// Stages run before the build unless tests are skipped.
    #[serde(default)]
    pub tests: Vec<StageDefinition>,
    /// Stages that produce the app's build output.
    #[serde(default)]
    pub build: Vec<StageDefinition>,
}

impl Manifest {
    /// Returns the manifest location for an app directory.
    #[must_use]
    pub fn path_in(app_dir: &Path) -> PathBuf {
        app_dir.join(MANIFEST_FILE_NAME)
    }

    /// Reads, parses and validates the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let data = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ManifestError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ManifestError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        Self::parse(&data, path)
    }

    /// Parses and validates manifest JSON. `path` is used for error messages.
    pub fn parse(data: &str, path: &Path) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_str(data).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Checks the manifest invariants.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.name.trim().is_empty() {
            return Err(ManifestError::MissingName);
        }
        Ok(())
    }
}
