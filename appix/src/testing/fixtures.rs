//! On-disk app fixtures.

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::manifest::MANIFEST_FILE_NAME;
use crate::stages::StageDefinition;

/// A throwaway app directory with a manifest.
///
/// The directory is removed when the fixture is dropped.
#[derive(Debug)]
pub struct AppFixture {
    dir: tempfile::TempDir,
}

impl AppFixture {
    /// Creates an app named `name` without stages.
    pub fn new(name: &str) -> std::io::Result<Self> {
        Self::with_stages(name, &[], &[])
    }

    /// Creates an app with the given test and build stages.
    pub fn with_stages(
        name: &str,
        tests: &[StageDefinition],
        build: &[StageDefinition],
    ) -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let manifest = json!({ "name": name, "tests": tests, "build": build });
        std::fs::write(dir.path().join(MANIFEST_FILE_NAME), manifest.to_string())?;
        Ok(Self { dir })
    }

    /// Creates an app whose manifest file holds `contents` verbatim.
    pub fn with_raw_manifest(contents: &str) -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join(MANIFEST_FILE_NAME), contents)?;
        Ok(Self { dir })
    }

    /// Writes a file relative to the app directory.
    pub fn write(&self, relative: impl AsRef<Path>, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// The app directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The manifest location.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.path().join(MANIFEST_FILE_NAME)
    }
}
