//! Artifact creation.
//!
//! The app directory is archived into a single `app.zap` (zip) file, leaving
//! out everything the [`IgnoreRules`] reject.

mod ignore;

pub use ignore::{IgnoreRules, BUILTIN_IGNORES, IGNORE_FILE_NAME};

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use md5::{Digest as _, Md5};
use sha2::Sha256;
use tracing::{debug, info};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::PackError;

/// File name of the produced archive.
pub const ARTIFACT_FILE_NAME: &str = "app.zap";

/// Predicate deciding whether a path (relative to the app directory) is
/// packed.
pub type IncludePredicate<'a> = dyn Fn(&Path) -> bool + Send + Sync + 'a;

/// Produces an artifact from an app directory.
#[async_trait]
pub trait Packager: Send + Sync {
    /// Packs `app_dir` and returns the artifact path.
    async fn pack(
        &self,
        app_dir: &Path,
        should_include: &IncludePredicate<'_>,
    ) -> Result<PathBuf, PackError>;
}

/// Packs apps into zip archives in a fresh temporary directory.
#[derive(Debug, Clone, Default)]
pub struct ZipPackager {
    output_root: Option<PathBuf>,
}

impl ZipPackager {
    /// Creates a packager writing below the system temp directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes archives below `root` instead of the system temp directory.
    #[must_use]
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = Some(root.into());
        self
    }

    fn output_dir(&self) -> PathBuf {
        let root = self
            .output_root
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        root.join(format!("appix-{}", Uuid::new_v4()))
    }
}

fn add_dir_entries<W: Write + io::Seek>(
    writer: &mut ZipWriter<W>,
    root: &Path,
    dir: &Path,
    should_include: &IncludePredicate<'_>,
    options: SimpleFileOptions,
) -> Result<usize, PackError> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    let mut added = 0;
    for entry in entries {
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path);

        if !should_include(relative) {
            debug!(path = %relative.display(), "Skipping");
            continue;
        }

        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            writer.add_directory(format!("{name}/"), options)?;
            added += add_dir_entries(writer, root, &path, should_include, options)?;
        } else if file_type.is_file() {
            debug!(path = %relative.display(), "Adding");
            writer.start_file(name, options)?;
            let mut file = File::open(&path)?;
            io::copy(&mut file, writer)?;
            added += 1;
        }
    }
    Ok(added)
}

fn write_archive(
    app_dir: &Path,
    artifact: &Path,
    should_include: &IncludePredicate<'_>,
) -> Result<usize, PackError> {
    let file = File::create(artifact)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let added = add_dir_entries(&mut writer, app_dir, app_dir, should_include, options)?;
    writer.finish()?;
    Ok(added)
}

#[async_trait]
impl Packager for ZipPackager {
    async fn pack(
        &self,
        app_dir: &Path,
        should_include: &IncludePredicate<'_>,
    ) -> Result<PathBuf, PackError> {
        let out_dir = self.output_dir();
        std::fs::create_dir_all(&out_dir)?;
        let artifact = out_dir.join(ARTIFACT_FILE_NAME);

        debug!(artifact = %artifact.display(), "Creating ZAP file");
        // The predicate is borrowed, so the archive is written on this task.
        let added = write_archive(app_dir, &artifact, should_include)?;

        info!(files = added, artifact = %artifact.display(), "Packed app");
        Ok(artifact)
    }
}

/// A packed artifact loaded for upload.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Where the artifact lives on disk.
    pub path: PathBuf,
    /// Archive contents.
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Reads the artifact at `path`.
    pub fn read(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let bytes = std::fs::read(&path)?;
        Ok(Self { path, bytes })
    }

    /// Reads the artifact at `path` and deletes it from disk.
    ///
    /// The directory holding the artifact is removed too once it is empty.
    pub fn take(path: impl Into<PathBuf>) -> io::Result<Self> {
        let artifact = Self::read(path)?;
        std::fs::remove_file(&artifact.path)?;
        if let Some(dir) = artifact.path.parent() {
            if let Err(error) = std::fs::remove_dir(dir) {
                debug!(dir = %dir.display(), error = %error, "Keeping artifact directory");
            }
        }
        Ok(artifact)
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the artifact is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Base64 MD5 digest, as used in `Content-MD5`.
    #[must_use]
    pub fn md5_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(Md5::digest(&self.bytes))
    }

    /// Hex SHA-256 digest.
    #[must_use]
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}
