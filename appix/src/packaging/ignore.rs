//! Ignore rules deciding which files go into the artifact.
//!
//! Patterns are globs (`*` and `?`) matched case-insensitively against every
//! component of a path relative to the app directory, and against the whole
//! relative path. A built-in list is always active; an `.appixignore` file in
//! the app directory adds one pattern per non-empty line.

use std::path::{Component, Path};

use regex::Regex;
use tracing::{debug, warn};

use crate::settings::DEV_FILE_NAME;

/// File name of the user ignore file.
pub const IGNORE_FILE_NAME: &str = ".appixignore";

/// Patterns that are always ignored.
pub const BUILTIN_IGNORES: &[&str] = &[
    "node_modules",
    "temp",
    ".git",
    ".idea",
    ".vscode",
    ".ds_store",
    "thumbs.db",
    "desktop.ini",
    DEV_FILE_NAME,
    IGNORE_FILE_NAME,
];

#[derive(Debug, Clone)]
struct IgnorePattern {
    glob: String,
    regex: Regex,
}

/// Compiled ignore patterns.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    patterns: Vec<IgnorePattern>,
}

fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push_str("(?i)^");
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
}

impl IgnoreRules {
    /// Creates rules with only the built-in patterns.
    #[must_use]
    pub fn builtin() -> Self {
        BUILTIN_IGNORES
            .iter()
            .fold(Self { patterns: Vec::new() }, |rules, glob| rules.with_pattern(glob))
    }

    /// Loads the built-in patterns plus the app's `.appixignore`, if any.
    #[must_use]
    pub fn load(app_dir: &Path) -> Self {
        let path = app_dir.join(IGNORE_FILE_NAME);
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                debug!(path = %path.display(), "Loaded ignore file");
                Self::builtin().with_ignore_file_contents(&contents)
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Self::builtin(),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "Could not read ignore file");
                Self::builtin()
            }
        }
    }

    /// Adds the patterns of an ignore file: one per line, blank lines and
    /// `#` comments skipped.
    #[must_use]
    pub fn with_ignore_file_contents(self, contents: &str) -> Self {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .fold(self, Self::with_pattern)
    }

    /// Adds one glob pattern. Patterns that cannot be compiled are skipped.
    #[must_use]
    pub fn with_pattern(mut self, glob: &str) -> Self {
        let glob = glob.trim_end_matches('/');
        match glob_to_regex(glob) {
            Ok(regex) => self.patterns.push(IgnorePattern {
                glob: glob.to_string(),
                regex,
            }),
            Err(error) => warn!(pattern = %glob, error = %error, "Skipping invalid ignore pattern"),
        }
        self
    }

    /// Returns the active glob patterns.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.glob.as_str())
    }

    /// Returns true if `relative_path` must be left out of the artifact.
    ///
    /// The app root itself (`""` or `"."`) is never ignored.
    #[must_use]
    pub fn is_ignored(&self, relative_path: &Path) -> bool {
        let components: Vec<String> = relative_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        if components.is_empty() {
            return false;
        }

        let joined = components.join("/");
        self.patterns.iter().any(|pattern| {
            pattern.regex.is_match(&joined)
                || components.iter().any(|part| pattern.regex.is_match(part))
        })
    }

    /// Returns true if `relative_path` may go into the artifact.
    #[must_use]
    pub fn should_include(&self, relative_path: &Path) -> bool {
        !self.is_ignored(relative_path)
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::builtin()
    }
}
