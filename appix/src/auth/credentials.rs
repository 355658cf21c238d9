//! The local credential file holding the refresh secret.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AuthError;

/// Contents of the credential file.
///
/// Only the refresh secret is interpreted; other fields written by the login
/// flow are preserved when the file is rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Refresh secret exchanged for access tokens.
    #[serde(alias = "refreshToken")]
    pub refresh_token: String,
    /// Unknown fields, kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Reads and writes the credential file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Creates a store for the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the credential file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the credentials.
    pub fn load(&self) -> Result<Credentials, AuthError> {
        debug!(path = %self.path.display(), "Reading credentials");

        let data = std::fs::read_to_string(&self.path)
            .map_err(|e| AuthError::credentials(&self.path, e.to_string()))?;
        let credentials: Credentials = serde_json::from_str(&data)
            .map_err(|e| AuthError::credentials(&self.path, e.to_string()))?;

        if credentials.refresh_token.trim().is_empty() {
            return Err(AuthError::credentials(&self.path, "refresh token is empty"));
        }
        Ok(credentials)
    }

    /// Replaces the stored refresh secret, keeping every other field.
    pub fn save_refresh_token(&self, refresh_token: &str) -> Result<(), AuthError> {
        let mut credentials = self.load()?;
        credentials.refresh_token = refresh_token.to_string();

        let data = serde_json::to_string_pretty(&credentials)
            .map_err(|e| AuthError::credentials(&self.path, e.to_string()))?;
        std::fs::write(&self.path, data)
            .map_err(|e| AuthError::credentials(&self.path, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, r#"{ "refresh_token": "secret", "user_id": "toto" }"#).unwrap();

        let credentials = CredentialStore::new(&path).load().unwrap();
        assert_eq!(credentials.refresh_token, "secret");
        assert_eq!(credentials.extra["user_id"], "toto");
    }

    #[test]
    fn test_camel_case_alias() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, r#"{ "refreshToken": "secret" }"#).unwrap();

        let credentials = CredentialStore::new(&path).load().unwrap();
        assert_eq!(credentials.refresh_token, "secret");
    }

    #[test]
    fn test_missing_file_is_credentials_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("missing.json"));

        assert!(matches!(store.load(), Err(AuthError::Credentials { .. })));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, r#"{ "refresh_token": "" }"#).unwrap();

        assert!(matches!(
            CredentialStore::new(&path).load(),
            Err(AuthError::Credentials { .. })
        ));
    }

    #[test]
    fn test_save_preserves_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, r#"{ "refresh_token": "old", "email": "dev@example.com" }"#)
            .unwrap();
        let store = CredentialStore::new(&path);

        store.save_refresh_token("new").unwrap();

        let credentials = store.load().unwrap();
        assert_eq!(credentials.refresh_token, "new");
        assert_eq!(credentials.extra["email"], "dev@example.com");
    }
}
