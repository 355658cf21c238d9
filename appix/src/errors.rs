//! Error types for appix.
//!
//! Manifest, stage and packaging failures are fatal for a push. Only the
//! network phase (authentication and upload) is retried, so only
//! [`AuthError`] and [`TransientServerError`] can end up inside
//! [`PushError::Exhausted`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::stages::StagePhase;

/// Error raised when the app manifest cannot be used.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file does not exist.
    #[error("App manifest not found: {}", path.display())]
    NotFound {
        /// Expected manifest location.
        path: PathBuf,
    },

    /// The manifest file exists but could not be read.
    #[error("Couldn't read the app manifest {}: {source}", path.display())]
    Read {
        /// Manifest location.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid JSON of the expected shape.
    #[error("Couldn't parse the app manifest {}: {source}", path.display())]
    Parse {
        /// Manifest location.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The manifest has no (or an empty) `name`.
    #[error("The name is missing from the app manifest")]
    MissingName,
}

/// Error raised when a test or build stage fails.
#[derive(Debug, Clone, Error)]
#[error("The {phase} are failing ({}). Please check the output", failed_stages.join(", "))]
pub struct StageFailure {
    /// The phase that failed.
    pub phase: StagePhase,
    /// Names of the stages that exited non-zero or failed to start.
    pub failed_stages: Vec<String>,
}

impl StageFailure {
    /// Creates a new stage failure.
    #[must_use]
    pub fn new(phase: StagePhase, failed_stages: Vec<String>) -> Self {
        Self {
            phase,
            failed_stages,
        }
    }
}

/// Errors from the identity provider or the local credential file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The credential file is missing, unreadable or has no refresh secret.
    #[error("Couldn't load credentials from {}: {reason}", path.display())]
    Credentials {
        /// Credential file location.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The refresh request could not be sent or completed.
    #[error("Token refresh request failed: {0}")]
    Request(String),

    /// The identity provider answered with a non-success status.
    #[error("Token refresh rejected with status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The identity provider answered with an unusable body.
    #[error("Token refresh response malformed: {0}")]
    Malformed(String),
}

impl AuthError {
    /// Creates a credentials error.
    #[must_use]
    pub fn credentials(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Credentials {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from a single upload attempt against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransientServerError {
    /// The catalog answered with a non-2xx status.
    #[error("Catalog responded with status {status}: {}", messages.join("; "))]
    Status {
        /// HTTP status code.
        status: u16,
        /// Messages from the response body, if it could be parsed.
        messages: Vec<String>,
    },

    /// The request failed before a response was received.
    #[error("Catalog request failed: {0}")]
    Network(String),

    /// The request exceeded the per-attempt timeout.
    #[error("Catalog request timed out after {0:?}")]
    Timeout(Duration),

    /// A 2xx response whose body could not be parsed.
    #[error("Catalog response could not be parsed (status {status}): {reason}")]
    Malformed {
        /// HTTP status code.
        status: u16,
        /// Parse failure.
        reason: String,
    },

    /// A 2xx response without an `upload` link.
    #[error("Catalog response has no upload link: {}", messages.join("; "))]
    MissingUploadLink {
        /// Messages from the response body.
        messages: Vec<String>,
    },
}

impl TransientServerError {
    /// Returns the HTTP status of the response, if one was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::Malformed { status, .. } => Some(*status),
            Self::MissingUploadLink { .. } => Some(200),
            Self::Network(_) | Self::Timeout(_) => None,
        }
    }

    /// Returns the messages reported by the catalog.
    #[must_use]
    pub fn messages(&self) -> &[String] {
        match self {
            Self::Status { messages, .. } | Self::MissingUploadLink { messages } => messages,
            _ => &[],
        }
    }
}

/// The cause of one failed network attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    /// Token acquisition failed.
    #[error("{0}")]
    Auth(#[from] AuthError),

    /// The upload itself failed.
    #[error("{0}")]
    Server(#[from] TransientServerError),
}

/// Errors raised while creating the artifact.
#[derive(Debug, Error)]
pub enum PackError {
    /// IO error while walking the app directory or writing the archive.
    #[error("Could not process App folder: {0}")]
    Io(#[from] std::io::Error),

    /// The archive writer failed.
    #[error("Could not create the app archive: {0}")]
    Archive(String),
}

impl From<zip::result::ZipError> for PackError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

/// The error returned by a push.
#[derive(Debug, Error)]
pub enum PushError {
    /// The manifest could not be loaded.
    #[error("{0}")]
    Manifest(#[from] ManifestError),

    /// A test or build stage failed.
    #[error("{0}")]
    Stage(#[from] StageFailure),

    /// The artifact could not be created.
    #[error("{0}")]
    Pack(#[from] PackError),

    /// Every network attempt failed.
    #[error("Push failed after {attempts} attempt(s): {cause}")]
    Exhausted {
        /// Number of attempts made.
        attempts: usize,
        /// The cause of the last attempt's failure.
        cause: AttemptError,
    },
}

impl PushError {
    /// Returns true if the network phase was reached and retried.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Returns the status of the last catalog response, if any.
    #[must_use]
    pub fn last_status(&self) -> Option<u16> {
        match self {
            Self::Exhausted {
                cause: AttemptError::Server(err),
                ..
            } => err.status(),
            _ => None,
        }
    }

    /// Returns the messages of the last catalog response.
    #[must_use]
    pub fn last_messages(&self) -> &[String] {
        match self {
            Self::Exhausted {
                cause: AttemptError::Server(err),
                ..
            } => err.messages(),
            _ => &[],
        }
    }
}

/// Errors raised while loading the tool configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Couldn't read config file {}: {source}", path.display())]
    Read {
        /// Config file location.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON.
    #[error("Couldn't parse config file {}: {source}", path.display())]
    Parse {
        /// Config file location.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// An environment override has an invalid value.
    #[error("Invalid value for {key}: {value}")]
    InvalidOverride {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },

    /// No catalog URI is configured for the selected target environment.
    #[error("No catalog URI configured for target environment '{0}'")]
    UnknownTarget(String),
}

/// Errors raised while reading or writing the development settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// IO error on the settings file.
    #[error("Development settings IO error on {}: {source}", path.display())]
    Io {
        /// Settings file location.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON.
    #[error("Failed to unmarshal development settings: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while setting up watch mode.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The watched path is not usable.
    #[error("Invalid app path {}: {source}", path.display())]
    InvalidPath {
        /// Requested path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file-system notification backend failed.
    #[error("Watch backend error: {0}")]
    Backend(#[from] notify::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failure_message_names_phase_and_stages() {
        let err = StageFailure::new(
            StagePhase::Tests,
            vec!["unit".to_string(), "lint".to_string()],
        );

        let message = err.to_string();
        assert!(message.contains("tests"));
        assert!(message.contains("unit, lint"));
    }

    #[test]
    fn test_push_error_exposes_last_status_and_messages() {
        let err = PushError::Exhausted {
            attempts: 3,
            cause: AttemptError::Server(TransientServerError::Status {
                status: 500,
                messages: vec!["failed".to_string()],
            }),
        };

        assert!(err.is_exhausted());
        assert_eq!(err.last_status(), Some(500));
        assert_eq!(err.last_messages(), ["failed".to_string()]);
        assert!(err.to_string().contains("3 attempt(s)"));
    }

    #[test]
    fn test_push_error_auth_cause_has_no_status() {
        let err = PushError::Exhausted {
            attempts: 1,
            cause: AttemptError::Auth(AuthError::Status {
                status: 401,
                body: "denied".to_string(),
            }),
        };

        assert_eq!(err.last_status(), None);
        assert!(err.last_messages().is_empty());
    }

    #[test]
    fn test_transient_error_status() {
        assert_eq!(TransientServerError::Network("reset".into()).status(), None);
        assert_eq!(
            TransientServerError::Timeout(Duration::from_secs(1)).status(),
            None
        );
        assert_eq!(
            TransientServerError::MissingUploadLink { messages: vec![] }.status(),
            Some(200)
        );
    }

    #[test]
    fn test_manifest_missing_name_message() {
        assert_eq!(
            ManifestError::MissingName.to_string(),
            "The name is missing from the app manifest"
        );
    }
}
