//! # Appix
//!
//! Packages a local app, runs its test and build stages, and publishes the
//! resulting artifact to the app catalog.
//!
//! Appix provides:
//!
//! - **Stage execution**: the manifest's `tests` and `build` stages run as
//!   concurrent processes with a single aggregate verdict
//! - **Token management**: bearer tokens are refreshed from the identity
//!   provider and cached until shortly before they expire
//! - **Retrying upload**: the network phase of a push is retried up to a
//!   configured attempt ceiling
//! - **Watch mode**: file-system changes are debounced and coalesced so that
//!   at most one push is in flight and bursts produce one follow-up push
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use appix::prelude::*;
//!
//! let config = AppixConfig::load(None)?;
//! let uploader = CatalogUploader::from_config(&config, "./my-app".as_ref());
//! let uri = uploader
//!     .push(config.catalog_url()?, 180, "./my-app/app.manifest".as_ref(), false)
//!     .await?;
//! println!("uploaded to {uri}");
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod auth;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod errors;
pub mod events;
pub mod manifest;
pub mod observability;
pub mod packaging;
pub mod settings;
pub mod stages;
pub mod testing;
pub mod watch;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::auth::{AuthToken, CredentialStore, HttpTokenSource, TokenProvider, TokenSource};
    pub use crate::catalog::{
        CatalogClient, CatalogResponse, CatalogUploader, PushAttempt, RetryConfig,
    };
    pub use crate::config::AppixConfig;
    pub use crate::errors::{
        AttemptError, AuthError, ManifestError, PackError, PushError, StageFailure,
        TransientServerError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::manifest::Manifest;
    pub use crate::packaging::{Artifact, IgnoreRules, Packager, ZipPackager};
    pub use crate::stages::{
        PoolOutcome, ProcessStageRunner, StageDefinition, StagePhase, StagePool, StageResult,
        StageRunner,
    };
    pub use crate::watch::{
        PushLauncher, ReloadSignal, UploaderLauncher, WatchCoalescer, WatcherState,
    };
}
