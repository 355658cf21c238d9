//! Push lifecycle events.
//!
//! The uploader reports what it is doing through an [`EventSink`]. The CLI
//! logs events; tests collect them.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A push started.
pub const PUSH_STARTED: &str = "push.started";
/// A stage phase (tests or build) finished.
pub const PUSH_STAGE_PHASE: &str = "push.stage_phase";
/// The artifact was created.
pub const PUSH_PACKED: &str = "push.packed";
/// A network attempt failed.
pub const PUSH_ATTEMPT_FAILED: &str = "push.attempt_failed";
/// The catalog accepted the artifact.
pub const PUSH_SUCCEEDED: &str = "push.succeeded";
/// The push ended with an error.
pub const PUSH_FAILED: &str = "push.failed";
