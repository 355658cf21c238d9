//! Testing utilities for pushes and watch mode.
//!
//! This module provides:
//! - Scripted stage runners, packagers and token sources
//! - A scripted push launcher and a recording reload signal
//! - Throwaway app directories (unit tests only)

#[cfg(test)]
mod fixtures;
mod mocks;

#[cfg(test)]
pub use fixtures::AppFixture;
pub use mocks::{
    RecordingReloadSignal, ScriptedLauncher, ScriptedStageRunner, StaticPackager,
    StaticTokenSource,
};
