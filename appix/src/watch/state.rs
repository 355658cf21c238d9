//! The watch state machine.

use std::fmt;

/// Where the coalescer stands with respect to pushing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatcherState {
    /// Idle, waiting for a file change.
    #[default]
    Waiting,
    /// A change arrived; the debounce delay is running.
    InitialDelay,
    /// A push is in flight.
    Pushing,
    /// A push is in flight and more changes arrived meanwhile.
    PushingAndGotEvent,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::InitialDelay => "initial_delay",
            Self::Pushing => "pushing",
            Self::PushingAndGotEvent => "pushing_and_got_event",
        };
        f.write_str(name)
    }
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// Something in the app directory changed.
    FileChanged,
    /// The debounce delay ran out.
    DelayElapsed,
    /// The in-flight push finished, successfully or not.
    PushCompleted,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do.
    None,
    /// Start the debounce delay.
    ArmDelay,
    /// Start a push.
    LaunchPush,
}

/// Computes the next state and the action to perform.
///
/// Events that make no sense in a state leave it unchanged.
#[must_use]
pub const fn transition(state: WatcherState, event: WatchEvent) -> (WatcherState, Action) {
    use WatchEvent::{DelayElapsed, FileChanged, PushCompleted};
    use WatcherState::{InitialDelay, Pushing, PushingAndGotEvent, Waiting};

    match (state, event) {
        (Waiting, FileChanged) => (InitialDelay, Action::ArmDelay),
        (InitialDelay, DelayElapsed) => (Pushing, Action::LaunchPush),
        (Pushing, FileChanged) => (PushingAndGotEvent, Action::None),
        (Pushing, PushCompleted) => (Waiting, Action::None),
        (PushingAndGotEvent, PushCompleted) => (Pushing, Action::LaunchPush),
        (state, _) => (state, Action::None),
    }
}

/// Returns true if `event` is expected in `state`.
#[must_use]
pub const fn is_expected(state: WatcherState, event: WatchEvent) -> bool {
    use WatchEvent::{DelayElapsed, FileChanged, PushCompleted};
    use WatcherState::{InitialDelay, Pushing, PushingAndGotEvent};

    matches!(
        (state, event),
        (_, FileChanged)
            | (InitialDelay, DelayElapsed)
            | (Pushing | PushingAndGotEvent, PushCompleted)
    )
}
