//! Encoder lifecycle as a pure state machine.
//!
//! `Idle -> Initializing -> Starting -> Running`, with `Stopped` reachable
//! from every state. No other transition exists, so a session can never
//! skip a startup phase or move backwards.

use std::fmt;

/// Lifecycle state of an encoder session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EncoderState {
    /// Device opened and configured; nothing started.
    Idle,
    /// Start command in flight on the helper thread.
    Initializing,
    /// Start command completed; waiting for one confirmation cycle.
    Starting,
    /// Steady-state transcoding.
    Running,
    /// Stop command issued. Terminal.
    Stopped,
}

/// Inputs that move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderEvent {
    /// Helper thread launched with the start command.
    StartLaunched,
    /// Helper thread finished and was joined.
    StartCompleted,
    /// One poll cycle passed after completion.
    Confirmed,
    /// Stop requested.
    Stop,
}

impl EncoderState {
    /// State reached by applying `event`, or `None` if the event is not
    /// valid here.
    pub fn on(self, event: EncoderEvent) -> Option<EncoderState> {
        use EncoderEvent::*;
        use EncoderState::*;

        match (self, event) {
            (Stopped, _) => None,
            (_, Stop) => Some(Stopped),
            (Idle, StartLaunched) => Some(Initializing),
            (Initializing, StartCompleted) => Some(Starting),
            (Starting, Confirmed) => Some(Running),
            _ => None,
        }
    }

    /// True while the startup handshake is in progress.
    pub fn is_starting_up(self) -> bool {
        matches!(self, EncoderState::Initializing | EncoderState::Starting)
    }

    /// Lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            EncoderState::Idle => "idle",
            EncoderState::Initializing => "initializing",
            EncoderState::Starting => "starting",
            EncoderState::Running => "running",
            EncoderState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for EncoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
