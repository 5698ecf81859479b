//! Session state machine states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a single write session.
///
/// `Active` is initial. `Completed` is reached after changes were saved or
/// discarded, `Closed` while a close/dispose is in flight, and `Disposed` once
/// the native session has been released. No transition leaves `Disposed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Completed,
    Closed,
    Disposed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Active => "active",
            SessionState::Completed => "completed",
            SessionState::Closed => "closed",
            SessionState::Disposed => "disposed",
        }
    }

    /// Whether mutating and read operations are still accepted.
    pub fn is_active(self) -> bool {
        self == SessionState::Active
    }

    /// Whether a close/dispose has already claimed the session.
    pub fn is_released(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Disposed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
