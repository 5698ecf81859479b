//! Engine lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an [`EngineRegistry`](crate::engine::EngineRegistry).
///
/// Normal progression is `Available -> Started -> Shutdown`. `Undefined` and
/// `Unavailable` are only produced by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    /// No implementation was found
    Undefined,
    /// An implementation was named but could not be built
    Unavailable,
    /// Resolved and ready to start
    Available,
    Started,
    Shutdown,
}

impl EngineState {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineState::Undefined => "UNDEFINED",
            EngineState::Unavailable => "UNAVAILABLE",
            EngineState::Available => "AVAILABLE",
            EngineState::Started => "STARTED",
            EngineState::Shutdown => "SHUTDOWN",
        }
    }

    /// Whether sessions may be opened in this state.
    pub fn is_online(self) -> bool {
        !matches!(
            self,
            EngineState::Undefined | EngineState::Unavailable | EngineState::Shutdown
        )
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
