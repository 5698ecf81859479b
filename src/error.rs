//! Error types for the session lifecycle runtime.

use crate::engine::EngineState;
use crate::session::SessionState;
use thiserror::Error;

/// Session-level errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session has left `Active`; the message names the state it is in.
    #[error("Session has already been {}", .0.as_str())]
    Inactive(SessionState),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Native session failure: {0}")]
    Native(String),
}

impl SessionError {
    /// True when the error comes from the session state machine rather than the backend.
    pub fn is_state_error(&self) -> bool {
        matches!(self, SessionError::Inactive(_))
    }
}

/// Engine and registry errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Application engine is not active (state: {0})")]
    NotActive(EngineState),

    #[error("Application engine is offline (state: {0})")]
    Offline(EngineState),

    #[error("Application '{0}' has already been loaded")]
    AlreadyLoaded(String),

    #[error("Context '{0}' is not managed by this engine")]
    ForeignContext(String),

    #[error("Only a single session per thread is allowed (application '{application}')")]
    SessionAlreadyActive { application: String },

    #[error("Invalid application class name: '{0}'")]
    InvalidApplication(String),

    #[error("Application context '{0}' has been disposed")]
    ContextDisposed(String),

    #[error("No application engine implementation available: {0}")]
    NoImplementation(String),

    #[error("Engine discovery failed: {0}")]
    Discovery(String),

    #[error("Lifecycle listener failed: {0}")]
    Listener(String),

    #[error("Leak reaper error: {0}")]
    Reaper(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}
