//! Engine driver port.
//!
//! A driver is the pluggable implementation behind a registry: it turns an
//! application class name into a backend that opens native sessions.

use crate::error::EngineError;
use crate::session::NativeSession;
use std::sync::Arc;

/// Opens native sessions for one loaded application.
pub trait ApplicationBackend: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn NativeSession>, EngineError>;

    /// Release application resources when its context is disposed.
    fn release(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Result of loading an application through a driver.
pub struct LoadedApplication {
    /// Human-readable application name
    pub name: String,
    pub backend: Arc<dyn ApplicationBackend>,
}

/// Pluggable engine implementation.
pub trait EngineDriver: Send + Sync {
    fn name(&self) -> &str;

    fn load_application(&self, class_name: &str) -> Result<LoadedApplication, EngineError>;

    fn start(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn shutdown(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Drivers backed by remote resources report connectivity here.
    fn is_online(&self) -> bool {
        true
    }
}

/// Human-readable name derived from a class name: its last path segment.
pub(crate) fn simple_name(class_name: &str) -> &str {
    class_name
        .rsplit(|c| c == '.' || c == ':')
        .find(|segment| !segment.is_empty())
        .unwrap_or(class_name)
}
