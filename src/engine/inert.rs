//! Placeholder driver installed when discovery finds no usable engine.

use crate::engine::driver::{EngineDriver, LoadedApplication};
use crate::error::EngineError;

/// Driver whose every operation fails with [`EngineError::NoImplementation`].
#[derive(Debug, Clone)]
pub struct InertDriver {
    reason: String,
}

impl InertDriver {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    fn unavailable(&self) -> EngineError {
        EngineError::NoImplementation(self.reason.clone())
    }
}

impl EngineDriver for InertDriver {
    fn name(&self) -> &str {
        "inert"
    }

    fn load_application(&self, _class_name: &str) -> Result<LoadedApplication, EngineError> {
        Err(self.unavailable())
    }

    fn start(&self) -> Result<(), EngineError> {
        Err(self.unavailable())
    }

    fn is_online(&self) -> bool {
        false
    }
}
