//! Native session port.
//!
//! Implemented by engine drivers. The runtime never inspects what a native
//! session does; it only decides when calls may reach it.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A resource read or written through a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Resource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// Stateful session opened by an engine backend.
///
/// Calls arrive from whichever thread holds the guard; `close` may arrive from
/// the reaper thread, hence `Send`.
pub trait NativeSession: Send {
    fn find(&mut self, id: &str) -> Result<Option<Resource>, SessionError>;

    /// Resolve a name or path to a resource id.
    fn resolve(&mut self, name: &str) -> Result<Option<String>, SessionError>;

    fn modify(&mut self, resource: Resource) -> Result<(), SessionError>;

    fn delete(&mut self, id: &str) -> Result<bool, SessionError>;

    fn query(&mut self, expression: &str) -> Result<Vec<Resource>, SessionError>;

    fn save_changes(&mut self) -> Result<(), SessionError>;

    fn discard_changes(&mut self) -> Result<(), SessionError>;

    fn close(&mut self) -> Result<(), SessionError>;
}
