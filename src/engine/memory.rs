//! In-memory engine driver.
//!
//! Each application class gets its own resource store which outlives
//! individual loads, the way a database outlives connections. Sessions stage
//! modifications and deletions until `save_changes` applies them.
//!
//! Query expressions: `*` (or empty) matches everything, `key=value` matches
//! a string attribute, anything else is an id prefix.

use crate::engine::driver::{simple_name, ApplicationBackend, EngineDriver, LoadedApplication};
use crate::error::{EngineError, SessionError};
use crate::session::{NativeSession, Resource};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Committed resources of one application plus session counters.
#[derive(Debug, Default)]
pub struct MemoryStore {
    resources: RwLock<BTreeMap<String, Resource>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MemoryStore {
    /// Committed resource by id.
    pub fn get(&self, id: &str) -> Option<Resource> {
        self.resources.read().get(id).cloned()
    }

    pub fn insert(&self, resource: Resource) {
        self.resources.write().insert(resource.id.clone(), resource);
    }

    pub fn len(&self) -> usize {
        self.resources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Native sessions opened against this store.
    pub fn opened_sessions(&self) -> usize {
        self.opened.load(Ordering::Acquire)
    }

    /// Native sessions closed against this store.
    pub fn closed_sessions(&self) -> usize {
        self.closed.load(Ordering::Acquire)
    }

    /// Sessions opened and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.opened_sessions().saturating_sub(self.closed_sessions())
    }
}

/// Driver keeping application data in process memory.
#[derive(Debug)]
pub struct MemoryDriver {
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
    online: AtomicBool,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    pub const NAME: &'static str = "memory";

    pub fn new() -> Self {
        Self {
            stores: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
        }
    }

    /// Store of an application class, created on first use.
    pub fn store(&self, class_name: &str) -> Arc<MemoryStore> {
        Arc::clone(self.stores.lock().entry(class_name.to_string()).or_default())
    }

    /// Simulate loss or recovery of the backing connection.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }
}

impl EngineDriver for MemoryDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn load_application(&self, class_name: &str) -> Result<LoadedApplication, EngineError> {
        let class_name = class_name.trim();
        if class_name.is_empty() {
            return Err(EngineError::InvalidApplication(class_name.to_string()));
        }
        Ok(LoadedApplication {
            name: simple_name(class_name).to_string(),
            backend: Arc::new(MemoryBackend {
                store: self.store(class_name),
            }),
        })
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}

struct MemoryBackend {
    store: Arc<MemoryStore>,
}

impl ApplicationBackend for MemoryBackend {
    fn open_session(&self) -> Result<Box<dyn NativeSession>, EngineError> {
        self.store.opened.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MemorySession {
            store: Arc::clone(&self.store),
            staged: BTreeMap::new(),
        }))
    }
}

/// `None` marks a staged deletion.
type Staged = BTreeMap<String, Option<Resource>>;

struct MemorySession {
    store: Arc<MemoryStore>,
    staged: Staged,
}

impl MemorySession {
    fn visible(&self, id: &str) -> Option<Resource> {
        match self.staged.get(id) {
            Some(staged) => staged.clone(),
            None => self.store.get(id),
        }
    }

    fn snapshot(&self) -> BTreeMap<String, Resource> {
        let mut view = self.store.resources.read().clone();
        for (id, staged) in &self.staged {
            match staged {
                Some(resource) => {
                    view.insert(id.clone(), resource.clone());
                }
                None => {
                    view.remove(id);
                }
            }
        }
        view
    }
}

fn matches_expression(resource: &Resource, expression: &str) -> bool {
    let expression = expression.trim();
    if expression.is_empty() || expression == "*" {
        return true;
    }
    match expression.split_once('=') {
        Some((key, expected)) => match resource.attribute(key.trim()) {
            Some(Value::String(value)) => value == expected.trim(),
            Some(other) => other.to_string() == expected.trim(),
            None => false,
        },
        None => resource.id.starts_with(expression),
    }
}

impl NativeSession for MemorySession {
    fn find(&mut self, id: &str) -> Result<Option<Resource>, SessionError> {
        Ok(self.visible(id))
    }

    fn resolve(&mut self, name: &str) -> Result<Option<String>, SessionError> {
        if self.visible(name).is_some() {
            return Ok(Some(name.to_string()));
        }
        Ok(self
            .snapshot()
            .into_values()
            .find(|resource| matches!(resource.attribute("name"), Some(Value::String(n)) if n == name))
            .map(|resource| resource.id))
    }

    fn modify(&mut self, resource: Resource) -> Result<(), SessionError> {
        self.staged.insert(resource.id.clone(), Some(resource));
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<bool, SessionError> {
        if self.visible(id).is_none() {
            return Ok(false);
        }
        self.staged.insert(id.to_string(), None);
        Ok(true)
    }

    fn query(&mut self, expression: &str) -> Result<Vec<Resource>, SessionError> {
        Ok(self
            .snapshot()
            .into_values()
            .filter(|resource| matches_expression(resource, expression))
            .collect())
    }

    fn save_changes(&mut self) -> Result<(), SessionError> {
        let staged = std::mem::take(&mut self.staged);
        let mut resources = self.store.resources.write();
        for (id, change) in staged {
            match change {
                Some(resource) => {
                    resources.insert(id, resource);
                }
                None => {
                    resources.remove(&id);
                }
            }
        }
        Ok(())
    }

    fn discard_changes(&mut self) -> Result<(), SessionError> {
        self.staged.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.staged.clear();
        self.store.closed.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
