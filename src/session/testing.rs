//! Scripted native session for unit tests.

use crate::error::SessionError;
use crate::session::native::{NativeSession, Resource};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

#[derive(Debug, Default)]
pub(crate) struct CallCounts {
    calls: AtomicUsize,
    closes: AtomicUsize,
}

impl CallCounts {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct ScriptedSession {
    counts: Arc<CallCounts>,
    resources: BTreeMap<String, Resource>,
    fail_save: bool,
    fail_close: bool,
    /// `find` meets the test at this barrier twice before answering
    find_gate: Option<Arc<Barrier>>,
}

impl ScriptedSession {
    pub(crate) fn new(counts: Arc<CallCounts>) -> Self {
        Self {
            counts,
            resources: BTreeMap::new(),
            fail_save: false,
            fail_close: false,
            find_gate: None,
        }
    }

    pub(crate) fn failing_save(mut self) -> Self {
        self.fail_save = true;
        self
    }

    pub(crate) fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub(crate) fn gated_find(mut self, gate: Arc<Barrier>) -> Self {
        self.find_gate = Some(gate);
        self
    }
}

impl NativeSession for ScriptedSession {
    fn find(&mut self, id: &str) -> Result<Option<Resource>, SessionError> {
        self.counts.call();
        if let Some(gate) = &self.find_gate {
            gate.wait();
            gate.wait();
        }
        Ok(self.resources.get(id).cloned())
    }

    fn resolve(&mut self, name: &str) -> Result<Option<String>, SessionError> {
        self.counts.call();
        Ok(self.resources.contains_key(name).then(|| name.to_string()))
    }

    fn modify(&mut self, resource: Resource) -> Result<(), SessionError> {
        self.counts.call();
        self.resources.insert(resource.id.clone(), resource);
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<bool, SessionError> {
        self.counts.call();
        Ok(self.resources.remove(id).is_some())
    }

    fn query(&mut self, _expression: &str) -> Result<Vec<Resource>, SessionError> {
        self.counts.call();
        Ok(self.resources.values().cloned().collect())
    }

    fn save_changes(&mut self) -> Result<(), SessionError> {
        self.counts.call();
        if self.fail_save {
            return Err(SessionError::Native("save rejected".to_string()));
        }
        Ok(())
    }

    fn discard_changes(&mut self) -> Result<(), SessionError> {
        self.counts.call();
        self.resources.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.counts.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(SessionError::Native("close failed".to_string()));
        }
        Ok(())
    }
}
