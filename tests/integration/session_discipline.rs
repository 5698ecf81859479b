//! Session state machine and per-thread session discipline.

use crate::integration::test_utils::started_registry;
use reclaim::error::{EngineError, SessionError};
use reclaim::session::{NativeSession, Resource, SessionGuard, SessionId, SessionState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

/// Native session counting closes, optionally failing them.
struct CountingSession {
    closes: Arc<AtomicUsize>,
    fail_close: bool,
}

impl NativeSession for CountingSession {
    fn find(&mut self, _id: &str) -> Result<Option<Resource>, SessionError> {
        Ok(None)
    }

    fn resolve(&mut self, _name: &str) -> Result<Option<String>, SessionError> {
        Ok(None)
    }

    fn modify(&mut self, _resource: Resource) -> Result<(), SessionError> {
        Ok(())
    }

    fn delete(&mut self, _id: &str) -> Result<bool, SessionError> {
        Ok(false)
    }

    fn query(&mut self, _expression: &str) -> Result<Vec<Resource>, SessionError> {
        Ok(Vec::new())
    }

    fn save_changes(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    fn discard_changes(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(SessionError::Native("connection reset".to_string()));
        }
        Ok(())
    }
}

fn counted_guard(fail_close: bool) -> (Arc<SessionGuard>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let closes = Arc::new(AtomicUsize::new(0));
    let notified = Arc::new(AtomicUsize::new(0));
    let listener_count = Arc::clone(&notified);
    let guard = SessionGuard::new(
        Box::new(CountingSession {
            closes: Arc::clone(&closes),
            fail_close,
        }),
        Some(Box::new(move |_: SessionId| {
            listener_count.fetch_add(1, Ordering::SeqCst);
        })),
    );
    (Arc::new(guard), closes, notified)
}

#[test]
fn test_close_is_idempotent() {
    let (guard, closes, notified) = counted_guard(false);
    for _ in 0..3 {
        guard.close().unwrap();
    }
    guard.dispose();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert_eq!(guard.state(), SessionState::Disposed);
}

#[test]
fn test_failed_close_still_disposes() {
    let (guard, closes, notified) = counted_guard(true);
    let err = guard.close().unwrap_err();
    assert!(matches!(err, SessionError::Native(_)));
    assert_eq!(guard.state(), SessionState::Disposed);
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    guard.close().unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_close_runs_once() {
    let (guard, closes, notified) = counted_guard(false);
    let barrier = Arc::new(Barrier::new(8));
    let workers: Vec<_> = (0..8)
        .map(|i| {
            let guard = Arc::clone(&guard);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                if i % 2 == 0 {
                    guard.close().unwrap();
                } else {
                    guard.dispose();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

#[test]
fn test_circuit_breaking_messages() {
    let (_driver, registry) = started_registry();
    let context = registry.load("app.Inventory").unwrap();

    let mut session = context.create_session().unwrap();
    session.modify(Resource::new("item-1")).unwrap();
    session.save_changes().unwrap();
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(
        session.find("item-1").unwrap_err().to_string(),
        "Session has already been completed"
    );
    assert_eq!(
        session.save_changes().unwrap_err().to_string(),
        "Session has already been completed"
    );

    session.close().unwrap();
    let err = session.query("*").unwrap_err();
    assert!(err.is_state_error());
    assert_eq!(err.to_string(), "Session has already been disposed");
}

#[test]
fn test_single_session_per_thread() {
    let (_driver, registry) = started_registry();
    let context = registry.load("app.Inventory").unwrap();

    let mut first = context.create_session().unwrap();
    let err = context.create_session().unwrap_err();
    assert!(matches!(err, EngineError::SessionAlreadyActive { ref application } if application == "app.Inventory"));

    let other_thread = {
        let context = Arc::clone(&context);
        thread::spawn(move || {
            let mut session = context.create_session().unwrap();
            session.close().unwrap();
        })
    };
    other_thread.join().unwrap();

    first.close().unwrap();
    let mut second = context.create_session().unwrap();
    second.close().unwrap();
}

#[test]
fn test_sessions_in_different_contexts_are_independent() {
    let (_driver, registry) = started_registry();
    let inventory = registry.load("app.Inventory").unwrap();
    let billing = registry.load("app.Billing").unwrap();

    let mut a = inventory.create_session().unwrap();
    let mut b = billing.create_session().unwrap();
    assert_ne!(a.id(), b.id());
    a.close().unwrap();
    b.close().unwrap();
}

#[test]
fn test_discarded_changes_are_not_committed() {
    let (driver, registry) = started_registry();
    let context = registry.load("app.Inventory").unwrap();

    context
        .with_session(|session| {
            session.modify(Resource::new("draft"))?;
            session.discard_changes()?;
            Ok::<_, EngineError>(())
        })
        .unwrap();
    assert!(driver.store("app.Inventory").get("draft").is_none());

    let found = context
        .with_session(|session| Ok::<_, EngineError>(session.find("draft")?))
        .unwrap();
    assert!(found.is_none());
}
