//! Leak reaper behaviour against real sessions and scripted sources.

use crate::integration::test_utils::{started_registry, wait_until};
use reclaim::config::ReaperConfig;
use reclaim::reaper::{LeakReaper, ReclamationSource, WaitError};
use reclaim::session::WeakSessionHandle;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

#[test]
fn test_dropped_session_is_reclaimed() {
    let (driver, registry) = started_registry();
    let context = registry.load("app.Inventory").unwrap();
    let store = driver.store("app.Inventory");

    let leaked = context.create_session().unwrap();
    drop(leaked);

    assert!(wait_until(|| store.open_sessions() == 0));
    assert!(wait_until(|| registry.reaper().reclaimed() == 1));
    assert!(wait_until(|| context.active_sessions() == 0));
    let stats = registry.reclamation_stats();
    assert_eq!(stats.tracked, 0);
    assert_eq!(stats.reclaimed, 1);
}

#[test]
fn test_closed_session_is_not_queued() {
    let (_driver, registry) = started_registry();
    let context = registry.load("app.Inventory").unwrap();

    let mut session = context.create_session().unwrap();
    assert_eq!(registry.reclamation_stats().tracked, 1);
    session.close().unwrap();
    drop(session);

    let stats = registry.reclamation_stats();
    assert_eq!(stats.tracked, 0);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.reclaimed, 0);
}

#[test]
fn test_reaper_launches_once() {
    let (_driver, registry) = started_registry();
    let context = registry.load("app.Inventory").unwrap();
    for _ in 0..10 {
        let mut session = context.create_session().unwrap();
        session.close().unwrap();
    }
    assert!(registry.reaper().is_active());
    assert_eq!(registry.reaper().spawned_workers(), 1);
}

#[test]
fn test_many_threads_leaking_sessions() {
    let (driver, registry) = started_registry();
    let context = registry.load("app.Inventory").unwrap();
    let workers: Vec<_> = (0..8)
        .map(|_| {
            let context = Arc::clone(&context);
            std::thread::spawn(move || {
                for _ in 0..5 {
                    drop(context.create_session().unwrap());
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let store = driver.store("app.Inventory");
    assert!(wait_until(|| store.open_sessions() == 0));
    assert_eq!(store.opened_sessions(), 40);
}

#[test]
fn test_shutdown_reclaims_pending_sessions() {
    let (driver, registry) = started_registry();
    let context = registry.load("app.Inventory").unwrap();
    drop(context.create_session().unwrap());
    registry.shutdown().unwrap();
    assert_eq!(driver.store("app.Inventory").open_sessions(), 0);
    assert!(!registry.reaper().is_active());
}

/// Fails fatally a fixed number of times, then blocks until interrupted.
struct FailingSource {
    failures_left: AtomicUsize,
    waits: AtomicUsize,
    interrupted: Mutex<bool>,
    wake: Condvar,
}

impl FailingSource {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(failures),
            waits: AtomicUsize::new(0),
            interrupted: Mutex::new(false),
            wake: Condvar::new(),
        })
    }
}

impl ReclamationSource for FailingSource {
    fn wait(&self) -> Result<WeakSessionHandle, WaitError> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(WaitError::Fatal("source broken".to_string()));
        }
        let mut interrupted = self.interrupted.lock().unwrap();
        while !*interrupted {
            interrupted = self.wake.wait(interrupted).unwrap();
        }
        *interrupted = false;
        Err(WaitError::Interrupted)
    }

    fn interrupt(&self) {
        *self.interrupted.lock().unwrap() = true;
        self.wake.notify_all();
    }
}

#[test]
fn test_reaper_restarts_after_fatal_wait() {
    let reaper = LeakReaper::new(ReaperConfig::default());
    let source = FailingSource::new(2);
    reaper.launch(source.clone()).unwrap();

    assert!(wait_until(|| reaper.spawned_workers() == 3));
    assert!(wait_until(|| source.waits.load(Ordering::SeqCst) == 3));
    assert!(reaper.is_active());

    reaper.terminate();
    assert!(!reaper.is_active());
    assert_eq!(reaper.spawned_workers(), 3);
}

#[test]
fn test_reaper_restart_can_be_disabled() {
    let reaper = LeakReaper::new(ReaperConfig {
        restart_on_failure: false,
        ..ReaperConfig::default()
    });
    let source = FailingSource::new(1);
    reaper.launch(source.clone()).unwrap();

    assert!(wait_until(|| !reaper.is_active()));
    assert_eq!(reaper.spawned_workers(), 1);

    reaper.launch(source.clone()).unwrap();
    assert_eq!(reaper.spawned_workers(), 2);
    assert!(reaper.is_active());
    reaper.terminate();
}

#[test]
fn test_terminate_is_idempotent() {
    let reaper = LeakReaper::default();
    reaper.terminate();
    reaper.launch(FailingSource::new(0)).unwrap();
    assert!(reaper.is_active());
    reaper.terminate();
    reaper.terminate();
    assert!(!reaper.is_active());
    assert_eq!(reaper.spawned_workers(), 1);
}
