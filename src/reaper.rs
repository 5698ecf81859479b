//! Leak Reaper
//!
//! A single background worker that disposes sessions whose wrappers were
//! dropped without being closed. The worker blocks on a [`ReclamationSource`];
//! on an unexpected wait failure it spawns its own replacement and exits,
//! unless a stop was requested first.

mod queue;

pub use queue::{QueueStats, ReclamationQueue, ReclamationSource, WaitError};

use crate::config::ReaperConfig;
use crate::error::EngineError;
use crate::session::WeakSessionHandle;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

struct Worker {
    generation: u64,
    stop: Arc<AtomicBool>,
    source: Arc<dyn ReclamationSource>,
    thread: JoinHandle<()>,
}

impl Worker {
    fn is_running(&self) -> bool {
        !self.stop.load(Ordering::Acquire) && !self.thread.is_finished()
    }
}

struct ReaperShared {
    config: ReaperConfig,
    slot: Mutex<Option<Worker>>,
    spawned: AtomicU64,
    reclaimed: AtomicU64,
}

impl ReaperShared {
    /// Spawn a worker. Callers hold the slot lock, so a fresh worker that
    /// fails immediately cannot observe the slot before it is filled.
    fn spawn_worker(
        self: &Arc<Self>,
        source: Arc<dyn ReclamationSource>,
    ) -> Result<Worker, EngineError> {
        let generation = self.spawned.fetch_add(1, Ordering::AcqRel) + 1;
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let shared = Arc::clone(self);
            let source = Arc::clone(&source);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name(format!("{}-{}", self.config.thread_name, generation))
                .spawn(move || shared.run(source, generation, stop))
                .map_err(|e| EngineError::Reaper(format!("Failed to spawn reaper thread: {}", e)))?
        };
        debug!(generation, "Spawned leak reaper worker");
        Ok(Worker {
            generation,
            stop,
            source,
            thread,
        })
    }

    fn run(self: Arc<Self>, source: Arc<dyn ReclamationSource>, generation: u64, stop: Arc<AtomicBool>) {
        debug!(generation, "Leak reaper worker running");
        loop {
            if stop.load(Ordering::Acquire) {
                break;
            }
            match source.wait() {
                Ok(handle) => self.reclaim(handle, generation),
                Err(WaitError::Interrupted) => {
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    debug!(generation, "Spurious reaper wakeup");
                }
                Err(WaitError::Fatal(reason)) => {
                    if stop.load(Ordering::Acquire) {
                        warn!(generation, error = %reason, "Reclamation wait failed after stop request");
                        break;
                    }
                    error!(generation, error = %reason, "Reclamation wait failed");
                    self.respawn(generation, &source);
                    return;
                }
            }
        }
        debug!(generation, "Leak reaper worker stopped");
    }

    fn reclaim(&self, handle: WeakSessionHandle, generation: u64) {
        let session_id = handle.session_id();
        let guard = handle.into_guard();
        match panic::catch_unwind(AssertUnwindSafe(|| guard.dispose())) {
            Ok(()) => {
                self.reclaimed.fetch_add(1, Ordering::AcqRel);
                debug!(session_id = %session_id, generation, "Reclaimed abandoned session");
            }
            Err(_) => {
                error!(session_id = %session_id, generation, "Disposal of abandoned session panicked");
            }
        }
    }

    /// Replace the failing worker `generation`, unless it was stopped or
    /// already replaced.
    fn respawn(self: &Arc<Self>, generation: u64, source: &Arc<dyn ReclamationSource>) {
        if !self.config.restart_on_failure {
            warn!(generation, "Leak reaper restart disabled, worker exiting");
            return;
        }
        let mut slot = self.slot.lock();
        let current = slot
            .as_ref()
            .map(|w| (w.generation, w.stop.load(Ordering::Acquire)));
        if current != Some((generation, false)) {
            debug!(generation, "Leak reaper worker retired, no restart");
            return;
        }
        match self.spawn_worker(Arc::clone(source)) {
            Ok(worker) => {
                let replacement = worker.generation;
                // Dropping our own JoinHandle detaches this thread.
                drop(slot.replace(worker));
                info!(generation, replacement, "Leak reaper restarted");
            }
            Err(err) => {
                error!(generation, error = %err, "Leak reaper restart failed");
            }
        }
    }
}

/// Singleton background worker disposing abandoned sessions.
pub struct LeakReaper {
    shared: Arc<ReaperShared>,
}

impl LeakReaper {
    pub fn new(config: ReaperConfig) -> Self {
        Self {
            shared: Arc::new(ReaperShared {
                config,
                slot: Mutex::new(None),
                spawned: AtomicU64::new(0),
                reclaimed: AtomicU64::new(0),
            }),
        }
    }

    /// Start the worker bound to `source`. No-op while a worker is running.
    pub fn launch(&self, source: Arc<dyn ReclamationSource>) -> Result<(), EngineError> {
        let stale = {
            let mut slot = self.shared.slot.lock();
            if slot.as_ref().is_some_and(Worker::is_running) {
                return Ok(());
            }
            slot.take()
        };
        if let Some(worker) = stale {
            Self::join(worker);
        }

        let mut slot = self.shared.slot.lock();
        if slot.as_ref().is_some_and(Worker::is_running) {
            return Ok(());
        }
        let worker = self.shared.spawn_worker(source)?;
        info!(generation = worker.generation, "Leak reaper started");
        *slot = Some(worker);
        Ok(())
    }

    /// Ask the worker to stop and wake it. No-op when nothing runs.
    ///
    /// Waits for the worker to exit unless called from the worker itself.
    pub fn terminate(&self) {
        let Some(worker) = self.shared.slot.lock().take() else {
            return;
        };
        worker.stop.store(true, Ordering::Release);
        worker.source.interrupt();
        let generation = worker.generation;
        Self::join(worker);
        info!(generation, "Leak reaper stopped");
    }

    pub fn is_active(&self) -> bool {
        self.shared
            .slot
            .lock()
            .as_ref()
            .is_some_and(Worker::is_running)
    }

    /// Number of worker threads spawned over the reaper's lifetime.
    pub fn spawned_workers(&self) -> u64 {
        self.shared.spawned.load(Ordering::Acquire)
    }

    /// Number of abandoned sessions disposed by workers.
    pub fn reclaimed(&self) -> u64 {
        self.shared.reclaimed.load(Ordering::Acquire)
    }

    fn join(worker: Worker) {
        worker.stop.store(true, Ordering::Release);
        if worker.thread.thread().id() == thread::current().id() {
            debug!(generation = worker.generation, "Reaper stop requested from its own thread");
            return;
        }
        if worker.thread.join().is_err() {
            error!(generation = worker.generation, "Leak reaper worker panicked");
        }
    }
}

impl Default for LeakReaper {
    fn default() -> Self {
        Self::new(ReaperConfig::default())
    }
}

impl Drop for LeakReaper {
    fn drop(&mut self) {
        self.terminate();
    }
}
