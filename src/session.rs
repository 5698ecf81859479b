//! Write sessions
//!
//! A native session is never handed to callers directly. It is wrapped in a
//! [`SessionGuard`] that enforces the session state machine, and the guard is
//! exposed through a [`WriteSession`] whose drop hook feeds abandoned sessions
//! to the leak reaper via a [`WeakSessionHandle`].

mod guard;
mod handle;
mod native;
mod state;
mod write;

#[cfg(test)]
pub(crate) mod testing;

pub use guard::{DisposeListener, SessionGuard, SessionId};
pub use handle::{SessionAnchor, WeakSessionHandle};
pub use native::{NativeSession, Resource};
pub use state::SessionState;
pub use write::WriteSession;
