//! Resume tokens and the scheduler seam between awaitables and the loop.
//!
//! A suspended generator is identified by a [`ResumeToken`]. Awaitables
//! never talk to the runtime directly: they capture the [`ResumeContext`]
//! the manager installed for the generator currently being advanced, and on
//! signal hand the token to the context's [`ResumeScheduler`] — the runtime
//! queue, which turns it into a `Continuable` event at the awaiter's
//! priority.

use std::cell::RefCell;
use std::sync::Arc;
use weft_types::Priority;

/// Identifier of a suspended generator within one manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResumeToken(u64);

impl ResumeToken {
    /// Wraps a raw token value. Issued by the runtime.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "resume:{}", self.0)
    }
}

/// Scheduling seam implemented by the runtime's event queue.
///
/// `Send + Sync` so awaitables themselves can be shared across threads
/// (e.g. captured by queued functions), even though resumption always lands
/// back on the owning manager's thread.
pub trait ResumeScheduler: Send + Sync {
    /// Enqueues a resumption of the generator identified by `token` at the
    /// given priority.
    fn schedule_resume(&self, token: ResumeToken, priority: Priority);
}

/// Everything an awaitable needs to wake its generator later.
#[derive(Clone)]
pub struct ResumeContext {
    /// Token of the generator being advanced.
    pub token: ResumeToken,
    /// The owning manager's queue.
    pub scheduler: Arc<dyn ResumeScheduler>,
    /// Priority resumption events are scheduled at.
    pub priority: Priority,
}

impl ResumeContext {
    /// Schedules the resumption described by this context.
    pub fn schedule(&self) {
        self.scheduler.schedule_resume(self.token, self.priority);
    }
}

impl std::fmt::Debug for ResumeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumeContext")
            .field("token", &self.token)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

thread_local! {
    static CURRENT: RefCell<Vec<ResumeContext>> = const { RefCell::new(Vec::new()) };
}

/// Runs `f` with `ctx` installed as the current resume context.
///
/// Called by the manager around every generator poll. Contexts nest: a
/// generator advanced from within another poll sees its own context.
pub fn with_resume_context<R>(ctx: ResumeContext, f: impl FnOnce() -> R) -> R {
    struct PopGuard;
    impl Drop for PopGuard {
        fn drop(&mut self) {
            CURRENT.with(|c| {
                c.borrow_mut().pop();
            });
        }
    }

    CURRENT.with(|c| c.borrow_mut().push(ctx));
    let _guard = PopGuard;
    f()
}

/// Returns the resume context of the generator currently being advanced on
/// this thread, if any.
#[must_use]
pub fn current_resume_context() -> Option<ResumeContext> {
    CURRENT.with(|c| c.borrow().last().cloned())
}
