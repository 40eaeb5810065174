//! Awaitable reset events.
//!
//! These are the signals generator producers suspend on. Setting one never
//! runs the waiter inline: it schedules a resumption through the waiter's
//! captured [`ResumeContext`](crate::ResumeContext), so the generator is
//! re-advanced by its owning manager's loop, on its owning thread.
//!
//! Both types are `Send + Sync` so queued functions can capture them across
//! threads; waiting is still only meaningful inside a manager-driven
//! generator.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use weft_event::{AsyncGenerator, AsyncAutoResetEvent};
//!
//! let evt = Arc::new(AsyncAutoResetEvent::new());
//! let evt2 = evt.clone();
//!
//! let gen: AsyncGenerator<()> = AsyncGenerator::new(move |_y| async move {
//!     evt2.wait().await; // parks until some handler calls evt.set()
//!     Ok(())
//! });
//! ```

use crate::resume::{current_resume_context, ResumeContext};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

struct Waiter {
    id: u64,
    ctx: ResumeContext,
    signalled: Arc<AtomicBool>,
}

#[derive(Default)]
struct LatchState {
    set: bool,
    waiters: Vec<Waiter>,
    next_waiter_id: u64,
}

impl LatchState {
    fn register(&mut self, ctx: ResumeContext) -> (u64, Arc<AtomicBool>) {
        let id = self.next_waiter_id;
        self.next_waiter_id += 1;
        let signalled = Arc::new(AtomicBool::new(false));
        self.waiters.push(Waiter {
            id,
            ctx,
            signalled: signalled.clone(),
        });
        (id, signalled)
    }

    fn signal_one(&mut self) -> bool {
        if self.waiters.is_empty() {
            return false;
        }
        let waiter = self.waiters.remove(0);
        waiter.signalled.store(true, Ordering::Release);
        waiter.ctx.schedule();
        true
    }

    fn signal_all(&mut self) {
        for waiter in self.waiters.drain(..) {
            waiter.signalled.store(true, Ordering::Release);
            waiter.ctx.schedule();
        }
    }

    fn forget(&mut self, id: u64) {
        self.waiters.retain(|w| w.id != id);
    }
}

/// Auto-reset awaitable: each `set` releases exactly one waiter.
///
/// If no waiter is parked the signal is latched and consumed by the next
/// `wait`. Repeated `set`s without waiters collapse into one latched signal.
#[derive(Default)]
pub struct AsyncAutoResetEvent {
    state: Mutex<LatchState>,
}

impl AsyncAutoResetEvent {
    /// Creates an unset event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases one parked waiter, or latches the signal if none is parked.
    pub fn set(&self) {
        let mut state = self.state.lock();
        if !state.signal_one() {
            state.set = true;
        }
    }

    /// Returns `true` if a signal is latched.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.state.lock().set
    }

    /// Awaits the next signal, consuming it.
    ///
    /// Must be polled from within a manager-driven generator.
    pub fn wait(&self) -> WaitFuture<'_> {
        WaitFuture {
            state: &self.state,
            auto_reset: true,
            registration: None,
        }
    }
}

/// Manual-reset awaitable: `set` releases every waiter and stays set until
/// [`reset`](Self::reset).
#[derive(Default)]
pub struct AsyncManualResetEvent {
    state: Mutex<LatchState>,
}

impl AsyncManualResetEvent {
    /// Creates an unset event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the event, releasing all parked waiters.
    pub fn set(&self) {
        let mut state = self.state.lock();
        state.set = true;
        state.signal_all();
    }

    /// Clears the event; later waits park again.
    pub fn reset(&self) {
        self.state.lock().set = false;
    }

    /// Returns `true` while the event is set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.state.lock().set
    }

    /// Awaits the event being set. Does not consume the signal.
    pub fn wait(&self) -> WaitFuture<'_> {
        WaitFuture {
            state: &self.state,
            auto_reset: false,
            registration: None,
        }
    }
}

/// Future returned by the reset events' `wait`.
pub struct WaitFuture<'a> {
    state: &'a Mutex<LatchState>,
    auto_reset: bool,
    registration: Option<(u64, Arc<AtomicBool>)>,
}

impl Future for WaitFuture<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some((_, signalled)) = &this.registration {
            if signalled.load(Ordering::Acquire) {
                this.registration = None;
                return Poll::Ready(());
            }
            return Poll::Pending;
        }

        let mut state = this.state.lock();
        if state.set {
            if this.auto_reset {
                state.set = false;
            }
            return Poll::Ready(());
        }

        let ctx = current_resume_context()
            .expect("reset events can only be awaited inside a manager-driven generator");
        this.registration = Some(state.register(ctx));
        Poll::Pending
    }
}

impl Unpin for WaitFuture<'_> {}

impl Drop for WaitFuture<'_> {
    fn drop(&mut self) {
        // A cancelled waiter must not swallow a future signal.
        if let Some((id, signalled)) = self.registration.take() {
            if !signalled.load(Ordering::Acquire) {
                self.state.lock().forget(id);
            }
        }
    }
}
