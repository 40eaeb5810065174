//! The resumable computation returned by event handlers.
//!
//! An [`AsyncGenerator`] wraps a producer future built from a closure that
//! receives a [`Yielder`]. The producer runs only when the consumer calls
//! [`advance`](AsyncGenerator::advance) (directly, or through the owning
//! manager's loop); it suspends either at a yield point — publishing a value
//! — or at an external await, in which case the innermost awaitable has
//! registered a resumption with the manager via the current
//! [`ResumeContext`](crate::ResumeContext).
//!
//! # Example
//!
//! ```
//! use weft_event::{AsyncGenerator, Step};
//!
//! let mut gen = AsyncGenerator::new(|y| async move {
//!     y.yield_item(1).await;
//!     y.yield_item(2).await;
//!     Ok(())
//! });
//!
//! assert!(matches!(gen.advance(), Step::Yielded(1)));
//! assert!(matches!(gen.advance(), Step::Yielded(2)));
//! assert!(matches!(gen.advance(), Step::Finished(Ok(()))));
//! ```

use crate::EventError;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

/// Observable state of an [`AsyncGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Producer has not been resumed past its last suspension point.
    /// The initial state: the producer suspends unconditionally before its
    /// first statement.
    ValueReadyProducerSuspended,
    /// Producer yielded; the consumer holds the value and has not advanced
    /// again yet.
    ValueReadyConsumerRunning,
    /// Producer is being polled right now.
    ValueNotReadyProducerRunning,
    /// Producer awaits an external signal; the consumer is parked until a
    /// scheduled resumption advances the generator again.
    ValueNotReadyConsumerSuspended,
    /// Cancellation was requested; the producer is destroyed at this or its
    /// next suspension point.
    Cancelled,
}

/// Result of one [`advance`](AsyncGenerator::advance).
#[derive(Debug)]
pub enum Step<T> {
    /// The producer yielded a value and suspended.
    Yielded(T),
    /// The producer awaits an external signal; a resumption has been
    /// registered with the owning manager.
    Suspended,
    /// The producer terminated. `Err` carries a producer fault or
    /// [`EventError::Cancelled`].
    Finished(Result<(), EventError>),
}

struct GenCore<T> {
    state: Cell<GeneratorState>,
    slot: RefCell<Option<T>>,
    consumer_parked: Cell<bool>,
}

/// Producer-side handle used to publish values.
///
/// Cloneable so the producer closure can move it into nested futures; only
/// one producer runs at a time by construction.
pub struct Yielder<T> {
    core: Rc<GenCore<T>>,
}

impl<T> Clone for Yielder<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T> Yielder<T> {
    /// Publishes `value` and suspends the producer until the next advance.
    pub fn yield_item(&self, value: T) -> YieldFuture<'_, T> {
        YieldFuture {
            core: &self.core,
            value: Some(value),
        }
    }
}

/// Future returned by [`Yielder::yield_item`].
pub struct YieldFuture<'a, T> {
    core: &'a GenCore<T>,
    value: Option<T>,
}

impl<T> Future for YieldFuture<'_, T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.value.take() {
            Some(v) => {
                *this.core.slot.borrow_mut() = Some(v);
                Poll::Pending
            }
            // Second poll: the consumer took the value and advanced again.
            None => Poll::Ready(()),
        }
    }
}

impl<T> Unpin for YieldFuture<'_, T> {}

/// Single-producer/single-consumer resumable computation.
///
/// `!Send`: a generator lives and dies on the thread of the manager that
/// started it. Dropping the handle requests cancellation.
pub struct AsyncGenerator<T> {
    core: Rc<GenCore<T>>,
    producer: Option<Pin<Box<dyn Future<Output = Result<(), EventError>>>>>,
    outcome: Option<Result<(), EventError>>,
}

impl<T: 'static> AsyncGenerator<T> {
    /// Builds a generator from a producer closure.
    ///
    /// The closure receives the [`Yielder`] and returns the producer future.
    /// Nothing runs until the first [`advance`](Self::advance).
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce(Yielder<T>) -> Fut,
        Fut: Future<Output = Result<(), EventError>> + 'static,
    {
        let core = Rc::new(GenCore {
            state: Cell::new(GeneratorState::ValueReadyProducerSuspended),
            slot: RefCell::new(None),
            consumer_parked: Cell::new(false),
        });
        let producer = f(Yielder { core: core.clone() });
        Self {
            core,
            producer: Some(Box::pin(producer)),
            outcome: None,
        }
    }

    /// A generator that terminates immediately with `Ok(())`.
    ///
    /// The common return for handlers that do all their work synchronously.
    #[must_use]
    pub fn ready() -> Self {
        Self::new(|_y| async { Ok(()) })
    }

    /// A generator that terminates immediately with a fault.
    #[must_use]
    pub fn faulted(error: EventError) -> Self {
        Self::new(move |_y| async move { Err(error) })
    }

    /// Current observable state.
    #[must_use]
    pub fn state(&self) -> GeneratorState {
        self.core.state.get()
    }

    /// `true` once the producer has terminated (yielding its return).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Resumes the producer and reports what it did.
    ///
    /// Valid from the initial state, after a yield was consumed, and after a
    /// suspension (the manager re-advances on the scheduled resumption).
    /// Advancing a finished generator returns its outcome again; advancing a
    /// cancelled one reports [`EventError::Cancelled`].
    pub fn advance(&mut self) -> Step<T> {
        if let Some(outcome) = &self.outcome {
            return Step::Finished(outcome.clone());
        }
        if self.core.state.get() == GeneratorState::Cancelled {
            return Step::Finished(Err(EventError::Cancelled));
        }

        let producer = self
            .producer
            .as_mut()
            .expect("producer present until finished or cancelled");

        self.core.state.set(GeneratorState::ValueNotReadyProducerRunning);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        match producer.as_mut().poll(&mut cx) {
            Poll::Ready(result) => {
                self.core.state.set(GeneratorState::ValueReadyProducerSuspended);
                self.producer = None;
                self.outcome = Some(result.clone());
                Step::Finished(result)
            }
            Poll::Pending => {
                let value = self.core.slot.borrow_mut().take();
                match value {
                    Some(v) => {
                        self.core.state.set(GeneratorState::ValueReadyConsumerRunning);
                        Step::Yielded(v)
                    }
                    None => {
                        self.core
                            .state
                            .set(GeneratorState::ValueNotReadyConsumerSuspended);
                        Step::Suspended
                    }
                }
            }
        }
    }

    /// Requests cancellation.
    ///
    /// If the producer is suspended at a yield point it is destroyed
    /// immediately; a producer suspended at an external await is destroyed
    /// here as well (dropping a future at an await point is sound), unless a
    /// nested consumer is currently parked on this generator — that is a
    /// programming error and panics.
    ///
    /// # Panics
    ///
    /// Panics if a consumer is parked awaiting this generator's next value,
    /// or if called from within the producer itself.
    pub fn request_cancellation(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        let previous = self.core.state.replace(GeneratorState::Cancelled);
        match previous {
            GeneratorState::Cancelled => {}
            GeneratorState::ValueNotReadyProducerRunning => {
                panic!("cannot cancel a generator from inside its own producer");
            }
            GeneratorState::ValueNotReadyConsumerSuspended if self.core.consumer_parked.get() => {
                panic!("cannot cancel a generator while a consumer awaits its next value");
            }
            _ => {
                self.producer = None;
            }
        }
    }

    /// Consumer future resolving to the producer's next value.
    ///
    /// Resolves to `Ok(Some(value))` on a yield, `Ok(None)` on termination,
    /// and `Err` on a producer fault. While the producer awaits an external
    /// signal the caller is parked (`ValueNotReadyConsumerSuspended`).
    pub fn next(&mut self) -> NextFuture<'_, T> {
        NextFuture { gen: self }
    }
}

impl<T> Drop for AsyncGenerator<T> {
    fn drop(&mut self) {
        if self.outcome.is_none() && self.core.state.get() != GeneratorState::Cancelled {
            let previous = self.core.state.replace(GeneratorState::Cancelled);
            // Mirrors request_cancellation, minus the double-cancel guard:
            // the drop-while-consumer-parked case cannot be reached from
            // safe code (the consumer borrows the generator), but the
            // in-producer case can, via drop of the handle inside a
            // callback.
            assert!(
                previous != GeneratorState::ValueNotReadyProducerRunning
                    || std::thread::panicking(),
                "generator handle dropped from inside its own producer"
            );
            self.producer = None;
        }
    }
}

/// Future returned by [`AsyncGenerator::next`].
pub struct NextFuture<'a, T> {
    gen: &'a mut AsyncGenerator<T>,
}

impl<T: 'static> Future for NextFuture<'_, T> {
    type Output = Result<Option<T>, EventError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.gen.core.consumer_parked.set(false);
        match this.gen.advance() {
            Step::Yielded(v) => Poll::Ready(Ok(Some(v))),
            Step::Finished(Ok(())) => Poll::Ready(Ok(None)),
            Step::Finished(Err(e)) => Poll::Ready(Err(e)),
            Step::Suspended => {
                // The producer's innermost await registered the *current*
                // (outer) resume context; when it fires the outer generator
                // re-polls this future.
                this.gen.core.consumer_parked.set(true);
                Poll::Pending
            }
        }
    }
}

impl<T> Unpin for NextFuture<'_, T> {}

// Wakeups are driven by scheduled resume tokens, never by the waker.
fn noop_waker() -> Waker {
    fn raw() -> RawWaker {
        fn clone(_: *const ()) -> RawWaker {
            raw()
        }
        fn no_op(_: *const ()) {}

        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    unsafe { Waker::from_raw(raw()) }
}
