//! Event metadata and the coroutine protocol for Weft.
//!
//! This crate defines what an event *is* to user code (its immutable header
//! and its typed payload contract) and the resumable-computation primitive
//! handlers return: [`AsyncGenerator`], a single-producer/single-consumer
//! state machine driven by the owning manager's event loop.
//!
//! # Crate Architecture
//!
//! Part of the **SDK layer**; contains no runtime types. The runtime plugs in
//! through one seam, [`ResumeScheduler`]:
//!
//! ```text
//!  handler code              this crate                    weft-runtime
//! ┌────────────┐   await   ┌────────────────┐  schedule  ┌─────────────┐
//! │ generator  │ ────────► │ AsyncAutoReset │ ─────────► │ EventQueue  │
//! │  producer  │           │ Event waiters  │   resume   │ Continuable │
//! └────────────┘           └────────────────┘   token    └─────────────┘
//! ```
//!
//! When a producer awaits an awaitable, the awaitable records the *resume
//! token* of the generator currently being advanced (installed in a
//! thread-local by the manager) and, once signalled, hands that token back to
//! the scheduler. The manager turns it into a `Continuable` event at the
//! awaiter's priority — which is how a generator always resumes on the same
//! thread that started it.
//!
//! # Generator States
//!
//! | State | Meaning |
//! |-------|---------|
//! | `ValueReadyProducerSuspended` | initial; also after termination |
//! | `ValueReadyConsumerRunning` | producer yielded, consumer holds the value |
//! | `ValueNotReadyProducerRunning` | producer is being polled right now |
//! | `ValueNotReadyConsumerSuspended` | producer awaits an external signal |
//! | `Cancelled` | consumer requested cancellation |
//!
//! Exactly one of *finished* or *cancelled* becomes true in a generator's
//! lifetime, and only after that point is its producer storage released.

mod error;
mod generator;
mod meta;
mod resume;
mod sync;

pub use error::EventError;
pub use generator::{AsyncGenerator, GeneratorState, Step, Yielder};
pub use meta::{EventKind, EventMeta, UserEvent};
pub use resume::{
    current_resume_context, with_resume_context, ResumeContext, ResumeScheduler, ResumeToken,
};
pub use sync::{AsyncAutoResetEvent, AsyncManualResetEvent};
