//! Weft runtime — the per-thread service container and event loop.
//!
//! This crate is the runtime layer under the SDK crates (`weft-types`,
//! `weft-event`, `weft-service`): it owns the prioritized queue, the
//! service registry with its lifecycle state machine, the dispatch tables,
//! and the broadcast fabric that federates managers across threads.
//!
//! # Architecture
//!
//! ```text
//!                 thread-confined                      Send + Sync
//! ┌──────────────────────────────────────────┐   ┌────────────────────┐
//! │ DependencyManager                        │   │ QueueHandle        │
//! │  ├─ registry: ServiceId → Lifecycle      │◄──┤  push / quit /     │
//! │  ├─ handlers / interceptors / trackers   │   │  wait_for_empty    │
//! │  ├─ completion + error callbacks         │   └────────▲───────────┘
//! │  └─ suspended generators (ResumeToken)   │            │
//! │            ▲                             │   ┌────────┴───────────┐
//! │            └── drain → dispatch → repeat │   │ CommunicationChannel│
//! └──────────────────────────────────────────┘   └────────────────────┘
//! ```
//!
//! Each manager runs a cooperative loop pinned to one OS thread: handlers
//! may suspend by awaiting inside an
//! [`AsyncGenerator`](weft_event::AsyncGenerator); resumption is always a
//! queued event, so a generator resumes on the thread that started it.
//! Cross-thread interaction is pushes via [`QueueHandle`] and broadcasts
//! via [`CommunicationChannel`] — nothing else.
//!
//! # Example
//!
//! ```no_run
//! use weft_runtime::{DependencyManager, ServiceSpec};
//! use weft_service::{Service, StartBehaviour};
//!
//! struct Hello(weft_runtime::ServiceContext);
//!
//! impl Service for Hello {
//!     fn start(&mut self) -> StartBehaviour {
//!         self.0.push_quit();
//!         StartBehaviour::Succeeded
//!     }
//!     fn stop(&mut self) -> StartBehaviour {
//!         StartBehaviour::Succeeded
//!     }
//! }
//!
//! let dm = DependencyManager::new();
//! dm.create_service(ServiceSpec::new(|_reg, _props, ctx| Hello(ctx.clone())))
//!     .unwrap();
//! dm.start();
//! ```

mod channel;
mod config;
mod context;
mod event;
mod lifecycle;
mod logging;
mod manager;
mod queue;
mod registration;

pub use channel::CommunicationChannel;
pub use config::ManagerConfig;
pub use context::{ManagerRef, ServiceContext};
pub use event::{
    ContinuableEvent, DependencyOfflineEvent, DependencyOnlineEvent, DependencyRequestEvent,
    DependencyUndoRequestEvent, Event, EventPayload, QueuedFunction, QuitEvent, RemoveServiceEvent,
    RunFunctionEvent, StartServiceEvent, StopServiceEvent,
};
pub use lifecycle::ServiceSpec;
pub use logging::{Logger, LoggerAdmin, TracingLogger};
pub use manager::DependencyManager;
pub use queue::QueueHandle;
pub use registration::{
    CompletionRegistration, DependencyTrackerRegistration, EventHandlerRegistration,
    EventInterceptorRegistration,
};
