//! Service contracts for the Weft container.
//!
//! This crate is the part of the SDK a service implementation depends on:
//! the [`Service`] lifecycle trait, the [`DependencyRegister`] a constructor
//! uses to declare typed dependencies, and the callback traits a service
//! implements to participate in dispatch ([`EventHandler`],
//! [`EventInterceptor`], [`CompletionHandler`], [`DependencyTracker`]).
//!
//! # Lifecycle
//!
//! ```text
//! Installed ──StartService──► Starting ──start() ok──► Injecting ──deps up──► Active
//!     ▲                          │                                              │
//!     │                    start() retry                                  StopService /
//!     │                    (requeued)                                     required dep lost
//!     └──── start() fail ────────┘                                              │
//!                                                                               ▼
//! Installed ◄──────────── stop() ok ─────────────── Stopping ◄──────────────────┘
//!                          stop() fail ──► Unknown (terminal)
//! any ── manager shutdown ──► Uninstalled
//! ```
//!
//! A service is Active only while every *required* dependency is satisfied.
//! Injected peers are handed to the service between the matching inject and
//! remove callbacks and must not be retained past the remove callback.
//!
//! # Example
//!
//! ```
//! use weft_service::{DependencyRegister, Injected, Service, StartBehaviour};
//!
//! trait Clock { fn now(&self) -> u64; }
//!
//! struct Reporter {
//!     clock: Option<Injected<dyn Clock>>,
//! }
//!
//! impl Reporter {
//!     fn new(reg: &mut DependencyRegister<Self>) -> Self {
//!         reg.register_required::<dyn Clock, _, _>(
//!             |me, clock, _provider| me.clock = Some(clock),
//!             |me, _provider| me.clock = None,
//!         );
//!         Self { clock: None }
//!     }
//! }
//!
//! impl Service for Reporter {
//!     fn start(&mut self) -> StartBehaviour {
//!         StartBehaviour::Succeeded
//!     }
//!
//!     fn stop(&mut self) -> StartBehaviour {
//!         StartBehaviour::Succeeded
//!     }
//! }
//! ```

mod error;
mod handler;
mod register;
mod service;

pub use error::ServiceError;
pub use handler::{
    AnyEventInterceptor, CompletionHandler, DependencyRequest, DependencyTracker, EventHandler,
    EventInterceptor, InterceptDecision,
};
pub use register::{DependencyRegister, ErasedDependencyRegister, Injected};
pub use service::{Service, ServiceState, StartBehaviour};
