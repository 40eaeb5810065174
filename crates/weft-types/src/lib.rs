//! Core value types for the Weft service container.
//!
//! Weft is a per-thread service container and prioritized event loop:
//! applications declare services that expose typed interfaces and depend on
//! other interfaces; a per-thread manager constructs them, injects satisfied
//! dependencies, drives their lifecycle, and mediates all communication as
//! prioritized events.
//!
//! # Crate Architecture
//!
//! This crate is the leaf of the **SDK layer**:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        SDK Layer                            │
//! │  (stable, safe for service crates to depend on)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  weft-types   : ids, Priority, Properties, Filter ◄── HERE  │
//! │  weft-event   : EventMeta, AsyncGenerator, awaitables       │
//! │  weft-service : Service trait, DependencyRegister           │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Runtime Layer                          │
//! │  weft-runtime : EventQueue, DependencyManager, Channel      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Identity Model
//!
//! | Type | Width | Issued |
//! |------|-------|--------|
//! | [`ServiceId`] | 64-bit counter | at service construction, process-wide |
//! | [`ServiceGid`] | UUID v4 | at service construction, globally unique |
//! | [`ManagerId`] | 64-bit counter | at manager creation, process-wide |
//! | [`InterfaceId`] | 64-bit name hash | deterministic per interface type |
//! | [`EventTypeId`] | 64-bit name hash | deterministic per event type |
//! | [`EventId`] | 64-bit counter | at push time, per manager |
//!
//! Zero is the universal sentinel: [`ServiceId::NONE`] means "no service",
//! [`EventId::NONE`] means "push rejected", and an [`EventTypeId`] of zero in
//! an interceptor table means "any event".
//!
//! # Error Handling
//!
//! All Weft error types implement [`ErrorCode`] for unified handling:
//! a stable UPPER_SNAKE_CASE code plus a recoverability flag.

mod dependency;
mod error;
mod filter;
mod id;
mod properties;

pub use dependency::Dependency;
pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use filter::{Filter, FilterEntry};
pub use id::{
    EventId, EventTypeId, InterfaceId, ManagerId, Priority, ServiceGid, ServiceId,
    INTERNAL_PRIORITY,
};
pub use properties::{keys, LogLevel, Properties, PropertyValue};
