//! Identifier types for Weft.
//!
//! Counter-issued identifiers ([`ServiceId`], [`ManagerId`], [`EventId`]) are
//! 64-bit and monotonically increasing; hash-derived identifiers
//! ([`InterfaceId`], [`EventTypeId`]) are stable FNV-1a hashes of a fully
//! qualified type name, so the same interface always maps to the same id in
//! every process.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scheduling priority of an event. **Lower value = dispatched earlier.**
///
/// Priorities are a contract between services sharing one manager; the queue
/// applies no fairness or starvation mitigation.
pub type Priority = u64;

/// Baseline priority used for framework events and for pushes that do not
/// specify one.
pub const INTERNAL_PRIORITY: Priority = 1000;

/// Identifier of a service within one process.
///
/// Issued from a process-wide monotonic counter starting at 1. Once a service
/// reaches its uninstalled state its id is never reused.
///
/// # Example
///
/// ```
/// use weft_types::ServiceId;
///
/// let id = ServiceId::from_raw(7);
/// assert_eq!(id.raw(), 7);
/// assert!(!id.is_none());
/// assert!(ServiceId::NONE.is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(u64);

impl ServiceId {
    /// Sentinel meaning "no service" (framework-originated events, rejected
    /// lookups).
    pub const NONE: ServiceId = ServiceId(0);

    /// Wraps a raw id. Intended for the runtime's counter and for tests.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is the [`NONE`](Self::NONE) sentinel.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "svc:{}", self.0)
    }
}

/// Globally unique identifier of a service instance.
///
/// Complements [`ServiceId`]: the counter id is compact and process-local,
/// the gid survives log aggregation across processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceGid(pub Uuid);

impl ServiceGid {
    /// Creates a new random gid.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ServiceGid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ServiceGid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gid:{}", self.0)
    }
}

/// Identifier of a `DependencyManager`.
///
/// Each manager owns one event queue and runs on one OS thread; the id is
/// the key under which a communication channel addresses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManagerId(u64);

impl ManagerId {
    /// Wraps a raw id. Intended for the runtime's counter and for tests.
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

impl std::fmt::Display for ManagerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mgr:{}", self.0)
    }
}

/// Stable identifier of an interface contract.
///
/// Derived from the interface's fully qualified type name with FNV-1a, so it
/// is a deterministic compile-time-stable constant per interface.
///
/// # Example
///
/// ```
/// use weft_types::InterfaceId;
///
/// trait Greeter {}
///
/// let a = InterfaceId::of::<dyn Greeter>();
/// let b = InterfaceId::of::<dyn Greeter>();
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceId(u64);

impl InterfaceId {
    /// Returns the id of interface type `I`.
    ///
    /// `I` is usually a `dyn Trait`; any `'static` type works.
    #[must_use]
    pub fn of<I: ?Sized + 'static>() -> Self {
        Self(fnv1a(std::any::type_name::<I>().as_bytes()))
    }

    /// Wraps a raw hash value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit hash.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "iface:{:016x}", self.0)
    }
}

/// Stable identifier of an event type.
///
/// Same derivation as [`InterfaceId`], kept distinct so handler tables and
/// injection tables cannot be crossed by accident. The value zero is reserved
/// and means "any event" in interceptor registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventTypeId(u64);

impl EventTypeId {
    /// Reserved id matching every event type (interceptor wildcard).
    pub const ANY: EventTypeId = EventTypeId(0);

    /// Returns the id of event type `E`.
    #[must_use]
    pub fn of<E: ?Sized + 'static>() -> Self {
        Self(fnv1a(std::any::type_name::<E>().as_bytes()))
    }

    /// Wraps a raw hash value. Used by the runtime for the reserved
    /// framework event ids.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit hash.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is the [`ANY`](Self::ANY) wildcard.
    #[must_use]
    pub const fn is_any(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for EventTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evty:{:016x}", self.0)
    }
}

/// Identifier of a pushed event.
///
/// Issued monotonically per manager at push time. Ids are unique and
/// strictly increasing in push order; priority scheduling may reorder
/// execution, never ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(u64);

impl EventId {
    /// Sentinel returned by pushes that were silently dropped (queue already
    /// shut down).
    pub const NONE: EventId = EventId(0);

    /// Wraps a raw id.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is the [`NONE`](Self::NONE) sentinel.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evt:{}", self.0)
    }
}

/// FNV-1a, 64-bit. Stable across platforms and compilations, unlike
/// `std::any::TypeId` hashing.
const fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        i += 1;
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    trait IfaceA {}
    trait IfaceB {}

    struct EventA;
    struct EventB;

    #[test]
    fn service_id_sentinel() {
        assert!(ServiceId::NONE.is_none());
        assert!(!ServiceId::from_raw(1).is_none());
        assert_eq!(ServiceId::from_raw(1).raw(), 1);
    }

    #[test]
    fn interface_id_deterministic() {
        assert_eq!(InterfaceId::of::<dyn IfaceA>(), InterfaceId::of::<dyn IfaceA>());
        assert_ne!(InterfaceId::of::<dyn IfaceA>(), InterfaceId::of::<dyn IfaceB>());
    }

    #[test]
    fn event_type_id_deterministic() {
        assert_eq!(EventTypeId::of::<EventA>(), EventTypeId::of::<EventA>());
        assert_ne!(EventTypeId::of::<EventA>(), EventTypeId::of::<EventB>());
        assert!(!EventTypeId::of::<EventA>().is_any());
        assert!(EventTypeId::ANY.is_any());
    }

    #[test]
    fn event_id_ordering_follows_raw() {
        let a = EventId::from_raw(1);
        let b = EventId::from_raw(2);
        assert!(a < b);
        assert!(EventId::NONE.is_none());
    }

    #[test]
    fn gid_unique_per_instance() {
        assert_ne!(ServiceGid::new(), ServiceGid::new());
    }

    #[test]
    fn display_formats() {
        assert_eq!(ServiceId::from_raw(3).to_string(), "svc:3");
        assert_eq!(ManagerId::from_raw(2).to_string(), "mgr:2");
        assert_eq!(EventId::from_raw(9).to_string(), "evt:9");
    }
}
