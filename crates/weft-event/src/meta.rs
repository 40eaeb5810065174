//! Event header and typed event contracts.

use std::any::Any;
use weft_types::{EventId, EventTypeId, Priority, ServiceId};

/// Immutable header carried by every dispatched event.
///
/// Handlers, interceptors and completion callbacks all observe the same
/// header; the payload (if any) is delivered separately and typed.
///
/// # Example
///
/// ```
/// use weft_event::EventMeta;
/// use weft_types::{EventId, EventTypeId, ServiceId, INTERNAL_PRIORITY};
///
/// struct Ping;
///
/// let meta = EventMeta {
///     id: EventId::from_raw(1),
///     event_type: EventTypeId::of::<Ping>(),
///     origin: ServiceId::from_raw(4),
///     priority: INTERNAL_PRIORITY,
/// };
/// assert_eq!(meta.origin.raw(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMeta {
    /// Monotonic per-manager id assigned at push time.
    pub id: EventId,
    /// Stable type id of the event.
    pub event_type: EventTypeId,
    /// Service that pushed the event; [`ServiceId::NONE`] for
    /// framework-originated events.
    pub origin: ServiceId,
    /// Scheduling priority the event was pushed with.
    pub priority: Priority,
}

/// A type usable as an event: anything with a stable [`EventTypeId`].
///
/// Implemented by user event types (usually via the provided defaults) and
/// by the runtime's framework event markers.
///
/// # Example
///
/// ```
/// use weft_event::EventKind;
///
/// struct ConfigReloaded;
/// impl EventKind for ConfigReloaded {}
///
/// assert_eq!(ConfigReloaded::event_type(), ConfigReloaded::event_type());
/// ```
pub trait EventKind: 'static {
    /// Stable type id of this event type.
    #[must_use]
    fn event_type() -> EventTypeId
    where
        Self: Sized,
    {
        EventTypeId::of::<Self>()
    }

    /// Human-readable event name for logs.
    #[must_use]
    fn event_name() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

/// A payload-carrying application event.
///
/// Blanket-implemented for every `Send` [`EventKind`]; declaring an event is
/// a one-line `impl EventKind for MyEvent {}`. The `Send` bound exists so
/// events can be pushed onto a manager's queue from other threads and
/// broadcast across communication channels.
pub trait UserEvent: EventKind + Any + Send {}

impl<T: EventKind + Any + Send> UserEvent for T {}
