//! Queued events and the framework event set.
//!
//! Every queue entry is an [`Event`]: the immutable
//! [`EventMeta`](weft_event::EventMeta) header plus an [`EventPayload`].
//! Framework payloads drive the lifecycle machinery; `User` payloads fan
//! out to registered handlers.
//!
//! The marker types ([`QuitEvent`], [`StartServiceEvent`], …) exist so
//! framework events can be addressed by type in the generic registration
//! APIs — intercepting `QuitEvent`, or registering completion callbacks for
//! `RunFunctionEvent`, works exactly like it does for user events.

use crate::context::ManagerRef;
use std::any::Any;
use weft_event::{AsyncGenerator, EventKind, EventMeta, ResumeToken};
use weft_service::DependencyRequest;
use weft_types::{EventTypeId, ServiceId};

/// A function queued for execution on the manager's thread.
///
/// `Send` so other threads can queue work; the returned generator is
/// created and driven on the loop thread.
pub type QueuedFunction = Box<dyn FnOnce(&ManagerRef) -> AsyncGenerator<()> + Send>;

/// One entry in a manager's queue.
pub struct Event {
    /// Immutable header.
    pub meta: EventMeta,
    /// Typed payload.
    pub payload: EventPayload,
}

/// Payload of a queued event.
pub enum EventPayload {
    /// A service declared a dependency; trackers may materialize a provider.
    DependencyRequest(DependencyRequest),
    /// A service declaring a dependency is going away; trackers tear down
    /// what they materialized for it.
    DependencyUndoRequest(DependencyRequest),
    /// The given service became active; interested dependents get injected.
    DependencyOnline {
        /// The provider that came up.
        service: ServiceId,
    },
    /// The given service is no longer active; dependents get un-injected.
    DependencyOffline {
        /// The provider that went away.
        service: ServiceId,
    },
    /// Start the given service if it is installed.
    StartService(ServiceId),
    /// Stop the given service if it is active.
    ///
    /// Stopping is a two-pass sequence: the first pass emits
    /// `DependencyOffline` for the service and requeues itself with
    /// `dependencies_offline` set, so every dependent's remove callback runs
    /// before the service's own `stop()` does.
    StopService {
        /// The service to stop.
        service: ServiceId,
        /// Whether the offline event for this service has already been
        /// dispatched.
        dependencies_offline: bool,
    },
    /// Stop (if needed) and unregister the given service.
    RemoveService(ServiceId),
    /// Run a queued function on the loop thread.
    RunFunction(QueuedFunction),
    /// Resume the suspended generator identified by the token.
    Continuable(ResumeToken),
    /// Drain the queue, stop all services, exit the loop.
    Quit,
    /// Application event, delivered to registered handlers.
    User(Box<dyn Any + Send>),
}

impl std::fmt::Debug for EventPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DependencyRequest(r) => write!(f, "DependencyRequest({})", r.requestor),
            Self::DependencyUndoRequest(r) => write!(f, "DependencyUndoRequest({})", r.requestor),
            Self::DependencyOnline { service } => write!(f, "DependencyOnline({service})"),
            Self::DependencyOffline { service } => write!(f, "DependencyOffline({service})"),
            Self::StartService(id) => write!(f, "StartService({id})"),
            Self::StopService {
                service,
                dependencies_offline,
            } => write!(f, "StopService({service}, offline={dependencies_offline})"),
            Self::RemoveService(id) => write!(f, "RemoveService({id})"),
            Self::RunFunction(_) => write!(f, "RunFunction"),
            Self::Continuable(token) => write!(f, "Continuable({token})"),
            Self::Quit => write!(f, "Quit"),
            Self::User(_) => write!(f, "User"),
        }
    }
}

macro_rules! framework_events {
    ($(($marker:ident, $constant:ident, $doc:literal)),+ $(,)?) => {
        $(
            #[doc = $doc]
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub struct $marker;

            impl EventKind for $marker {}

            #[doc = concat!("Type id of [`", stringify!($marker), "`].")]
            pub(crate) fn $constant() -> EventTypeId {
                <$marker as EventKind>::event_type()
            }
        )+
    };
}

framework_events!(
    (DependencyRequestEvent, dependency_request_event, "Marker for dependency-request events."),
    (
        DependencyUndoRequestEvent,
        dependency_undo_request_event,
        "Marker for dependency-undo-request events."
    ),
    (DependencyOnlineEvent, dependency_online_event, "Marker for dependency-online events."),
    (DependencyOfflineEvent, dependency_offline_event, "Marker for dependency-offline events."),
    (StartServiceEvent, start_service_event, "Marker for start-service events."),
    (StopServiceEvent, stop_service_event, "Marker for stop-service events."),
    (RemoveServiceEvent, remove_service_event, "Marker for remove-service events."),
    (RunFunctionEvent, run_function_event, "Marker for queued-function events."),
    (ContinuableEvent, continuable_event, "Marker for generator-resumption events."),
    (QuitEvent, quit_event, "Marker for the quit event."),
);
