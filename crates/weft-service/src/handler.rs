//! Callback traits a service implements to participate in dispatch.

use weft_event::{AsyncGenerator, EventError, EventKind, EventMeta, UserEvent};
use weft_types::{Dependency, Properties, ServiceId};

use crate::Service;

/// Verdict of a pre-interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptDecision {
    /// Let handlers (and later interceptors) see the event.
    Allow,
    /// Veto: no handler runs. Post-interceptors that already ran their pre
    /// step still observe the event with `processed = false`.
    Prevent,
}

/// Handler for a user event type.
///
/// The returned generator may do all its work before first suspending, or
/// await [`AsyncAutoResetEvent`](weft_event::AsyncAutoResetEvent)s /
/// other generators; the manager advances it and fires the originator's
/// completion (or error) callback once every handler of the event has
/// finished.
///
/// The generator must be `'static`: capture clones of what it needs, not
/// `self` borrows.
pub trait EventHandler<E: UserEvent>: Service {
    /// Called once per matching dispatched event.
    fn handle_event(&mut self, event: &E, meta: &EventMeta) -> AsyncGenerator<()>;
}

/// Interceptor for a specific event type.
///
/// Pre-interceptors run before dispatch in global registration order; any
/// [`Prevent`](InterceptDecision::Prevent) short-circuits handling.
/// Post-interceptors run after dispatch in reverse order of the pres that
/// ran, with `processed` telling whether handlers actually saw the event.
pub trait EventInterceptor<E: EventKind>: Service {
    /// Observe (and possibly veto) an event before dispatch.
    fn pre_intercept(&mut self, meta: &EventMeta) -> InterceptDecision {
        let _ = meta;
        InterceptDecision::Allow
    }

    /// Observe an event after dispatch.
    fn post_intercept(&mut self, meta: &EventMeta, processed: bool) {
        let _ = (meta, processed);
    }
}

/// Interceptor for *every* event, framework events included.
///
/// Registered under the wildcard target; fires interleaved with typed
/// interceptors in global registration order.
pub trait AnyEventInterceptor: Service {
    /// Observe (and possibly veto) any event before dispatch.
    fn pre_intercept(&mut self, meta: &EventMeta) -> InterceptDecision {
        let _ = meta;
        InterceptDecision::Allow
    }

    /// Observe any event after dispatch.
    fn post_intercept(&mut self, meta: &EventMeta, processed: bool) {
        let _ = (meta, processed);
    }
}

/// Completion and error callbacks for events a service pushes.
///
/// At most one registration per `(owner, event type)` pair. The completion
/// callback fires once all handlers of an event pushed by `owner` have
/// finished; the error callback fires instead if any handler faulted.
pub trait CompletionHandler<E: EventKind>: Service {
    /// All handlers of the event completed without fault.
    fn handle_completion(&mut self, meta: &EventMeta) {
        let _ = meta;
    }

    /// At least one handler faulted.
    fn handle_error(&mut self, meta: &EventMeta, error: &EventError) {
        let _ = (meta, error);
    }
}

/// A dependency request as trackers observe it.
///
/// Produced when a service declaring a dependency is created (request) and
/// when it is removed (undo request).
#[derive(Debug, Clone)]
pub struct DependencyRequest {
    /// Service that declared the dependency.
    pub requestor: ServiceId,
    /// The declared slot.
    pub dependency: Dependency,
    /// Properties attached to the declaration, if any.
    pub properties: Option<Properties>,
}

/// Observer of dependency requests for one interface.
///
/// The factory-service hook: a tracker typically materializes a provider
/// per requestor on request, and tears it down again on the undo request.
/// A provider created this way must carry a
/// [`Filter`](weft_types::Filter) matching only the requestor, so the
/// injection machinery does not wire it to unintended consumers.
pub trait DependencyTracker<I: ?Sized + 'static>: Service {
    /// A service declared a dependency on `I`.
    fn on_request(&mut self, request: &DependencyRequest);

    /// A service declaring a dependency on `I` is being removed.
    fn on_undo_request(&mut self, request: &DependencyRequest);
}
