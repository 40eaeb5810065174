//! The per-thread dependency manager and its run loop.
//!
//! One [`DependencyManager`] per OS thread: it owns the queue, the service
//! registry and the handler tables, and runs the cooperative
//! drain-one-event → dispatch → repeat loop. Everything except queue pushes
//! is confined to the owning thread by construction — the manager types are
//! `!Send`, and the only cross-thread surface is the
//! [`QueueHandle`](crate::QueueHandle).
//!
//! # Dispatch
//!
//! For every dequeued event:
//!
//! 1. Pre-interceptors run in global registration order (type-matched and
//!    wildcard entries interleaved). Any `Prevent` short-circuits handling.
//! 2. Framework events drive the lifecycle machinery; user events fan out
//!    to matching, live handlers, each returning a generator that is
//!    advanced to its first suspension.
//! 3. Once the last handler generator of an event finishes, the
//!    `(origin, type)` completion callback fires — or the error callback,
//!    if any handler faulted.
//! 4. Post-interceptors run in reverse order of the pres that ran, with
//!    `processed` reporting whether handlers saw the event.

use crate::channel::CommunicationChannel;
use crate::config::ManagerConfig;
use crate::context::{ManagerRef, ServiceContext};
use crate::event::{self, Event, EventPayload, QueuedFunction};
use crate::lifecycle::{LifecycleHandle, LifecycleManager, ServiceSpec};
use crate::queue::{EventQueue, QueueHandle};
use crate::registration::{
    CompletionRegistration, DependencyTrackerRegistration, EventHandlerRegistration,
    EventInterceptorRegistration,
};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use weft_event::{
    with_resume_context, AsyncGenerator, EventError, EventKind, EventMeta, ResumeContext,
    ResumeToken, Step, UserEvent,
};
use weft_service::{
    AnyEventInterceptor, CompletionHandler, DependencyRequest, DependencyTracker, EventHandler,
    EventInterceptor, InterceptDecision, Service, ServiceError, ServiceState,
};
use weft_types::{
    EventId, EventTypeId, InterfaceId, ManagerId, Priority, ServiceId,
};

static NEXT_SERVICE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct HandlerEntry {
    owner: ServiceId,
    filter: Option<ServiceId>,
    seq: u64,
    invoke: Rc<dyn Fn(&Event) -> Option<AsyncGenerator<()>>>,
}

pub(crate) struct InterceptorEntry {
    target: Option<EventTypeId>,
    seq: u64,
    pre: Rc<dyn Fn(&EventMeta) -> Option<InterceptDecision>>,
    post: Rc<dyn Fn(&EventMeta, bool)>,
}

struct CompletionEntry {
    seq: u64,
    on_complete: Rc<dyn Fn(&EventMeta)>,
    on_error: Rc<dyn Fn(&EventMeta, &EventError)>,
}

struct TrackerEntry {
    seq: u64,
    on_request: Rc<dyn Fn(&DependencyRequest)>,
    on_undo: Rc<dyn Fn(&DependencyRequest)>,
}

struct SuspendedGenerator {
    generator: AsyncGenerator<()>,
    owner: ServiceId,
    priority: Priority,
    completion: Option<Rc<PendingCompletion>>,
}

/// Tracks the asynchronous completion of one dispatched event across all of
/// its handler generators.
struct PendingCompletion {
    meta: EventMeta,
    remaining: Cell<usize>,
    fault: RefCell<Option<EventError>>,
}

pub(crate) struct DmCore {
    id: ManagerId,
    name: String,
    config: ManagerConfig,
    queue: Arc<EventQueue>,
    services: RefCell<BTreeMap<ServiceId, Rc<dyn LifecycleHandle>>>,
    handlers: RefCell<HashMap<EventTypeId, Vec<HandlerEntry>>>,
    interceptors: RefCell<Vec<InterceptorEntry>>,
    completions: RefCell<HashMap<(ServiceId, EventTypeId), CompletionEntry>>,
    trackers: RefCell<HashMap<InterfaceId, Vec<TrackerEntry>>>,
    suspended: RefCell<HashMap<ResumeToken, SuspendedGenerator>>,
    next_token: Cell<u64>,
    next_seq: Cell<u64>,
    channel: RefCell<Option<CommunicationChannel>>,
    quitting: Cell<bool>,
    running: Cell<bool>,
}

/// Per-thread service container and event loop.
///
/// Dereferences to [`ManagerRef`], which carries the whole same-thread API;
/// [`start`](Self::start) runs the loop on the calling thread until a quit
/// event drains.
///
/// # Example
///
/// ```no_run
/// use weft_runtime::{DependencyManager, ServiceSpec};
/// use weft_service::{Service, StartBehaviour};
///
/// struct QuitOnStart(weft_runtime::ServiceContext);
///
/// impl Service for QuitOnStart {
///     fn start(&mut self) -> StartBehaviour {
///         self.0.push_quit();
///         StartBehaviour::Succeeded
///     }
///     fn stop(&mut self) -> StartBehaviour {
///         StartBehaviour::Succeeded
///     }
/// }
///
/// let dm = DependencyManager::new();
/// dm.create_service(ServiceSpec::new(|_reg, _props, ctx| QuitOnStart(ctx.clone())))
///     .unwrap();
/// dm.start(); // returns once the quit drains
/// ```
pub struct DependencyManager {
    handle: ManagerRef,
}

impl Default for DependencyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyManager {
    /// Creates a manager with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    /// Creates a manager with an explicit configuration.
    #[must_use]
    pub fn with_config(config: ManagerConfig) -> Self {
        let id = ManagerId::from_raw(NEXT_MANAGER_ID.fetch_add(1, Ordering::AcqRel));
        let name = config.name.clone().unwrap_or_else(|| id.to_string());
        let core = Rc::new(DmCore {
            id,
            name,
            config,
            queue: EventQueue::new(),
            services: RefCell::new(BTreeMap::new()),
            handlers: RefCell::new(HashMap::new()),
            interceptors: RefCell::new(Vec::new()),
            completions: RefCell::new(HashMap::new()),
            trackers: RefCell::new(HashMap::new()),
            suspended: RefCell::new(HashMap::new()),
            next_token: Cell::new(1),
            next_seq: Cell::new(1),
            channel: RefCell::new(None),
            quitting: Cell::new(false),
            running: Cell::new(false),
        });
        Self {
            handle: ManagerRef { core },
        }
    }

    /// A cloneable same-thread handle to this manager.
    #[must_use]
    pub fn handle(&self) -> ManagerRef {
        self.handle.clone()
    }

    /// Runs the event loop on the calling thread.
    ///
    /// Returns after a quit event was dispatched, the queue drained, and
    /// every service was uninstalled.
    pub fn start(&self) {
        let core = &self.handle.core;
        core.running.set(true);
        tracing::info!(manager = %core.name, "manager started");

        loop {
            let popped = if core.quitting.get() {
                core.queue.try_pop()
            } else {
                core.queue.pop_highest()
            };
            match popped {
                Some(event) => {
                    core.dispatch(event);
                    core.queue.dispatch_done();
                }
                None => break,
            }
        }

        core.teardown();
        core.running.set(false);
        tracing::info!(manager = %core.name, "manager stopped");
    }
}

impl std::ops::Deref for DependencyManager {
    type Target = ManagerRef;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl ManagerRef {
    /// This manager's id.
    #[must_use]
    pub fn id(&self) -> ManagerId {
        self.core.id
    }

    /// `true` while the loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.core.running.get()
    }

    /// The `Send + Sync` cross-thread push surface of this manager.
    #[must_use]
    pub fn queue_handle(&self) -> QueueHandle {
        QueueHandle {
            queue: self.core.queue.clone(),
        }
    }

    /// The communication channel this manager is registered with, if any.
    #[must_use]
    pub fn communication_channel(&self) -> Option<CommunicationChannel> {
        self.core.channel.borrow().clone()
    }

    pub(crate) fn set_channel(&self, channel: Option<CommunicationChannel>) {
        *self.core.channel.borrow_mut() = channel;
    }

    /// Pushes a user event at the manager's default priority.
    ///
    /// Returns [`EventId::NONE`] once the manager is quitting.
    pub fn push_event<E: UserEvent>(&self, origin: ServiceId, payload: E) -> EventId {
        self.push_prioritised_event(origin, self.core.config.default_priority, payload)
    }

    /// Pushes a user event at an explicit priority.
    pub fn push_prioritised_event<E: UserEvent>(
        &self,
        origin: ServiceId,
        priority: Priority,
        payload: E,
    ) -> EventId {
        self.core.queue.push(
            origin,
            priority,
            E::event_type(),
            EventPayload::User(Box::new(payload)),
            false,
        )
    }

    /// Pushes the quit event.
    pub fn push_quit(&self, origin: ServiceId) -> EventId {
        self.core.queue.push(
            origin,
            self.core.config.default_priority,
            event::quit_event(),
            EventPayload::Quit,
            false,
        )
    }

    /// Queues a function for execution on the loop thread at the default
    /// priority.
    ///
    /// The function runs inside dispatch and may return a generator that
    /// suspends on awaitables.
    pub fn run_function(
        &self,
        origin: ServiceId,
        f: impl FnOnce(&ManagerRef) -> AsyncGenerator<()> + Send + 'static,
    ) -> EventId {
        self.run_function_prioritised(origin, self.core.config.default_priority, f)
    }

    /// Queues a function at an explicit priority.
    pub fn run_function_prioritised(
        &self,
        origin: ServiceId,
        priority: Priority,
        f: impl FnOnce(&ManagerRef) -> AsyncGenerator<()> + Send + 'static,
    ) -> EventId {
        let queued: QueuedFunction = Box::new(f);
        self.core.queue.push(
            origin,
            priority,
            event::run_function_event(),
            EventPayload::RunFunction(queued),
            false,
        )
    }

    /// Constructs and registers a service, emits its initial events, and
    /// returns its id.
    ///
    /// Already-active providers are injected before the initial
    /// start-service event is dispatched, so a consumer created after its
    /// provider observes injection strictly before its own `start()`.
    pub fn create_service<S: Service>(&self, spec: ServiceSpec<S>) -> Result<ServiceId, ServiceError> {
        self.core.create_service(self, spec)
    }

    /// Pushes a remove-service event: stop if needed, notify trackers,
    /// unregister. The id is never reused.
    pub fn remove_service(&self, origin: ServiceId, service: ServiceId) -> EventId {
        self.core.queue.push(
            origin,
            self.core.config.default_priority,
            event::remove_service_event(),
            EventPayload::RemoveService(service),
            false,
        )
    }

    /// Current lifecycle state of a service.
    #[must_use]
    pub fn service_state(&self, service: ServiceId) -> Option<ServiceState> {
        self.core.service(service).map(|s| s.state())
    }

    /// Number of registered services.
    #[must_use]
    pub fn service_count(&self) -> usize {
        self.core.services.borrow().len()
    }

    /// Blocks until no events are queued, none is dispatching, and no
    /// generator is suspended.
    ///
    /// Must not be called from the loop thread itself.
    pub fn wait_for_empty_queue(&self) {
        self.core.queue.wait_for_empty();
    }

    /// Registers `owner` as handler for user events of type `E`.
    ///
    /// With a `filter`, only events originating from that service are
    /// delivered. The registration is RAII-scoped.
    pub fn register_event_handler<E, S>(
        &self,
        owner: ServiceId,
        filter: Option<ServiceId>,
    ) -> Result<EventHandlerRegistration, ServiceError>
    where
        E: UserEvent,
        S: EventHandler<E>,
    {
        let weak = self.core.instance_of::<S>(owner)?;
        let seq = self.core.next_seq();
        let invoke: Rc<dyn Fn(&Event) -> Option<AsyncGenerator<()>>> =
            Rc::new(move |event: &Event| {
                let EventPayload::User(payload) = &event.payload else {
                    return None;
                };
                let payload = payload.downcast_ref::<E>()?;
                let svc = weak.upgrade()?;
                let mut svc = svc.borrow_mut();
                Some(svc.handle_event(payload, &event.meta))
            });
        self.core
            .handlers
            .borrow_mut()
            .entry(E::event_type())
            .or_default()
            .push(HandlerEntry {
                owner,
                filter,
                seq,
                invoke,
            });
        Ok(EventHandlerRegistration::new(
            Rc::downgrade(&self.core),
            E::event_type(),
            seq,
        ))
    }

    /// Registers `owner` as interceptor for events of type `E` (framework
    /// event markers included).
    pub fn register_event_interceptor<E, S>(
        &self,
        owner: ServiceId,
    ) -> Result<EventInterceptorRegistration, ServiceError>
    where
        E: EventKind,
        S: EventInterceptor<E>,
    {
        let weak = self.core.instance_of::<S>(owner)?;
        let weak2 = weak.clone();
        self.core.add_interceptor(
            Some(E::event_type()),
            Rc::new(move |meta: &EventMeta| {
                let svc = weak.upgrade()?;
                let mut svc = svc.borrow_mut();
                Some(EventInterceptor::<E>::pre_intercept(&mut *svc, meta))
            }),
            Rc::new(move |meta: &EventMeta, processed: bool| {
                if let Some(svc) = weak2.upgrade() {
                    let mut svc = svc.borrow_mut();
                    EventInterceptor::<E>::post_intercept(&mut *svc, meta, processed);
                }
            }),
        )
    }

    /// Registers `owner` as interceptor for *every* event.
    pub fn register_any_event_interceptor<S>(
        &self,
        owner: ServiceId,
    ) -> Result<EventInterceptorRegistration, ServiceError>
    where
        S: AnyEventInterceptor,
    {
        let weak = self.core.instance_of::<S>(owner)?;
        let weak2 = weak.clone();
        self.core.add_interceptor(
            None,
            Rc::new(move |meta: &EventMeta| {
                let svc = weak.upgrade()?;
                let mut svc = svc.borrow_mut();
                Some(AnyEventInterceptor::pre_intercept(&mut *svc, meta))
            }),
            Rc::new(move |meta: &EventMeta, processed: bool| {
                if let Some(svc) = weak2.upgrade() {
                    let mut svc = svc.borrow_mut();
                    AnyEventInterceptor::post_intercept(&mut *svc, meta, processed);
                }
            }),
        )
    }

    /// Registers completion and error callbacks for events of type `E`
    /// pushed by `owner`.
    ///
    /// At most one registration per `(owner, event type)` pair.
    pub fn register_completion_callbacks<E, S>(
        &self,
        owner: ServiceId,
    ) -> Result<CompletionRegistration, ServiceError>
    where
        E: EventKind,
        S: CompletionHandler<E>,
    {
        let key = (owner, E::event_type());
        if self.core.completions.borrow().contains_key(&key) {
            return Err(ServiceError::DuplicateCompletionHandler(owner));
        }
        let weak = self.core.instance_of::<S>(owner)?;
        let weak2 = weak.clone();
        let seq = self.core.next_seq();
        self.core.completions.borrow_mut().insert(
            key,
            CompletionEntry {
                seq,
                on_complete: Rc::new(move |meta: &EventMeta| {
                    if let Some(svc) = weak.upgrade() {
                        let mut svc = svc.borrow_mut();
                        CompletionHandler::<E>::handle_completion(&mut *svc, meta);
                    }
                }),
                on_error: Rc::new(move |meta: &EventMeta, error: &EventError| {
                    if let Some(svc) = weak2.upgrade() {
                        let mut svc = svc.borrow_mut();
                        CompletionHandler::<E>::handle_error(&mut *svc, meta, error);
                    }
                }),
            },
        );
        Ok(CompletionRegistration::new(
            Rc::downgrade(&self.core),
            key,
            seq,
        ))
    }

    /// Registers `owner` as dependency tracker for interface `I`.
    ///
    /// Existing unfulfilled dependencies on `I` are queued as fresh
    /// dependency-request events, so a factory coming up late still
    /// materializes providers for earlier requestors. The replay is *not*
    /// synchronous: the tracker's `on_request` runs on a later dispatch
    /// pass, after this call (and typically the registering `start()`) has
    /// returned.
    pub fn register_dependency_tracker<I, S>(
        &self,
        owner: ServiceId,
    ) -> Result<DependencyTrackerRegistration, ServiceError>
    where
        I: ?Sized + 'static,
        S: DependencyTracker<I>,
    {
        let weak = self.core.instance_of::<S>(owner)?;
        let weak2 = weak.clone();
        let interface = InterfaceId::of::<I>();
        let on_request: Rc<dyn Fn(&DependencyRequest)> = Rc::new(move |req: &DependencyRequest| {
            if let Some(svc) = weak.upgrade() {
                let mut svc = svc.borrow_mut();
                DependencyTracker::<I>::on_request(&mut *svc, req);
            }
        });
        let on_undo: Rc<dyn Fn(&DependencyRequest)> = Rc::new(move |req: &DependencyRequest| {
            if let Some(svc) = weak2.upgrade() {
                let mut svc = svc.borrow_mut();
                DependencyTracker::<I>::on_undo_request(&mut *svc, req);
            }
        });

        // Replay existing unfulfilled requests. Replays are enqueued, not
        // delivered inline: trackers register from their owner's `start()`,
        // where the owner instance is already mutably borrowed. Trackers
        // must therefore be idempotent per requestor.
        let pending: Vec<DependencyRequest> = {
            let services = self.core.services.borrow();
            services
                .values()
                .flat_map(|svc| {
                    let requestor = svc.service_id();
                    svc.declared_dependencies()
                        .into_iter()
                        .filter(|(dep, _)| dep.interface == interface && !dep.satisfied)
                        .map(move |(dependency, properties)| DependencyRequest {
                            requestor,
                            dependency,
                            properties,
                        })
                })
                .collect()
        };
        for request in pending {
            let priority = self
                .core
                .service(request.requestor)
                .map_or(self.core.config.default_priority, |s| s.priority());
            self.core.push_internal(
                request.requestor,
                priority,
                event::dependency_request_event(),
                EventPayload::DependencyRequest(request),
            );
        }

        let seq = self.core.next_seq();
        self.core
            .trackers
            .borrow_mut()
            .entry(interface)
            .or_default()
            .push(TrackerEntry {
                seq,
                on_request,
                on_undo,
            });
        Ok(DependencyTrackerRegistration::new(
            Rc::downgrade(&self.core),
            interface,
            seq,
        ))
    }
}

impl DmCore {
    fn next_seq(&self) -> u64 {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        seq
    }

    fn next_token(&self) -> ResumeToken {
        let raw = self.next_token.get();
        self.next_token.set(raw + 1);
        ResumeToken::from_raw(raw)
    }

    fn service(&self, id: ServiceId) -> Option<Rc<dyn LifecycleHandle>> {
        self.services.borrow().get(&id).cloned()
    }

    /// Snapshot of all registered services, in registration order.
    fn service_snapshot(&self) -> Vec<Rc<dyn LifecycleHandle>> {
        self.services.borrow().values().cloned().collect()
    }

    fn instance_of<S: Service>(
        &self,
        owner: ServiceId,
    ) -> Result<Weak<RefCell<S>>, ServiceError> {
        let handle = self.service(owner).ok_or(ServiceError::NotFound(owner))?;
        let any = handle.instance_any();
        let rc: Rc<RefCell<S>> = any
            .downcast()
            .map_err(|_| ServiceError::TypeMismatch(owner))?;
        Ok(Rc::downgrade(&rc))
    }

    fn add_interceptor(
        self: &Rc<Self>,
        target: Option<EventTypeId>,
        pre: Rc<dyn Fn(&EventMeta) -> Option<InterceptDecision>>,
        post: Rc<dyn Fn(&EventMeta, bool)>,
    ) -> Result<EventInterceptorRegistration, ServiceError> {
        let seq = self.next_seq();
        self.interceptors.borrow_mut().push(InterceptorEntry {
            target,
            seq,
            pre,
            post,
        });
        Ok(EventInterceptorRegistration::new(Rc::downgrade(self), seq))
    }

    fn push_internal(&self, origin: ServiceId, priority: Priority, ty: EventTypeId, payload: EventPayload) {
        self.queue.push(origin, priority, ty, payload, true);
    }

    // ─── dispatch ───────────────────────────────────────────────────────

    pub(crate) fn dispatch(self: &Rc<Self>, event: Event) {
        let meta = event.meta;
        tracing::trace!(manager = %self.name, id = %meta.id, payload = ?event.payload, "dispatch");

        let snapshot: Vec<(Rc<dyn Fn(&EventMeta) -> Option<InterceptDecision>>, Rc<dyn Fn(&EventMeta, bool)>)> = self
            .interceptors
            .borrow()
            .iter()
            .filter(|e| e.target.map_or(true, |t| t == meta.event_type))
            .map(|e| (e.pre.clone(), e.post.clone()))
            .collect();

        // Every pre runs even after a Prevent: prevention suppresses
        // handling, not later interceptors, and every pre that ran gets its
        // post.
        let mut ran = Vec::with_capacity(snapshot.len());
        let mut prevented = false;
        for (pre, post) in &snapshot {
            match pre(&meta) {
                None => continue, // owner gone
                Some(decision) => {
                    ran.push(post);
                    if decision == InterceptDecision::Prevent {
                        prevented = true;
                    }
                }
            }
        }

        let processed = if prevented {
            false
        } else {
            self.dispatch_inner(event)
        };

        for post in ran.iter().rev() {
            post(&meta, processed);
        }
    }

    fn dispatch_inner(self: &Rc<Self>, event: Event) -> bool {
        let meta = event.meta;
        match event.payload {
            EventPayload::StartService(target) => {
                self.handle_start_service(target, &meta);
                true
            }
            EventPayload::StopService {
                service,
                dependencies_offline,
            } => {
                self.handle_stop_service(service, dependencies_offline, &meta);
                true
            }
            EventPayload::RemoveService(target) => {
                self.handle_remove_service(target, &meta);
                true
            }
            EventPayload::DependencyOnline { service } => {
                self.handle_dependency_online(service);
                true
            }
            EventPayload::DependencyOffline { service } => {
                if let Some(provider) = self.service(service) {
                    self.uninject_provider(provider.as_ref());
                }
                true
            }
            EventPayload::DependencyRequest(request) => {
                self.deliver_to_trackers(&request, false);
                true
            }
            EventPayload::DependencyUndoRequest(request) => {
                self.deliver_to_trackers(&request, true);
                true
            }
            EventPayload::RunFunction(f) => {
                let manager = ManagerRef { core: self.clone() };
                let generator = f(&manager);
                let completion = Rc::new(PendingCompletion {
                    meta,
                    remaining: Cell::new(1),
                    fault: RefCell::new(None),
                });
                self.drive_generator(generator, meta.origin, meta.priority, Some(completion));
                true
            }
            EventPayload::Continuable(token) => {
                self.handle_continuable(token);
                true
            }
            EventPayload::Quit => {
                self.handle_quit(&meta);
                true
            }
            EventPayload::User(_) => self.dispatch_user(&event),
        }
    }

    fn dispatch_user(self: &Rc<Self>, event: &Event) -> bool {
        let meta = event.meta;
        let entries: Vec<(ServiceId, Option<ServiceId>, Rc<dyn Fn(&Event) -> Option<AsyncGenerator<()>>>)> = self
            .handlers
            .borrow()
            .get(&meta.event_type)
            .map(|list| {
                list.iter()
                    .map(|e| (e.owner, e.filter, e.invoke.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let completion = Rc::new(PendingCompletion {
            meta,
            remaining: Cell::new(0),
            fault: RefCell::new(None),
        });

        let mut ran = 0usize;
        for (owner, filter, invoke) in entries {
            if filter.is_some_and(|f| f != meta.origin) {
                continue;
            }
            // A pending event targeting a stopped service is dropped
            // silently at dispatch time.
            let live = self.service(owner).is_some_and(|s| s.state().is_live());
            if !live {
                continue;
            }
            let Some(generator) = invoke(event) else {
                continue;
            };
            ran += 1;
            completion.remaining.set(completion.remaining.get() + 1);
            self.drive_generator(generator, owner, meta.priority, Some(completion.clone()));
        }

        if ran == 0 {
            tracing::trace!(manager = %self.name, event_type = %meta.event_type, "no live handler");
        }
        ran > 0
    }

    // ─── generators ─────────────────────────────────────────────────────

    fn drive_generator(
        self: &Rc<Self>,
        generator: AsyncGenerator<()>,
        owner: ServiceId,
        priority: Priority,
        completion: Option<Rc<PendingCompletion>>,
    ) {
        let token = self.next_token();
        self.advance_generator(generator, token, owner, priority, completion);
    }

    fn advance_generator(
        self: &Rc<Self>,
        mut generator: AsyncGenerator<()>,
        token: ResumeToken,
        owner: ServiceId,
        priority: Priority,
        completion: Option<Rc<PendingCompletion>>,
    ) {
        let ctx = ResumeContext {
            token,
            scheduler: self.queue.clone(),
            priority,
        };
        loop {
            let step = with_resume_context(ctx.clone(), || generator.advance());
            match step {
                Step::Yielded(()) => continue,
                Step::Suspended => {
                    self.queue.add_suspended();
                    self.suspended.borrow_mut().insert(
                        token,
                        SuspendedGenerator {
                            generator,
                            owner,
                            priority,
                            completion,
                        },
                    );
                    return;
                }
                Step::Finished(result) => {
                    self.generator_finished(result, completion);
                    return;
                }
            }
        }
    }

    fn handle_continuable(self: &Rc<Self>, token: ResumeToken) {
        let Some(entry) = self.suspended.borrow_mut().remove(&token) else {
            // The owning service stopped and the generator was cancelled.
            tracing::trace!(manager = %self.name, %token, "stale resume token");
            return;
        };
        self.queue.remove_suspended();
        self.advance_generator(
            entry.generator,
            token,
            entry.owner,
            entry.priority,
            entry.completion,
        );
    }

    fn generator_finished(
        &self,
        result: Result<(), EventError>,
        completion: Option<Rc<PendingCompletion>>,
    ) {
        let fault = match result {
            Ok(()) | Err(EventError::Cancelled) => None,
            Err(err) => Some(err),
        };
        match completion {
            Some(pending) => {
                if let Some(err) = fault {
                    *pending.fault.borrow_mut() = Some(err);
                }
                let left = pending.remaining.get().saturating_sub(1);
                pending.remaining.set(left);
                if left == 0 {
                    self.fire_completion(&pending);
                }
            }
            None => {
                if let Some(err) = fault {
                    tracing::warn!(manager = %self.name, %err, "unhandled handler fault");
                }
            }
        }
    }

    fn fire_completion(&self, pending: &PendingCompletion) {
        let meta = pending.meta;
        if meta.origin.is_none() {
            return;
        }
        // Callbacks only fire while the originator is active.
        let active = self
            .service(meta.origin)
            .is_some_and(|s| s.state() == ServiceState::Active);
        if !active {
            return;
        }

        let entry = self
            .completions
            .borrow()
            .get(&(meta.origin, meta.event_type))
            .map(|e| (e.on_complete.clone(), e.on_error.clone()));

        let fault = pending.fault.borrow().clone();
        match (fault, entry) {
            (Some(err), Some((_, on_error))) => on_error(&meta, &err),
            (Some(err), None) => {
                tracing::warn!(manager = %self.name, origin = %meta.origin, %err, "handler fault without error callback");
            }
            (None, Some((on_complete, _))) => on_complete(&meta),
            (None, None) => {}
        }
    }

    fn cancel_generators_of(&self, owner: ServiceId) {
        let tokens: Vec<ResumeToken> = self
            .suspended
            .borrow()
            .iter()
            .filter(|(_, s)| s.owner == owner)
            .map(|(t, _)| *t)
            .collect();
        for token in tokens {
            if let Some(mut entry) = self.suspended.borrow_mut().remove(&token) {
                self.queue.remove_suspended();
                entry.generator.request_cancellation();
                self.generator_finished(Err(EventError::Cancelled), entry.completion);
                tracing::trace!(manager = %self.name, %owner, %token, "generator cancelled");
            }
        }
    }

    // ─── lifecycle ──────────────────────────────────────────────────────

    fn create_service<S: Service>(
        self: &Rc<Self>,
        manager: &ManagerRef,
        spec: ServiceSpec<S>,
    ) -> Result<ServiceId, ServiceError> {
        let service_id = ServiceId::from_raw(NEXT_SERVICE_ID.fetch_add(1, Ordering::AcqRel));
        let priority = spec
            .priority
            .or_else(|| spec.properties.priority())
            .unwrap_or(self.config.default_priority);
        let properties = Rc::new(RefCell::new(spec.properties));

        let ctx = ServiceContext {
            service_id,
            priority,
            properties: properties.clone(),
            manager: manager.clone(),
        };

        let mut register = weft_service::DependencyRegister::new();
        let instance = {
            let props = properties.borrow();
            (spec.ctor)(&mut register, &props, &ctx)?
        };

        let lifecycle = LifecycleManager::new(
            service_id,
            priority,
            properties,
            spec.interfaces,
            register,
            instance,
        );
        tracing::debug!(manager = %self.name, service = %service_id, name = lifecycle.name(), "service registered");

        // Inject already-active providers before the initial start event, so
        // consumers created after their providers observe inject-before-start.
        for provider in self.service_snapshot() {
            if provider.state() == ServiceState::Active {
                lifecycle.inject_from(provider.as_ref());
            }
        }

        self.services
            .borrow_mut()
            .insert(service_id, lifecycle.clone());

        for (dependency, props) in lifecycle.declared_dependencies() {
            self.push_internal(
                service_id,
                priority,
                event::dependency_request_event(),
                EventPayload::DependencyRequest(DependencyRequest {
                    requestor: service_id,
                    dependency,
                    properties: props,
                }),
            );
        }

        // Start inline, so a consumer created after its provider observes
        // inject-before-start; the start-service event only carries retries
        // and revivals.
        let handle: Rc<dyn LifecycleHandle> = lifecycle;
        self.start_service_now(&handle, None);
        Ok(service_id)
    }

    fn handle_start_service(self: &Rc<Self>, target: ServiceId, meta: &EventMeta) {
        let Some(handle) = self.service(target) else {
            return;
        };
        if handle.state() != ServiceState::Installed {
            tracing::trace!(manager = %self.name, service = %target, state = %handle.state(), "start dropped");
            return;
        }
        self.start_service_now(&handle, Some(meta));
    }

    /// The start sequence. User `start()` runs in Starting regardless of
    /// dependency satisfaction; the service then waits in Injecting until
    /// every required slot is filled.
    fn start_service_now(self: &Rc<Self>, handle: &Rc<dyn LifecycleHandle>, meta: Option<&EventMeta>) {
        let target = handle.service_id();
        handle.set_state(ServiceState::Starting);
        match handle.start() {
            weft_service::StartBehaviour::Succeeded => {
                handle.set_state(ServiceState::Injecting);
                self.try_activate(handle);
            }
            weft_service::StartBehaviour::FailedAndRetry => {
                handle.set_state(ServiceState::Installed);
                self.push_internal(
                    meta.map_or(target, |m| m.origin),
                    handle.priority(),
                    event::start_service_event(),
                    EventPayload::StartService(target),
                );
            }
            weft_service::StartBehaviour::FailedDoNotRetry => {
                handle.set_state(ServiceState::Installed);
                tracing::debug!(manager = %self.name, service = %target, "start failed, not retrying");
                if let Some(meta) = meta {
                    self.fire_error_for(meta, &EventError::fault("service start failed"));
                }
            }
        }
    }

    /// Errors surfaced outside the generator path (start failures) still
    /// reach the originator's error callback.
    fn fire_error_for(&self, meta: &EventMeta, error: &EventError) {
        if meta.origin.is_none() {
            return;
        }
        let entry = self
            .completions
            .borrow()
            .get(&(meta.origin, meta.event_type))
            .map(|e| e.on_error.clone());
        if let Some(on_error) = entry {
            on_error(meta, error);
        }
    }

    fn try_activate(self: &Rc<Self>, handle: &Rc<dyn LifecycleHandle>) {
        if handle.state() != ServiceState::Injecting || !handle.all_required_satisfied() {
            return;
        }
        handle.set_state(ServiceState::Active);
        tracing::debug!(manager = %self.name, service = %handle.service_id(), name = handle.name(), "service active");
        self.push_internal(
            handle.service_id(),
            handle.priority(),
            event::dependency_online_event(),
            EventPayload::DependencyOnline {
                service: handle.service_id(),
            },
        );
    }

    fn handle_dependency_online(self: &Rc<Self>, provider_id: ServiceId) {
        let Some(provider) = self.service(provider_id) else {
            return;
        };
        if provider.state() != ServiceState::Active {
            return;
        }

        for consumer in self.service_snapshot() {
            if consumer.service_id() == provider_id {
                continue;
            }
            match consumer.state() {
                ServiceState::Installed | ServiceState::Injecting | ServiceState::Active => {}
                _ => continue,
            }
            let interested = consumer.inject_from(provider.as_ref());
            if !interested {
                continue;
            }
            match consumer.state() {
                // A provider appearing can revive a service whose start
                // previously failed for lack of it.
                ServiceState::Installed => {
                    self.push_internal(
                        provider_id,
                        consumer.priority(),
                        event::start_service_event(),
                        EventPayload::StartService(consumer.service_id()),
                    );
                }
                ServiceState::Injecting => self.try_activate(&consumer),
                _ => {}
            }
        }
    }

    /// Un-injects `provider` from every dependent. Dependents that lose a
    /// required dependency while active are enqueued for stop at their own
    /// priority.
    fn uninject_provider(self: &Rc<Self>, provider: &dyn LifecycleHandle) {
        for consumer in self.service_snapshot() {
            if !consumer.is_injected_from(provider.service_id()) {
                continue;
            }
            let lost_required = consumer.remove_from(provider);
            if lost_required && consumer.state() == ServiceState::Active {
                tracing::debug!(
                    manager = %self.name,
                    service = %consumer.service_id(),
                    provider = %provider.service_id(),
                    "required dependency lost, stopping"
                );
                self.push_internal(
                    provider.service_id(),
                    consumer.priority(),
                    event::stop_service_event(),
                    EventPayload::StopService {
                        service: consumer.service_id(),
                        dependencies_offline: false,
                    },
                );
            }
        }
    }

    /// The two-pass stop sequence.
    ///
    /// The first pass emits `DependencyOffline` for the service and requeues
    /// the stop with `dependencies_offline` set: the offline event's own
    /// dispatch un-injects every dependent, so remove callbacks run before
    /// the service's `stop()` does, and the transition is observable to
    /// interceptors like any other framework event. The second pass cancels
    /// the service's suspended generators and runs user `stop()`.
    fn handle_stop_service(
        self: &Rc<Self>,
        target: ServiceId,
        dependencies_offline: bool,
        meta: &EventMeta,
    ) {
        let Some(handle) = self.service(target) else {
            return;
        };
        if handle.state() != ServiceState::Active {
            tracing::trace!(manager = %self.name, service = %target, state = %handle.state(), "stop dropped");
            return;
        }

        if !dependencies_offline {
            self.push_internal(
                target,
                meta.priority,
                event::dependency_offline_event(),
                EventPayload::DependencyOffline { service: target },
            );
            self.push_internal(
                meta.origin,
                meta.priority,
                event::stop_service_event(),
                EventPayload::StopService {
                    service: target,
                    dependencies_offline: true,
                },
            );
            return;
        }

        // Stragglers wired between the offline event and this pass.
        self.uninject_provider(handle.as_ref());
        self.cancel_generators_of(target);

        handle.set_state(ServiceState::Stopping);
        match handle.stop() {
            weft_service::StartBehaviour::Succeeded => {
                handle.set_state(ServiceState::Installed);
                tracing::debug!(manager = %self.name, service = %target, "service stopped");
            }
            weft_service::StartBehaviour::FailedAndRetry => {
                handle.set_state(ServiceState::Active);
                self.push_internal(
                    target,
                    handle.priority(),
                    event::stop_service_event(),
                    EventPayload::StopService {
                        service: target,
                        dependencies_offline: true,
                    },
                );
            }
            weft_service::StartBehaviour::FailedDoNotRetry => {
                handle.set_state(ServiceState::Unknown);
                tracing::warn!(manager = %self.name, service = %target, "stop failed, state unknown");
            }
        }
    }

    /// Synchronous stop used by teardown only: the loop has exited and the
    /// queue is shut down, so the offline/stop events cannot be dispatched
    /// any more.
    fn stop_inline(self: &Rc<Self>, handle: &Rc<dyn LifecycleHandle>) {
        let target = handle.service_id();
        self.uninject_provider(handle.as_ref());
        self.cancel_generators_of(target);

        handle.set_state(ServiceState::Stopping);
        match handle.stop() {
            weft_service::StartBehaviour::Succeeded => {
                handle.set_state(ServiceState::Installed);
                tracing::debug!(manager = %self.name, service = %target, "service stopped");
            }
            _ => {
                // Nothing left to retry against at teardown.
                handle.set_state(ServiceState::Unknown);
                tracing::warn!(manager = %self.name, service = %target, "stop failed at teardown");
            }
        }
    }

    fn handle_remove_service(self: &Rc<Self>, target: ServiceId, meta: &EventMeta) {
        let Some(handle) = self.service(target) else {
            return;
        };

        // An active service stops through the regular two-pass sequence
        // first; the removal itself is requeued behind it.
        if handle.state() == ServiceState::Active {
            self.push_internal(
                target,
                meta.priority,
                event::dependency_offline_event(),
                EventPayload::DependencyOffline { service: target },
            );
            self.push_internal(
                meta.origin,
                meta.priority,
                event::stop_service_event(),
                EventPayload::StopService {
                    service: target,
                    dependencies_offline: true,
                },
            );
            self.push_internal(
                meta.origin,
                meta.priority,
                event::remove_service_event(),
                EventPayload::RemoveService(target),
            );
            return;
        }

        for (dependency, properties) in handle.declared_dependencies() {
            self.push_internal(
                target,
                handle.priority(),
                event::dependency_undo_request_event(),
                EventPayload::DependencyUndoRequest(DependencyRequest {
                    requestor: target,
                    dependency,
                    properties,
                }),
            );
        }

        handle.set_state(ServiceState::Uninstalled);
        self.services.borrow_mut().remove(&target);
        tracing::debug!(manager = %self.name, service = %target, "service removed");
    }

    fn deliver_to_trackers(&self, request: &DependencyRequest, undo: bool) {
        let entries: Vec<(Rc<dyn Fn(&DependencyRequest)>, Rc<dyn Fn(&DependencyRequest)>)> = self
            .trackers
            .borrow()
            .get(&request.dependency.interface)
            .map(|list| {
                list.iter()
                    .map(|e| (e.on_request.clone(), e.on_undo.clone()))
                    .collect()
            })
            .unwrap_or_default();
        for (on_request, on_undo) in entries {
            if undo {
                on_undo(request);
            } else {
                on_request(request);
            }
        }
    }

    fn handle_quit(self: &Rc<Self>, meta: &EventMeta) {
        if self.quitting.get() {
            return;
        }
        self.quitting.set(true);
        self.queue.close();
        tracing::info!(manager = %self.name, "quit received, draining");

        // Stop active services in reverse registration order. All stops go
        // out at the quit's priority so FIFO preserves the order.
        let active: Vec<ServiceId> = self
            .services
            .borrow()
            .values()
            .rev()
            .filter(|s| s.state() == ServiceState::Active)
            .map(|s| s.service_id())
            .collect();
        for id in active {
            self.push_internal(
                meta.origin,
                meta.priority,
                event::stop_service_event(),
                EventPayload::StopService {
                    service: id,
                    dependencies_offline: false,
                },
            );
        }
    }

    fn teardown(self: &Rc<Self>) {
        // Surviving suspended generators hold unresolvable awaits; cancel
        // them at their suspension point.
        let tokens: Vec<ResumeToken> = self.suspended.borrow().keys().copied().collect();
        for token in tokens {
            if let Some(mut entry) = self.suspended.borrow_mut().remove(&token) {
                self.queue.remove_suspended();
                entry.generator.request_cancellation();
                self.generator_finished(Err(EventError::Cancelled), entry.completion);
            }
        }

        // Uninstall everything, newest first. The queue is closed, so
        // undo requests are delivered to trackers synchronously.
        let ids: Vec<ServiceId> = self.services.borrow().keys().rev().copied().collect();
        for id in ids {
            let Some(handle) = self.service(id) else {
                continue;
            };
            if handle.state() == ServiceState::Active {
                self.stop_inline(&handle);
            }
            for (dependency, properties) in handle.declared_dependencies() {
                self.deliver_to_trackers(
                    &DependencyRequest {
                        requestor: id,
                        dependency,
                        properties,
                    },
                    true,
                );
            }
            handle.set_state(ServiceState::Uninstalled);
            self.services.borrow_mut().remove(&id);
        }

        self.queue.shutdown();
    }

    // ─── registration removal (RAII handles) ────────────────────────────

    pub(crate) fn remove_handler(&self, event_type: EventTypeId, seq: u64) {
        if let Some(list) = self.handlers.borrow_mut().get_mut(&event_type) {
            list.retain(|e| e.seq != seq);
        }
    }

    pub(crate) fn remove_interceptor(&self, seq: u64) {
        self.interceptors.borrow_mut().retain(|e| e.seq != seq);
    }

    pub(crate) fn remove_completion(&self, key: (ServiceId, EventTypeId), seq: u64) {
        let mut completions = self.completions.borrow_mut();
        if completions.get(&key).is_some_and(|e| e.seq == seq) {
            completions.remove(&key);
        }
    }

    pub(crate) fn remove_tracker(&self, interface: InterfaceId, seq: u64) {
        if let Some(list) = self.trackers.borrow_mut().get_mut(&interface) {
            list.retain(|e| e.seq != seq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_service::StartBehaviour;

    struct Inert;
    impl Service for Inert {
        fn start(&mut self) -> StartBehaviour {
            StartBehaviour::Succeeded
        }
        fn stop(&mut self) -> StartBehaviour {
            StartBehaviour::Succeeded
        }
    }

    struct Ping;
    impl EventKind for Ping {}
    impl weft_service::CompletionHandler<Ping> for Inert {}

    #[test]
    fn manager_ids_are_unique() {
        let a = DependencyManager::new();
        let b = DependencyManager::new();
        assert_ne!(a.id(), b.id());
        assert!(!a.is_running());
    }

    #[test]
    fn create_service_registers_and_starts_inline() {
        let dm = DependencyManager::new();
        let id = dm
            .create_service(ServiceSpec::new(|_reg, _props, _ctx| Inert))
            .unwrap();
        // Started inline at creation; no dependencies, so already active.
        assert_eq!(dm.service_state(id), Some(ServiceState::Active));
        assert_eq!(dm.service_count(), 1);
    }

    #[test]
    fn service_ids_are_never_reused() {
        let dm = DependencyManager::new();
        let first = dm
            .create_service(ServiceSpec::new(|_reg, _props, _ctx| Inert))
            .unwrap();
        let second = dm
            .create_service(ServiceSpec::new(|_reg, _props, _ctx| Inert))
            .unwrap();
        assert!(second > first);
    }

    #[test]
    fn registration_for_unknown_owner_is_refused() {
        let dm = DependencyManager::new();
        let missing = ServiceId::from_raw(u64::MAX);
        assert!(matches!(
            dm.register_completion_callbacks::<Ping, Inert>(missing),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn registration_with_wrong_type_is_refused() {
        struct Other;
        impl Service for Other {
            fn start(&mut self) -> StartBehaviour {
                StartBehaviour::Succeeded
            }
            fn stop(&mut self) -> StartBehaviour {
                StartBehaviour::Succeeded
            }
        }
        impl weft_service::CompletionHandler<Ping> for Other {}

        let dm = DependencyManager::new();
        let id = dm
            .create_service(ServiceSpec::new(|_reg, _props, _ctx| Inert))
            .unwrap();
        assert!(matches!(
            dm.register_completion_callbacks::<Ping, Other>(id),
            Err(ServiceError::TypeMismatch(_))
        ));
    }

    #[test]
    fn priority_resolution_prefers_spec_over_property() {
        use weft_types::{keys, Properties, PropertyValue};

        let dm = DependencyManager::new();
        let props = Properties::new().with(keys::PRIORITY, PropertyValue::Uint(50));
        let id = dm
            .create_service(
                ServiceSpec::new(|_reg, _props, _ctx| Inert)
                    .with_properties(props)
                    .with_priority(7),
            )
            .unwrap();
        let handle = dm.core.service(id).unwrap();
        assert_eq!(handle.priority(), 7);
    }
}
