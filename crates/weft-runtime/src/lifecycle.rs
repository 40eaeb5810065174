//! Per-service runtime records.
//!
//! A [`ServiceSpec`] describes how to build one service: its constructor,
//! properties, priority, and the interfaces it exposes (each with a caster
//! closure — the explicit `InterfaceId → cast` mapping that stands in for
//! language-level interface inheritance). Registration turns the spec into
//! a [`LifecycleManager`], the record that owns the instance and its state
//! machine; the dependency manager only ever sees the object-safe
//! [`LifecycleHandle`] view.

use crate::context::ServiceContext;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use weft_service::{DependencyRegister, Service, ServiceError, ServiceState, StartBehaviour};
use weft_types::{
    Dependency, InterfaceId, Priority, Properties, ServiceGid, ServiceId,
};

type Caster<S> = Box<dyn Fn(&Rc<RefCell<S>>) -> Box<dyn Any>>;
type Constructor<S> =
    Box<dyn FnOnce(&mut DependencyRegister<S>, &Properties, &ServiceContext) -> Result<S, ServiceError>>;

/// Everything needed to construct and register one service.
///
/// # Example
///
/// ```no_run
/// use weft_runtime::{DependencyManager, ServiceSpec};
/// use weft_service::{Service, StartBehaviour};
///
/// trait Greeter { fn greet(&self) -> String; }
///
/// struct English;
/// impl Service for English {
///     fn start(&mut self) -> StartBehaviour { StartBehaviour::Succeeded }
///     fn stop(&mut self) -> StartBehaviour { StartBehaviour::Succeeded }
/// }
/// impl Greeter for English {
///     fn greet(&self) -> String { "hello".into() }
/// }
///
/// let dm = DependencyManager::new();
/// let id = dm
///     .create_service(
///         ServiceSpec::new(|_reg, _props, _ctx| English).exposes::<dyn Greeter, _>(|s| s),
///     )
///     .unwrap();
/// ```
pub struct ServiceSpec<S: Service> {
    pub(crate) ctor: Constructor<S>,
    pub(crate) properties: Properties,
    pub(crate) priority: Option<Priority>,
    pub(crate) interfaces: Vec<(InterfaceId, Caster<S>)>,
}

impl<S: Service> ServiceSpec<S> {
    /// Spec from an infallible constructor.
    ///
    /// The constructor receives the [`DependencyRegister`] for declaring
    /// dependencies, the service's properties, and its [`ServiceContext`].
    #[must_use]
    pub fn new(
        ctor: impl FnOnce(&mut DependencyRegister<S>, &Properties, &ServiceContext) -> S + 'static,
    ) -> Self {
        Self::try_new(move |reg, props, ctx| Ok(ctor(reg, props, ctx)))
    }

    /// Spec from a fallible constructor.
    ///
    /// A construction error means the service is never registered and no
    /// events fire.
    #[must_use]
    pub fn try_new(
        ctor: impl FnOnce(&mut DependencyRegister<S>, &Properties, &ServiceContext) -> Result<S, ServiceError>
            + 'static,
    ) -> Self {
        Self {
            ctor: Box::new(ctor),
            properties: Properties::new(),
            priority: None,
            interfaces: Vec::new(),
        }
    }

    /// Sets the service's properties.
    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Sets the service's priority, overriding the `priority` property and
    /// the manager default.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Declares that the service exposes interface `I`.
    ///
    /// `cast` is the unsized coercion from the concrete instance to the
    /// interface object — written `|s| s` at the call site. Exposure order
    /// is preserved and observable in injection order.
    #[must_use]
    pub fn exposes<I, F>(mut self, cast: F) -> Self
    where
        I: ?Sized + 'static,
        F: Fn(Rc<RefCell<S>>) -> Rc<RefCell<I>> + 'static,
    {
        let interface = InterfaceId::of::<I>();
        self.interfaces.push((
            interface,
            Box::new(move |rc| Box::new(cast(rc.clone())) as Box<dyn Any>),
        ));
        self
    }
}

/// Object-safe view of a [`LifecycleManager`], as the registry stores it.
pub(crate) trait LifecycleHandle {
    fn service_id(&self) -> ServiceId;
    fn gid(&self) -> ServiceGid;
    fn name(&self) -> &'static str;
    fn priority(&self) -> Priority;
    fn state(&self) -> ServiceState;
    fn set_state(&self, state: ServiceState);
    fn properties(&self) -> Rc<RefCell<Properties>>;
    fn interfaces(&self) -> &[InterfaceId];
    /// Declared dependencies with their attached request properties.
    fn declared_dependencies(&self) -> Vec<(Dependency, Option<Properties>)>;
    fn all_required_satisfied(&self) -> bool;
    /// The instance as `Rc<RefCell<S>>`, type-erased for downcasting in the
    /// registration APIs.
    fn instance_any(&self) -> Rc<dyn Any>;
    /// The instance cast to one of its exposed interfaces, boxed as the
    /// `Injected<I>` the consumer's register downcasts.
    fn cast(&self, interface: InterfaceId) -> Option<Box<dyn Any>>;
    /// Runs user `start()`.
    fn start(&self) -> StartBehaviour;
    /// Runs user `stop()`.
    fn stop(&self) -> StartBehaviour;
    /// Offers `provider`'s interfaces to this service's unsatisfied slots.
    /// Returns `true` if anything was injected.
    fn inject_from(&self, provider: &dyn LifecycleHandle) -> bool;
    /// Removes `provider` from this service. Returns `true` if a required
    /// dependency became unsatisfied.
    fn remove_from(&self, provider: &dyn LifecycleHandle) -> bool;
    fn is_injected_from(&self, provider: ServiceId) -> bool;
}

/// Owning record for one registered service.
pub(crate) struct LifecycleManager<S: Service> {
    service_id: ServiceId,
    gid: ServiceGid,
    name: &'static str,
    priority: Priority,
    state: Cell<ServiceState>,
    properties: Rc<RefCell<Properties>>,
    interfaces: Vec<InterfaceId>,
    casters: HashMap<InterfaceId, Caster<S>>,
    register: RefCell<DependencyRegister<S>>,
    injected_from: RefCell<Vec<ServiceId>>,
    instance: Rc<RefCell<S>>,
}

impl<S: Service> LifecycleManager<S> {
    pub(crate) fn new(
        service_id: ServiceId,
        priority: Priority,
        properties: Rc<RefCell<Properties>>,
        interfaces: Vec<(InterfaceId, Caster<S>)>,
        register: DependencyRegister<S>,
        instance: S,
    ) -> Rc<Self> {
        let mut order = Vec::with_capacity(interfaces.len());
        let mut casters = HashMap::with_capacity(interfaces.len());
        for (interface, caster) in interfaces {
            order.push(interface);
            casters.insert(interface, caster);
        }
        Rc::new(Self {
            service_id,
            gid: ServiceGid::new(),
            name: std::any::type_name::<S>(),
            priority,
            state: Cell::new(ServiceState::Installed),
            properties,
            interfaces: order,
            casters,
            register: RefCell::new(register),
            injected_from: RefCell::new(Vec::new()),
            instance: Rc::new(RefCell::new(instance)),
        })
    }

    /// Both-direction filter check: a provider's filter must accept the
    /// consumer and vice versa.
    fn filters_allow(&self, provider: &dyn LifecycleHandle) -> bool {
        let provider_props = provider.properties();
        let provider_props = provider_props.borrow();
        if let Some(filter) = provider_props.filter() {
            let own = self.properties.borrow();
            if !filter.matches(self.service_id, &own) {
                return false;
            }
        }
        let own = self.properties.borrow();
        if let Some(filter) = own.filter() {
            if !filter.matches(provider.service_id(), &provider_props) {
                return false;
            }
        }
        true
    }
}

impl<S: Service> LifecycleHandle for LifecycleManager<S> {
    fn service_id(&self) -> ServiceId {
        self.service_id
    }

    fn gid(&self) -> ServiceGid {
        self.gid
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn state(&self) -> ServiceState {
        self.state.get()
    }

    fn set_state(&self, state: ServiceState) {
        let old = self.state.replace(state);
        if old != state {
            tracing::trace!(service = %self.service_id, name = self.name, %old, %state, "state");
        }
    }

    fn properties(&self) -> Rc<RefCell<Properties>> {
        self.properties.clone()
    }

    fn interfaces(&self) -> &[InterfaceId] {
        &self.interfaces
    }

    fn declared_dependencies(&self) -> Vec<(Dependency, Option<Properties>)> {
        self.register.borrow().erased().declared().to_vec()
    }

    fn all_required_satisfied(&self) -> bool {
        self.register.borrow().all_required_satisfied()
    }

    fn instance_any(&self) -> Rc<dyn Any> {
        self.instance.clone()
    }

    fn cast(&self, interface: InterfaceId) -> Option<Box<dyn Any>> {
        self.casters.get(&interface).map(|c| c(&self.instance))
    }

    fn start(&self) -> StartBehaviour {
        self.instance.borrow_mut().start()
    }

    fn stop(&self) -> StartBehaviour {
        self.instance.borrow_mut().stop()
    }

    fn inject_from(&self, provider: &dyn LifecycleHandle) -> bool {
        if provider.service_id() == self.service_id {
            return false;
        }
        if self.is_injected_from(provider.service_id()) {
            return false;
        }

        // Which of the provider's interfaces fill an unsatisfied slot here?
        let wanted: Vec<InterfaceId> = {
            let register = self.register.borrow();
            provider
                .interfaces()
                .iter()
                .copied()
                .filter(|iface| {
                    register
                        .dependency(*iface)
                        .is_some_and(|dep| !dep.satisfied)
                })
                .collect()
        };
        if wanted.is_empty() {
            return false;
        }
        if !self.filters_allow(provider) {
            return false;
        }

        let mut injected = false;
        for interface in wanted {
            let Some(instance) = provider.cast(interface) else {
                continue;
            };
            let ok = {
                let register = self.register.borrow();
                let mut target = self.instance.borrow_mut();
                register.inject(&mut target, interface, instance.as_ref(), provider.service_id())
            };
            if ok {
                self.register.borrow_mut().set_satisfied(interface, true);
                injected = true;
                tracing::debug!(
                    consumer = %self.service_id,
                    provider = %provider.service_id(),
                    %interface,
                    "dependency injected"
                );
            }
        }

        if injected {
            self.injected_from.borrow_mut().push(provider.service_id());
        }
        injected
    }

    fn remove_from(&self, provider: &dyn LifecycleHandle) -> bool {
        if !self.is_injected_from(provider.service_id()) {
            return false;
        }

        let mut lost_required = false;
        for interface in provider.interfaces() {
            let Some(dep) = self.register.borrow().dependency(*interface) else {
                continue;
            };
            if !dep.satisfied {
                continue;
            }
            {
                let register = self.register.borrow();
                let mut target = self.instance.borrow_mut();
                register.remove(&mut target, *interface, provider.service_id());
            }
            self.register.borrow_mut().set_satisfied(*interface, false);
            if dep.required {
                lost_required = true;
            }
            tracing::debug!(
                consumer = %self.service_id,
                provider = %provider.service_id(),
                interface = %interface,
                "dependency removed"
            );
        }

        self.injected_from
            .borrow_mut()
            .retain(|id| *id != provider.service_id());
        lost_required
    }

    fn is_injected_from(&self, provider: ServiceId) -> bool {
        self.injected_from.borrow().contains(&provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_service::Injected;
    use weft_types::{keys, Filter, PropertyValue};

    trait Port {
        fn port_name(&self) -> &'static str;
    }

    struct Provider;
    impl Service for Provider {
        fn start(&mut self) -> StartBehaviour {
            StartBehaviour::Succeeded
        }
        fn stop(&mut self) -> StartBehaviour {
            StartBehaviour::Succeeded
        }
    }
    impl Port for Provider {
        fn port_name(&self) -> &'static str {
            "provider"
        }
    }

    #[derive(Default)]
    struct Consumer {
        port: Option<Injected<dyn Port>>,
    }
    impl Service for Consumer {
        fn start(&mut self) -> StartBehaviour {
            StartBehaviour::Succeeded
        }
        fn stop(&mut self) -> StartBehaviour {
            StartBehaviour::Succeeded
        }
    }

    fn provider_record(id: u64, properties: Properties) -> Rc<LifecycleManager<Provider>> {
        // The spec builder is the one place that can write the unsized
        // coercion; reuse it for its caster list.
        let spec = ServiceSpec::<Provider>::new(|_reg, _props, _ctx| Provider)
            .exposes::<dyn Port, _>(|s| s);
        LifecycleManager::new(
            ServiceId::from_raw(id),
            1000,
            Rc::new(RefCell::new(properties)),
            spec.interfaces,
            DependencyRegister::new(),
            Provider,
        )
    }

    fn consumer_record(id: u64, properties: Properties) -> Rc<LifecycleManager<Consumer>> {
        let mut register = DependencyRegister::new();
        register.register_required::<dyn Port, _, _>(
            |me: &mut Consumer, port, _provider| me.port = Some(port),
            |me: &mut Consumer, _provider| me.port = None,
        );
        LifecycleManager::new(
            ServiceId::from_raw(id),
            1000,
            Rc::new(RefCell::new(properties)),
            Vec::new(),
            register,
            Consumer::default(),
        )
    }

    #[test]
    fn inject_and_remove_roundtrip() {
        let provider = provider_record(1, Properties::new());
        let consumer = consumer_record(2, Properties::new());

        assert!(!consumer.all_required_satisfied());
        assert!(consumer.inject_from(provider.as_ref()));
        assert!(consumer.all_required_satisfied());
        assert!(consumer.is_injected_from(ServiceId::from_raw(1)));

        // The consumer can actually call through the injected object.
        {
            let inner = consumer.instance.borrow();
            let port = inner.port.as_ref().unwrap();
            assert_eq!(port.borrow().port_name(), "provider");
        }

        assert!(consumer.remove_from(provider.as_ref()));
        assert!(!consumer.all_required_satisfied());
        assert!(!consumer.is_injected_from(ServiceId::from_raw(1)));
        assert!(consumer.instance.borrow().port.is_none());
    }

    #[test]
    fn second_injection_from_same_provider_is_ignored() {
        let provider = provider_record(3, Properties::new());
        let consumer = consumer_record(4, Properties::new());

        assert!(consumer.inject_from(provider.as_ref()));
        assert!(!consumer.inject_from(provider.as_ref()));
    }

    #[test]
    fn satisfied_slot_ignores_other_providers() {
        let first = provider_record(5, Properties::new());
        let second = provider_record(6, Properties::new());
        let consumer = consumer_record(7, Properties::new());

        assert!(consumer.inject_from(first.as_ref()));
        // First-wins: the slot is taken.
        assert!(!consumer.inject_from(second.as_ref()));
    }

    #[test]
    fn provider_filter_scopes_injection() {
        let scoped = Properties::new().with(
            keys::FILTER,
            PropertyValue::Filter(Filter::service_id(ServiceId::from_raw(99))),
        );
        let provider = provider_record(8, scoped);
        let consumer = consumer_record(9, Properties::new());

        // Filter names service 99; consumer 9 is rejected.
        assert!(!consumer.inject_from(provider.as_ref()));
        assert!(!consumer.all_required_satisfied());
    }

    #[test]
    fn consumer_filter_rejects_provider() {
        let provider = provider_record(10, Properties::new());
        let choosy = Properties::new().with(
            keys::FILTER,
            PropertyValue::Filter(Filter::service_id(ServiceId::from_raw(42))),
        );
        let consumer = consumer_record(11, choosy);

        assert!(!consumer.inject_from(provider.as_ref()));
    }

    #[test]
    fn self_injection_is_refused() {
        let consumer = consumer_record(12, Properties::new());
        let same_id = consumer_record(12, Properties::new());
        assert!(!consumer.inject_from(same_id.as_ref()));
    }

    #[test]
    fn spec_records_exposure_order() {
        let spec = ServiceSpec::<Provider>::new(|_reg, _props, _ctx| Provider)
            .exposes::<dyn Port, _>(|s| s);
        assert_eq!(spec.interfaces.len(), 1);
        assert_eq!(spec.interfaces[0].0, InterfaceId::of::<dyn Port>());
    }
}
