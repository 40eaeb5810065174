//! Dependency declaration and injection plumbing.
//!
//! A service declares its dependencies in its constructor through
//! [`DependencyRegister`]. Each declaration pairs an interface with two
//! closures: *inject* (a provider of that interface came up) and *remove*
//! (it went away). The register also carries the injection bookkeeping the
//! lifecycle machinery needs: requiredness, satisfaction, and optional
//! per-request properties that travel with the dependency-request event so
//! trackers can honor them.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use weft_types::{Dependency, InterfaceId, Properties, ServiceId};

/// Reference to an injected peer, valid strictly between the matching
/// inject and remove callbacks.
///
/// Services store it in an `Option` and clear it in the remove callback;
/// holding it past that point keeps a stopped peer alive and is a contract
/// violation.
pub type Injected<I> = Rc<RefCell<I>>;

/// Type-erased view of one declared dependency, as the runtime sees it.
///
/// Exposed so the lifecycle machinery can walk declarations without knowing
/// the service type.
#[derive(Debug, Clone)]
pub struct ErasedDependencyRegister {
    entries: Vec<(Dependency, Option<Properties>)>,
}

impl ErasedDependencyRegister {
    /// Declared dependencies with their current satisfaction state.
    #[must_use]
    pub fn declared(&self) -> &[(Dependency, Option<Properties>)] {
        &self.entries
    }
}

struct Entry<S> {
    dependency: Dependency,
    request_properties: Option<Properties>,
    inject: Box<dyn Fn(&mut S, &dyn Any, ServiceId) -> bool>,
    remove: Box<dyn Fn(&mut S, ServiceId)>,
}

/// Collects a service's dependency declarations during construction.
///
/// See the crate-level example. One declaration per interface; declaring
/// the same interface twice replaces the earlier declaration.
pub struct DependencyRegister<S> {
    entries: Vec<Entry<S>>,
}

impl<S: 'static> Default for DependencyRegister<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: 'static> DependencyRegister<S> {
    /// Creates an empty register.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Declares a required dependency on interface `I`.
    ///
    /// `inject` receives the peer handle and the provider's id; `remove`
    /// receives the provider's id. The owning service can only be active
    /// while this slot is satisfied.
    pub fn register_required<I, FInject, FRemove>(&mut self, inject: FInject, remove: FRemove)
    where
        I: ?Sized + 'static,
        FInject: Fn(&mut S, Injected<I>, ServiceId) + 'static,
        FRemove: Fn(&mut S, ServiceId) + 'static,
    {
        self.register_with::<I, _, _>(true, None, inject, remove);
    }

    /// Declares an optional dependency on interface `I`.
    pub fn register_optional<I, FInject, FRemove>(&mut self, inject: FInject, remove: FRemove)
    where
        I: ?Sized + 'static,
        FInject: Fn(&mut S, Injected<I>, ServiceId) + 'static,
        FRemove: Fn(&mut S, ServiceId) + 'static,
    {
        self.register_with::<I, _, _>(false, None, inject, remove);
    }

    /// Full-form declaration.
    ///
    /// `request_properties` travel with the dependency-request event pushed
    /// at registration, so trackers materializing providers on demand can
    /// honor them (e.g. a requested log level).
    pub fn register_with<I, FInject, FRemove>(
        &mut self,
        required: bool,
        request_properties: Option<Properties>,
        inject: FInject,
        remove: FRemove,
    ) where
        I: ?Sized + 'static,
        FInject: Fn(&mut S, Injected<I>, ServiceId) + 'static,
        FRemove: Fn(&mut S, ServiceId) + 'static,
    {
        let interface = InterfaceId::of::<I>();
        let dependency = if required {
            Dependency::required(interface)
        } else {
            Dependency::optional(interface)
        };
        let entry = Entry {
            dependency,
            request_properties,
            inject: Box::new(move |target, instance, provider| {
                match instance.downcast_ref::<Injected<I>>() {
                    Some(peer) => {
                        inject(target, peer.clone(), provider);
                        true
                    }
                    None => false,
                }
            }),
            remove: Box::new(remove),
        };

        self.entries.retain(|e| e.dependency.interface != interface);
        self.entries.push(entry);
    }

    /// Number of declared dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no dependencies were declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the declarations, type-erased.
    #[must_use]
    pub fn erased(&self) -> ErasedDependencyRegister {
        ErasedDependencyRegister {
            entries: self
                .entries
                .iter()
                .map(|e| (e.dependency, e.request_properties.clone()))
                .collect(),
        }
    }

    /// The declaration for `interface`, if present.
    #[must_use]
    pub fn dependency(&self, interface: InterfaceId) -> Option<Dependency> {
        self.entry(interface).map(|e| e.dependency)
    }

    /// `true` if `interface` is declared.
    #[must_use]
    pub fn is_registered(&self, interface: InterfaceId) -> bool {
        self.entry(interface).is_some()
    }

    /// Marks a slot's satisfaction state. Runtime-internal bookkeeping.
    pub fn set_satisfied(&mut self, interface: InterfaceId, satisfied: bool) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.dependency.interface == interface) {
            e.dependency.satisfied = satisfied;
        }
    }

    /// `true` when every required slot is satisfied.
    #[must_use]
    pub fn all_required_satisfied(&self) -> bool {
        self.entries
            .iter()
            .all(|e| !e.dependency.required || e.dependency.satisfied)
    }

    /// Runs the inject callback for `interface` with a provider instance.
    ///
    /// `instance` must be the `Injected<I>` produced by the provider's
    /// caster for the same interface; a mismatch returns `false` and injects
    /// nothing.
    pub fn inject(
        &self,
        target: &mut S,
        interface: InterfaceId,
        instance: &dyn Any,
        provider: ServiceId,
    ) -> bool {
        match self.entry(interface) {
            Some(e) => (e.inject)(target, instance, provider),
            None => false,
        }
    }

    /// Runs the remove callback for `interface`.
    pub fn remove(&self, target: &mut S, interface: InterfaceId, provider: ServiceId) {
        if let Some(e) = self.entry(interface) {
            (e.remove)(target, provider);
        }
    }

    fn entry(&self, interface: InterfaceId) -> Option<&Entry<S>> {
        self.entries.iter().find(|e| e.dependency.interface == interface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Clock {
        fn now(&self) -> u64;
    }

    struct FixedClock(u64);
    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            self.0
        }
    }

    #[derive(Default)]
    struct Consumer {
        clock: Option<Injected<dyn Clock>>,
        removed_from: Option<ServiceId>,
    }

    fn register() -> DependencyRegister<Consumer> {
        let mut reg = DependencyRegister::new();
        reg.register_required::<dyn Clock, _, _>(
            |me: &mut Consumer, clock, _provider| me.clock = Some(clock),
            |me, provider| {
                me.clock = None;
                me.removed_from = Some(provider);
            },
        );
        reg
    }

    #[test]
    fn inject_and_remove_roundtrip() {
        let reg = register();
        let mut consumer = Consumer::default();
        let provider = ServiceId::from_raw(9);

        let instance: Injected<dyn Clock> = Rc::new(RefCell::new(FixedClock(42)));
        let boxed: Box<dyn Any> = Box::new(instance);

        let iface = InterfaceId::of::<dyn Clock>();
        assert!(reg.inject(&mut consumer, iface, boxed.as_ref(), provider));
        assert_eq!(consumer.clock.as_ref().unwrap().borrow().now(), 42);

        reg.remove(&mut consumer, iface, provider);
        assert!(consumer.clock.is_none());
        assert_eq!(consumer.removed_from, Some(provider));
    }

    #[test]
    fn wrong_instance_type_is_rejected() {
        let reg = register();
        let mut consumer = Consumer::default();
        let boxed: Box<dyn Any> = Box::new(5u32);
        assert!(!reg.inject(
            &mut consumer,
            InterfaceId::of::<dyn Clock>(),
            boxed.as_ref(),
            ServiceId::from_raw(1)
        ));
        assert!(consumer.clock.is_none());
    }

    #[test]
    fn satisfaction_bookkeeping() {
        let mut reg = register();
        let iface = InterfaceId::of::<dyn Clock>();

        assert!(!reg.all_required_satisfied());
        reg.set_satisfied(iface, true);
        assert!(reg.all_required_satisfied());
        assert!(reg.dependency(iface).unwrap().satisfied);
    }

    #[test]
    fn redeclaration_replaces() {
        let mut reg = register();
        reg.register_optional::<dyn Clock, _, _>(|_, _, _| {}, |_, _| {});
        assert_eq!(reg.len(), 1);
        assert!(!reg.dependency(InterfaceId::of::<dyn Clock>()).unwrap().required);
    }

    #[test]
    fn unknown_interface() {
        let reg = register();
        trait Other {}
        assert!(!reg.is_registered(InterfaceId::of::<dyn Other>()));
        assert!(reg.dependency(InterfaceId::of::<dyn Other>()).is_none());
    }
}
