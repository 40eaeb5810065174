//! Handles through which services reach their manager.
//!
//! Services never hold the [`DependencyManager`](crate::DependencyManager)
//! itself: the constructor hands every service a [`ServiceContext`], a
//! cheap clone of which can be stored for the service's lifetime. The
//! context carries the service's identity and a [`ManagerRef`] — the full
//! same-thread API of the owning manager.
//!
//! Both types are `!Send` on purpose: everything except queue pushes is
//! confined to the manager's thread. Cross-thread producers use
//! [`QueueHandle`](crate::QueueHandle) instead.

use crate::manager::DmCore;
use std::cell::RefCell;
use std::rc::Rc;
use weft_types::{EventId, Priority, Properties, ServiceId};

/// Same-thread handle to a dependency manager.
///
/// Carries the full registration, creation and push API of the owning
/// [`DependencyManager`](crate::DependencyManager). `Clone` is a reference
/// count bump.
#[derive(Clone)]
pub struct ManagerRef {
    pub(crate) core: Rc<DmCore>,
}

impl std::fmt::Debug for ManagerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerRef").field("id", &self.id()).finish()
    }
}

/// Per-service view handed to a service at construction.
///
/// Carries the assigned [`ServiceId`], the service's scheduling priority,
/// its shared [`Properties`], and the owning manager.
#[derive(Clone)]
pub struct ServiceContext {
    pub(crate) service_id: ServiceId,
    pub(crate) priority: Priority,
    pub(crate) properties: Rc<RefCell<Properties>>,
    pub(crate) manager: ManagerRef,
}

impl ServiceContext {
    /// The owning service's id.
    #[must_use]
    pub fn service_id(&self) -> ServiceId {
        self.service_id
    }

    /// The owning service's scheduling priority.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// The owning service's properties.
    ///
    /// The service may mutate them; keep borrows short — the injection
    /// machinery reads these when wiring dependencies.
    #[must_use]
    pub fn properties(&self) -> Rc<RefCell<Properties>> {
        self.properties.clone()
    }

    /// The owning manager.
    #[must_use]
    pub fn manager(&self) -> &ManagerRef {
        &self.manager
    }

    /// Pushes a user event originating from this service at the service's
    /// priority.
    pub fn push_event<E: weft_event::UserEvent>(&self, payload: E) -> EventId {
        self.manager
            .push_prioritised_event(self.service_id, self.priority, payload)
    }

    /// Pushes a user event originating from this service at an explicit
    /// priority.
    pub fn push_prioritised_event<E: weft_event::UserEvent>(
        &self,
        priority: Priority,
        payload: E,
    ) -> EventId {
        self.manager
            .push_prioritised_event(self.service_id, priority, payload)
    }

    /// Pushes the quit event on behalf of this service.
    pub fn push_quit(&self) -> EventId {
        self.manager.push_quit(self.service_id)
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("service_id", &self.service_id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}
