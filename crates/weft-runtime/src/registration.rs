//! Scoped registration handles.
//!
//! Every `register_*` call on a manager returns one of these; dropping the
//! handle removes the registration. Removal is idempotent, tolerates the
//! manager being gone, and never fires callbacks.

use crate::manager::DmCore;
use std::rc::Weak;
use weft_types::{EventTypeId, InterfaceId, ServiceId};

macro_rules! registration {
    ($name:ident, $key:ty, $remove:ident, $doc:literal) => {
        #[doc = $doc]
        ///
        /// Dropping the handle removes the registration; [`release`](Self::release)
        /// does the same eagerly.
        #[must_use = "dropping the handle removes the registration"]
        pub struct $name {
            core: Weak<DmCore>,
            key: Option<($key, u64)>,
        }

        impl $name {
            pub(crate) fn new(core: Weak<DmCore>, key: $key, seq: u64) -> Self {
                Self {
                    core,
                    key: Some((key, seq)),
                }
            }

            /// Removes the registration now instead of at drop.
            pub fn release(mut self) {
                self.remove();
            }

            fn remove(&mut self) {
                if let (Some((key, seq)), Some(core)) = (self.key.take(), self.core.upgrade()) {
                    core.$remove(key, seq);
                }
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.remove();
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("active", &self.key.is_some())
                    .finish()
            }
        }
    };
}

registration!(
    EventHandlerRegistration,
    EventTypeId,
    remove_handler,
    "Scoped event-handler registration."
);

registration!(
    CompletionRegistration,
    (ServiceId, EventTypeId),
    remove_completion,
    "Scoped completion/error-callback registration."
);

registration!(
    DependencyTrackerRegistration,
    InterfaceId,
    remove_tracker,
    "Scoped dependency-tracker registration."
);

/// Scoped event-interceptor registration.
///
/// Dropping the handle removes the registration; [`release`](Self::release)
/// does the same eagerly.
#[must_use = "dropping the handle removes the registration"]
pub struct EventInterceptorRegistration {
    core: Weak<DmCore>,
    seq: Option<u64>,
}

impl EventInterceptorRegistration {
    pub(crate) fn new(core: Weak<DmCore>, seq: u64) -> Self {
        Self {
            core,
            seq: Some(seq),
        }
    }

    /// Removes the registration now instead of at drop.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let (Some(seq), Some(core)) = (self.seq.take(), self.core.upgrade()) {
            core.remove_interceptor(seq);
        }
    }
}

impl Drop for EventInterceptorRegistration {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for EventInterceptorRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventInterceptorRegistration")
            .field("active", &self.seq.is_some())
            .finish()
    }
}
