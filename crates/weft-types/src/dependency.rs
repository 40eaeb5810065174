//! Declared dependency of a service on an interface.

use crate::InterfaceId;
use serde::{Deserialize, Serialize};

/// One declared dependency slot on a service.
///
/// A service declares its dependencies at construction; the runtime fills
/// `satisfied` as providers come and go. A slot accepts the first live
/// provider of its interface and ignores further providers until that one
/// goes offline (first-wins).
///
/// Two dependencies are equal when they name the same interface with the
/// same requiredness — `satisfied` is runtime state, not identity.
///
/// # Example
///
/// ```
/// use weft_types::{Dependency, InterfaceId};
///
/// trait Clock {}
///
/// let dep = Dependency::required(InterfaceId::of::<dyn Clock>());
/// assert!(dep.required);
/// assert!(!dep.satisfied);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Dependency {
    /// Interface this slot binds to.
    pub interface: InterfaceId,
    /// Whether the owning service can only be active while this slot is
    /// satisfied.
    pub required: bool,
    /// Whether a provider is currently injected.
    pub satisfied: bool,
}

impl Dependency {
    /// Creates an unsatisfied required dependency.
    #[must_use]
    pub const fn required(interface: InterfaceId) -> Self {
        Self {
            interface,
            required: true,
            satisfied: false,
        }
    }

    /// Creates an unsatisfied optional dependency.
    #[must_use]
    pub const fn optional(interface: InterfaceId) -> Self {
        Self {
            interface,
            required: false,
            satisfied: false,
        }
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.interface == other.interface && self.required == other.required
    }
}

impl Eq for Dependency {}
