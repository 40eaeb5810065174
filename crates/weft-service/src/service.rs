//! The service lifecycle contract.

use serde::{Deserialize, Serialize};

/// Outcome of a service's `start` or `stop`.
///
/// This three-valued contract is authoritative for the whole framework:
/// retryable failures are re-queued by the manager at the service's
/// priority, terminal failures leave the service where the state machine
/// puts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StartBehaviour {
    /// The transition completed.
    Succeeded,
    /// The transition failed; the manager should requeue it.
    FailedAndRetry,
    /// The transition failed permanently.
    FailedDoNotRetry,
}

/// Lifecycle state of a registered service.
///
/// Transitions are driven exclusively by framework events; user code
/// observes states, it never sets them.
///
/// | State | Meaning |
/// |-------|---------|
/// | `Installed` | registered, not started |
/// | `Starting` | user `start()` running |
/// | `Injecting` | started, waiting for required dependencies |
/// | `Active` | running, all required dependencies satisfied |
/// | `Stopping` | user `stop()` running |
/// | `Unknown` | `stop()` failed terminally |
/// | `Uninstalled` | removed; the id is never reused |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ServiceState {
    /// Registered but not started.
    #[default]
    Installed,
    /// User `start()` is running.
    Starting,
    /// Started; waiting for required dependencies to be satisfied.
    Injecting,
    /// Running; handlers of this service are dispatched.
    Active,
    /// User `stop()` is running.
    Stopping,
    /// Terminal: `stop()` failed and the instance state is indeterminate.
    Unknown,
    /// Terminal: removed from the registry.
    Uninstalled,
}

impl ServiceState {
    /// `true` while the service participates in dispatch and injection.
    ///
    /// # Example
    ///
    /// ```
    /// use weft_service::ServiceState;
    ///
    /// assert!(ServiceState::Active.is_live());
    /// assert!(ServiceState::Injecting.is_live());
    /// assert!(!ServiceState::Stopping.is_live());
    /// ```
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Starting | Self::Injecting | Self::Active)
    }

    /// `true` once no further transitions are possible short of manager
    /// teardown.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Unknown | Self::Uninstalled)
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Installed => write!(f, "installed"),
            Self::Starting => write!(f, "starting"),
            Self::Injecting => write!(f, "injecting"),
            Self::Active => write!(f, "active"),
            Self::Stopping => write!(f, "stopping"),
            Self::Unknown => write!(f, "unknown"),
            Self::Uninstalled => write!(f, "uninstalled"),
        }
    }
}

/// A component managed by a dependency manager.
///
/// Implementations are constructed by a closure handed to the manager
/// (together with a `DependencyRegister` for declaring dependencies) and
/// live on the manager's thread for their whole lifetime.
///
/// `start` runs in [`ServiceState::Starting`]; the service becomes
/// [`Active`](ServiceState::Active) once every required dependency is
/// satisfied. `stop` runs in [`ServiceState::Stopping`] after the service's
/// outstanding generators have been cancelled and its dependents have been
/// un-injected.
pub trait Service: 'static {
    /// Starts the service. Typically registers event handlers and pushes
    /// initial events.
    fn start(&mut self) -> StartBehaviour;

    /// Stops the service. Typically drops registration handles.
    fn stop(&mut self) -> StartBehaviour;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_states() {
        assert!(ServiceState::Starting.is_live());
        assert!(ServiceState::Injecting.is_live());
        assert!(ServiceState::Active.is_live());
        assert!(!ServiceState::Installed.is_live());
        assert!(!ServiceState::Uninstalled.is_live());
    }

    #[test]
    fn terminal_states() {
        assert!(ServiceState::Unknown.is_terminal());
        assert!(ServiceState::Uninstalled.is_terminal());
        assert!(!ServiceState::Active.is_terminal());
    }

    #[test]
    fn default_is_installed() {
        assert_eq!(ServiceState::default(), ServiceState::Installed);
    }

    #[test]
    fn display() {
        assert_eq!(ServiceState::Injecting.to_string(), "injecting");
        assert_eq!(ServiceState::Unknown.to_string(), "unknown");
    }
}
