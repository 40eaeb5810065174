//! Manager configuration.

use serde::{Deserialize, Serialize};
use weft_types::{Priority, INTERNAL_PRIORITY};

/// Configuration of one [`DependencyManager`](crate::DependencyManager).
///
/// # Example
///
/// ```
/// use weft_runtime::ManagerConfig;
///
/// let cfg = ManagerConfig {
///     name: Some("io".into()),
///     ..ManagerConfig::default()
/// };
/// assert_eq!(cfg.default_priority, 1000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Name used in log output. Defaults to the manager id.
    pub name: Option<String>,
    /// Priority for pushes and services that do not specify one.
    pub default_priority: Priority,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            name: None,
            default_priority: INTERNAL_PRIORITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_priority_is_internal() {
        assert_eq!(ManagerConfig::default().default_priority, INTERNAL_PRIORITY);
        assert!(ManagerConfig::default().name.is_none());
    }
}
