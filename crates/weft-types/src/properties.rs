//! Per-service property map.
//!
//! Properties configure a service at construction time and may be mutated by
//! the service itself afterwards. Values are a closed tagged set rather than
//! an open `Any` map: every kind the framework consumes has its own variant,
//! unknown keys are inert.
//!
//! # Well-Known Keys
//!
//! | Key | Kind | Effect |
//! |-----|------|--------|
//! | [`keys::PRIORITY`] | `Uint` | initial priority for the service's events and start/stop |
//! | [`keys::FILTER`] | `Filter` | injection predicate (see [`Filter`]) |
//! | [`keys::LOG_LEVEL`] | `LogLevel` | consumed by the logger admin |
//! | [`keys::TARGET_SERVICE_ID`] | `Uint` | consumed by the logger admin |
//!
//! # Example
//!
//! ```
//! use weft_types::{keys, LogLevel, Properties, PropertyValue};
//!
//! let mut props = Properties::new();
//! props.insert(keys::PRIORITY, PropertyValue::Uint(10));
//! props.insert(keys::LOG_LEVEL, PropertyValue::LogLevel(LogLevel::Debug));
//! props.insert("endpoint", PropertyValue::Str("127.0.0.1:8001".into()));
//!
//! assert_eq!(props.get_uint(keys::PRIORITY), Some(10));
//! assert_eq!(props.get_str("endpoint"), Some("127.0.0.1:8001"));
//! assert_eq!(props.get_bool("missing"), None);
//! ```

use crate::{Filter, Priority, ServiceId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Property keys the framework itself recognizes.
pub mod keys {
    /// Initial [`Priority`](crate::Priority) of the owning service.
    pub const PRIORITY: &str = "priority";
    /// Injection predicate, a [`Filter`](crate::Filter) value.
    pub const FILTER: &str = "filter";
    /// Requested [`LogLevel`](crate::LogLevel) for a tracker-created logger.
    pub const LOG_LEVEL: &str = "log-level";
    /// Service id a tracker-created provider was materialized for.
    pub const TARGET_SERVICE_ID: &str = "target-service-id";
}

/// Severity threshold understood by the logger collaborator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum LogLevel {
    /// Finest-grained framework internals.
    Trace,
    /// Diagnostic detail.
    Debug,
    /// Normal operational messages.
    #[default]
    Info,
    /// Unexpected but recoverable conditions.
    Warn,
    /// Failures.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A dynamically-typed property value.
///
/// The variant set is closed on purpose: it covers exactly the kinds the
/// framework and its collaborators consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer (ids, priorities).
    Uint(u64),
    /// Floating point.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Opaque byte payload.
    Bytes(Vec<u8>),
    /// Injection predicate.
    Filter(Filter),
    /// Log severity.
    LogLevel(LogLevel),
}

/// String-keyed map of [`PropertyValue`]s owned by one service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    entries: HashMap<String, PropertyValue>,
}

impl Properties {
    /// Creates an empty property map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any previous value under the key.
    pub fn insert(&mut self, key: impl Into<String>, value: PropertyValue) -> Option<PropertyValue> {
        self.entries.insert(key.into(), value)
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.insert(key, value);
        self
    }

    /// Removes a key, returning its value if present.
    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.entries.remove(key)
    }

    /// Returns the raw value under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(key)
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(key, value)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Typed getter for [`PropertyValue::Bool`].
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.entries.get(key) {
            Some(PropertyValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    /// Typed getter for [`PropertyValue::Int`].
    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.entries.get(key) {
            Some(PropertyValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Typed getter for [`PropertyValue::Uint`].
    #[must_use]
    pub fn get_uint(&self, key: &str) -> Option<u64> {
        match self.entries.get(key) {
            Some(PropertyValue::Uint(v)) => Some(*v),
            _ => None,
        }
    }

    /// Typed getter for [`PropertyValue::Float`].
    #[must_use]
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.entries.get(key) {
            Some(PropertyValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    /// Typed getter for [`PropertyValue::Str`].
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(PropertyValue::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Typed getter for [`PropertyValue::Bytes`].
    #[must_use]
    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        match self.entries.get(key) {
            Some(PropertyValue::Bytes(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Typed getter for [`PropertyValue::Filter`].
    #[must_use]
    pub fn get_filter(&self, key: &str) -> Option<&Filter> {
        match self.entries.get(key) {
            Some(PropertyValue::Filter(v)) => Some(v),
            _ => None,
        }
    }

    /// Typed getter for [`PropertyValue::LogLevel`].
    #[must_use]
    pub fn get_log_level(&self, key: &str) -> Option<LogLevel> {
        match self.entries.get(key) {
            Some(PropertyValue::LogLevel(v)) => Some(*v),
            _ => None,
        }
    }

    /// The [`keys::PRIORITY`] value, if set.
    #[must_use]
    pub fn priority(&self) -> Option<Priority> {
        self.get_uint(keys::PRIORITY)
    }

    /// The [`keys::FILTER`] value, if set.
    #[must_use]
    pub fn filter(&self) -> Option<&Filter> {
        self.get_filter(keys::FILTER)
    }

    /// The [`keys::TARGET_SERVICE_ID`] value, if set.
    #[must_use]
    pub fn target_service_id(&self) -> Option<ServiceId> {
        self.get_uint(keys::TARGET_SERVICE_ID).map(ServiceId::from_raw)
    }
}

impl<K: Into<String>> FromIterator<(K, PropertyValue)> for Properties {
    fn from_iter<T: IntoIterator<Item = (K, PropertyValue)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
