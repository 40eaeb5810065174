//! Injection predicates.
//!
//! A [`Filter`] restricts which peers a service is wired to. The runtime
//! checks filters in both directions when connecting a provider to a
//! consumer: a provider carrying a filter only serves matching consumers
//! (how on-demand factories scope a provider to the one service that
//! requested it), and a consumer carrying a filter only accepts matching
//! providers.
//!
//! # Example
//!
//! ```
//! use weft_types::{Filter, Properties, PropertyValue, ServiceId};
//!
//! let props = Properties::new().with("zone", PropertyValue::Str("eu".into()));
//! let me = ServiceId::from_raw(4);
//!
//! // Match by id.
//! assert!(Filter::service_id(me).matches(me, &props));
//!
//! // Match by property equality, composed.
//! let f = Filter::all(vec![
//!     Filter::service_id(me).into_entry(),
//!     Filter::property("zone", PropertyValue::Str("eu".into())).into_entry(),
//! ]);
//! assert!(f.matches(me, &props));
//! assert!(!f.matches(ServiceId::from_raw(5), &props));
//! ```

use crate::{Properties, PropertyValue, ServiceId};
use serde::{Deserialize, Serialize};

/// One predicate in a [`Filter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterEntry {
    /// Candidate's service id equals the given id.
    ServiceId(ServiceId),
    /// Candidate's properties contain `key` with exactly `value`.
    Property {
        /// Property key to look up on the candidate.
        key: String,
        /// Value the candidate must carry under `key`.
        value: PropertyValue,
    },
    /// Every inner filter matches (conjunction).
    All(Vec<FilterEntry>),
    /// At least one inner filter matches (disjunction).
    Any(Vec<FilterEntry>),
}

impl FilterEntry {
    fn matches(&self, candidate: ServiceId, properties: &Properties) -> bool {
        match self {
            Self::ServiceId(id) => *id == candidate,
            Self::Property { key, value } => properties.get(key) == Some(value),
            Self::All(entries) => entries.iter().all(|e| e.matches(candidate, properties)),
            Self::Any(entries) => entries.iter().any(|e| e.matches(candidate, properties)),
        }
    }
}

/// Predicate over a candidate service, evaluated against its id and
/// properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    root: Box<FilterEntry>,
}

impl Filter {
    /// Filter matching exactly one service id.
    #[must_use]
    pub fn service_id(id: ServiceId) -> Self {
        Self {
            root: Box::new(FilterEntry::ServiceId(id)),
        }
    }

    /// Filter matching candidates whose properties contain `key == value`.
    #[must_use]
    pub fn property(key: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            root: Box::new(FilterEntry::Property {
                key: key.into(),
                value,
            }),
        }
    }

    /// Conjunction of entries.
    #[must_use]
    pub fn all(entries: Vec<FilterEntry>) -> Self {
        Self {
            root: Box::new(FilterEntry::All(entries)),
        }
    }

    /// Disjunction of entries.
    #[must_use]
    pub fn any(entries: Vec<FilterEntry>) -> Self {
        Self {
            root: Box::new(FilterEntry::Any(entries)),
        }
    }

    /// Unwraps into a [`FilterEntry`] for composition.
    #[must_use]
    pub fn into_entry(self) -> FilterEntry {
        *self.root
    }

    /// Evaluates the filter against a candidate service.
    #[must_use]
    pub fn matches(&self, candidate: ServiceId, properties: &Properties) -> bool {
        self.root.matches(candidate, properties)
    }
}
