//! Service layer errors.
//!
//! # Error Code Convention
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`Construction`](ServiceError::Construction) | `SERVICE_CONSTRUCTION` | No |
//! | [`NotFound`](ServiceError::NotFound) | `SERVICE_NOT_FOUND` | No |
//! | [`WrongState`](ServiceError::WrongState) | `SERVICE_WRONG_STATE` | Yes |
//! | [`TypeMismatch`](ServiceError::TypeMismatch) | `SERVICE_TYPE_MISMATCH` | No |
//! | [`DuplicateCompletionHandler`](ServiceError::DuplicateCompletionHandler) | `SERVICE_DUPLICATE_COMPLETION_HANDLER` | No |

use crate::ServiceState;
use thiserror::Error;
use weft_types::{ErrorCode, ServiceId};

/// Error raised by registry and registration operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// A service factory failed at construction time; the service was never
    /// registered and no events fired.
    #[error("service construction failed: {0}")]
    Construction(String),

    /// No service with the given id is registered.
    #[error("service {0} not found")]
    NotFound(ServiceId),

    /// The operation is not valid in the service's current lifecycle state.
    #[error("service {id} is {state}, operation requires a different state")]
    WrongState {
        /// Service the operation targeted.
        id: ServiceId,
        /// Its state at the time.
        state: ServiceState,
    },

    /// The registered service is not of the type the registration expected.
    #[error("service {0} has a different concrete type")]
    TypeMismatch(ServiceId),

    /// The `(owner, event type)` pair already has completion callbacks.
    #[error("service {0} already registered completion callbacks for this event type")]
    DuplicateCompletionHandler(ServiceId),
}

impl ErrorCode for ServiceError {
    fn code(&self) -> &'static str {
        match self {
            Self::Construction(_) => "SERVICE_CONSTRUCTION",
            Self::NotFound(_) => "SERVICE_NOT_FOUND",
            Self::WrongState { .. } => "SERVICE_WRONG_STATE",
            Self::TypeMismatch(_) => "SERVICE_TYPE_MISMATCH",
            Self::DuplicateCompletionHandler(_) => "SERVICE_DUPLICATE_COMPLETION_HANDLER",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::WrongState { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::assert_error_codes;

    fn all_variants() -> Vec<ServiceError> {
        vec![
            ServiceError::Construction("x".into()),
            ServiceError::NotFound(ServiceId::from_raw(1)),
            ServiceError::WrongState {
                id: ServiceId::from_raw(1),
                state: ServiceState::Stopping,
            },
            ServiceError::TypeMismatch(ServiceId::from_raw(1)),
            ServiceError::DuplicateCompletionHandler(ServiceId::from_raw(1)),
        ]
    }

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(&all_variants(), "SERVICE_");
    }

    #[test]
    fn wrong_state_is_recoverable() {
        for err in all_variants() {
            let expect = matches!(err, ServiceError::WrongState { .. });
            assert_eq!(err.is_recoverable(), expect, "{err:?}");
        }
    }

    #[test]
    fn messages_mention_ids() {
        let err = ServiceError::NotFound(ServiceId::from_raw(7));
        assert!(err.to_string().contains("svc:7"));
    }
}
