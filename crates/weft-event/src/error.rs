//! Event layer errors.
//!
//! # Error Code Convention
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`HandlerFault`](EventError::HandlerFault) | `EVENT_HANDLER_FAULT` | No |
//! | [`Cancelled`](EventError::Cancelled) | `EVENT_CANCELLED` | No |

use serde::{Deserialize, Serialize};
use thiserror::Error;
use weft_types::ErrorCode;

/// Failure surfaced through a generator.
///
/// A producer faults by returning `Err`; the fault propagates through the
/// consumer's next advance and is routed to the originator's error callback
/// by the dispatching manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum EventError {
    /// A handler's generator surfaced an unhandled fault.
    #[error("handler fault: {0}")]
    HandlerFault(String),

    /// The generator was cancelled before completing.
    ///
    /// Observed when advancing a generator whose handle requested
    /// cancellation. Intentional teardown, not a defect.
    #[error("generator cancelled")]
    Cancelled,
}

impl EventError {
    /// Shorthand for [`EventError::HandlerFault`].
    #[must_use]
    pub fn fault(message: impl Into<String>) -> Self {
        Self::HandlerFault(message.into())
    }
}

impl ErrorCode for EventError {
    fn code(&self) -> &'static str {
        match self {
            Self::HandlerFault(_) => "EVENT_HANDLER_FAULT",
            Self::Cancelled => "EVENT_CANCELLED",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
