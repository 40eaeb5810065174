//! Unified error interface for Weft.
//!
//! Every error type in the workspace implements [`ErrorCode`]: a stable
//! machine-readable code plus a recoverability flag. Codes are
//! UPPER_SNAKE_CASE with a per-crate prefix (`EVENT_`, `SERVICE_`) and are
//! part of the API contract — they never change once published.
//!
//! # Example
//!
//! ```
//! use weft_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum QueueError {
//!     Full,
//!     ShutDown,
//! }
//!
//! impl ErrorCode for QueueError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Full => "QUEUE_FULL",
//!             Self::ShutDown => "QUEUE_SHUT_DOWN",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Full)
//!     }
//! }
//!
//! assert_eq!(QueueError::Full.code(), "QUEUE_FULL");
//! assert!(QueueError::Full.is_recoverable());
//! ```

/// Machine-readable error code interface.
///
/// An error is *recoverable* when retrying the operation may succeed or the
/// caller can take corrective action; it is not recoverable when retrying
/// cannot help (bad input, terminal lifecycle state, programming error).
pub trait ErrorCode {
    /// Returns the stable UPPER_SNAKE_CASE code for this error.
    fn code(&self) -> &'static str;

    /// Returns whether retrying or corrective action may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that an error code follows Weft conventions: non-empty,
/// UPPER_SNAKE_CASE, and carrying the expected prefix.
///
/// # Panics
///
/// Panics with a descriptive message if validation fails. Intended for
/// tests covering every variant of an error enum.
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "error code '{code}' must start with prefix '{expected_prefix}'"
    );
    assert!(
        is_upper_snake_case(code),
        "error code '{code}' must be UPPER_SNAKE_CASE"
    );
}

/// [`assert_error_code`] over a slice — use to cover all variants at once.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
