//! Worker error types
//!
//! Two channels:
//! - [`Rejection`] is the structured "cannot proceed right now" answer
//!   (missing access, wrong version, source still growing). It travels inside
//!   `Ok(..)` values up through the lifecycle phases.
//! - [`WorkerError`] is for programming errors and unexpected runtime faults.
//!   Inside a running job these become the job's `error` event.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::accessor::AccessType;
use crate::expectation::ExpectationType;

/// Result type alias for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Outcome of a capability check: `Ok(())` or a structured rejection.
pub type CheckResult = Result<(), Rejection>;

/// Dual-audience message: `user` is shown to operators, `tech` goes to logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub user: String,
    pub tech: String,
}

impl Reason {
    pub fn new(user: impl Into<String>, tech: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            tech: tech.into(),
        }
    }

    /// Same text for both audiences.
    pub fn plain(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            user: message.clone(),
            tech: message,
        }
    }

    /// Prefix both messages, keeping the original as the tail.
    pub fn prefixed(&self, user_prefix: &str, tech_prefix: &str) -> Self {
        Self {
            user: format!("{}{}", user_prefix, self.user),
            tech: format!("{}{}", tech_prefix, self.tech),
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.user, self.tech)
    }
}

/// A structured failure: the reason plus whether it is a recognized,
/// operator-actionable condition (`known_reason = true`) or an unexpected
/// fault caught and reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: Reason,
    pub known_reason: bool,
}

impl Rejection {
    pub fn known(user: impl Into<String>, tech: impl Into<String>) -> Self {
        Self {
            reason: Reason::new(user, tech),
            known_reason: true,
        }
    }

    pub fn unknown(user: impl Into<String>, tech: impl Into<String>) -> Self {
        Self {
            reason: Reason::new(user, tech),
            known_reason: false,
        }
    }

    pub fn with_reason(reason: Reason, known_reason: bool) -> Self {
        Self {
            reason,
            known_reason,
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.known_reason {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "unexpected: {}", self.reason)
        }
    }
}

/// Errors that abort an operation instead of answering it.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// An operation exceeded its time budget
    #[error("Timeout after {}ms: {label}", after.as_millis())]
    Timeout { label: String, after: Duration },

    /// `cancel()` was called before the executor registered a cancel handler
    #[error("Cancel called before a cancel handler was registered")]
    CancelHandlerMissing,

    /// The executor tried to register a second cancel handler
    #[error("A cancel handler is already registered")]
    CancelHandlerAlreadySet,

    /// The job was cancelled before it settled
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// `start()` called twice on the same job
    #[error("Work \"{work_label}\" has already been started")]
    AlreadyStarted { work_label: String },

    /// No handle factory registered for an accessor type
    #[error("No accessor handle registered for type {0}")]
    AccessorNotRegistered(AccessType),

    /// The accessor variant does not implement this operation
    #[error("{operation} is not supported by {access_type} accessors")]
    Unsupported {
        access_type: AccessType,
        operation: &'static str,
    },

    /// A handle of an unexpected variant reached a branch that assumed otherwise
    #[error("Unexpected accessor type {actual}, expected {expected}")]
    UnexpectedAccessorType {
        expected: AccessType,
        actual: AccessType,
    },

    /// An expectation was routed to a handler for another type
    #[error("Wrong expectation type: expected {expected}, got {actual}")]
    WrongExpectationType {
        expected: ExpectationType,
        actual: ExpectationType,
    },

    /// A backend reported a fault
    #[error("Backend error on accessor {accessor_id}: {message}")]
    Backend {
        accessor_id: String,
        message: String,
    },

    /// The owning Expectation Manager could not be reached or answered with an error
    #[error("Manager {manager_id} call failed: {message}")]
    Manager { manager_id: String, message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything else raised from inside a job body
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkerError {
    /// Create a timeout error
    pub fn timeout(label: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            label: label.into(),
            after,
        }
    }

    /// Create a backend error
    pub fn backend(accessor_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            accessor_id: accessor_id.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Operator-facing summary plus the full technical message.
    pub fn to_reason(&self) -> Reason {
        let user = match self {
            Self::Timeout { .. } => "Operation timed out",
            Self::Cancelled(_) => "Work was cancelled",
            Self::AccessorNotRegistered(_) | Self::Unsupported { .. } => {
                "Accessor type is not supported by this worker"
            }
            Self::Backend { .. } | Self::Io(_) => "Error accessing the package",
            Self::Manager { .. } => "Could not reach the Expectation Manager",
            Self::Config { .. } => "Worker configuration error",
            _ => "Internal error",
        };
        Reason::new(user, self.to_string())
    }

    /// Surface this error on the structured channel, flagged as unexpected.
    pub fn to_rejection(&self) -> Rejection {
        Rejection::with_reason(self.to_reason(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_prefixed() {
        let reason = Reason::new("Not found", "stat ENOENT");
        let prefixed = reason.prefixed("Source: ", "container1: ");
        assert_eq!(prefixed.user, "Source: Not found");
        assert_eq!(prefixed.tech, "container1: stat ENOENT");
    }

    #[test]
    fn test_timeout_converts_to_unknown_rejection() {
        let err = WorkerError::timeout("checkPackageReadAccess", Duration::from_millis(1500));
        assert!(err.is_timeout());
        let rejection = err.to_rejection();
        assert!(!rejection.known_reason);
        assert_eq!(rejection.reason.user, "Operation timed out");
        assert!(rejection.reason.tech.contains("1500ms"));
        assert!(rejection.reason.tech.contains("checkPackageReadAccess"));
    }

    #[test]
    fn test_unsupported_display() {
        let err = WorkerError::Unsupported {
            access_type: AccessType::Http,
            operation: "putPackageInfo",
        };
        assert_eq!(
            err.to_string(),
            "putPackageInfo is not supported by HTTP accessors"
        );
    }

    #[test]
    fn test_rejection_json_roundtrip() {
        let rejection = Rejection::known("Source not stable", "fileSize: 100 vs 150");
        let json = serde_json::to_string(&rejection).unwrap();
        let parsed: Rejection = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rejection);
    }
}
