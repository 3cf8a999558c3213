//! Provisioning error types

use crate::report::Step;
use std::time::Duration;
use thiserror::Error;

/// Failure category reported by a control-plane adapter.
///
/// Adapters translate their provider-specific error codes into one of these
/// kinds. Whether a kind is harmless depends on the operation that produced it,
/// see [`crate::idempotent::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The resource (or an identical one) already exists
    AlreadyExists,
    /// The resource does not exist
    NotFound,
    /// An identical rule or attachment is already present
    Duplicate,
    /// Request rate exceeded
    Throttled,
    /// The service or the transport failed; the request may succeed later
    Unavailable,
    /// Credentials are missing, invalid or lack the permission
    AccessDenied,
    /// The request was rejected as malformed or over quota
    InvalidRequest,
    /// The resource exists but is in a state that forbids the operation
    InvalidState,
    /// Anything the adapter could not map
    Other,
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteErrorKind::AlreadyExists => write!(f, "already exists"),
            RemoteErrorKind::NotFound => write!(f, "not found"),
            RemoteErrorKind::Duplicate => write!(f, "duplicate"),
            RemoteErrorKind::Throttled => write!(f, "throttled"),
            RemoteErrorKind::Unavailable => write!(f, "unavailable"),
            RemoteErrorKind::AccessDenied => write!(f, "access denied"),
            RemoteErrorKind::InvalidRequest => write!(f, "invalid request"),
            RemoteErrorKind::InvalidState => write!(f, "invalid state"),
            RemoteErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Error returned by a Resource Client call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,

    /// Provider error code (e.g. `EntityAlreadyExists`), when one was returned
    pub code: Option<String>,

    pub message: String,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({}): {}", code, self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::AlreadyExists, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == RemoteErrorKind::NotFound
    }
}

/// What a remote failure means for the operation that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The remote side is already where the operation wanted it; treat as success
    AlreadyInDesiredState,
    /// Worth another attempt
    Transient,
    /// Abort the current step and surface the error
    Fatal,
}

/// Provisioning errors
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Step {step} failed with a transient error: {source}")]
    TransientRemote {
        step: Step,
        #[source]
        source: RemoteError,
    },

    #[error("Step {step} failed: {source}")]
    FatalRemote {
        step: Step,
        #[source]
        source: RemoteError,
    },

    #[error("Step {step} timed out after {}s (last status: {last_status})", .waited.as_secs())]
    TimedOut {
        step: Step,
        waited: Duration,
        last_status: String,
    },

    #[error("Step {step} observed terminal status: {status}")]
    TerminalStatus { step: Step, status: String },

    #[error("Step {step} was cancelled")]
    Cancelled { step: Step },

    #[error("State file error: {0}")]
    State(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse taxonomy of [`ProvisionError`] for callers that branch on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    TransientRemote,
    FatalRemote,
    TimedOut,
    TerminalStatus,
    Cancelled,
    State,
}

impl ProvisionError {
    /// Wrap a remote failure that was not absorbed by the idempotent layer
    pub fn remote(step: Step, class: ErrorClass, source: RemoteError) -> Self {
        match class {
            ErrorClass::Transient => ProvisionError::TransientRemote { step, source },
            // AlreadyInDesiredState never reaches here from the idempotent layer
            ErrorClass::Fatal | ErrorClass::AlreadyInDesiredState => {
                ProvisionError::FatalRemote { step, source }
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvisionError::Configuration(_) => ErrorKind::Configuration,
            ProvisionError::TransientRemote { .. } => ErrorKind::TransientRemote,
            ProvisionError::FatalRemote { .. } => ErrorKind::FatalRemote,
            ProvisionError::TimedOut { .. } => ErrorKind::TimedOut,
            ProvisionError::TerminalStatus { .. } => ErrorKind::TerminalStatus,
            ProvisionError::Cancelled { .. } => ErrorKind::Cancelled,
            ProvisionError::State(_) | ProvisionError::Io(_) | ProvisionError::Json(_) => {
                ErrorKind::State
            }
        }
    }

    /// The protocol step that failed, if the error came from one
    pub fn step(&self) -> Option<Step> {
        match self {
            ProvisionError::TransientRemote { step, .. }
            | ProvisionError::FatalRemote { step, .. }
            | ProvisionError::TimedOut { step, .. }
            | ProvisionError::TerminalStatus { step, .. }
            | ProvisionError::Cancelled { step } => Some(*step),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display_includes_code() {
        let err = RemoteError::already_exists("Role with name dwhRole already exists.")
            .with_code("EntityAlreadyExists");
        assert_eq!(
            err.to_string(),
            "EntityAlreadyExists (already exists): Role with name dwhRole already exists."
        );

        let err = RemoteError::new(RemoteErrorKind::Unavailable, "connection reset");
        assert_eq!(err.to_string(), "unavailable: connection reset");
    }

    #[test]
    fn test_provision_error_reports_failing_step() {
        let err = ProvisionError::remote(
            Step::CreateRole,
            ErrorClass::Fatal,
            RemoteError::new(RemoteErrorKind::AccessDenied, "not authorized"),
        );
        assert_eq!(err.kind(), ErrorKind::FatalRemote);
        assert_eq!(err.step(), Some(Step::CreateRole));
        assert!(err.to_string().contains("create-role"));

        let err = ProvisionError::Configuration("DWH_DB is empty".to_string());
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.step(), None);
    }

    #[test]
    fn test_timed_out_is_distinct_from_fatal() {
        let err = ProvisionError::TimedOut {
            step: Step::WaitAvailable,
            waited: Duration::from_secs(1800),
            last_status: "creating".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert!(err.to_string().contains("1800s"));
    }
}
