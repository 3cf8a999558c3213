//! AWS error code mapping
//!
//! Service errors are mapped by their error code; anything that never got a
//! service response (timeouts, dispatch failures, unparseable responses) is
//! reported as `Unavailable` so the idempotent layer retries it.

use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use dwhflow_cloud::{RemoteError, RemoteErrorKind};

/// Map an AWS error code to a remote error kind
pub fn kind_for_code(code: &str) -> RemoteErrorKind {
    match code {
        "EntityAlreadyExists" | "ClusterAlreadyExists" => RemoteErrorKind::AlreadyExists,

        "NoSuchEntity"
        | "ClusterNotFound"
        | "InvalidPermission.NotFound"
        | "InvalidGroup.NotFound"
        | "InvalidVpcID.NotFound" => RemoteErrorKind::NotFound,

        "InvalidPermission.Duplicate" => RemoteErrorKind::Duplicate,

        "Throttling"
        | "ThrottlingException"
        | "RequestLimitExceeded"
        | "TooManyRequestsException" => RemoteErrorKind::Throttled,

        "ServiceUnavailable" | "ServiceFailure" | "InternalFailure" | "InternalError" => {
            RemoteErrorKind::Unavailable
        }

        "AccessDenied"
        | "AccessDeniedException"
        | "UnauthorizedOperation"
        | "AuthFailure"
        | "InvalidClientTokenId"
        | "SignatureDoesNotMatch" => RemoteErrorKind::AccessDenied,

        "InvalidClusterState" | "DeleteConflict" => RemoteErrorKind::InvalidState,

        "ValidationError"
        | "MalformedPolicyDocument"
        | "InvalidParameterValue"
        | "InvalidParameterCombination"
        | "MissingParameter"
        | "ClusterQuotaExceeded"
        | "InsufficientClusterCapacity"
        | "LimitExceeded" => RemoteErrorKind::InvalidRequest,

        _ => RemoteErrorKind::Other,
    }
}

/// Convert an SDK error into a [`RemoteError`]
pub(crate) fn remote_error<E, R>(err: SdkError<E, R>) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match &err {
        SdkError::ServiceError(context) => {
            let service_err = context.err();
            let message = service_err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
            match service_err.code() {
                Some(code) => RemoteError::new(kind_for_code(code), message).with_code(code),
                None => RemoteError::new(RemoteErrorKind::Other, message),
            }
        }
        SdkError::ConstructionFailure(_) => RemoteError::new(
            RemoteErrorKind::InvalidRequest,
            DisplayErrorContext(&err).to_string(),
        ),
        _ => RemoteError::new(
            RemoteErrorKind::Unavailable,
            DisplayErrorContext(&err).to_string(),
        ),
    }
}
