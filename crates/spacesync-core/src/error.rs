//! Error types for SpaceSync Core

use crate::result::FailureReason;
use thiserror::Error;

/// Core error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Component {component_id} not found on entity {entity}")]
    ComponentNotFound { entity: String, component_id: u16 },

    #[error("Entity is not modifiable by this client: {0}")]
    NotModifiable(String),

    #[error("Invalid sequence key: {0}")]
    InvalidSequenceKey(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Service rejected request ({http_code}): {message}")]
    Service { http_code: u16, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Reason code reported through the external result contract
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Error::InvalidSequenceKey(_) => FailureReason::InvalidSequenceKey,
            Error::EntityNotFound(_) | Error::ComponentNotFound { .. } => FailureReason::NotFound,
            Error::NotModifiable(_) => FailureReason::PermissionDenied,
            Error::InvalidArgument(_) | Error::Config(_) => FailureReason::InvalidArgument,
            Error::Service { http_code, .. } => match *http_code {
                400 => FailureReason::InvalidArgument,
                401 | 403 => FailureReason::PermissionDenied,
                404 => FailureReason::NotFound,
                409 => FailureReason::Conflict,
                _ => FailureReason::Unknown,
            },
            Error::Timeout(_) => FailureReason::Timeout,
            Error::Cancelled => FailureReason::Cancelled,
            Error::Transport(_) | Error::Serialization(_) => FailureReason::Transport,
        }
    }

    /// HTTP status carried by server-side failures, 0 otherwise
    pub fn http_code(&self) -> u16 {
        match self {
            Error::Service { http_code, .. } => *http_code,
            _ => 0,
        }
    }

    /// Transport failures may be retried by the caller. Validation and
    /// permission failures never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout(_) | Error::Transport(_) => true,
            Error::Service { http_code, .. } => *http_code >= 500,
            _ => false,
        }
    }
}

/// Result type alias for SpaceSync Core operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_codes_map_to_reasons() {
        let forbidden = Error::Service { http_code: 403, message: "no edit rights".into() };
        assert_eq!(forbidden.failure_reason(), FailureReason::PermissionDenied);
        assert_eq!(forbidden.http_code(), 403);
        assert!(!forbidden.is_retryable());

        let conflict = Error::Service { http_code: 409, message: "exists".into() };
        assert_eq!(conflict.failure_reason(), FailureReason::Conflict);

        let unavailable = Error::Service { http_code: 503, message: "busy".into() };
        assert!(unavailable.is_retryable());
    }

    #[test]
    fn test_validation_is_not_retryable() {
        let err = Error::InvalidSequenceKey("a/b".into());
        assert_eq!(err.failure_reason(), FailureReason::InvalidSequenceKey);
        assert_eq!(err.http_code(), 0);
        assert!(!err.is_retryable());
        assert!(Error::Timeout("get".into()).is_retryable());
    }
}
