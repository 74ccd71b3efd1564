//! Result contract shared with external collaborators
//!
//! Every asynchronous operation resolves to a `{ResultCode, HttpResultCode,
//! FailureReason}` triple. Internally the crates use `Result<T, Error>`; this
//! module projects those outcomes onto the external shape.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Completion state of an operation. `InProgress` is never terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultCode {
    InProgress,
    Success,
    Failed,
}

/// Why an operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    None,
    InvalidSequenceKey,
    InvalidArgument,
    PermissionDenied,
    NotFound,
    Conflict,
    Timeout,
    Cancelled,
    Transport,
    Unknown,
}

impl Default for FailureReason {
    fn default() -> Self {
        FailureReason::None
    }
}

/// Outcome of an asynchronous operation as seen by collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub result_code: ResultCode,
    pub http_result_code: u16,
    pub failure_reason: FailureReason,
}

impl OperationResult {
    pub fn in_progress() -> Self {
        Self {
            result_code: ResultCode::InProgress,
            http_result_code: 0,
            failure_reason: FailureReason::None,
        }
    }

    pub fn success(http_result_code: u16) -> Self {
        Self {
            result_code: ResultCode::Success,
            http_result_code,
            failure_reason: FailureReason::None,
        }
    }

    pub fn failed(error: &Error) -> Self {
        Self {
            result_code: ResultCode::Failed,
            http_result_code: error.http_code(),
            failure_reason: error.failure_reason(),
        }
    }

    /// Project a finished outcome onto the contract
    pub fn from_outcome<T>(outcome: &Result<T>) -> Self {
        match outcome {
            Ok(_) => Self::success(200),
            Err(e) => Self::failed(e),
        }
    }

    /// Callers keep waiting while this is false
    pub fn is_terminal(&self) -> bool {
        self.result_code != ResultCode::InProgress
    }

    pub fn is_success(&self) -> bool {
        self.result_code == ResultCode::Success
    }
}

impl Default for OperationResult {
    fn default() -> Self {
        Self::in_progress()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_progress_is_not_terminal() {
        let pending = OperationResult::default();
        assert!(!pending.is_terminal());
        assert!(!pending.is_success());
    }

    #[test]
    fn test_from_outcome() {
        let ok: Result<u32> = Ok(1);
        assert_eq!(OperationResult::from_outcome(&ok), OperationResult::success(200));

        let err: Result<u32> = Err(Error::Service { http_code: 403, message: "denied".into() });
        let projected = OperationResult::from_outcome(&err);
        assert_eq!(projected.result_code, ResultCode::Failed);
        assert_eq!(projected.http_result_code, 403);
        assert_eq!(projected.failure_reason, FailureReason::PermissionDenied);
        assert!(projected.is_terminal());
    }
}
