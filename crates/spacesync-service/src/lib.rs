//! SpaceSync Sequence Service
//!
//! The remote CRUD boundary for sequences:
//! - `SequenceService`: the operations the client relies on
//! - `SequenceObserver`: change notification hook on the server side
//! - Memory (default): in-process backend used by tests and demos

pub mod memory;

use async_trait::async_trait;
use spacesync_core::{Sequence, SequenceChange, SequenceCriteria};

/// Sequence REST API as seen by the client
#[async_trait]
pub trait SequenceService: Send + Sync {
    /// Store a new sequence. Fails with a conflict if the key exists.
    async fn create_sequence(&self, sequence: Sequence) -> Result<Sequence, ServiceError>;

    /// Replace items and metadata of an existing sequence
    async fn update_sequence(&self, sequence: Sequence) -> Result<Sequence, ServiceError>;

    /// Move a sequence to a new key, keeping items and metadata
    async fn rename_sequence(&self, old_key: &str, new_key: &str) -> Result<Sequence, ServiceError>;

    /// Delete sequences. Keys that do not exist are skipped.
    async fn delete_sequences(&self, keys: &[String]) -> Result<(), ServiceError>;

    async fn get_sequence(&self, key: &str) -> Result<Sequence, ServiceError>;

    async fn get_sequences_by_criteria(
        &self,
        criteria: &SequenceCriteria,
    ) -> Result<Vec<Sequence>, ServiceError>;

    /// Every sequence holding at least one of `items`
    async fn get_all_sequences_containing_items(
        &self,
        items: &[String],
        reference_type: Option<&str>,
        reference_ids: &[String],
    ) -> Result<Vec<Sequence>, ServiceError>;
}

/// Receives every successful mutation, in order, after it is visible
pub trait SequenceObserver: Send + Sync {
    fn sequence_changed(&self, change: &SequenceChange);
}

/// Service error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Sequence not found: {0}")]
    NotFound(String),

    #[error("Sequence already exists: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    pub fn http_code(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::Forbidden(_) => 403,
            ServiceError::NotFound(_) => 404,
            ServiceError::Conflict(_) => 409,
            ServiceError::Unavailable(_) => 503,
        }
    }
}

impl From<ServiceError> for spacesync_core::Error {
    fn from(e: ServiceError) -> Self {
        spacesync_core::Error::Service {
            http_code: e.http_code(),
            message: e.to_string(),
        }
    }
}

/// Service statistics
#[derive(Debug, Clone, Default)]
pub struct ServiceStats {
    pub sequence_count: usize,
    /// Requests received, including rejected ones
    pub request_count: usize,
}

pub use memory::MemorySequenceService;
