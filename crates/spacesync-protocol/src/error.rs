//! Protocol error types

use thiserror::Error;

/// Protocol-specific errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Message too large: {size} > {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("Core error: {0}")]
    Core(#[from] spacesync_core::Error),
}

impl From<rmp_serde::encode::Error> for ProtocolError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        ProtocolError::Encode(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ProtocolError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        ProtocolError::Decode(e.to_string())
    }
}

impl From<ProtocolError> for spacesync_core::Error {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Core(inner) => inner,
            ProtocolError::InvalidPayload(msg) => spacesync_core::Error::InvalidArgument(msg),
            other => spacesync_core::Error::Serialization(other.to_string()),
        }
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
