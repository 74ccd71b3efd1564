//! SpaceSync Protocol
//!
//! Binary messages exchanged between a client and the space server.
//!
//! ## Message Flow
//! ```text
//! client -> server   ClientMessage { request_id, Request }
//! server -> client   ServerMessage::Reply { request_id, Reply }
//! server -> client   ServerMessage::Push { seq, Push }
//! ```
//!
//! Frames are MessagePack bodies with a 4-byte big-endian length prefix.

pub mod command;
pub mod error;
pub mod event;
pub mod parser;
pub mod response;

pub use command::{ClientMessage, Request};
pub use error::{ProtocolError, ProtocolResult};
pub use event::{
    parse_sequence_changed, sequence_changed_event, ConversationEventPayload,
    ConversationEventType, NetworkEvent, CONVERSATION_EVENT, SEQUENCE_CHANGED_EVENT,
};
pub use parser::{encode, Parser, MAX_MESSAGE_SIZE};
pub use response::{Push, Reply, ServerMessage};
