//! Network events and the payload conventions layered on them
//!
//! An event is a name plus an ordered tuple of [`ReplicatedValue`]s. Consumers
//! read the first argument as a discriminant and route on it.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use spacesync_core::{ReplicatedValue, SequenceChange, SequenceUpdateType};

/// Event name used for sequence, hierarchy and hotspot group changes
pub const SEQUENCE_CHANGED_EVENT: &str = "SequenceChanged";

/// Event name used for conversation changes
pub const CONVERSATION_EVENT: &str = "ConversationEvent";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub name: String,
    pub args: Vec<ReplicatedValue>,
    /// Filled in by the server; 0 for server-originated events
    pub sender_client_id: u64,
}

impl NetworkEvent {
    pub fn new(name: impl Into<String>, args: Vec<ReplicatedValue>) -> Self {
        Self {
            name: name.into(),
            args,
            sender_client_id: 0,
        }
    }
}

fn arg_i64(args: &[ReplicatedValue], index: usize) -> ProtocolResult<i64> {
    args.get(index)
        .and_then(ReplicatedValue::as_i64)
        .ok_or_else(|| ProtocolError::InvalidPayload(format!("argument {} is not an integer", index)))
}

fn arg_str(args: &[ReplicatedValue], index: usize) -> ProtocolResult<&str> {
    args.get(index)
        .and_then(ReplicatedValue::as_str)
        .ok_or_else(|| ProtocolError::InvalidPayload(format!("argument {} is not a string", index)))
}

/// `[Integer(update_type), String(key), String(space_id)]`
pub fn sequence_changed_event(change: &SequenceChange) -> NetworkEvent {
    NetworkEvent::new(
        SEQUENCE_CHANGED_EVENT,
        vec![
            ReplicatedValue::Integer(change.update_type.as_i64()),
            ReplicatedValue::from(change.key.as_str()),
            ReplicatedValue::from(change.space_id.as_str()),
        ],
    )
}

pub fn parse_sequence_changed(args: &[ReplicatedValue]) -> ProtocolResult<SequenceChange> {
    let raw = arg_i64(args, 0)?;
    let update_type = SequenceUpdateType::from_i64(raw)
        .ok_or_else(|| ProtocolError::InvalidPayload(format!("unknown sequence update type {}", raw)))?;

    Ok(SequenceChange {
        update_type,
        key: arg_str(args, 1)?.to_string(),
        space_id: arg_str(args, 2)?.to_string(),
    })
}

/// Discriminant of a conversation event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i64)]
pub enum ConversationEventType {
    NewMessage = 0,
    MessageInformation = 1,
    DeleteMessage = 2,
    DeleteConversation = 3,
    ConversationInformation = 4,
}

impl ConversationEventType {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(ConversationEventType::NewMessage),
            1 => Some(ConversationEventType::MessageInformation),
            2 => Some(ConversationEventType::DeleteMessage),
            3 => Some(ConversationEventType::DeleteConversation),
            4 => Some(ConversationEventType::ConversationInformation),
            _ => None,
        }
    }
}

/// `[Integer(type), String(conversation_id), String(message_id)]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEventPayload {
    pub event_type: ConversationEventType,
    pub conversation_id: String,
    /// Empty for conversation-wide events
    pub message_id: String,
}

impl ConversationEventPayload {
    pub fn to_event(&self) -> NetworkEvent {
        NetworkEvent::new(
            CONVERSATION_EVENT,
            vec![
                ReplicatedValue::Integer(self.event_type as i64),
                ReplicatedValue::from(self.conversation_id.as_str()),
                ReplicatedValue::from(self.message_id.as_str()),
            ],
        )
    }

    pub fn from_args(args: &[ReplicatedValue]) -> ProtocolResult<Self> {
        let raw = arg_i64(args, 0)?;
        let event_type = ConversationEventType::from_i64(raw).ok_or_else(|| {
            ProtocolError::InvalidPayload(format!("unknown conversation event type {}", raw))
        })?;

        Ok(Self {
            event_type,
            conversation_id: arg_str(args, 1)?.to_string(),
            message_id: arg_str(args, 2)?.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_changed_payload() {
        let change = SequenceChange {
            update_type: SequenceUpdateType::Rename,
            key: "old".into(),
            space_id: "space1".into(),
        };
        let event = sequence_changed_event(&change);
        assert_eq!(event.name, SEQUENCE_CHANGED_EVENT);
        assert_eq!(event.args[0], ReplicatedValue::Integer(2));
        assert_eq!(parse_sequence_changed(&event.args).unwrap(), change);
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(parse_sequence_changed(&[]).is_err());
        assert!(parse_sequence_changed(&[
            ReplicatedValue::Integer(42),
            "k".into(),
            "s".into()
        ])
        .is_err());
        assert!(ConversationEventPayload::from_args(&["x".into()]).is_err());
    }

    #[test]
    fn test_conversation_payload() {
        let payload = ConversationEventPayload {
            event_type: ConversationEventType::DeleteMessage,
            conversation_id: "c1".into(),
            message_id: "m1".into(),
        };
        let event = payload.to_event();
        assert_eq!(event.name, CONVERSATION_EVENT);
        assert_eq!(ConversationEventPayload::from_args(&event.args).unwrap(), payload);
    }
}
