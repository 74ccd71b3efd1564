//! Conversations - threaded messages stored as sequences
//!
//! A conversation is the sequence `Conversation:<ConversationId>` whose items
//! are its message ids in posting order. Each message is its own sequence
//! `Conversation:<ConversationId>:Message:<MessageId>`. Authors, text, titles
//! and timestamps live in sequence metadata.
//!
//! Every successful change is announced to the space as a `ConversationEvent`.

use crate::sequence::SequenceSystem;
use spacesync_core::{Error, Result, Sequence, SequenceCriteria};
use spacesync_protocol::{
    ConversationEventPayload, ConversationEventType, NetworkEvent, CONVERSATION_EVENT,
};
use spacesync_transport::EventBus;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

pub const CONVERSATION_REFERENCE_TYPE: &str = "Conversation";
const CONVERSATION_KEY_PREFIX: &str = "Conversation:";
const MESSAGE_SEGMENT: &str = ":Message:";

mod meta {
    pub const USER_ID: &str = "UserId";
    pub const MESSAGE: &str = "Message";
    pub const TITLE: &str = "Title";
    pub const RESOLVED: &str = "Resolved";
    pub const CREATED_AT: &str = "CreatedAt";
    pub const EDITED_AT: &str = "EditedAt";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationInfo {
    pub conversation_id: String,
    pub user_id: String,
    pub title: String,
    pub resolved: bool,
    /// Milliseconds since the Unix epoch
    pub created_at: u64,
    pub edited_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    pub conversation_id: String,
    pub message_id: String,
    pub user_id: String,
    pub message: String,
    pub created_at: u64,
    pub edited_at: Option<u64>,
}

/// One page of messages, oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePage {
    pub messages: Vec<MessageInfo>,
    /// Messages in the whole conversation
    pub total_count: usize,
}

pub fn conversation_key(conversation_id: &str) -> String {
    format!("{}{}", CONVERSATION_KEY_PREFIX, conversation_id)
}

pub fn message_key(conversation_id: &str, message_id: &str) -> String {
    format!("{}{}{}{}", CONVERSATION_KEY_PREFIX, conversation_id, MESSAGE_SEGMENT, message_id)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn meta_u64(metadata: &BTreeMap<String, String>, key: &str) -> Option<u64> {
    metadata.get(key).and_then(|v| v.parse().ok())
}

fn meta_string(metadata: &BTreeMap<String, String>, key: &str) -> String {
    metadata.get(key).cloned().unwrap_or_default()
}

impl ConversationInfo {
    fn from_sequence(conversation_id: &str, sequence: &Sequence) -> Self {
        let metadata = &sequence.metadata;
        Self {
            conversation_id: conversation_id.to_string(),
            user_id: meta_string(metadata, meta::USER_ID),
            title: meta_string(metadata, meta::TITLE),
            resolved: metadata.get(meta::RESOLVED).map_or(false, |v| v == "true"),
            created_at: meta_u64(metadata, meta::CREATED_AT).unwrap_or_default(),
            edited_at: meta_u64(metadata, meta::EDITED_AT),
        }
    }

    fn to_metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        metadata.insert(meta::USER_ID.to_string(), self.user_id.clone());
        metadata.insert(meta::TITLE.to_string(), self.title.clone());
        metadata.insert(meta::RESOLVED.to_string(), self.resolved.to_string());
        metadata.insert(meta::CREATED_AT.to_string(), self.created_at.to_string());
        if let Some(edited_at) = self.edited_at {
            metadata.insert(meta::EDITED_AT.to_string(), edited_at.to_string());
        }
        metadata
    }
}

impl MessageInfo {
    fn from_sequence(conversation_id: &str, message_id: &str, sequence: &Sequence) -> Self {
        let metadata = &sequence.metadata;
        Self {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
            user_id: meta_string(metadata, meta::USER_ID),
            message: meta_string(metadata, meta::MESSAGE),
            created_at: meta_u64(metadata, meta::CREATED_AT).unwrap_or_default(),
            edited_at: meta_u64(metadata, meta::EDITED_AT),
        }
    }

    fn to_metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        metadata.insert(meta::USER_ID.to_string(), self.user_id.clone());
        metadata.insert(meta::MESSAGE.to_string(), self.message.clone());
        metadata.insert(meta::CREATED_AT.to_string(), self.created_at.to_string());
        if let Some(edited_at) = self.edited_at {
            metadata.insert(meta::EDITED_AT.to_string(), edited_at.to_string());
        }
        metadata
    }
}

#[derive(Clone)]
pub struct ConversationSystem {
    sequences: SequenceSystem,
    bus: Arc<EventBus>,
    user_id: String,
    space_id: String,
}

impl ConversationSystem {
    pub fn new(
        sequences: SequenceSystem,
        bus: Arc<EventBus>,
        user_id: impl Into<String>,
        space_id: impl Into<String>,
    ) -> Self {
        Self {
            sequences,
            bus,
            user_id: user_id.into(),
            space_id: space_id.into(),
        }
    }

    /// Start a conversation and return its id
    pub async fn create_conversation(&self, title: &str) -> Result<String> {
        let conversation_id = Uuid::new_v4().simple().to_string();
        let info = ConversationInfo {
            conversation_id: conversation_id.clone(),
            user_id: self.user_id.clone(),
            title: title.to_string(),
            resolved: false,
            created_at: now_millis(),
            edited_at: None,
        };

        self.sequences
            .create_sequence(
                &conversation_key(&conversation_id),
                CONVERSATION_REFERENCE_TYPE,
                &self.space_id,
                Vec::new(),
                info.to_metadata(),
            )
            .await?;
        debug!(conversation_id = %conversation_id, "Created conversation");

        self.announce(ConversationEventType::ConversationInformation, &conversation_id, "")
            .await;
        Ok(conversation_id)
    }

    /// Post a message at the end of a conversation
    pub async fn add_message(&self, conversation_id: &str, message: &str) -> Result<MessageInfo> {
        let root = self.sequences.get_sequence(&conversation_key(conversation_id)).await?;

        let info = MessageInfo {
            conversation_id: conversation_id.to_string(),
            message_id: Uuid::new_v4().simple().to_string(),
            user_id: self.user_id.clone(),
            message: message.to_string(),
            created_at: now_millis(),
            edited_at: None,
        };
        self.sequences
            .create_sequence(
                &message_key(conversation_id, &info.message_id),
                CONVERSATION_REFERENCE_TYPE,
                &self.space_id,
                Vec::new(),
                info.to_metadata(),
            )
            .await?;

        let mut items = root.items;
        items.push(info.message_id.clone());
        self.update_root(&root.key, items, root.metadata).await?;

        self.announce(ConversationEventType::NewMessage, conversation_id, &info.message_id)
            .await;
        Ok(info)
    }

    /// Messages `offset..offset + limit` in posting order
    pub async fn get_messages(
        &self,
        conversation_id: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<MessagePage> {
        let root = self.sequences.get_sequence(&conversation_key(conversation_id)).await?;
        let total_count = root.items.len();
        let page: Vec<&String> = root
            .items
            .iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        if page.is_empty() {
            return Ok(MessagePage {
                messages: Vec::new(),
                total_count,
            });
        }

        let criteria = SequenceCriteria {
            keys: page.iter().map(|id| message_key(conversation_id, id)).collect(),
            ..Default::default()
        };
        let mut by_key: BTreeMap<String, Sequence> = self
            .sequences
            .get_sequences_by_criteria(&criteria)
            .await?
            .into_iter()
            .map(|s| (s.key.clone(), s))
            .collect();

        let messages = page
            .into_iter()
            .filter_map(|id| match by_key.remove(&message_key(conversation_id, id)) {
                Some(sequence) => Some(MessageInfo::from_sequence(conversation_id, id, &sequence)),
                None => {
                    warn!(conversation_id, message_id = %id, "Conversation lists a missing message");
                    None
                }
            })
            .collect();

        Ok(MessagePage {
            messages,
            total_count,
        })
    }

    pub async fn get_message(&self, conversation_id: &str, message_id: &str) -> Result<MessageInfo> {
        let sequence = self
            .sequences
            .get_sequence(&message_key(conversation_id, message_id))
            .await?;
        Ok(MessageInfo::from_sequence(conversation_id, message_id, &sequence))
    }

    /// Replace the text of a message
    pub async fn update_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        message: &str,
    ) -> Result<MessageInfo> {
        let key = message_key(conversation_id, message_id);
        let sequence = self.sequences.get_sequence(&key).await?;

        let mut info = MessageInfo::from_sequence(conversation_id, message_id, &sequence);
        info.message = message.to_string();
        info.edited_at = Some(now_millis());

        self.sequences
            .update_sequence(
                &key,
                CONVERSATION_REFERENCE_TYPE,
                &self.space_id,
                sequence.items,
                info.to_metadata(),
            )
            .await?;

        self.announce(ConversationEventType::MessageInformation, conversation_id, message_id)
            .await;
        Ok(info)
    }

    pub async fn delete_message(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        let root = self.sequences.get_sequence(&conversation_key(conversation_id)).await?;
        if !root.items.iter().any(|id| id == message_id) {
            return Err(Error::InvalidArgument(format!(
                "message {} is not part of conversation {}",
                message_id, conversation_id
            )));
        }

        self.sequences
            .delete_sequences(&[message_key(conversation_id, message_id)])
            .await?;
        let items = root.items.into_iter().filter(|id| id != message_id).collect();
        self.update_root(&root.key, items, root.metadata).await?;

        self.announce(ConversationEventType::DeleteMessage, conversation_id, message_id)
            .await;
        Ok(())
    }

    /// Delete a conversation with all of its messages
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let root_key = conversation_key(conversation_id);
        let root = self.sequences.get_sequence(&root_key).await?;

        let mut keys: Vec<String> = root
            .items
            .iter()
            .map(|id| message_key(conversation_id, id))
            .collect();
        keys.push(root_key);
        self.sequences.delete_sequences(&keys).await?;
        debug!(conversation_id, messages = root.items.len(), "Deleted conversation");

        self.announce(ConversationEventType::DeleteConversation, conversation_id, "")
            .await;
        Ok(())
    }

    pub async fn get_conversation_info(&self, conversation_id: &str) -> Result<ConversationInfo> {
        let root = self.sequences.get_sequence(&conversation_key(conversation_id)).await?;
        Ok(ConversationInfo::from_sequence(conversation_id, &root))
    }

    /// Change the title and resolved flag
    pub async fn set_conversation_info(
        &self,
        conversation_id: &str,
        title: &str,
        resolved: bool,
    ) -> Result<ConversationInfo> {
        let root = self.sequences.get_sequence(&conversation_key(conversation_id)).await?;

        let mut info = ConversationInfo::from_sequence(conversation_id, &root);
        info.title = title.to_string();
        info.resolved = resolved;
        info.edited_at = Some(now_millis());
        self.update_root(&root.key, root.items, info.to_metadata()).await?;

        self.announce(ConversationEventType::ConversationInformation, conversation_id, "")
            .await;
        Ok(info)
    }

    /// Conversation events raised by other clients of the space
    pub fn subscribe(&self) -> ConversationEvents {
        ConversationEvents {
            events: self.bus.subscribe_event(CONVERSATION_EVENT),
        }
    }

    async fn update_root(
        &self,
        key: &str,
        items: Vec<String>,
        metadata: BTreeMap<String, String>,
    ) -> Result<()> {
        self.sequences
            .update_sequence(key, CONVERSATION_REFERENCE_TYPE, &self.space_id, items, metadata)
            .await
            .map(|_| ())
    }

    /// The change already happened; a failed notification is only logged
    async fn announce(&self, event_type: ConversationEventType, conversation_id: &str, message_id: &str) {
        let payload = ConversationEventPayload {
            event_type,
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
        };
        let event = payload.to_event();
        if let Err(e) = self.bus.send_network_event(&event.name, event.args).await {
            warn!(conversation_id, ?event_type, error = %e, "Failed to announce conversation change");
        }
    }
}

/// Stream of typed conversation events
pub struct ConversationEvents {
    events: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl ConversationEvents {
    pub async fn recv(&mut self) -> Option<ConversationEventPayload> {
        loop {
            let event = self.events.recv().await?;
            match ConversationEventPayload::from_args(&event.args) {
                Ok(payload) => return Some(payload),
                Err(e) => warn!(error = %e, "Ignoring malformed conversation event"),
            }
        }
    }
}
