//! Client to server messages

use crate::event::NetworkEvent;
use serde::{Deserialize, Serialize};
use spacesync_core::EntityOperation;

/// A request sent by a client. Every request gets exactly one reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub request_id: u64,
    pub request: Request,
}

impl ClientMessage {
    pub fn new(request_id: u64, request: Request) -> Self {
        Self { request_id, request }
    }
}

/// All supported requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Introduce the connection; replied with `Welcome`
    Hello { user_id: String, space_id: String },

    /// Reserve ids for entities about to be created
    GenerateObjectIds { count: u32 },

    /// Replicate an entity operation to the rest of the space
    EntityOperation(EntityOperation),

    /// Deliver an event to one client, or to the whole space when no target is given
    SendEvent {
        event: NetworkEvent,
        target_client_id: Option<u64>,
    },

    /// Take part in leader election for a scope
    JoinScope { scope: String },

    /// Stop taking part in a scope, giving up leadership if held
    LeaveScope { scope: String },

    /// Sent periodically by the leader of a scope
    Heartbeat { scope: String },

    Ping,
}

impl Request {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Request::Hello { .. } => "hello",
            Request::GenerateObjectIds { .. } => "generate_object_ids",
            Request::EntityOperation(_) => "entity_operation",
            Request::SendEvent { .. } => "send_event",
            Request::JoinScope { .. } => "join_scope",
            Request::LeaveScope { .. } => "leave_scope",
            Request::Heartbeat { .. } => "heartbeat",
            Request::Ping => "ping",
        }
    }
}
