//! Server to client messages

use crate::event::NetworkEvent;
use serde::{Deserialize, Serialize};
use spacesync_core::{EntityOperation, Error, LeaderEvent};

/// Anything the server sends to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Answer to the request with the same id
    Reply { request_id: u64, reply: Reply },

    /// Unsolicited delivery. `seq` increases per connection; a redelivered
    /// push keeps its original number.
    Push { seq: u64, push: Push },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Ok,
    Welcome { client_id: u64 },
    ObjectIds(Vec<u64>),
    Pong,
    Error { http_code: u16, message: String },
}

impl Reply {
    pub fn error(http_code: u16, message: impl Into<String>) -> Self {
        Reply::Error {
            http_code,
            message: message.into(),
        }
    }

    /// Turn an error reply into a core error
    pub fn into_result(self) -> Result<Reply, Error> {
        match self {
            Reply::Error { http_code, message } => Err(Error::Service { http_code, message }),
            other => Ok(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Push {
    Event(NetworkEvent),
    EntityOperation(EntityOperation),
    LeaderElected {
        scope: String,
        client_id: u64,
        user_id: String,
    },
    LeaderVacated {
        scope: String,
    },
}

impl Push {
    /// Leadership change carried by this push, if any
    pub fn leader_event(&self) -> Option<LeaderEvent> {
        match self {
            Push::LeaderElected { scope, client_id, user_id } => Some(LeaderEvent::Elected {
                scope: scope.clone(),
                client_id: *client_id,
                user_id: user_id.clone(),
            }),
            Push::LeaderVacated { scope } => Some(LeaderEvent::Vacated {
                scope: scope.clone(),
            }),
            _ => None,
        }
    }
}
