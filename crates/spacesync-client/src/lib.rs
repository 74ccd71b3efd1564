//! SpaceSync Client
//!
//! Everything one connected client needs, built around a [`Session`]:
//! - entity replication through the session's entity system
//! - sequences, entity hierarchies and hotspot groups
//! - conversations stored as sequences
//! - leader election per scope

pub mod conversation;
pub mod hierarchy;
pub mod hotspot;
pub mod leader;
pub mod sequence;
pub mod session;

pub use conversation::{ConversationEvents, ConversationInfo, ConversationSystem, MessageInfo, MessagePage};
pub use hierarchy::{HierarchyChanges, HierarchySystem};
pub use hotspot::{HotspotGroupChange, HotspotGroupChanges, HotspotSequenceSystem};
pub use leader::LeaderElection;
pub use sequence::{SequenceChanges, SequenceSystem};
pub use session::Session;
