//! SpaceSync Core - Entity Replication and Sequence Model
//!
//! This crate provides the data model shared by every SpaceSync crate:
//! - Replicated values, components and string-keyed property extensions
//! - Space entities in a generational arena, with the deferred apply loop
//! - Sequence, hierarchy and hotspot group keys
//! - Leader state, result codes, configuration and errors

pub mod arena;
pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod extensions;
pub mod leader;
pub mod operation;
pub mod queue;
pub mod rate_limit;
pub mod result;
pub mod sequence;
pub mod system;
pub mod value;

pub use arena::Handle;
pub use component::{ComponentBase, ComponentType};
pub use config::SessionConfig;
pub use entity::{ComponentUpdateInfo, EntityState, SpaceEntity, UpdateFlags};
pub use error::{Error, Result};
pub use extensions::{hash_property_key, ComponentExtensions};
pub use leader::{LeaderEvent, LeaderState, LeaderTable};
pub use operation::{
    ComponentPatch, ComponentSnapshot, ComponentUpdateType, EntityId, EntityOperation,
    EntityPatch, EntitySnapshot, LockType, ParentUpdate, Transform,
};
pub use queue::{InboundOperation, InboundSender, OperationQueue};
pub use result::{FailureReason, OperationResult, ResultCode};
pub use sequence::{
    HierarchyChange, HotspotGroup, Sequence, SequenceChange, SequenceCriteria,
    SequenceHierarchy, SequenceUpdateType,
};
pub use system::{EntityEvent, EntitySystem};
pub use value::{ReplicatedValue, ReplicatedValueType, Vector2, Vector3, Vector4};
