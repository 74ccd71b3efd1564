//! Entity operations - the network-visible form of entity state transitions

use crate::component::ComponentType;
use crate::value::{ReplicatedValue, Vector3, Vector4};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Server-assigned entity identifier
pub type EntityId = u64;

/// Local transform of an entity relative to its parent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vector3,
    pub rotation: Vector4,
    pub scale: Vector3,
}

impl Transform {
    pub fn new(position: Vector3, rotation: Vector4, scale: Vector3) -> Self {
        Self { position, rotation, scale }
    }

    /// Express `child` (relative to `self`) in the space `self` lives in
    pub fn compose(&self, child: &Transform) -> Transform {
        Transform {
            position: self
                .rotation
                .rotate(child.position.mul(self.scale))
                .add(self.position),
            rotation: self.rotation.quat_mul(child.rotation),
            scale: self.scale.mul(child.scale),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vector3::ZERO,
            rotation: Vector4::IDENTITY,
            scale: Vector3::ONE,
        }
    }
}

/// Entity lock state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockType {
    None,
    /// Locked for every client until explicitly unlocked
    UserAgnostic,
}

impl Default for LockType {
    fn default() -> Self {
        LockType::None
    }
}

/// Parent change carried by a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParentUpdate {
    Attach(EntityId),
    Detach,
}

impl ParentUpdate {
    pub fn from_parent_id(parent_id: Option<EntityId>) -> Self {
        match parent_id {
            Some(id) => ParentUpdate::Attach(id),
            None => ParentUpdate::Detach,
        }
    }

    pub fn parent_id(self) -> Option<EntityId> {
        match self {
            ParentUpdate::Attach(id) => Some(id),
            ParentUpdate::Detach => None,
        }
    }
}

/// What happened to a component in a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentUpdateType {
    Add,
    Update,
    Delete,
}

/// Full replicated state of a component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSnapshot {
    pub id: u16,
    pub component_type: ComponentType,
    pub properties: BTreeMap<u32, ReplicatedValue>,
}

/// Full replicated state of an entity, sent on create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub name: String,
    pub transform: Transform,
    pub owner_id: u64,
    pub is_transferable: bool,
    pub parent_id: Option<EntityId>,
    pub lock_type: LockType,
    pub components: Vec<ComponentSnapshot>,
}

/// Changed properties of one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentPatch {
    pub id: u16,
    pub component_type: ComponentType,
    pub update_type: ComponentUpdateType,
    /// `Invalid` values remove the key
    pub properties: BTreeMap<u32, ReplicatedValue>,
}

/// Delta for an existing entity. `None` fields are unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityPatch {
    pub id: EntityId,
    pub name: Option<String>,
    pub position: Option<Vector3>,
    pub rotation: Option<Vector4>,
    pub scale: Option<Vector3>,
    pub parent: Option<ParentUpdate>,
    pub owner_id: Option<u64>,
    pub lock_type: Option<LockType>,
    pub components: Vec<ComponentPatch>,
}

impl EntityPatch {
    pub fn new(id: EntityId) -> Self {
        Self { id, ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.position.is_none()
            && self.rotation.is_none()
            && self.scale.is_none()
            && self.parent.is_none()
            && self.owner_id.is_none()
            && self.lock_type.is_none()
            && self.components.is_empty()
    }
}

/// A replicated entity state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityOperation {
    Create(EntitySnapshot),
    Patch(EntityPatch),
    Delete { id: EntityId },
}

impl EntityOperation {
    pub fn entity_id(&self) -> EntityId {
        match self {
            EntityOperation::Create(snapshot) => snapshot.id,
            EntityOperation::Patch(patch) => patch.id,
            EntityOperation::Delete { id } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_patch() {
        let mut patch = EntityPatch::new(7);
        assert!(patch.is_empty());
        patch.parent = Some(ParentUpdate::Detach);
        assert!(!patch.is_empty());
        assert_eq!(EntityOperation::Patch(patch).entity_id(), 7);
    }

    #[test]
    fn test_compose_transforms() {
        let parent = Transform::new(Vector3::new(10.0, 0.0, 0.0), Vector4::IDENTITY, Vector3::new(2.0, 2.0, 2.0));
        let child = Transform::new(Vector3::new(1.0, 1.0, 0.0), Vector4::IDENTITY, Vector3::ONE);

        let global = parent.compose(&child);
        assert_eq!(global.position, Vector3::new(12.0, 2.0, 0.0));
        assert_eq!(global.scale, Vector3::new(2.0, 2.0, 2.0));
        assert_eq!(global.rotation, Vector4::IDENTITY);
    }
}
