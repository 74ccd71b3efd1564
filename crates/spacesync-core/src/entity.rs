//! Space entities
//!
//! A [`SpaceEntity`] holds live replicated state plus a set of staged local
//! edits. Entity-level edits (name, transform, parent, lock, ownership) are
//! staged and only become live when the entity's queued update is flushed;
//! component property writes go straight into the component and are picked up
//! through its dirty set.

use crate::arena::Handle;
use crate::component::{ComponentBase, ComponentType};
use crate::operation::{
    ComponentPatch, ComponentSnapshot, ComponentUpdateType, EntityId, EntityPatch, EntitySnapshot,
    LockType, ParentUpdate, Transform,
};
use crate::value::{Vector3, Vector4};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{BitOr, BitOrAssign};

/// Lifecycle of an entity in the local view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityState {
    /// Created locally, the server has not acknowledged it yet
    PendingCreate,
    /// Acknowledged, waiting for the next apply pass
    Created,
    Live,
    Deleted,
}

/// Bitset describing which parts of an entity an update touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UpdateFlags(u32);

impl UpdateFlags {
    pub const NONE: UpdateFlags = UpdateFlags(0);
    pub const NAME: UpdateFlags = UpdateFlags(1 << 0);
    pub const POSITION: UpdateFlags = UpdateFlags(1 << 1);
    pub const ROTATION: UpdateFlags = UpdateFlags(1 << 2);
    pub const SCALE: UpdateFlags = UpdateFlags(1 << 3);
    pub const COMPONENTS: UpdateFlags = UpdateFlags(1 << 4);
    pub const PARENT: UpdateFlags = UpdateFlags(1 << 5);
    pub const LOCK: UpdateFlags = UpdateFlags(1 << 6);
    pub const OWNER: UpdateFlags = UpdateFlags(1 << 7);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: UpdateFlags) -> bool {
        self.0 & other.0 == other.0 && !other.is_empty()
    }
}

impl BitOr for UpdateFlags {
    type Output = UpdateFlags;

    fn bitor(self, rhs: UpdateFlags) -> UpdateFlags {
        UpdateFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for UpdateFlags {
    fn bitor_assign(&mut self, rhs: UpdateFlags) {
        self.0 |= rhs.0;
    }
}

/// Per-component change reported alongside an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentUpdateInfo {
    pub component_id: u16,
    pub update_type: ComponentUpdateType,
}

/// Local edits waiting for the next flush
#[derive(Debug, Clone, Default)]
struct StagedEdits {
    name: Option<String>,
    position: Option<Vector3>,
    rotation: Option<Vector4>,
    scale: Option<Vector3>,
    parent_id: Option<Option<EntityId>>,
    owner_id: Option<u64>,
    lock_type: Option<LockType>,
    added_components: BTreeSet<u16>,
    removed_components: BTreeSet<u16>,
}

impl StagedEdits {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.position.is_none()
            && self.rotation.is_none()
            && self.scale.is_none()
            && self.parent_id.is_none()
            && self.owner_id.is_none()
            && self.lock_type.is_none()
            && self.added_components.is_empty()
            && self.removed_components.is_empty()
    }
}

/// An object in a space
#[derive(Debug, Clone)]
pub struct SpaceEntity {
    id: EntityId,
    name: String,
    transform: Transform,
    owner_id: u64,
    is_transferable: bool,
    lock_type: LockType,
    parent_id: Option<EntityId>,
    /// Resolved parent; `None` while `parent_id` names an entity not yet seen
    pub(crate) parent: Option<Handle>,
    pub(crate) children: Vec<Handle>,
    components: BTreeMap<u16, ComponentBase>,
    next_component_id: u16,
    pub(crate) state: EntityState,
    staged: StagedEdits,
}

impl SpaceEntity {
    pub fn new(id: EntityId, name: impl Into<String>, transform: Transform, owner_id: u64) -> Self {
        Self {
            id,
            name: name.into(),
            transform,
            owner_id,
            is_transferable: true,
            lock_type: LockType::None,
            parent_id: None,
            parent: None,
            children: Vec::new(),
            components: BTreeMap::new(),
            next_component_id: 0,
            state: EntityState::PendingCreate,
            staged: StagedEdits::default(),
        }
    }

    /// Rebuild an entity from a remote create
    pub fn from_snapshot(snapshot: &EntitySnapshot) -> Self {
        let mut entity = Self::new(
            snapshot.id,
            snapshot.name.clone(),
            snapshot.transform,
            snapshot.owner_id,
        );
        entity.is_transferable = snapshot.is_transferable;
        entity.lock_type = snapshot.lock_type;
        entity.parent_id = snapshot.parent_id;
        for component in &snapshot.components {
            entity.insert_component(ComponentBase::from_properties(
                component.id,
                component.component_type,
                component.properties.clone(),
            ));
        }
        entity.state = EntityState::Live;
        entity
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id,
            name: self.name.clone(),
            transform: self.transform,
            owner_id: self.owner_id,
            is_transferable: self.is_transferable,
            parent_id: self.parent_id,
            lock_type: self.lock_type,
            components: self
                .components
                .values()
                .map(|c| ComponentSnapshot {
                    id: c.id(),
                    component_type: c.component_type(),
                    properties: c.properties().clone(),
                })
                .collect(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn position(&self) -> Vector3 {
        self.transform.position
    }

    pub fn rotation(&self) -> Vector4 {
        self.transform.rotation
    }

    pub fn scale(&self) -> Vector3 {
        self.transform.scale
    }

    pub fn owner_id(&self) -> u64 {
        self.owner_id
    }

    pub fn is_transferable(&self) -> bool {
        self.is_transferable
    }

    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    pub fn is_locked(&self) -> bool {
        self.lock_type != LockType::None
    }

    pub fn parent_id(&self) -> Option<EntityId> {
        self.parent_id
    }

    pub fn parent(&self) -> Option<Handle> {
        self.parent
    }

    pub fn children(&self) -> &[Handle] {
        &self.children
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn components(&self) -> impl Iterator<Item = &ComponentBase> {
        self.components.values()
    }

    pub fn component(&self, id: u16) -> Option<&ComponentBase> {
        self.components.get(&id)
    }

    pub(crate) fn component_mut(&mut self, id: u16) -> Option<&mut ComponentBase> {
        self.components.get_mut(&id)
    }

    pub fn find_component(&self, component_type: ComponentType) -> Option<&ComponentBase> {
        self.components
            .values()
            .find(|c| c.component_type() == component_type)
    }

    /// Whether the entity carries edits that a flush would send
    pub fn has_pending_changes(&self) -> bool {
        !self.staged.is_empty() || self.components.values().any(|c| c.is_dirty())
    }

    /// Parent the entity would have after its staged edits are flushed
    pub fn effective_parent_id(&self) -> Option<EntityId> {
        self.staged.parent_id.unwrap_or(self.parent_id)
    }

    pub(crate) fn set_parent_id_immediate(&mut self, parent_id: Option<EntityId>) {
        self.parent_id = parent_id;
    }

    pub(crate) fn stage_name(&mut self, name: String) {
        self.staged.name = Some(name);
    }

    pub(crate) fn stage_position(&mut self, position: Vector3) {
        self.staged.position = Some(position);
    }

    pub(crate) fn stage_rotation(&mut self, rotation: Vector4) {
        self.staged.rotation = Some(rotation);
    }

    pub(crate) fn stage_scale(&mut self, scale: Vector3) {
        self.staged.scale = Some(scale);
    }

    pub(crate) fn stage_parent(&mut self, parent_id: Option<EntityId>) {
        self.staged.parent_id = Some(parent_id);
    }

    pub(crate) fn stage_owner(&mut self, owner_id: u64) {
        if owner_id != self.owner_id {
            self.staged.owner_id = Some(owner_id);
        }
    }

    pub(crate) fn stage_lock(&mut self, lock_type: LockType) {
        self.staged.lock_type = Some(lock_type);
    }

    pub(crate) fn has_staged_unlock(&self) -> bool {
        self.staged.lock_type == Some(LockType::None)
    }

    fn insert_component(&mut self, component: ComponentBase) {
        self.next_component_id = self.next_component_id.max(component.id().saturating_add(1));
        self.components.insert(component.id(), component);
    }

    /// Add a component locally. It is sent with the next flush.
    ///
    /// Ids are handed out in increasing order. Once the top id is taken the
    /// lowest free one is reused, and `None` is returned when every id is live.
    pub(crate) fn add_component(&mut self, component_type: ComponentType) -> Option<u16> {
        let id = if self.components.contains_key(&self.next_component_id) {
            (0..=u16::MAX).find(|id| !self.components.contains_key(id))?
        } else {
            self.next_component_id
        };
        self.insert_component(ComponentBase::new(id, component_type));
        self.staged.added_components.insert(id);
        Some(id)
    }

    /// Mark a component for removal on the next flush
    pub(crate) fn stage_component_removal(&mut self, id: u16) -> bool {
        if !self.components.contains_key(&id) {
            return false;
        }
        if !self.staged.added_components.remove(&id) {
            self.staged.removed_components.insert(id);
            return true;
        }
        // Added and removed before the server ever saw it
        self.components.remove(&id);
        true
    }

    /// Commit staged edits into live state and describe them as a patch.
    ///
    /// Returns `None` when nothing changed.
    pub(crate) fn commit_staged(&mut self) -> Option<(EntityPatch, UpdateFlags, Vec<ComponentUpdateInfo>)> {
        if !self.has_pending_changes() {
            return None;
        }

        let staged = std::mem::take(&mut self.staged);
        let mut patch = EntityPatch::new(self.id);
        patch.name = staged.name;
        patch.position = staged.position;
        patch.rotation = staged.rotation;
        patch.scale = staged.scale;
        patch.parent = staged.parent_id.map(ParentUpdate::from_parent_id);
        patch.owner_id = staged.owner_id;
        patch.lock_type = staged.lock_type;

        for (id, component) in self.components.iter_mut() {
            if staged.removed_components.contains(id) {
                continue;
            }
            let added = staged.added_components.contains(id);
            if added {
                component.take_dirty();
                patch.components.push(ComponentPatch {
                    id: *id,
                    component_type: component.component_type(),
                    update_type: ComponentUpdateType::Add,
                    properties: component.properties().clone(),
                });
            } else if component.is_dirty() {
                patch.components.push(ComponentPatch {
                    id: *id,
                    component_type: component.component_type(),
                    update_type: ComponentUpdateType::Update,
                    properties: component.take_dirty(),
                });
            }
        }

        for id in &staged.removed_components {
            if let Some(component) = self.components.remove(id) {
                patch.components.push(ComponentPatch {
                    id: *id,
                    component_type: component.component_type(),
                    update_type: ComponentUpdateType::Delete,
                    properties: BTreeMap::new(),
                });
            }
        }

        // Component changes were already applied write-through
        let mut flags = self.apply_entity_fields(&patch);
        if !patch.components.is_empty() {
            flags |= UpdateFlags::COMPONENTS;
        }
        let infos = patch
            .components
            .iter()
            .map(|c| ComponentUpdateInfo {
                component_id: c.id,
                update_type: c.update_type,
            })
            .collect();

        Some((patch, flags, infos))
    }

    /// Apply a patch received from the server
    pub fn apply_patch(&mut self, patch: &EntityPatch) -> (UpdateFlags, Vec<ComponentUpdateInfo>) {
        let mut flags = self.apply_entity_fields(patch);
        let mut infos = Vec::new();

        for component_patch in &patch.components {
            let applied = match component_patch.update_type {
                ComponentUpdateType::Add => {
                    self.insert_component(ComponentBase::from_properties(
                        component_patch.id,
                        component_patch.component_type,
                        component_patch.properties.clone(),
                    ));
                    true
                }
                ComponentUpdateType::Update => match self.components.get_mut(&component_patch.id) {
                    Some(component) => {
                        component.apply_remote(&component_patch.properties);
                        true
                    }
                    None => {
                        // The add was lost or reordered; materialize from what we have
                        self.insert_component(ComponentBase::from_properties(
                            component_patch.id,
                            component_patch.component_type,
                            component_patch.properties.clone(),
                        ));
                        true
                    }
                },
                ComponentUpdateType::Delete => self.components.remove(&component_patch.id).is_some(),
            };

            if applied {
                flags |= UpdateFlags::COMPONENTS;
                infos.push(ComponentUpdateInfo {
                    component_id: component_patch.id,
                    update_type: component_patch.update_type,
                });
            }
        }

        (flags, infos)
    }

    fn apply_entity_fields(&mut self, patch: &EntityPatch) -> UpdateFlags {
        let mut flags = UpdateFlags::NONE;

        if let Some(name) = &patch.name {
            self.name = name.clone();
            flags |= UpdateFlags::NAME;
        }
        if let Some(position) = patch.position {
            self.transform.position = position;
            flags |= UpdateFlags::POSITION;
        }
        if let Some(rotation) = patch.rotation {
            self.transform.rotation = rotation;
            flags |= UpdateFlags::ROTATION;
        }
        if let Some(scale) = patch.scale {
            self.transform.scale = scale;
            flags |= UpdateFlags::SCALE;
        }
        if let Some(parent) = patch.parent {
            self.parent_id = parent.parent_id();
            flags |= UpdateFlags::PARENT;
        }
        if let Some(owner_id) = patch.owner_id {
            self.owner_id = owner_id;
            flags |= UpdateFlags::OWNER;
        }
        if let Some(lock_type) = patch.lock_type {
            self.lock_type = lock_type;
            flags |= UpdateFlags::LOCK;
        }

        flags
    }
}
