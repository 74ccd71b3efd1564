//! Entity System - the local view of a space's entity graph
//!
//! The graph is only mutated by [`EntitySystem::process_pending_entity_operations`]
//! and by the staging mutators, which never touch live state directly. Network
//! tasks talk to the system through the [`InboundSender`] of its queue.

use crate::arena::{Arena, Handle};
use crate::component::ComponentType;
use crate::config::SessionConfig;
use crate::entity::{ComponentUpdateInfo, EntityState, SpaceEntity, UpdateFlags};
use crate::error::{Error, Result};
use crate::extensions::{hash_property_key, ComponentExtensions};
use crate::operation::{EntityId, EntityOperation, EntitySnapshot, LockType, Transform};
use crate::queue::{InboundOperation, InboundSender, OperationQueue};
use crate::rate_limit::PatchRateLimiter;
use crate::value::{ReplicatedValue, Vector3, Vector4};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Change to the local entity graph, emitted after it was applied
#[derive(Debug, Clone, PartialEq)]
pub enum EntityEvent {
    Created {
        handle: Handle,
        id: EntityId,
    },
    Updated {
        handle: Handle,
        id: EntityId,
        flags: UpdateFlags,
        components: Vec<ComponentUpdateInfo>,
    },
    Deleted {
        id: EntityId,
    },
}

pub struct EntitySystem {
    local_client_id: u64,
    entities: Arena<SpaceEntity>,
    by_id: HashMap<EntityId, Handle>,
    queue: OperationQueue,
    patch_limiter: PatchRateLimiter,
    event_sender: broadcast::Sender<EntityEvent>,
}

impl EntitySystem {
    pub fn new(local_client_id: u64, config: &SessionConfig) -> Self {
        let (event_sender, _) = broadcast::channel(config.event_channel_capacity);

        Self {
            local_client_id,
            entities: Arena::new(),
            by_id: HashMap::new(),
            queue: OperationQueue::new(),
            patch_limiter: PatchRateLimiter::new(config.patch_rate_limit()),
            event_sender,
        }
    }

    pub fn local_client_id(&self) -> u64 {
        self.local_client_id
    }

    /// Sender for operations arriving from the network
    pub fn inbound_sender(&self) -> InboundSender {
        self.queue.inbound_sender()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EntityEvent> {
        self.event_sender.subscribe()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    // ---- Queries ----

    pub fn entity(&self, handle: Handle) -> Option<&SpaceEntity> {
        self.entities.get(handle)
    }

    pub fn find_by_id(&self, id: EntityId) -> Option<Handle> {
        self.by_id.get(&id).copied()
    }

    pub fn find_by_name(&self, name: &str) -> Option<Handle> {
        self.entities
            .iter()
            .filter(|(_, e)| e.name() == name)
            .min_by_key(|(_, e)| e.id())
            .map(|(handle, _)| handle)
    }

    /// Every entity, ordered by id
    pub fn entities(&self) -> Vec<Handle> {
        let mut all: Vec<(EntityId, Handle)> =
            self.entities.iter().map(|(h, e)| (e.id(), h)).collect();
        all.sort();
        all.into_iter().map(|(_, h)| h).collect()
    }

    /// Entities without a parent, ordered by id
    pub fn root_entities(&self) -> Vec<Handle> {
        let mut roots: Vec<(EntityId, Handle)> = self
            .entities
            .iter()
            .filter(|(_, e)| e.parent_id().is_none())
            .map(|(h, e)| (e.id(), h))
            .collect();
        roots.sort();
        roots.into_iter().map(|(_, h)| h).collect()
    }

    pub fn children_of(&self, handle: Handle) -> Vec<Handle> {
        self.entities
            .get(handle)
            .map(|e| e.children().to_vec())
            .unwrap_or_default()
    }

    pub fn is_descendant_of(&self, handle: Handle, ancestor: Handle) -> bool {
        let mut current = self.entities.get(handle).and_then(|e| e.parent());
        // Bounded walk; a remote patch may have introduced a cycle
        for _ in 0..self.entities.len() {
            match current {
                Some(h) if h == ancestor => return true,
                Some(h) => current = self.entities.get(h).and_then(|e| e.parent()),
                None => return false,
            }
        }
        false
    }

    /// Transform of an entity composed with all of its ancestors
    pub fn global_transform(&self, handle: Handle) -> Option<Transform> {
        let entity = self.entities.get(handle)?;
        let mut chain = vec![*entity.transform()];
        let mut current = entity.parent();
        while let Some(h) = current {
            if chain.len() > self.entities.len() {
                warn!(entity_id = entity.id(), "Parent cycle while composing transform");
                break;
            }
            let Some(parent) = self.entities.get(h) else { break };
            chain.push(*parent.transform());
            current = parent.parent();
        }

        let mut global = Transform::default();
        for transform in chain.iter().rev() {
            global = global.compose(transform);
        }
        Some(global)
    }

    pub fn snapshot(&self, handle: Handle) -> Option<EntitySnapshot> {
        self.entities.get(handle).map(|e| e.snapshot())
    }

    // ---- Local creation and deletion ----

    /// Materialize an entity whose id the server already allocated.
    ///
    /// It stays `PendingCreate` until [`EntitySystem::acknowledge_create`].
    pub fn create_local(
        &mut self,
        id: EntityId,
        name: &str,
        transform: Transform,
        parent_id: Option<EntityId>,
    ) -> Result<Handle> {
        if self.by_id.contains_key(&id) {
            return Err(Error::InvalidArgument(format!("entity {} already exists", id)));
        }

        let mut entity = SpaceEntity::new(id, name, transform, self.local_client_id);
        entity.set_parent_id_immediate(parent_id);
        let handle = self.entities.insert(entity);
        self.by_id.insert(id, handle);
        self.relink(handle);

        debug!(entity_id = id, name, "Created local entity");
        Ok(handle)
    }

    /// The server accepted the create; the entity goes live on the next pass
    pub fn acknowledge_create(&mut self, handle: Handle) -> bool {
        let Some(entity) = self.entities.get_mut(handle) else {
            return false;
        };
        if entity.state != EntityState::PendingCreate {
            return false;
        }
        entity.state = EntityState::Created;
        self.queue
            .inbound_sender()
            .send(InboundOperation::CreateAcknowledged(entity.id()))
    }

    /// Drop a local entity whose create was rejected
    pub fn discard_pending(&mut self, handle: Handle) -> bool {
        let id = match self.entities.get(handle) {
            Some(e) if e.state == EntityState::PendingCreate => e.id(),
            _ => return false,
        };
        self.remove_entity(id, &mut Vec::new());
        true
    }

    /// Reject further edits while a delete is in flight
    pub fn begin_delete(&mut self, handle: Handle) -> Result<EntityId> {
        self.check_modifiable(handle, "delete")?;
        let entity = self
            .entities
            .get_mut(handle)
            .ok_or_else(|| Error::EntityNotFound(format!("{:?}", handle)))?;
        entity.state = EntityState::Deleted;
        let id = entity.id();
        self.queue.dequeue(handle);
        Ok(id)
    }

    /// Restore an entity whose delete was rejected
    pub fn abort_delete(&mut self, handle: Handle) {
        if let Some(entity) = self.entities.get_mut(handle) {
            if entity.state == EntityState::Deleted {
                entity.state = EntityState::Live;
            }
        }
    }

    // ---- Local mutation ----

    /// Whether the local client may edit the entity
    pub fn is_modifiable(&self, handle: Handle) -> bool {
        self.check_modifiable(handle, "check").is_ok()
    }

    fn check_modifiable(&self, handle: Handle, action: &str) -> Result<()> {
        let entity = self
            .entities
            .get(handle)
            .ok_or_else(|| Error::EntityNotFound(format!("{:?}", handle)))?;

        let owned = entity.owner_id() == self.local_client_id || entity.is_transferable();
        if entity.state() == EntityState::Deleted || entity.is_locked() || !owned {
            warn!(
                entity_id = entity.id(),
                action,
                owner_id = entity.owner_id(),
                locked = entity.is_locked(),
                "Entity is not modifiable by this client"
            );
            return Err(Error::NotModifiable(entity.id().to_string()));
        }
        Ok(())
    }

    /// Run `edit` against a modifiable entity, claiming ownership if needed
    fn modify(&mut self, handle: Handle, action: &str, edit: impl FnOnce(&mut SpaceEntity)) -> bool {
        if self.check_modifiable(handle, action).is_err() {
            return false;
        }
        let local = self.local_client_id;
        match self.entities.get_mut(handle) {
            Some(entity) => {
                entity.stage_owner(local);
                edit(entity);
                true
            }
            None => false,
        }
    }

    pub fn set_name(&mut self, handle: Handle, name: &str) -> bool {
        self.modify(handle, "set_name", |e| e.stage_name(name.to_string()))
    }

    pub fn set_position(&mut self, handle: Handle, position: Vector3) -> bool {
        self.modify(handle, "set_position", |e| e.stage_position(position))
    }

    pub fn set_rotation(&mut self, handle: Handle, rotation: Vector4) -> bool {
        self.modify(handle, "set_rotation", |e| e.stage_rotation(rotation))
    }

    pub fn set_scale(&mut self, handle: Handle, scale: Vector3) -> bool {
        self.modify(handle, "set_scale", |e| e.stage_scale(scale))
    }

    /// Reparent under `parent_id`. Self-parenting and cycles are rejected.
    pub fn set_parent_id(&mut self, handle: Handle, parent_id: EntityId) -> bool {
        let Some(entity) = self.entities.get(handle) else {
            return false;
        };
        if entity.id() == parent_id {
            warn!(entity_id = parent_id, "Entity cannot be its own parent");
            return false;
        }
        if let Some(parent) = self.find_by_id(parent_id) {
            if self.is_descendant_of(parent, handle) {
                warn!(entity_id = entity.id(), parent_id, "Reparenting would create a cycle");
                return false;
            }
        }
        self.modify(handle, "set_parent_id", |e| e.stage_parent(Some(parent_id)))
    }

    pub fn remove_parent(&mut self, handle: Handle) -> bool {
        self.modify(handle, "remove_parent", |e| e.stage_parent(None))
    }

    pub fn lock(&mut self, handle: Handle) -> bool {
        self.modify(handle, "lock", |e| e.stage_lock(LockType::UserAgnostic))
    }

    /// Unlocking is the only edit a locked entity accepts
    pub fn unlock(&mut self, handle: Handle) -> bool {
        let local = self.local_client_id;
        match self.entities.get_mut(handle) {
            Some(entity) if entity.is_locked() && entity.state() != EntityState::Deleted => {
                if entity.owner_id() != local && !entity.is_transferable() {
                    warn!(entity_id = entity.id(), "Cannot unlock an entity owned by another client");
                    return false;
                }
                entity.stage_owner(local);
                entity.stage_lock(LockType::None);
                true
            }
            Some(entity) => {
                debug!(entity_id = entity.id(), "Entity is not locked");
                false
            }
            None => false,
        }
    }

    pub fn add_component(&mut self, handle: Handle, component_type: ComponentType) -> Option<u16> {
        let mut added = None;
        let modifiable = self.modify(handle, "add_component", |e| {
            added = e.add_component(component_type);
        });
        if modifiable && added.is_none() {
            warn!(?component_type, "No free component id left on entity");
        }
        added
    }

    pub fn remove_component(&mut self, handle: Handle, component_id: u16) -> bool {
        let mut removed = false;
        self.modify(handle, "remove_component", |e| {
            removed = e.stage_component_removal(component_id);
        });
        if !removed {
            debug!(component_id, "Component already removed");
        }
        removed
    }

    pub fn set_component_property(
        &mut self,
        handle: Handle,
        component_id: u16,
        key: u32,
        value: ReplicatedValue,
    ) -> bool {
        let mut written = false;
        self.modify(handle, "set_component_property", |e| {
            if let Some(component) = e.component_mut(component_id) {
                component.set_property(key, value);
                written = true;
            }
        });
        written
    }

    pub fn component_property(&self, handle: Handle, component_id: u16, key: u32) -> ReplicatedValue {
        self.entities
            .get(handle)
            .and_then(|e| e.component(component_id))
            .map(|c| c.get_property(key))
            .unwrap_or_default()
    }

    /// String-keyed properties of a component, for writing.
    ///
    /// Claims ownership like any other edit. An entity the local client may not
    /// modify, a stale handle or a missing component all yield an extension
    /// without a component, on which every call is a logged no-op.
    pub fn component_extensions(&mut self, handle: Handle, component_id: u16) -> ComponentExtensions<'_> {
        if self.check_modifiable(handle, "component_extensions").is_err() {
            return ComponentExtensions::new(None);
        }
        let local = self.local_client_id;
        let component = self.entities.get_mut(handle).and_then(|e| {
            e.stage_owner(local);
            e.component_mut(component_id)
        });
        ComponentExtensions::new(component)
    }

    /// Read a string-keyed property without claiming the entity
    pub fn extension_property(&self, handle: Handle, component_id: u16, key: &str) -> ReplicatedValue {
        self.entities
            .get(handle)
            .and_then(|e| e.component(component_id))
            .map(|c| c.get_property(hash_property_key(key, c.extension_range())))
            .unwrap_or_default()
    }

    /// Finalize staged edits into one outbound patch on the next pass.
    ///
    /// Refused for entities the local client may not modify, except to send a
    /// staged unlock.
    pub fn queue_update(&mut self, handle: Handle) -> bool {
        let Some(entity) = self.entities.get(handle) else {
            return false;
        };
        if entity.state() == EntityState::Deleted {
            return false;
        }
        if !entity.has_staged_unlock() && self.check_modifiable(handle, "queue_update").is_err() {
            return false;
        }
        self.queue.queue_update(handle);
        true
    }

    /// Put operations that failed to send back at the front of the outbound
    /// queue, keeping their order
    pub fn requeue_outbound(&mut self, ops: Vec<EntityOperation>) {
        if !ops.is_empty() {
            debug!(count = ops.len(), "Requeueing unsent entity operations");
        }
        self.queue.requeue_outbound(ops);
    }

    /// Patches produced by previous passes, ready to send
    pub fn take_outbound(&mut self) -> Vec<EntityOperation> {
        self.queue.take_outbound()
    }

    // ---- Apply loop ----

    pub fn process_pending_entity_operations(&mut self) -> usize {
        self.process_pending_entity_operations_at(Instant::now())
    }

    /// Flush queued local updates, then fold inbound operations into the
    /// graph in arrival order. Returns the number of events emitted.
    pub fn process_pending_entity_operations_at(&mut self, now: Instant) -> usize {
        let mut events = Vec::new();

        self.flush_queued_updates(now, &mut events);

        for op in self.queue.drain_inbound() {
            self.apply_inbound(op, &mut events);
        }

        self.resolve_parents();

        let count = events.len();
        for event in events {
            let _ = self.event_sender.send(event);
        }
        count
    }

    fn flush_queued_updates(&mut self, now: Instant, events: &mut Vec<EntityEvent>) {
        let mut deferred = Vec::new();

        for handle in self.queue.take_queued_updates() {
            let Some(entity) = self.entities.get_mut(handle) else {
                continue;
            };
            match entity.state {
                EntityState::PendingCreate => {
                    deferred.push(handle);
                    continue;
                }
                EntityState::Deleted => continue,
                EntityState::Created | EntityState::Live => {}
            }
            if !entity.has_pending_changes() {
                continue;
            }

            let id = entity.id();
            if !self.patch_limiter.try_acquire(id, now) {
                debug!(entity_id = id, "Patch rate limited, keeping update queued");
                deferred.push(handle);
                continue;
            }

            if let Some((patch, flags, components)) = entity.commit_staged() {
                if flags.contains(UpdateFlags::PARENT) {
                    self.relink(handle);
                }
                self.queue.push_outbound(EntityOperation::Patch(patch));
                events.push(EntityEvent::Updated {
                    handle,
                    id,
                    flags,
                    components,
                });
            }
        }

        for handle in deferred {
            self.queue.queue_update(handle);
        }
    }

    fn apply_inbound(&mut self, op: InboundOperation, events: &mut Vec<EntityEvent>) {
        match op {
            InboundOperation::Remote(EntityOperation::Create(snapshot)) => {
                if self.by_id.contains_key(&snapshot.id) {
                    debug!(entity_id = snapshot.id, "Ignoring duplicate create");
                    return;
                }
                let handle = self.entities.insert(SpaceEntity::from_snapshot(&snapshot));
                self.by_id.insert(snapshot.id, handle);
                self.relink(handle);
                events.push(EntityEvent::Created {
                    handle,
                    id: snapshot.id,
                });
            }
            InboundOperation::Remote(EntityOperation::Patch(patch)) => {
                let Some(handle) = self.find_by_id(patch.id) else {
                    warn!(entity_id = patch.id, "Dropping patch for unknown entity");
                    return;
                };
                let Some(entity) = self.entities.get_mut(handle) else {
                    return;
                };
                let (flags, components) = entity.apply_patch(&patch);
                if flags.contains(UpdateFlags::PARENT) {
                    self.relink(handle);
                }
                if !flags.is_empty() {
                    events.push(EntityEvent::Updated {
                        handle,
                        id: patch.id,
                        flags,
                        components,
                    });
                }
            }
            InboundOperation::Remote(EntityOperation::Delete { id })
            | InboundOperation::DeleteAcknowledged(id) => {
                self.remove_entity(id, events);
            }
            InboundOperation::CreateAcknowledged(id) => {
                let Some(handle) = self.find_by_id(id) else {
                    return;
                };
                if let Some(entity) = self.entities.get_mut(handle) {
                    if entity.state == EntityState::Created {
                        entity.state = EntityState::Live;
                        events.push(EntityEvent::Created { handle, id });
                    }
                }
            }
        }
    }

    /// Remove an entity and re-root its children. Missing ids are a no-op.
    fn remove_entity(&mut self, id: EntityId, events: &mut Vec<EntityEvent>) {
        let Some(handle) = self.by_id.remove(&id) else {
            debug!(entity_id = id, "Entity already deleted");
            return;
        };
        let Some(entity) = self.entities.remove(handle) else {
            return;
        };

        if let Some(parent) = entity.parent().and_then(|p| self.entities.get_mut(p)) {
            parent.children.retain(|c| *c != handle);
        }

        for child_handle in entity.children() {
            if let Some(child) = self.entities.get_mut(*child_handle) {
                child.parent = None;
                child.set_parent_id_immediate(None);
                events.push(EntityEvent::Updated {
                    handle: *child_handle,
                    id: child.id(),
                    flags: UpdateFlags::PARENT,
                    components: Vec::new(),
                });
            }
        }

        self.queue.dequeue(handle);
        self.patch_limiter.remove(id);
        events.push(EntityEvent::Deleted { id });
    }

    /// Bring the parent handle and child lists in line with `parent_id`
    fn relink(&mut self, handle: Handle) {
        let Some(entity) = self.entities.get(handle) else {
            return;
        };
        let old_parent = entity.parent();
        let new_parent = entity.parent_id().and_then(|id| self.find_by_id(id));
        if old_parent == new_parent {
            return;
        }

        if let Some(old) = old_parent.and_then(|p| self.entities.get_mut(p)) {
            old.children.retain(|c| *c != handle);
        }
        if let Some(entity) = self.entities.get_mut(handle) {
            entity.parent = new_parent;
        }
        if let Some(new) = new_parent.and_then(|p| self.entities.get_mut(p)) {
            if !new.children.contains(&handle) {
                new.children.push(handle);
            }
        }
    }

    /// Link entities whose parent arrived after them
    fn resolve_parents(&mut self) {
        let unresolved: Vec<Handle> = self
            .entities
            .iter()
            .filter(|(_, e)| e.parent().is_none())
            .filter(|(_, e)| e.parent_id().map_or(false, |id| self.by_id.contains_key(&id)))
            .map(|(h, _)| h)
            .collect();

        for handle in unresolved {
            self.relink(handle);
        }
    }

    /// Tear down the whole graph, e.g. on space exit
    pub fn clear(&mut self) {
        debug!(count = self.entities.len(), "Clearing entity system");
        self.entities.clear();
        self.by_id.clear();
        self.queue.clear();
        self.patch_limiter.reset();
    }
}
