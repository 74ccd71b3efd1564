//! Session - the context every system of one connected client hangs off
//!
//! A session owns one event bus, one entity system and the sequence based
//! systems built on the shared sequence service. Several sessions can live in
//! one process; nothing here is global.

use crate::conversation::ConversationSystem;
use crate::hierarchy::HierarchySystem;
use crate::hotspot::HotspotSequenceSystem;
use crate::leader::LeaderElection;
use crate::sequence::SequenceSystem;
use parking_lot::{Mutex, MutexGuard};
use spacesync_core::{
    EntityEvent, EntityId, EntityOperation, EntitySystem, Error, Handle, InboundOperation,
    Result, SessionConfig, Transform,
};
use spacesync_service::SequenceService;
use spacesync_transport::{Connection, EventBus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub struct Session {
    config: SessionConfig,
    user_id: String,
    space_id: String,
    bus: Arc<EventBus>,
    entities: Mutex<EntitySystem>,
    sequences: SequenceSystem,
    hierarchy: HierarchySystem,
    hotspots: HotspotSequenceSystem,
    conversations: ConversationSystem,
    leader: LeaderElection,
    exited: AtomicBool,
}

impl Session {
    /// Connect to the space server and build every system
    pub async fn connect(
        connection: Connection,
        service: Arc<dyn SequenceService>,
        config: SessionConfig,
        user_id: &str,
        space_id: &str,
    ) -> Result<Self> {
        config.validate()?;
        let bus = Arc::new(EventBus::connect(connection, &config, user_id, space_id).await?);

        let entities = EntitySystem::new(bus.client_id(), &config);
        bus.attach_entity_sink(entities.inbound_sender());

        let sequences = SequenceSystem::new(service, bus.clone());
        let hierarchy = HierarchySystem::new(sequences.clone(), space_id);
        let hotspots = HotspotSequenceSystem::new(sequences.clone(), space_id);
        let conversations = ConversationSystem::new(sequences.clone(), bus.clone(), user_id, space_id);
        let leader = LeaderElection::new(bus.clone(), config.leader_heartbeat_interval());

        Ok(Self {
            config,
            user_id: user_id.to_string(),
            space_id: space_id.to_string(),
            bus,
            entities: Mutex::new(entities),
            sequences,
            hierarchy,
            hotspots,
            conversations,
            leader,
            exited: AtomicBool::new(false),
        })
    }

    pub fn client_id(&self) -> u64 {
        self.bus.client_id()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn space_id(&self) -> &str {
        &self.space_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Lock the entity graph. Do not hold the guard across an await.
    pub fn entities(&self) -> MutexGuard<'_, EntitySystem> {
        self.entities.lock()
    }

    pub fn subscribe_entity_events(&self) -> broadcast::Receiver<EntityEvent> {
        self.entities.lock().subscribe()
    }

    pub fn sequences(&self) -> &SequenceSystem {
        &self.sequences
    }

    pub fn hierarchy(&self) -> &HierarchySystem {
        &self.hierarchy
    }

    pub fn hotspots(&self) -> &HotspotSequenceSystem {
        &self.hotspots
    }

    pub fn conversations(&self) -> &ConversationSystem {
        &self.conversations
    }

    pub fn leader(&self) -> &LeaderElection {
        &self.leader
    }

    /// Join the space scope, becoming a leader candidate
    pub async fn enter_space(&self) -> Result<()> {
        self.ensure_in_space("enter_space")?;
        self.leader.join(&self.space_id).await?;
        info!(space_id = %self.space_id, client_id = self.client_id(), "Entered space");
        Ok(())
    }

    /// Leave the space scope and drop the local entity graph.
    ///
    /// Replication stops for good: later entity operations from peers are
    /// dropped and local entity calls fail. Connect a new session to re-enter.
    pub async fn exit_space(&self) -> Result<()> {
        self.exited.store(true, Ordering::SeqCst);
        self.bus.detach_entity_sink();
        let left = self.leader.leave(&self.space_id).await;
        self.entities.lock().clear();
        info!(space_id = %self.space_id, "Exited space");
        left
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    fn ensure_in_space(&self, action: &str) -> Result<()> {
        if self.has_exited() {
            warn!(space_id = %self.space_id, action, "Session already exited its space");
            return Err(Error::InvalidArgument(format!(
                "{}: session exited space {}",
                action, self.space_id
            )));
        }
        Ok(())
    }

    /// One frame: apply pending operations, send the resulting patches and
    /// keep leadership alive.
    ///
    /// An operation that fails with a retryable error goes back to the front
    /// of the outbound queue together with everything behind it, so the next
    /// tick sends them again in order. Other failures drop the operation.
    ///
    /// Returns the number of entity events emitted by the apply pass.
    pub async fn tick(&self) -> Result<usize> {
        let (events, outbound) = {
            let mut entities = self.entities.lock();
            let events = entities.process_pending_entity_operations();
            (events, entities.take_outbound())
        };

        let mut first_error = None;
        let mut pending = outbound.into_iter();
        while let Some(op) = pending.next() {
            let id = op.entity_id();
            match self.bus.send_entity_operation(op.clone()).await {
                Ok(()) => {}
                Err(e) if e.is_retryable() => {
                    warn!(entity_id = id, error = %e, "Failed to send entity patch, retrying next tick");
                    let mut unsent = vec![op];
                    unsent.extend(pending.by_ref());
                    self.entities.lock().requeue_outbound(unsent);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    warn!(entity_id = id, error = %e, "Entity patch rejected");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Err(e) = self.leader.heartbeat_if_due().await {
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(events),
        }
    }

    /// Create an entity and wait until the server accepted it.
    ///
    /// The entity becomes live, and `EntityEvent::Created` fires, on the next
    /// [`Session::tick`].
    pub async fn create_entity(
        &self,
        name: &str,
        transform: Transform,
        parent_id: Option<EntityId>,
    ) -> Result<Handle> {
        self.ensure_in_space("create_entity")?;
        let id = self
            .bus
            .generate_object_ids(1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Transport("server returned no entity id".into()))?;

        let (handle, snapshot) = {
            let mut entities = self.entities.lock();
            let handle = entities.create_local(id, name, transform, parent_id)?;
            let snapshot = entities
                .snapshot(handle)
                .ok_or_else(|| Error::EntityNotFound(id.to_string()))?;
            (handle, snapshot)
        };

        match self.bus.send_entity_operation(EntityOperation::Create(snapshot)).await {
            Ok(()) => {
                self.entities.lock().acknowledge_create(handle);
                debug!(entity_id = id, name, "Entity created");
                Ok(handle)
            }
            Err(e) => {
                warn!(entity_id = id, error = %e, "Entity create rejected");
                self.entities.lock().discard_pending(handle);
                Err(e)
            }
        }
    }

    /// Delete an entity and wait until the server accepted it.
    ///
    /// Local removal happens on the next [`Session::tick`].
    pub async fn destroy_entity(&self, handle: Handle) -> Result<()> {
        self.ensure_in_space("destroy_entity")?;
        let id = self.entities.lock().begin_delete(handle)?;

        match self.bus.send_entity_operation(EntityOperation::Delete { id }).await {
            Ok(()) => {
                self.entities
                    .lock()
                    .inbound_sender()
                    .send(InboundOperation::DeleteAcknowledged(id));
                debug!(entity_id = id, "Entity deleted");
                Ok(())
            }
            Err(e) => {
                warn!(entity_id = id, error = %e, "Entity delete rejected");
                self.entities.lock().abort_delete(handle);
                Err(e)
            }
        }
    }
}
