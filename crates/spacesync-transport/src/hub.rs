//! Local hub - an in-process space server
//!
//! Implements the server behaviour the client depends on:
//! - client and entity id allocation
//! - entity operation fan-out to the other clients of a space
//! - network event delivery, broadcast or targeted
//! - leader election per scope, re-electing when the leader leaves
//! - `SequenceChanged` notifications for sequence service mutations
//!
//! Every push carries a per-client sequence number. With duplicate delivery
//! enabled each push is written twice to exercise idempotent receivers.

use crate::connection::Connection;
use bytes::Bytes;
use parking_lot::Mutex;
use spacesync_core::{
    EntityId, EntityOperation, EntityPatch, ParentUpdate, SequenceChange, SpaceEntity,
};
use spacesync_protocol::{
    encode, sequence_changed_event, ClientMessage, NetworkEvent, Parser, Push, Reply, Request,
    ServerMessage, MAX_MESSAGE_SIZE,
};
use spacesync_service::SequenceObserver;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Largest id batch a single request may ask for
const MAX_ID_BATCH: u32 = 1024;

struct ClientEntry {
    user_id: String,
    space_id: Option<String>,
    outgoing: mpsc::UnboundedSender<Bytes>,
    next_seq: u64,
}

struct ScopeState {
    /// Members in join order
    members: Vec<u64>,
    leader: Option<u64>,
    last_heartbeat: Instant,
}

#[derive(Default)]
struct HubState {
    clients: BTreeMap<u64, ClientEntry>,
    spaces: HashMap<String, BTreeMap<EntityId, SpaceEntity>>,
    scopes: HashMap<String, ScopeState>,
}

struct HubInner {
    next_client_id: AtomicU64,
    next_object_id: AtomicU64,
    duplicate_delivery: AtomicBool,
    failing_entity_operations: AtomicUsize,
    max_message_size: usize,
    state: Mutex<HubState>,
}

/// In-process space server
#[derive(Clone)]
pub struct LocalHub {
    inner: Arc<HubInner>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::with_max_message_size(MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                next_client_id: AtomicU64::new(1),
                next_object_id: AtomicU64::new(1),
                duplicate_delivery: AtomicBool::new(false),
                failing_entity_operations: AtomicUsize::new(0),
                max_message_size,
                state: Mutex::new(HubState::default()),
            }),
        }
    }

    /// Accept a new client and return its end of the connection.
    ///
    /// Must be called inside a tokio runtime.
    pub fn connect(&self) -> Connection {
        let (client, server) = Connection::pair();
        let (outgoing, incoming) = server.into_parts();
        let client_id = self.inner.next_client_id.fetch_add(1, Ordering::SeqCst);

        self.inner.state.lock().clients.insert(
            client_id,
            ClientEntry {
                user_id: String::new(),
                space_id: None,
                outgoing,
                next_seq: 0,
            },
        );
        debug!(client_id, "Client connected to hub");

        tokio::spawn(serve(self.inner.clone(), client_id, incoming));
        client
    }

    /// Write every push twice
    pub fn set_duplicate_delivery(&self, enabled: bool) {
        self.inner.duplicate_delivery.store(enabled, Ordering::SeqCst);
    }

    /// Reject the next `count` entity operations with 503 without applying them
    pub fn fail_next_entity_operations(&self, count: usize) {
        self.inner.failing_entity_operations.store(count, Ordering::SeqCst);
    }

    pub fn client_count(&self) -> usize {
        self.inner.state.lock().clients.len()
    }

    /// Number of entities the hub holds for a space
    pub fn entity_count(&self, space_id: &str) -> usize {
        self.inner
            .state
            .lock()
            .spaces
            .get(space_id)
            .map_or(0, |entities| entities.len())
    }

    pub fn entity_snapshot(&self, space_id: &str, id: EntityId) -> Option<spacesync_core::EntitySnapshot> {
        self.inner
            .state
            .lock()
            .spaces
            .get(space_id)
            .and_then(|entities| entities.get(&id))
            .map(|e| e.snapshot())
    }

    pub fn leader_of(&self, scope: &str) -> Option<u64> {
        self.inner.state.lock().scopes.get(scope).and_then(|s| s.leader)
    }

    /// Re-elect in scopes whose leader has not sent a heartbeat for `timeout`.
    ///
    /// Returns the number of scopes whose leader changed.
    pub fn expire_stale_leaders(&self, timeout: Duration) -> usize {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        let now = Instant::now();

        let stale: Vec<String> = state
            .scopes
            .iter()
            .filter(|(_, s)| s.leader.is_some() && now.duration_since(s.last_heartbeat) >= timeout)
            .map(|(scope, _)| scope.clone())
            .collect();

        let mut changed = 0;
        for scope in stale {
            let Some(scope_state) = state.scopes.get_mut(&scope) else {
                continue;
            };
            let current = scope_state.leader;
            let Some(next) = scope_state.members.iter().copied().find(|m| Some(*m) != current) else {
                continue;
            };
            // The silent leader drops to the back of the line
            if let Some(stale_leader) = current {
                scope_state.members.retain(|m| *m != stale_leader);
                scope_state.members.push(stale_leader);
            }
            scope_state.leader = Some(next);
            scope_state.last_heartbeat = now;
            warn!(scope = %scope, ?current, next, "Leader missed heartbeats, re-electing");
            inner.announce_leader(&mut state, &scope, None);
            changed += 1;
        }
        changed
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceObserver for LocalHub {
    fn sequence_changed(&self, change: &SequenceChange) {
        let event = sequence_changed_event(change);
        let mut state = self.inner.state.lock();
        let targets = HubInner::space_members(&state, &change.space_id);
        for client_id in targets {
            self.inner.push(&mut state, client_id, Push::Event(event.clone()));
        }
    }
}

async fn serve(inner: Arc<HubInner>, client_id: u64, mut incoming: mpsc::UnboundedReceiver<Bytes>) {
    let mut parser = Parser::with_max_message_size(inner.max_message_size);

    while let Some(chunk) = incoming.recv().await {
        match parser.feed_and_parse::<ClientMessage>(&chunk) {
            Ok(messages) => {
                for message in messages {
                    inner.handle(client_id, message);
                }
            }
            Err(e) => warn!(client_id, error = %e, "Dropping malformed client frame"),
        }
    }

    inner.disconnect(client_id);
}

impl HubInner {
    fn handle(&self, client_id: u64, message: ClientMessage) {
        let ClientMessage { request_id, request } = message;
        debug!(client_id, request_id, request = request.name(), "Handling request");

        let mut state = self.state.lock();
        let reply = match request {
            Request::Hello { user_id, space_id } => {
                self.handle_hello(&mut state, client_id, request_id, user_id, space_id);
                return;
            }
            Request::GenerateObjectIds { count } => self.handle_generate_ids(count),
            Request::EntityOperation(op) => self.handle_entity_operation(&mut state, client_id, op),
            Request::SendEvent { event, target_client_id } => {
                self.handle_send_event(&mut state, client_id, event, target_client_id)
            }
            Request::JoinScope { scope } => self.handle_join(&mut state, client_id, &scope),
            Request::LeaveScope { scope } => self.handle_leave(&mut state, client_id, &scope),
            Request::Heartbeat { scope } => {
                if let Some(scope_state) = state.scopes.get_mut(&scope) {
                    if scope_state.leader == Some(client_id) {
                        scope_state.last_heartbeat = Instant::now();
                    }
                }
                Reply::Ok
            }
            Request::Ping => Reply::Pong,
        };

        self.reply(&mut state, client_id, request_id, reply);
    }

    fn handle_hello(
        &self,
        state: &mut HubState,
        client_id: u64,
        request_id: u64,
        user_id: String,
        space_id: String,
    ) {
        if let Some(entry) = state.clients.get_mut(&client_id) {
            entry.user_id = user_id.clone();
            entry.space_id = Some(space_id.clone());
        }
        info!(client_id, user_id = %user_id, space_id = %space_id, "Client entered space");
        self.reply(state, client_id, request_id, Reply::Welcome { client_id });

        // Late joiners get the current world as creates
        let snapshots: Vec<_> = state
            .spaces
            .get(&space_id)
            .map(|entities| entities.values().map(|e| e.snapshot()).collect())
            .unwrap_or_default();
        for snapshot in snapshots {
            self.push(state, client_id, Push::EntityOperation(EntityOperation::Create(snapshot)));
        }
    }

    fn handle_generate_ids(&self, count: u32) -> Reply {
        if count == 0 || count > MAX_ID_BATCH {
            return Reply::error(400, format!("id count must be between 1 and {}", MAX_ID_BATCH));
        }
        let first = self.next_object_id.fetch_add(count as u64, Ordering::SeqCst);
        Reply::ObjectIds((first..first + count as u64).collect())
    }

    fn handle_entity_operation(&self, state: &mut HubState, client_id: u64, op: EntityOperation) -> Reply {
        let failing = self
            .failing_entity_operations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            warn!(client_id, entity_id = op.entity_id(), "Failing entity operation on request");
            return Reply::error(503, "entity service unavailable");
        }
        let Some(space_id) = state.clients.get(&client_id).and_then(|c| c.space_id.clone()) else {
            return Reply::error(403, "client has not entered a space");
        };
        let entities = state.spaces.entry(space_id.clone()).or_default();

        let mut fan_out = vec![op.clone()];
        match &op {
            EntityOperation::Create(snapshot) => {
                if entities.contains_key(&snapshot.id) {
                    return Reply::error(409, format!("entity {} already exists", snapshot.id));
                }
                entities.insert(snapshot.id, SpaceEntity::from_snapshot(snapshot));
            }
            EntityOperation::Patch(patch) => match entities.get_mut(&patch.id) {
                Some(entity) => {
                    entity.apply_patch(patch);
                }
                None => return Reply::error(404, format!("entity {} not found", patch.id)),
            },
            EntityOperation::Delete { id } => {
                if entities.remove(id).is_none() {
                    debug!(entity_id = id, "Delete of unknown entity");
                    return Reply::Ok;
                }
                // Children stay in the space as roots
                for child in entities.values_mut().filter(|e| e.parent_id() == Some(*id)) {
                    let mut detach = EntityPatch::new(child.id());
                    detach.parent = Some(ParentUpdate::Detach);
                    child.apply_patch(&detach);
                    fan_out.push(EntityOperation::Patch(detach));
                }
            }
        }

        let peers: Vec<u64> = Self::space_members(state, &space_id)
            .into_iter()
            .filter(|id| *id != client_id)
            .collect();
        for peer in peers {
            for op in &fan_out {
                self.push(state, peer, Push::EntityOperation(op.clone()));
            }
        }
        Reply::Ok
    }

    fn handle_send_event(
        &self,
        state: &mut HubState,
        client_id: u64,
        mut event: NetworkEvent,
        target_client_id: Option<u64>,
    ) -> Reply {
        let Some(space_id) = state.clients.get(&client_id).and_then(|c| c.space_id.clone()) else {
            return Reply::error(403, "client has not entered a space");
        };
        event.sender_client_id = client_id;

        let targets = match target_client_id {
            Some(target) => {
                let in_space = state
                    .clients
                    .get(&target)
                    .map_or(false, |c| c.space_id.as_deref() == Some(space_id.as_str()));
                if !in_space {
                    return Reply::error(404, format!("client {} is not in the space", target));
                }
                vec![target]
            }
            None => Self::space_members(state, &space_id),
        };

        for target in targets {
            self.push(state, target, Push::Event(event.clone()));
        }
        Reply::Ok
    }

    fn handle_join(&self, state: &mut HubState, client_id: u64, scope: &str) -> Reply {
        let scope_state = state.scopes.entry(scope.to_string()).or_insert_with(|| ScopeState {
            members: Vec::new(),
            leader: None,
            last_heartbeat: Instant::now(),
        });
        if !scope_state.members.contains(&client_id) {
            scope_state.members.push(client_id);
        }

        if scope_state.leader.is_none() {
            scope_state.leader = Some(client_id);
            scope_state.last_heartbeat = Instant::now();
            info!(scope, client_id, "Elected scope leader");
            self.announce_leader(state, scope, None);
        } else {
            // Only the joiner needs to learn the current leader
            self.announce_leader(state, scope, Some(client_id));
        }
        Reply::Ok
    }

    fn handle_leave(&self, state: &mut HubState, client_id: u64, scope: &str) -> Reply {
        if self.remove_from_scope(state, client_id, scope) {
            Reply::Ok
        } else {
            Reply::error(404, format!("not a member of scope {}", scope))
        }
    }

    /// Returns false if the client was not a member
    fn remove_from_scope(&self, state: &mut HubState, client_id: u64, scope: &str) -> bool {
        let Some(scope_state) = state.scopes.get_mut(scope) else {
            return false;
        };
        let before = scope_state.members.len();
        scope_state.members.retain(|m| *m != client_id);
        if scope_state.members.len() == before {
            return false;
        }

        if scope_state.leader == Some(client_id) {
            scope_state.leader = scope_state.members.first().copied();
            scope_state.last_heartbeat = Instant::now();
            info!(scope, previous = client_id, next = ?scope_state.leader, "Leader left scope");

            let now_empty = scope_state.members.is_empty();
            self.announce_leader(state, scope, None);
            // The departing leader learns it no longer leads
            self.push(state, client_id, Push::LeaderVacated { scope: scope.to_string() });
            if now_empty {
                state.scopes.remove(scope);
            }
        } else if scope_state.members.is_empty() {
            state.scopes.remove(scope);
        }
        true
    }

    /// Push the scope's leader to every member, or only to `only`
    fn announce_leader(&self, state: &mut HubState, scope: &str, only: Option<u64>) {
        let Some(scope_state) = state.scopes.get(scope) else {
            return;
        };
        let push = match scope_state.leader {
            Some(leader) => Push::LeaderElected {
                scope: scope.to_string(),
                client_id: leader,
                user_id: state
                    .clients
                    .get(&leader)
                    .map(|c| c.user_id.clone())
                    .unwrap_or_default(),
            },
            None => Push::LeaderVacated {
                scope: scope.to_string(),
            },
        };
        let targets = match only {
            Some(client_id) => vec![client_id],
            None => scope_state.members.clone(),
        };
        for target in targets {
            self.push(state, target, push.clone());
        }
    }

    fn disconnect(&self, client_id: u64) {
        let mut state = self.state.lock();
        let scopes: Vec<String> = state
            .scopes
            .iter()
            .filter(|(_, s)| s.members.contains(&client_id))
            .map(|(scope, _)| scope.clone())
            .collect();
        for scope in scopes {
            self.remove_from_scope(&mut state, client_id, &scope);
        }
        state.clients.remove(&client_id);
        info!(client_id, "Client disconnected from hub");
    }

    fn space_members(state: &HubState, space_id: &str) -> Vec<u64> {
        state
            .clients
            .iter()
            .filter(|(_, c)| c.space_id.as_deref() == Some(space_id))
            .map(|(id, _)| *id)
            .collect()
    }

    fn reply(&self, state: &mut HubState, client_id: u64, request_id: u64, reply: Reply) {
        self.send(state, client_id, &ServerMessage::Reply { request_id, reply }, false);
    }

    fn push(&self, state: &mut HubState, client_id: u64, push: Push) {
        let Some(entry) = state.clients.get_mut(&client_id) else {
            return;
        };
        entry.next_seq += 1;
        let message = ServerMessage::Push {
            seq: entry.next_seq,
            push,
        };
        let duplicate = self.duplicate_delivery.load(Ordering::SeqCst);
        self.send(state, client_id, &message, duplicate);
    }

    fn send(&self, state: &mut HubState, client_id: u64, message: &ServerMessage, duplicate: bool) {
        let Some(entry) = state.clients.get(&client_id) else {
            return;
        };
        let frame = match encode(message, self.max_message_size) {
            Ok(frame) => frame,
            Err(e) => {
                error!(client_id, error = %e, "Failed to encode server message");
                return;
            }
        };

        let copies = if duplicate { 2 } else { 1 };
        for _ in 0..copies {
            if entry.outgoing.send(frame.clone()).is_err() {
                debug!(client_id, "Client connection already closed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventBus;
    use spacesync_core::{
        EntitySnapshot, LeaderEvent, LockType, ReplicatedValue, SequenceUpdateType, SessionConfig,
        Transform,
    };

    async fn join(hub: &LocalHub, user: &str) -> EventBus {
        EventBus::connect(hub.connect(), &SessionConfig::default(), user, "space1")
            .await
            .unwrap()
    }

    fn snapshot(id: EntityId, parent_id: Option<EntityId>) -> EntitySnapshot {
        EntitySnapshot {
            id,
            name: format!("entity-{}", id),
            transform: Transform::default(),
            owner_id: 1,
            is_transferable: true,
            parent_id,
            lock_type: LockType::None,
            components: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_object_ids_are_unique() {
        let hub = LocalHub::new();
        let a = join(&hub, "alice").await;
        let b = join(&hub, "bob").await;

        let mut ids = a.generate_object_ids(3).await.unwrap();
        ids.extend(b.generate_object_ids(2).await.unwrap());
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);

        let err = a.generate_object_ids(0).await.unwrap_err();
        assert_eq!(err.http_code(), 400);
    }

    #[tokio::test]
    async fn test_first_joiner_leads_and_successor_takes_over() {
        let hub = LocalHub::new();
        let a = join(&hub, "alice").await;
        let b = join(&hub, "bob").await;

        a.join_scope("space1").await.unwrap();
        b.join_scope("space1").await.unwrap();
        assert_eq!(hub.leader_of("space1"), Some(a.client_id()));
        assert!(a.is_leader("space1"));
        assert_eq!(b.leader_state("space1").current_leader_user_id.as_deref(), Some("alice"));

        let mut b_events = b.subscribe_leader_events();
        a.leave_scope("space1").await.unwrap();
        assert_eq!(hub.leader_of("space1"), Some(b.client_id()));

        let event = b_events.recv().await.unwrap();
        assert_eq!(
            event,
            LeaderEvent::Elected {
                scope: "space1".into(),
                client_id: b.client_id(),
                user_id: "bob".into(),
            }
        );
        assert!(!a.is_leader("space1"));
    }

    #[tokio::test]
    async fn test_disconnect_re_elects() {
        let hub = LocalHub::new();
        let a = join(&hub, "alice").await;
        let b = join(&hub, "bob").await;
        a.join_scope("scope").await.unwrap();
        b.join_scope("scope").await.unwrap();

        let mut b_events = b.subscribe_leader_events();
        drop(a);
        b_events.recv().await.unwrap();
        assert!(b.is_leader("scope"));
        assert_eq!(hub.client_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_leader_is_replaced() {
        let hub = LocalHub::new();
        let a = join(&hub, "alice").await;
        let b = join(&hub, "bob").await;
        a.join_scope("scope").await.unwrap();
        b.join_scope("scope").await.unwrap();

        let mut b_events = b.subscribe_leader_events();
        assert_eq!(hub.expire_stale_leaders(Duration::ZERO), 1);
        assert_eq!(hub.leader_of("scope"), Some(b.client_id()));
        b_events.recv().await.unwrap();
        assert!(b.is_leader("scope"));

        assert_eq!(hub.expire_stale_leaders(Duration::from_secs(3600)), 0);
    }

    #[tokio::test]
    async fn test_leave_without_membership_is_not_found() {
        let hub = LocalHub::new();
        let a = join(&hub, "alice").await;
        assert_eq!(a.leave_scope("nowhere").await.unwrap_err().http_code(), 404);
    }

    #[tokio::test]
    async fn test_targeted_event_reaches_only_target() {
        let hub = LocalHub::new();
        let a = join(&hub, "alice").await;
        let b = join(&hub, "bob").await;
        let c = join(&hub, "carol").await;
        let mut b_rx = b.subscribe_event("Poke");
        let mut c_rx = c.subscribe_event("Poke");

        a.send_network_event_to_client("Poke", vec![ReplicatedValue::Integer(1)], b.client_id())
            .await
            .unwrap();
        a.send_network_event("Poke", vec![ReplicatedValue::Integer(2)]).await.unwrap();

        assert_eq!(b_rx.recv().await.unwrap().args, vec![ReplicatedValue::Integer(1)]);
        assert_eq!(b_rx.recv().await.unwrap().args, vec![ReplicatedValue::Integer(2)]);
        assert_eq!(c_rx.recv().await.unwrap().args, vec![ReplicatedValue::Integer(2)]);

        let err = a.send_network_event_to_client("Poke", vec![], 999).await.unwrap_err();
        assert_eq!(err.http_code(), 404);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_absorbed() {
        let hub = LocalHub::new();
        hub.set_duplicate_delivery(true);
        let a = join(&hub, "alice").await;
        let b = join(&hub, "bob").await;
        let mut rx = b.subscribe_event("Chat");

        a.send_network_event("Chat", vec![ReplicatedValue::from("one")]).await.unwrap();
        a.send_network_event("Chat", vec![ReplicatedValue::from("two")]).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().args, vec![ReplicatedValue::from("one")]);
        assert_eq!(rx.recv().await.unwrap().args, vec![ReplicatedValue::from("two")]);
        b.ping().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_entity_operations_are_not_applied() {
        let hub = LocalHub::new();
        let a = join(&hub, "alice").await;
        hub.fail_next_entity_operations(1);

        let err = a
            .send_entity_operation(EntityOperation::Create(snapshot(1, None)))
            .await
            .unwrap_err();
        assert_eq!(err.http_code(), 503);
        assert!(err.is_retryable());
        assert_eq!(hub.entity_count("space1"), 0);

        a.send_entity_operation(EntityOperation::Create(snapshot(1, None))).await.unwrap();
        assert_eq!(hub.entity_count("space1"), 1);
    }

    #[tokio::test]
    async fn test_hub_tracks_entities_and_re_roots_children() {
        let hub = LocalHub::new();
        let a = join(&hub, "alice").await;

        a.send_entity_operation(EntityOperation::Create(snapshot(1, None))).await.unwrap();
        a.send_entity_operation(EntityOperation::Create(snapshot(2, Some(1)))).await.unwrap();
        assert_eq!(
            a.send_entity_operation(EntityOperation::Create(snapshot(1, None)))
                .await
                .unwrap_err()
                .http_code(),
            409
        );
        assert_eq!(hub.entity_count("space1"), 2);

        a.send_entity_operation(EntityOperation::Delete { id: 1 }).await.unwrap();
        a.send_entity_operation(EntityOperation::Delete { id: 1 }).await.unwrap();
        assert_eq!(hub.entity_count("space1"), 1);
        assert_eq!(hub.entity_snapshot("space1", 2).unwrap().parent_id, None);

        let mut patch = EntityPatch::new(42);
        patch.name = Some("ghost".into());
        let err = a.send_entity_operation(EntityOperation::Patch(patch)).await.unwrap_err();
        assert_eq!(err.http_code(), 404);
    }

    #[tokio::test]
    async fn test_sequence_changes_reach_space_members() {
        let hub = LocalHub::new();
        let a = join(&hub, "alice").await;
        let mut rx = a.subscribe_event(spacesync_protocol::SEQUENCE_CHANGED_EVENT);

        hub.sequence_changed(&SequenceChange {
            update_type: SequenceUpdateType::Create,
            key: "space1:tour".into(),
            space_id: "space1".into(),
        });
        hub.sequence_changed(&SequenceChange {
            update_type: SequenceUpdateType::Create,
            key: "space2:tour".into(),
            space_id: "space2".into(),
        });

        let event = rx.recv().await.unwrap();
        let change = spacesync_protocol::parse_sequence_changed(&event.args).unwrap();
        assert_eq!(change.key, "space1:tour");
        a.ping().await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
