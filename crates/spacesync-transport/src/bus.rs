//! Event bus - the client end of the real-time channel
//!
//! One receive task parses server frames and routes them:
//! - replies complete the pending request with the same id
//! - network events go to the subscribers of their name
//! - entity operations go to the entity system's inbound queue
//! - leader announcements update the leader table, then fan out
//!
//! Pushes carry a per-connection sequence number. Delivery is at-least-once,
//! so anything at or below the last number seen is dropped.

use crate::cancel::CancellationToken;
use crate::connection::Connection;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use spacesync_core::{
    EntityId, EntityOperation, Error, InboundSender, LeaderEvent, LeaderState, LeaderTable,
    ReplicatedValue, Result, SessionConfig,
};
use spacesync_protocol::{encode, ClientMessage, NetworkEvent, Parser, Push, Reply, Request, ServerMessage};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Where inbound entity operations go
enum EntitySink {
    /// Held until the entity system is attached
    Buffering(Vec<EntityOperation>),
    Forwarding(InboundSender),
    /// The client left its space
    Detached,
}

struct BusInner {
    outgoing: mpsc::UnboundedSender<Bytes>,
    client_id: AtomicU64,
    next_request_id: AtomicU64,
    pending: DashMap<u64, oneshot::Sender<Reply>>,
    subscriptions: DashMap<String, Vec<mpsc::UnboundedSender<NetworkEvent>>>,
    entity_sink: Mutex<EntitySink>,
    leaders: RwLock<LeaderTable>,
    leader_sender: broadcast::Sender<LeaderEvent>,
    last_push_seq: AtomicU64,
    allow_self_messaging: AtomicBool,
    connected: AtomicBool,
    request_timeout: Duration,
    max_message_size: usize,
}

/// Client side of the bidirectional channel to the space server
pub struct EventBus {
    inner: Arc<BusInner>,
    receive_task: JoinHandle<()>,
}

impl EventBus {
    /// Start the receive task and introduce ourselves to the server
    pub async fn connect(
        connection: Connection,
        config: &SessionConfig,
        user_id: &str,
        space_id: &str,
    ) -> Result<Self> {
        let (outgoing, incoming) = connection.into_parts();
        let (leader_sender, _) = broadcast::channel(config.event_channel_capacity);

        let inner = Arc::new(BusInner {
            outgoing,
            client_id: AtomicU64::new(0),
            next_request_id: AtomicU64::new(1),
            pending: DashMap::new(),
            subscriptions: DashMap::new(),
            entity_sink: Mutex::new(EntitySink::Buffering(Vec::new())),
            leaders: RwLock::new(LeaderTable::new()),
            leader_sender,
            last_push_seq: AtomicU64::new(0),
            allow_self_messaging: AtomicBool::new(config.allow_self_messaging),
            connected: AtomicBool::new(true),
            request_timeout: config.request_timeout(),
            max_message_size: config.max_message_size,
        });

        let receive_task = tokio::spawn(receive_loop(inner.clone(), incoming));
        let bus = Self { inner, receive_task };

        let reply = bus
            .request(
                Request::Hello {
                    user_id: user_id.to_string(),
                    space_id: space_id.to_string(),
                },
                None,
            )
            .await?;
        match reply {
            Reply::Welcome { client_id } => {
                bus.inner.client_id.store(client_id, Ordering::SeqCst);
                info!(client_id, user_id, space_id, "Connected to space server");
                Ok(bus)
            }
            other => Err(unexpected_reply("hello", &other)),
        }
    }

    pub fn client_id(&self) -> u64 {
        self.inner.client_id.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn allow_self_messaging(&self) -> bool {
        self.inner.allow_self_messaging.load(Ordering::SeqCst)
    }

    pub fn set_allow_self_messaging(&self, allow: bool) {
        self.inner.allow_self_messaging.store(allow, Ordering::SeqCst);
    }

    /// Send a request and wait for its reply.
    ///
    /// Fails with `Error::Timeout` after the configured request timeout and
    /// with `Error::Cancelled` when `cancel` fires first. Error replies are
    /// returned as `Error::Service`.
    pub async fn request(&self, request: Request, cancel: Option<&CancellationToken>) -> Result<Reply> {
        let name = request.name();
        let request_id = self.inner.next_request_id.fetch_add(1, Ordering::SeqCst);
        let frame = encode(&ClientMessage::new(request_id, request), self.inner.max_message_size)?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(request_id, tx);

        if self.inner.outgoing.send(frame).is_err() {
            self.inner.pending.remove(&request_id);
            return Err(Error::Transport("connection closed".into()));
        }
        debug!(request_id, request = name, "Sent request");

        let wait = async {
            match tokio::time::timeout(self.inner.request_timeout, rx).await {
                Ok(Ok(reply)) => reply.into_result(),
                Ok(Err(_)) => Err(Error::Transport("connection closed".into())),
                Err(_) => Err(Error::Timeout(name.to_string())),
            }
        };

        let outcome = match cancel {
            Some(token) => tokio::select! {
                outcome = wait => outcome,
                _ = token.cancelled() => Err(Error::Cancelled),
            },
            None => wait.await,
        };

        if outcome.is_err() {
            self.inner.pending.remove(&request_id);
        }
        outcome
    }

    async fn request_ok(&self, request: Request) -> Result<()> {
        let name = request.name();
        match self.request(request, None).await? {
            Reply::Ok => Ok(()),
            other => Err(unexpected_reply(name, &other)),
        }
    }

    /// Ask the server for `count` fresh entity ids
    pub async fn generate_object_ids(&self, count: u32) -> Result<Vec<EntityId>> {
        match self.request(Request::GenerateObjectIds { count }, None).await? {
            Reply::ObjectIds(ids) if ids.len() == count as usize => Ok(ids),
            other => Err(unexpected_reply("generate_object_ids", &other)),
        }
    }

    pub async fn send_entity_operation(&self, operation: EntityOperation) -> Result<()> {
        self.request_ok(Request::EntityOperation(operation)).await
    }

    /// Broadcast an event to every client in the space
    pub async fn send_network_event(&self, name: &str, args: Vec<ReplicatedValue>) -> Result<()> {
        self.request_ok(Request::SendEvent {
            event: NetworkEvent::new(name, args),
            target_client_id: None,
        })
        .await
    }

    /// Send an event to a single client
    pub async fn send_network_event_to_client(
        &self,
        name: &str,
        args: Vec<ReplicatedValue>,
        target_client_id: u64,
    ) -> Result<()> {
        self.request_ok(Request::SendEvent {
            event: NetworkEvent::new(name, args),
            target_client_id: Some(target_client_id),
        })
        .await
    }

    pub async fn join_scope(&self, scope: &str) -> Result<()> {
        self.request_ok(Request::JoinScope { scope: scope.to_string() }).await
    }

    pub async fn leave_scope(&self, scope: &str) -> Result<()> {
        self.request_ok(Request::LeaveScope { scope: scope.to_string() }).await?;
        self.inner.leaders.write().forget(scope);
        Ok(())
    }

    pub async fn heartbeat(&self, scope: &str) -> Result<()> {
        self.request_ok(Request::Heartbeat { scope: scope.to_string() }).await
    }

    pub async fn ping(&self) -> Result<()> {
        match self.request(Request::Ping, None).await? {
            Reply::Pong => Ok(()),
            other => Err(unexpected_reply("ping", &other)),
        }
    }

    /// Receive every event with this name
    pub fn subscribe_event(&self, name: &str) -> mpsc::UnboundedReceiver<NetworkEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscriptions
            .entry(name.to_string())
            .or_default()
            .push(tx);
        rx
    }

    pub fn subscribe_leader_events(&self) -> broadcast::Receiver<LeaderEvent> {
        self.inner.leader_sender.subscribe()
    }

    /// Leader of `scope` as last announced by the server
    pub fn leader_state(&self, scope: &str) -> LeaderState {
        self.inner.leaders.read().get(scope)
    }

    pub fn is_leader(&self, scope: &str) -> bool {
        self.inner.leaders.read().is_leader(scope, self.client_id())
    }

    /// Scopes this client leads
    pub fn led_scopes(&self) -> Vec<String> {
        self.inner.leaders.read().led_by(self.client_id())
    }

    /// Route entity operations into `sink`, flushing anything received so far
    pub fn attach_entity_sink(&self, sink: InboundSender) {
        let mut current = self.inner.entity_sink.lock();
        if let EntitySink::Buffering(buffered) = &mut *current {
            for op in buffered.drain(..) {
                sink.send_remote(op);
            }
        }
        *current = EntitySink::Forwarding(sink);
    }

    /// Stop routing entity operations. Anything received afterwards is dropped.
    pub fn detach_entity_sink(&self) {
        *self.inner.entity_sink.lock() = EntitySink::Detached;
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.receive_task.abort();
    }
}

fn unexpected_reply(request: &str, reply: &Reply) -> Error {
    Error::Transport(format!("unexpected reply to {}: {:?}", request, reply))
}

async fn receive_loop(inner: Arc<BusInner>, mut incoming: mpsc::UnboundedReceiver<Bytes>) {
    let mut parser = Parser::with_max_message_size(inner.max_message_size);

    while let Some(chunk) = incoming.recv().await {
        match parser.feed_and_parse::<ServerMessage>(&chunk) {
            Ok(messages) => {
                for message in messages {
                    inner.dispatch(message);
                }
            }
            Err(e) => error!(error = %e, "Dropping malformed server frame"),
        }
    }

    info!(client_id = inner.client_id.load(Ordering::SeqCst), "Server closed the connection");
    inner.connected.store(false, Ordering::SeqCst);
    // Dropping the senders fails every outstanding request
    inner.pending.clear();
}

impl BusInner {
    fn dispatch(&self, message: ServerMessage) {
        match message {
            ServerMessage::Reply { request_id, reply } => match self.pending.remove(&request_id) {
                Some((_, tx)) => {
                    let _ = tx.send(reply);
                }
                None => debug!(request_id, "Reply for abandoned request"),
            },
            ServerMessage::Push { seq, push } => {
                let last = self.last_push_seq.fetch_max(seq, Ordering::SeqCst);
                if seq <= last {
                    debug!(seq, last, "Dropping duplicate push");
                    return;
                }
                self.handle_push(push);
            }
        }
    }

    fn handle_push(&self, push: Push) {
        if let Some(event) = push.leader_event() {
            let changed = self.leaders.write().apply(&event);
            if changed {
                debug!(scope = event.scope(), ?event, "Leader changed");
                let _ = self.leader_sender.send(event);
            }
            return;
        }

        match push {
            Push::Event(event) => self.deliver_event(event),
            Push::EntityOperation(op) => {
                let mut sink = self.entity_sink.lock();
                match &mut *sink {
                    EntitySink::Buffering(buffered) => buffered.push(op),
                    EntitySink::Forwarding(sender) => {
                        if !sender.send_remote(op) {
                            warn!("Entity system is gone, dropping operation");
                        }
                    }
                    EntitySink::Detached => {
                        debug!(entity_id = op.entity_id(), "Entity sink detached, dropping operation");
                    }
                }
            }
            Push::LeaderElected { .. } | Push::LeaderVacated { .. } => {}
        }
    }

    fn deliver_event(&self, event: NetworkEvent) {
        let own = event.sender_client_id == self.client_id.load(Ordering::SeqCst);
        if own && !self.allow_self_messaging.load(Ordering::SeqCst) {
            debug!(event = %event.name, "Suppressing own event");
            return;
        }

        match self.subscriptions.get_mut(&event.name) {
            Some(mut subscribers) => {
                subscribers.retain(|tx| tx.send(event.clone()).is_ok());
            }
            None => debug!(event = %event.name, "No subscribers for event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacesync_protocol::MAX_MESSAGE_SIZE;

    /// Scripted server end: answers Hello and returns the raw channel
    async fn connect_scripted(
        config: SessionConfig,
    ) -> (EventBus, mpsc::UnboundedSender<Bytes>, mpsc::UnboundedReceiver<Bytes>) {
        let (client, server) = Connection::pair();
        let (server_tx, mut server_rx) = server.into_parts();

        let responder = server_tx.clone();
        let hello = tokio::spawn(async move {
            let mut parser = Parser::new();
            let chunk = server_rx.recv().await.unwrap();
            let message: ClientMessage = parser.feed_and_parse(&chunk).unwrap().remove(0);
            let reply = ServerMessage::Reply {
                request_id: message.request_id,
                reply: Reply::Welcome { client_id: 9 },
            };
            responder.send(encode(&reply, MAX_MESSAGE_SIZE).unwrap()).unwrap();
            server_rx
        });

        let bus = EventBus::connect(client, &config, "alice", "space1").await.unwrap();
        let server_rx = hello.await.unwrap();
        (bus, server_tx, server_rx)
    }

    fn push(seq: u64, push: Push) -> Bytes {
        encode(&ServerMessage::Push { seq, push }, MAX_MESSAGE_SIZE).unwrap()
    }

    fn event_from(sender: u64) -> Push {
        let mut event = NetworkEvent::new("Chat", vec![ReplicatedValue::from("hi")]);
        event.sender_client_id = sender;
        Push::Event(event)
    }

    #[tokio::test]
    async fn test_connect_assigns_client_id() {
        let (bus, _tx, _rx) = connect_scripted(SessionConfig::default()).await;
        assert_eq!(bus.client_id(), 9);
        assert!(bus.is_connected());
    }

    #[tokio::test]
    async fn test_duplicate_pushes_are_dropped() {
        let (bus, tx, _rx) = connect_scripted(SessionConfig::default()).await;
        let mut events = bus.subscribe_event("Chat");

        tx.send(push(1, event_from(2))).unwrap();
        tx.send(push(1, event_from(2))).unwrap();
        tx.send(push(2, event_from(3))).unwrap();

        assert_eq!(events.recv().await.unwrap().sender_client_id, 2);
        assert_eq!(events.recv().await.unwrap().sender_client_id, 3);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_own_events_are_suppressed() {
        let (bus, tx, _rx) = connect_scripted(SessionConfig::default()).await;
        let mut events = bus.subscribe_event("Chat");

        tx.send(push(1, event_from(9))).unwrap();
        tx.send(push(2, event_from(4))).unwrap();
        assert_eq!(events.recv().await.unwrap().sender_client_id, 4);

        bus.set_allow_self_messaging(true);
        tx.send(push(3, event_from(9))).unwrap();
        assert_eq!(events.recv().await.unwrap().sender_client_id, 9);
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let config = SessionConfig {
            request_timeout_ms: 20,
            ..Default::default()
        };
        let (bus, _tx, _rx) = connect_scripted(config).await;

        let err = bus.ping().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_request_can_be_cancelled() {
        let (bus, _tx, _rx) = connect_scripted(SessionConfig::default()).await;
        let token = CancellationToken::new();
        token.cancel();

        let err = bus.request(Request::Ping, Some(&token)).await.unwrap_err();
        assert_eq!(err, Error::Cancelled);
    }

    #[tokio::test]
    async fn test_pending_requests_fail_when_server_goes_away() {
        let (bus, tx, rx) = connect_scripted(SessionConfig::default()).await;
        drop(tx);
        drop(rx);

        let err = bus.ping().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_entity_operations_are_buffered_until_attached() {
        let (bus, tx, _rx) = connect_scripted(SessionConfig::default()).await;
        tx.send(push(1, Push::EntityOperation(EntityOperation::Delete { id: 5 })))
            .unwrap();
        bus.sync_with_receiver(&tx).await;

        let mut queue = spacesync_core::OperationQueue::new();
        bus.attach_entity_sink(queue.inbound_sender());
        assert_eq!(
            queue.drain_inbound(),
            vec![spacesync_core::InboundOperation::Remote(EntityOperation::Delete { id: 5 })]
        );
    }

    #[tokio::test]
    async fn test_leader_pushes_update_table() {
        let (bus, tx, _rx) = connect_scripted(SessionConfig::default()).await;
        let mut leaders = bus.subscribe_leader_events();

        tx.send(push(
            1,
            Push::LeaderElected {
                scope: "space1".into(),
                client_id: 9,
                user_id: "alice".into(),
            },
        ))
        .unwrap();

        let event = leaders.recv().await.unwrap();
        assert_eq!(event.scope(), "space1");
        assert!(bus.is_leader("space1"));
        assert_eq!(bus.led_scopes(), vec!["space1".to_string()]);
    }

    impl EventBus {
        /// Wait until the receive task processed everything sent so far
        async fn sync_with_receiver(&self, tx: &mpsc::UnboundedSender<Bytes>) {
            let mut events = self.subscribe_event("Barrier");
            let mut barrier = NetworkEvent::new("Barrier", vec![]);
            barrier.sender_client_id = 1;
            tx.send(push(u64::MAX, Push::Event(barrier))).unwrap();
            events.recv().await.unwrap();
        }
    }
}
