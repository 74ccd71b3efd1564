//! Operation queue between the network and the entity system
//!
//! Inbound operations arrive from the network task through an unbounded
//! channel and are only applied during an apply pass, in arrival order.
//! Local updates are recorded here and flushed on the same pass.

use crate::arena::Handle;
use crate::operation::{EntityId, EntityOperation};
use std::collections::{HashSet, VecDeque};
use tokio::sync::mpsc;

/// Something the apply pass has to fold into the entity view
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOperation {
    /// Operation broadcast by the server
    Remote(EntityOperation),
    /// The server accepted one of our creates
    CreateAcknowledged(EntityId),
    /// The server accepted one of our deletes
    DeleteAcknowledged(EntityId),
}

/// Cloneable handle used by network tasks to feed the queue
#[derive(Debug, Clone)]
pub struct InboundSender {
    tx: mpsc::UnboundedSender<InboundOperation>,
}

impl InboundSender {
    /// Returns false once the owning queue is gone
    pub fn send(&self, op: InboundOperation) -> bool {
        self.tx.send(op).is_ok()
    }

    pub fn send_remote(&self, op: EntityOperation) -> bool {
        self.send(InboundOperation::Remote(op))
    }
}

pub struct OperationQueue {
    inbound_tx: mpsc::UnboundedSender<InboundOperation>,
    inbound_rx: mpsc::UnboundedReceiver<InboundOperation>,
    queued_updates: VecDeque<Handle>,
    queued_set: HashSet<Handle>,
    outbound: VecDeque<EntityOperation>,
}

impl OperationQueue {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            inbound_tx,
            inbound_rx,
            queued_updates: VecDeque::new(),
            queued_set: HashSet::new(),
            outbound: VecDeque::new(),
        }
    }

    pub fn inbound_sender(&self) -> InboundSender {
        InboundSender {
            tx: self.inbound_tx.clone(),
        }
    }

    /// Queue an entity for the next flush. Returns false if it was already queued.
    pub fn queue_update(&mut self, handle: Handle) -> bool {
        if !self.queued_set.insert(handle) {
            return false;
        }
        self.queued_updates.push_back(handle);
        true
    }

    pub fn is_queued(&self, handle: Handle) -> bool {
        self.queued_set.contains(&handle)
    }

    pub fn take_queued_updates(&mut self) -> Vec<Handle> {
        self.queued_set.clear();
        self.queued_updates.drain(..).collect()
    }

    /// Drop a queued update, e.g. when its entity went away
    pub fn dequeue(&mut self, handle: Handle) {
        if self.queued_set.remove(&handle) {
            self.queued_updates.retain(|h| *h != handle);
        }
    }

    /// Take every inbound operation received so far, oldest first
    pub fn drain_inbound(&mut self) -> Vec<InboundOperation> {
        let mut ops = Vec::new();
        while let Ok(op) = self.inbound_rx.try_recv() {
            ops.push(op);
        }
        ops
    }

    pub fn push_outbound(&mut self, op: EntityOperation) {
        self.outbound.push_back(op);
    }

    pub fn take_outbound(&mut self) -> Vec<EntityOperation> {
        self.outbound.drain(..).collect()
    }

    /// Return unsent operations to the front, ahead of anything queued since
    pub fn requeue_outbound(&mut self, ops: Vec<EntityOperation>) {
        for op in ops.into_iter().rev() {
            self.outbound.push_front(op);
        }
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Drop everything local. Inbound operations still in flight are discarded.
    pub fn clear(&mut self) {
        self.queued_updates.clear();
        self.queued_set.clear();
        self.outbound.clear();
        while self.inbound_rx.try_recv().is_ok() {}
    }
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}
