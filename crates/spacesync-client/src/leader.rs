//! Leader election as seen by one client
//!
//! The server decides who leads a scope. This system only joins and leaves
//! scopes, reports what the server announced, and keeps the heartbeat going
//! for scopes the local client leads.

use parking_lot::Mutex;
use spacesync_core::{LeaderEvent, LeaderState, Result};
use spacesync_transport::EventBus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub struct LeaderElection {
    bus: Arc<EventBus>,
    heartbeat_interval: Duration,
    last_heartbeat: Mutex<Option<Instant>>,
}

impl LeaderElection {
    pub fn new(bus: Arc<EventBus>, heartbeat_interval: Duration) -> Self {
        Self {
            bus,
            heartbeat_interval,
            last_heartbeat: Mutex::new(None),
        }
    }

    /// Become a candidate in `scope`
    pub async fn join(&self, scope: &str) -> Result<()> {
        self.bus.join_scope(scope).await
    }

    /// Leave `scope`, handing leadership to another member if we held it
    pub async fn leave(&self, scope: &str) -> Result<()> {
        self.bus.leave_scope(scope).await
    }

    pub fn current_leader(&self, scope: &str) -> LeaderState {
        self.bus.leader_state(scope)
    }

    pub fn is_local_leader(&self, scope: &str) -> bool {
        self.bus.is_leader(scope)
    }

    pub fn led_scopes(&self) -> Vec<String> {
        self.bus.led_scopes()
    }

    /// Elections and vacancies in every joined scope
    pub fn subscribe(&self) -> broadcast::Receiver<LeaderEvent> {
        self.bus.subscribe_leader_events()
    }

    /// Send heartbeats for led scopes once the interval has passed.
    ///
    /// Returns the number of heartbeats sent.
    pub async fn heartbeat_if_due(&self) -> Result<usize> {
        let now = Instant::now();
        {
            let last = self.last_heartbeat.lock();
            if last.map_or(false, |at| now.duration_since(at) < self.heartbeat_interval) {
                return Ok(0);
            }
        }

        let scopes = self.led_scopes();
        if scopes.is_empty() {
            return Ok(0);
        }
        *self.last_heartbeat.lock() = Some(now);

        for scope in &scopes {
            if let Err(e) = self.bus.heartbeat(scope).await {
                warn!(scope = %scope, error = %e, "Leader heartbeat failed");
                return Err(e);
            }
        }
        debug!(count = scopes.len(), "Sent leader heartbeats");
        Ok(scopes.len())
    }
}
