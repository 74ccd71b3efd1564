//! Shared fixtures: one in-process hub and sequence service per test

#![allow(dead_code)]

use async_trait::async_trait;
use spacesync_client::Session;
use spacesync_core::{Sequence, SequenceCriteria, SessionConfig};
use spacesync_service::{MemorySequenceService, SequenceService, ServiceError};
use spacesync_transport::LocalHub;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SPACE: &str = "space1";

/// Counts every call that would leave the process
pub struct CountingService {
    inner: Arc<MemorySequenceService>,
    calls: AtomicUsize,
}

impl CountingService {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SequenceService for CountingService {
    async fn create_sequence(&self, sequence: Sequence) -> Result<Sequence, ServiceError> {
        self.count();
        self.inner.create_sequence(sequence).await
    }

    async fn update_sequence(&self, sequence: Sequence) -> Result<Sequence, ServiceError> {
        self.count();
        self.inner.update_sequence(sequence).await
    }

    async fn rename_sequence(&self, old_key: &str, new_key: &str) -> Result<Sequence, ServiceError> {
        self.count();
        self.inner.rename_sequence(old_key, new_key).await
    }

    async fn delete_sequences(&self, keys: &[String]) -> Result<(), ServiceError> {
        self.count();
        self.inner.delete_sequences(keys).await
    }

    async fn get_sequence(&self, key: &str) -> Result<Sequence, ServiceError> {
        self.count();
        self.inner.get_sequence(key).await
    }

    async fn get_sequences_by_criteria(
        &self,
        criteria: &SequenceCriteria,
    ) -> Result<Vec<Sequence>, ServiceError> {
        self.count();
        self.inner.get_sequences_by_criteria(criteria).await
    }

    async fn get_all_sequences_containing_items(
        &self,
        items: &[String],
        reference_type: Option<&str>,
        reference_ids: &[String],
    ) -> Result<Vec<Sequence>, ServiceError> {
        self.count();
        self.inner
            .get_all_sequences_containing_items(items, reference_type, reference_ids)
            .await
    }
}

pub struct World {
    pub hub: LocalHub,
    pub store: Arc<MemorySequenceService>,
    pub service: Arc<CountingService>,
}

impl World {
    pub fn new() -> Self {
        let hub = LocalHub::new();
        let store = Arc::new(MemorySequenceService::new());
        store.add_observer(Arc::new(hub.clone()));
        let service = Arc::new(CountingService {
            inner: store.clone(),
            calls: AtomicUsize::new(0),
        });
        Self { hub, store, service }
    }

    pub fn config() -> SessionConfig {
        SessionConfig {
            request_timeout_ms: 2_000,
            entity_patch_rate_limit_enabled: false,
            ..Default::default()
        }
    }

    pub async fn session(&self, user_id: &str) -> Session {
        self.session_with(user_id, Self::config()).await
    }

    pub async fn session_with(&self, user_id: &str, config: SessionConfig) -> Session {
        Session::connect(self.hub.connect(), self.service.clone(), config, user_id, SPACE)
            .await
            .expect("session connects")
    }
}

/// Tick every session until `done` holds, failing after two seconds
pub async fn tick_until(sessions: &[&Session], mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        for session in sessions {
            session.tick().await.expect("tick");
        }
        if done() {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait for an async value with a bounded timeout
pub async fn within<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), future)
        .await
        .expect("timed out")
}
