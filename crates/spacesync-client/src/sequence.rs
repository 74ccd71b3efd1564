//! Sequence system - validated access to the sequence service
//!
//! Every key that would travel as a URL path segment is checked before the
//! service is called, so a rejected key never costs a round-trip.

use spacesync_core::sequence::validate_sequence_key;
use spacesync_core::{Result, Sequence, SequenceChange, SequenceCriteria};
use spacesync_protocol::{parse_sequence_changed, NetworkEvent, SEQUENCE_CHANGED_EVENT};
use spacesync_service::SequenceService;
use spacesync_transport::EventBus;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct SequenceSystem {
    service: Arc<dyn SequenceService>,
    bus: Arc<EventBus>,
}

impl SequenceSystem {
    pub fn new(service: Arc<dyn SequenceService>, bus: Arc<EventBus>) -> Self {
        Self { service, bus }
    }

    pub async fn create_sequence(
        &self,
        key: &str,
        reference_type: &str,
        reference_id: &str,
        items: Vec<String>,
        metadata: BTreeMap<String, String>,
    ) -> Result<Sequence> {
        check_key(key)?;
        let sequence = Sequence::new(key, reference_type, reference_id, items).with_metadata(metadata);
        let created = self.service.create_sequence(sequence).await?;
        debug!(key, "Created sequence");
        Ok(created)
    }

    /// Replace the items and metadata of an existing sequence
    pub async fn update_sequence(
        &self,
        key: &str,
        reference_type: &str,
        reference_id: &str,
        items: Vec<String>,
        metadata: BTreeMap<String, String>,
    ) -> Result<Sequence> {
        check_key(key)?;
        let sequence = Sequence::new(key, reference_type, reference_id, items).with_metadata(metadata);
        let updated = self.service.update_sequence(sequence).await?;
        debug!(key, "Updated sequence");
        Ok(updated)
    }

    pub async fn rename_sequence(&self, old_key: &str, new_key: &str) -> Result<Sequence> {
        check_key(old_key)?;
        check_key(new_key)?;
        let renamed = self.service.rename_sequence(old_key, new_key).await?;
        debug!(old_key, new_key, "Renamed sequence");
        Ok(renamed)
    }

    /// Fails without deleting anything if any key is invalid
    pub async fn delete_sequences(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            check_key(key)?;
        }
        self.service.delete_sequences(keys).await?;
        debug!(count = keys.len(), "Deleted sequences");
        Ok(())
    }

    pub async fn get_sequence(&self, key: &str) -> Result<Sequence> {
        check_key(key)?;
        Ok(self.service.get_sequence(key).await?)
    }

    /// Criteria travel in the request body, so keys are not validated
    pub async fn get_sequences_by_criteria(&self, criteria: &SequenceCriteria) -> Result<Vec<Sequence>> {
        Ok(self.service.get_sequences_by_criteria(criteria).await?)
    }

    /// Every sequence containing at least one of `items`
    pub async fn get_all_sequences_containing_items(
        &self,
        items: &[String],
        reference_type: Option<&str>,
        reference_ids: &[String],
    ) -> Result<Vec<Sequence>> {
        Ok(self
            .service
            .get_all_sequences_containing_items(items, reference_type, reference_ids)
            .await?)
    }

    /// Change notifications for every sequence in the space
    pub fn subscribe(&self) -> SequenceChanges {
        SequenceChanges {
            events: self.bus.subscribe_event(SEQUENCE_CHANGED_EVENT),
        }
    }
}

fn check_key(key: &str) -> Result<()> {
    validate_sequence_key(key).map_err(|e| {
        warn!(key, "Rejected sequence key");
        e
    })
}

/// Stream of typed sequence change notifications
pub struct SequenceChanges {
    events: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl SequenceChanges {
    /// Next change, or `None` once the connection is gone
    pub async fn recv(&mut self) -> Option<SequenceChange> {
        loop {
            let event = self.events.recv().await?;
            if let Some(change) = decode(&event) {
                return Some(change);
            }
        }
    }

    /// Next change that has already arrived
    pub fn try_recv(&mut self) -> Option<SequenceChange> {
        while let Ok(event) = self.events.try_recv() {
            if let Some(change) = decode(&event) {
                return Some(change);
            }
        }
        None
    }
}

fn decode(event: &NetworkEvent) -> Option<SequenceChange> {
    match parse_sequence_changed(&event.args) {
        Ok(change) => Some(change),
        Err(e) => {
            warn!(error = %e, "Ignoring malformed sequence change");
            None
        }
    }
}
