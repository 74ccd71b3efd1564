//! In-memory sequence backend

use crate::{SequenceObserver, SequenceService, ServiceError, ServiceStats};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use spacesync_core::{Sequence, SequenceChange, SequenceCriteria, SequenceUpdateType};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// In-memory sequence service
///
/// Behaves like the remote API for everything the client depends on:
/// conflicts, missing keys, read-only reference ids, regex queries and
/// change notification. Data is lost when the process exits.
pub struct MemorySequenceService {
    sequences: DashMap<String, Sequence>,
    /// Reference ids whose sequences may not be edited
    read_only: DashSet<String>,
    observers: RwLock<Vec<Arc<dyn SequenceObserver>>>,
    /// Serializes mutations so checks, writes and notifications are atomic
    write_lock: Mutex<()>,
    request_count: AtomicUsize,
    pending_failures: AtomicUsize,
}

impl MemorySequenceService {
    pub fn new() -> Self {
        Self {
            sequences: DashMap::new(),
            read_only: DashSet::new(),
            observers: RwLock::new(Vec::new()),
            write_lock: Mutex::new(()),
            request_count: AtomicUsize::new(0),
            pending_failures: AtomicUsize::new(0),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn SequenceObserver>) {
        self.observers.write().push(observer);
    }

    /// Reject edits to sequences referencing `reference_id` with 403
    pub fn set_read_only(&self, reference_id: impl Into<String>) {
        self.read_only.insert(reference_id.into());
    }

    /// Fail the next `count` requests with 503
    pub fn fail_next_requests(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            sequence_count: self.sequences.len(),
            request_count: self.request_count(),
        }
    }

    /// Count the request and apply injected failures
    fn begin_request(&self, operation: &str) -> Result<(), ServiceError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            debug!(operation, "Injected service failure");
            return Err(ServiceError::Unavailable(operation.to_string()));
        }
        Ok(())
    }

    fn check_writable(&self, reference_id: &str) -> Result<(), ServiceError> {
        if self.read_only.contains(reference_id) {
            return Err(ServiceError::Forbidden(reference_id.to_string()));
        }
        Ok(())
    }

    fn notify(&self, update_type: SequenceUpdateType, sequence: &Sequence) {
        let change = SequenceChange {
            update_type,
            key: sequence.key.clone(),
            space_id: sequence.reference_id.clone(),
        };
        debug!(key = %change.key, ?update_type, "Sequence changed");
        for observer in self.observers.read().iter() {
            observer.sequence_changed(&change);
        }
    }

    fn sorted(mut sequences: Vec<Sequence>) -> Vec<Sequence> {
        sequences.sort_by(|a, b| a.key.cmp(&b.key));
        sequences
    }

    fn matches_reference(sequence: &Sequence, reference_type: Option<&str>, reference_ids: &[String]) -> bool {
        reference_type.map_or(true, |t| sequence.reference_type == t)
            && (reference_ids.is_empty() || reference_ids.contains(&sequence.reference_id))
    }
}

impl Default for MemorySequenceService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SequenceService for MemorySequenceService {
    async fn create_sequence(&self, sequence: Sequence) -> Result<Sequence, ServiceError> {
        self.begin_request("create_sequence")?;
        {
            let _guard = self.write_lock.lock();
            self.check_writable(&sequence.reference_id)?;
            if self.sequences.contains_key(&sequence.key) {
                return Err(ServiceError::Conflict(sequence.key));
            }
            self.sequences.insert(sequence.key.clone(), sequence.clone());
            self.notify(SequenceUpdateType::Create, &sequence);
        }
        Ok(sequence)
    }

    async fn update_sequence(&self, sequence: Sequence) -> Result<Sequence, ServiceError> {
        self.begin_request("update_sequence")?;
        {
            let _guard = self.write_lock.lock();
            let existing = self
                .sequences
                .get(&sequence.key)
                .map(|s| s.reference_id.clone())
                .ok_or_else(|| ServiceError::NotFound(sequence.key.clone()))?;
            self.check_writable(&existing)?;
            self.check_writable(&sequence.reference_id)?;
            self.sequences.insert(sequence.key.clone(), sequence.clone());
            self.notify(SequenceUpdateType::Update, &sequence);
        }
        Ok(sequence)
    }

    async fn rename_sequence(&self, old_key: &str, new_key: &str) -> Result<Sequence, ServiceError> {
        self.begin_request("rename_sequence")?;
        let _guard = self.write_lock.lock();
        let old = self
            .sequences
            .get(old_key)
            .map(|s| s.value().clone())
            .ok_or_else(|| ServiceError::NotFound(old_key.to_string()))?;
        self.check_writable(&old.reference_id)?;
        if old_key != new_key && self.sequences.contains_key(new_key) {
            return Err(ServiceError::Conflict(new_key.to_string()));
        }

        let mut renamed = old.clone();
        renamed.key = new_key.to_string();
        self.sequences.remove(old_key);
        self.sequences.insert(renamed.key.clone(), renamed.clone());

        // Rename is reported under the old key, followed by an update of the new one
        self.notify(SequenceUpdateType::Rename, &old);
        self.notify(SequenceUpdateType::Update, &renamed);
        Ok(renamed)
    }

    async fn delete_sequences(&self, keys: &[String]) -> Result<(), ServiceError> {
        self.begin_request("delete_sequences")?;
        let _guard = self.write_lock.lock();
        for key in keys {
            if let Some(existing) = self.sequences.get(key) {
                self.check_writable(&existing.reference_id)?;
            }
        }
        for key in keys {
            if let Some((_, sequence)) = self.sequences.remove(key) {
                self.notify(SequenceUpdateType::Delete, &sequence);
            }
        }
        Ok(())
    }

    async fn get_sequence(&self, key: &str) -> Result<Sequence, ServiceError> {
        self.begin_request("get_sequence")?;
        self.sequences
            .get(key)
            .map(|s| s.value().clone())
            .ok_or_else(|| ServiceError::NotFound(key.to_string()))
    }

    async fn get_sequences_by_criteria(
        &self,
        criteria: &SequenceCriteria,
    ) -> Result<Vec<Sequence>, ServiceError> {
        self.begin_request("get_sequences_by_criteria")?;
        let regex = criteria
            .key_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| ServiceError::BadRequest(e.to_string()))?;

        let found = self
            .sequences
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|s| criteria.keys.is_empty() || criteria.keys.contains(&s.key))
            .filter(|s| regex.as_ref().map_or(true, |r| r.is_match(&s.key)))
            .filter(|s| {
                Self::matches_reference(s, criteria.reference_type.as_deref(), &criteria.reference_ids)
            })
            .filter(|s| {
                criteria
                    .metadata
                    .iter()
                    .all(|(k, v)| s.metadata.get(k) == Some(v))
            })
            .collect();

        Ok(Self::sorted(found))
    }

    async fn get_all_sequences_containing_items(
        &self,
        items: &[String],
        reference_type: Option<&str>,
        reference_ids: &[String],
    ) -> Result<Vec<Sequence>, ServiceError> {
        self.begin_request("get_all_sequences_containing_items")?;
        let found = self
            .sequences
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|s| s.items.iter().any(|item| items.contains(item)))
            .filter(|s| Self::matches_reference(s, reference_type, reference_ids))
            .collect();

        Ok(Self::sorted(found))
    }
}
