//! Entity hierarchies stored as sequences
//!
//! The root ordering of a space lives under `EntityHierarchy:<SpaceId>`, the
//! ordering of a parent's children under `EntityHierarchy:<SpaceId>:m_Id_<ParentId>`.

use crate::sequence::{SequenceChanges, SequenceSystem};
use spacesync_core::sequence::{hierarchy_key, parse_hierarchy_key, HIERARCHY_REFERENCE_TYPE};
use spacesync_core::{EntityId, HierarchyChange, Result, SequenceHierarchy};
use std::collections::BTreeMap;

#[derive(Clone)]
pub struct HierarchySystem {
    sequences: SequenceSystem,
    space_id: String,
}

impl HierarchySystem {
    pub fn new(sequences: SequenceSystem, space_id: impl Into<String>) -> Self {
        Self {
            sequences,
            space_id: space_id.into(),
        }
    }

    fn key(&self, parent_id: Option<EntityId>) -> String {
        hierarchy_key(&self.space_id, parent_id)
    }

    fn items(ids: &[EntityId]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    /// Store the child order under `parent_id`, or the root order for `None`
    pub async fn create_sequence_hierarchy(
        &self,
        parent_id: Option<EntityId>,
        ids: &[EntityId],
    ) -> Result<SequenceHierarchy> {
        let sequence = self
            .sequences
            .create_sequence(
                &self.key(parent_id),
                HIERARCHY_REFERENCE_TYPE,
                &self.space_id,
                Self::items(ids),
                BTreeMap::new(),
            )
            .await?;
        SequenceHierarchy::from_sequence(&sequence)
    }

    /// Replace the stored order. The new list is taken as is.
    pub async fn update_sequence_hierarchy(
        &self,
        parent_id: Option<EntityId>,
        ids: &[EntityId],
    ) -> Result<SequenceHierarchy> {
        let sequence = self
            .sequences
            .update_sequence(
                &self.key(parent_id),
                HIERARCHY_REFERENCE_TYPE,
                &self.space_id,
                Self::items(ids),
                BTreeMap::new(),
            )
            .await?;
        SequenceHierarchy::from_sequence(&sequence)
    }

    pub async fn get_sequence_hierarchy(&self, parent_id: Option<EntityId>) -> Result<SequenceHierarchy> {
        let sequence = self.sequences.get_sequence(&self.key(parent_id)).await?;
        SequenceHierarchy::from_sequence(&sequence)
    }

    pub async fn delete_sequence_hierarchy(&self, parent_id: Option<EntityId>) -> Result<()> {
        self.sequences.delete_sequences(&[self.key(parent_id)]).await
    }

    /// Hierarchy changes in this space
    pub fn subscribe(&self) -> HierarchyChanges {
        HierarchyChanges {
            changes: self.sequences.subscribe(),
            space_id: self.space_id.clone(),
        }
    }
}

pub struct HierarchyChanges {
    changes: SequenceChanges,
    space_id: String,
}

impl HierarchyChanges {
    pub async fn recv(&mut self) -> Option<HierarchyChange> {
        loop {
            let change = self.changes.recv().await?;
            let Some(key) = parse_hierarchy_key(&change.key) else {
                continue;
            };
            if key.space_id != self.space_id {
                continue;
            }
            return Some(HierarchyChange {
                update_type: change.update_type,
                space_id: key.space_id,
                parent_id: key.parent_id,
                is_root: key.parent_id.is_none(),
            });
        }
    }
}
