//! Hotspot groups - ordered groups of points of interest, keyed `<SpaceId>:<GroupName>`

use crate::sequence::{SequenceChanges, SequenceSystem};
use spacesync_core::sequence::{hotspot_group_key, parse_hotspot_group_key, HOTSPOT_REFERENCE_TYPE};
use spacesync_core::{HotspotGroup, Result, Sequence, SequenceUpdateType};
use std::collections::BTreeMap;
use tracing::debug;

/// Change to a hotspot group of this space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotspotGroupChange {
    pub update_type: SequenceUpdateType,
    pub group_name: String,
}

#[derive(Clone)]
pub struct HotspotSequenceSystem {
    sequences: SequenceSystem,
    space_id: String,
}

impl HotspotSequenceSystem {
    pub fn new(sequences: SequenceSystem, space_id: impl Into<String>) -> Self {
        Self {
            sequences,
            space_id: space_id.into(),
        }
    }

    fn key(&self, group_name: &str) -> String {
        hotspot_group_key(&self.space_id, group_name)
    }

    fn to_group(&self, sequence: &Sequence) -> Result<HotspotGroup> {
        HotspotGroup::from_sequence(&self.space_id, sequence)
    }

    pub async fn create_hotspot_group(&self, group_name: &str, items: Vec<String>) -> Result<HotspotGroup> {
        let sequence = self
            .sequences
            .create_sequence(
                &self.key(group_name),
                HOTSPOT_REFERENCE_TYPE,
                &self.space_id,
                items,
                BTreeMap::new(),
            )
            .await?;
        self.to_group(&sequence)
    }

    pub async fn update_hotspot_group(&self, group_name: &str, items: Vec<String>) -> Result<HotspotGroup> {
        let sequence = self
            .sequences
            .update_sequence(
                &self.key(group_name),
                HOTSPOT_REFERENCE_TYPE,
                &self.space_id,
                items,
                BTreeMap::new(),
            )
            .await?;
        self.to_group(&sequence)
    }

    pub async fn rename_hotspot_group(&self, old_name: &str, new_name: &str) -> Result<HotspotGroup> {
        let sequence = self
            .sequences
            .rename_sequence(&self.key(old_name), &self.key(new_name))
            .await?;
        self.to_group(&sequence)
    }

    pub async fn get_hotspot_group(&self, group_name: &str) -> Result<HotspotGroup> {
        let sequence = self.sequences.get_sequence(&self.key(group_name)).await?;
        self.to_group(&sequence)
    }

    /// Groups of this space that contain `hotspot_id`, ordered by name
    pub async fn get_hotspot_groups_containing_hotspot(&self, hotspot_id: &str) -> Result<Vec<HotspotGroup>> {
        let sequences = self
            .sequences
            .get_all_sequences_containing_items(
                &[hotspot_id.to_string()],
                Some(HOTSPOT_REFERENCE_TYPE),
                &[self.space_id.clone()],
            )
            .await?;
        sequences.iter().map(|s| self.to_group(s)).collect()
    }

    pub async fn delete_hotspot_group(&self, group_name: &str) -> Result<()> {
        self.sequences.delete_sequences(&[self.key(group_name)]).await
    }

    /// Take a deleted hotspot out of every group that lists it.
    ///
    /// Returns the number of groups that changed.
    pub async fn remove_item_from_groups(&self, hotspot_id: &str) -> Result<usize> {
        let groups = self.get_hotspot_groups_containing_hotspot(hotspot_id).await?;
        for group in &groups {
            let items = group
                .items
                .iter()
                .filter(|item| item.as_str() != hotspot_id)
                .cloned()
                .collect();
            self.update_hotspot_group(&group.name, items).await?;
        }
        debug!(hotspot_id, groups = groups.len(), "Removed hotspot from groups");
        Ok(groups.len())
    }

    pub fn subscribe(&self) -> HotspotGroupChanges {
        HotspotGroupChanges {
            changes: self.sequences.subscribe(),
            space_id: self.space_id.clone(),
        }
    }
}

pub struct HotspotGroupChanges {
    changes: SequenceChanges,
    space_id: String,
}

impl HotspotGroupChanges {
    pub async fn recv(&mut self) -> Option<HotspotGroupChange> {
        loop {
            let change = self.changes.recv().await?;
            if let Some(group_name) = parse_hotspot_group_key(&self.space_id, &change.key) {
                return Some(HotspotGroupChange {
                    update_type: change.update_type,
                    group_name: group_name.to_string(),
                });
            }
        }
    }
}
