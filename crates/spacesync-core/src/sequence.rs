//! Sequences - named, ordered lists of string items
//!
//! Hierarchies and hotspot groups are sequences with derived keys:
//!
//! - `EntityHierarchy:<SpaceId>` / `EntityHierarchy:<SpaceId>:m_Id_<ParentId>`
//! - `<SpaceId>:<GroupName>`
//!
//! Keys travel as URL path segments, so `/` and `%` are rejected before any
//! request is made.

use crate::error::{Error, Result};
use crate::operation::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const HIERARCHY_KEY_PREFIX: &str = "EntityHierarchy";
pub const HIERARCHY_REFERENCE_TYPE: &str = "EntityHierarchy";
pub const HIERARCHY_PARENT_SEGMENT: &str = ":m_Id_";
pub const HOTSPOT_REFERENCE_TYPE: &str = "GroupId";

/// Characters that would be ambiguous in a URL path segment
const RESERVED_KEY_CHARS: [char; 2] = ['/', '%'];

/// A named ordered list of items
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sequence {
    pub key: String,
    pub reference_type: String,
    pub reference_id: String,
    pub items: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

impl Sequence {
    pub fn new(
        key: impl Into<String>,
        reference_type: impl Into<String>,
        reference_id: impl Into<String>,
        items: Vec<String>,
    ) -> Self {
        Self {
            key: key.into(),
            reference_type: reference_type.into(),
            reference_id: reference_id.into(),
            items,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Reject keys that cannot be used as a URL path segment
pub fn validate_sequence_key(key: &str) -> Result<()> {
    if key.contains(&RESERVED_KEY_CHARS[..]) {
        return Err(Error::InvalidSequenceKey(key.to_string()));
    }
    Ok(())
}

/// Query over stored sequences. Empty fields do not filter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequenceCriteria {
    pub keys: Vec<String>,
    pub key_regex: Option<String>,
    pub reference_type: Option<String>,
    pub reference_ids: Vec<String>,
    /// Every entry must match the sequence metadata exactly
    pub metadata: BTreeMap<String, String>,
}

/// Kind of change reported for a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i64)]
pub enum SequenceUpdateType {
    Create = 0,
    Update = 1,
    Rename = 2,
    Delete = 3,
}

impl SequenceUpdateType {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(SequenceUpdateType::Create),
            1 => Some(SequenceUpdateType::Update),
            2 => Some(SequenceUpdateType::Rename),
            3 => Some(SequenceUpdateType::Delete),
            _ => None,
        }
    }
}

/// Notification that a sequence changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceChange {
    pub update_type: SequenceUpdateType,
    pub key: String,
    pub space_id: String,
}

/// Entity ordering under one parent (or the space root)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequenceHierarchy {
    pub space_id: String,
    pub parent_id: Option<EntityId>,
    pub ids: Vec<EntityId>,
}

impl SequenceHierarchy {
    pub fn has_parent(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Read a hierarchy back from its sequence
    pub fn from_sequence(sequence: &Sequence) -> Result<Self> {
        let key = parse_hierarchy_key(&sequence.key).ok_or_else(|| {
            Error::InvalidArgument(format!("not a hierarchy key: {}", sequence.key))
        })?;
        let ids = sequence
            .items
            .iter()
            .map(|item| {
                item.parse::<EntityId>().map_err(|_| {
                    Error::InvalidArgument(format!("hierarchy item is not an entity id: {}", item))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            space_id: key.space_id,
            parent_id: key.parent_id,
            ids,
        })
    }
}

/// Notification that a hierarchy changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyChange {
    pub update_type: SequenceUpdateType,
    pub space_id: String,
    pub parent_id: Option<EntityId>,
    pub is_root: bool,
}

/// Decoded form of a hierarchy key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyKey {
    pub space_id: String,
    pub parent_id: Option<EntityId>,
}

pub fn hierarchy_key(space_id: &str, parent_id: Option<EntityId>) -> String {
    match parent_id {
        Some(parent) => format!(
            "{}:{}{}{}",
            HIERARCHY_KEY_PREFIX, space_id, HIERARCHY_PARENT_SEGMENT, parent
        ),
        None => format!("{}:{}", HIERARCHY_KEY_PREFIX, space_id),
    }
}

pub fn parse_hierarchy_key(key: &str) -> Option<HierarchyKey> {
    let rest = key
        .strip_prefix(HIERARCHY_KEY_PREFIX)?
        .strip_prefix(':')?;

    match rest.rsplit_once(HIERARCHY_PARENT_SEGMENT) {
        Some((space_id, parent)) => Some(HierarchyKey {
            space_id: space_id.to_string(),
            parent_id: Some(parent.parse().ok()?),
        }),
        None if !rest.is_empty() => Some(HierarchyKey {
            space_id: rest.to_string(),
            parent_id: None,
        }),
        None => None,
    }
}

/// Ordered group of hotspots in a space
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HotspotGroup {
    pub name: String,
    pub items: Vec<String>,
}

impl HotspotGroup {
    pub fn from_sequence(space_id: &str, sequence: &Sequence) -> Result<Self> {
        let name = parse_hotspot_group_key(space_id, &sequence.key).ok_or_else(|| {
            Error::InvalidArgument(format!("not a hotspot group key: {}", sequence.key))
        })?;
        Ok(Self {
            name: name.to_string(),
            items: sequence.items.clone(),
        })
    }
}

pub fn hotspot_group_key(space_id: &str, group_name: &str) -> String {
    format!("{}:{}", space_id, group_name)
}

/// Group name of a hotspot key in `space_id`
pub fn parse_hotspot_group_key<'a>(space_id: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(space_id)?
        .strip_prefix(':')
        .filter(|name| !name.is_empty())
}
