//! Components - typed property bags attached to an entity
//!
//! Each component type reserves the property keys `[0, N)` for its core
//! properties. Keys above that range belong to [`ComponentExtensions`].

use crate::extensions::ComponentExtensions;
use crate::value::{ReplicatedValue, Vector3, Vector4};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Core property keys per component type
pub mod keys {
    pub mod custom {
        pub const APPLICATION_ORIGIN: u32 = 0;
        pub const PROPERTY_KEYS: u32 = 1;
        pub const COUNT: u32 = 2;
    }

    pub mod static_model {
        pub const EXTERNAL_RESOURCE_ASSET_ID: u32 = 0;
        pub const EXTERNAL_RESOURCE_ASSET_COLLECTION_ID: u32 = 1;
        pub const POSITION: u32 = 2;
        pub const ROTATION: u32 = 3;
        pub const SCALE: u32 = 4;
        pub const IS_VISIBLE: u32 = 5;
        pub const IS_AR_VISIBLE: u32 = 6;
        pub const THIRD_PARTY_REF: u32 = 7;
        pub const IS_SHADOW_CASTER: u32 = 8;
        pub const COUNT: u32 = 9;
    }

    pub mod light {
        pub const LIGHT_TYPE: u32 = 0;
        pub const INTENSITY: u32 = 1;
        pub const RANGE: u32 = 2;
        pub const INNER_CONE_ANGLE: u32 = 3;
        pub const OUTER_CONE_ANGLE: u32 = 4;
        pub const POSITION: u32 = 5;
        pub const ROTATION: u32 = 6;
        pub const COLOR: u32 = 7;
        pub const IS_VISIBLE: u32 = 8;
        pub const COUNT: u32 = 9;
    }

    pub mod hotspot {
        pub const POSITION: u32 = 0;
        pub const ROTATION: u32 = 1;
        pub const NAME: u32 = 2;
        pub const IS_VISIBLE: u32 = 3;
        pub const IS_AR_VISIBLE: u32 = 4;
        pub const IS_SPAWN_POINT: u32 = 5;
        pub const IS_TELEPORT_POINT: u32 = 6;
        pub const COUNT: u32 = 7;
    }

    pub mod conversation {
        pub const IS_VISIBLE: u32 = 0;
        pub const IS_ACTIVE: u32 = 1;
        pub const POSITION: u32 = 2;
        pub const ROTATION: u32 = 3;
        pub const TITLE: u32 = 4;
        pub const RESOLVED: u32 = 5;
        pub const CONVERSATION_ID: u32 = 6;
        pub const COUNT: u32 = 7;
    }

    pub mod script_data {
        pub const SCRIPT_SOURCE: u32 = 0;
        pub const OWNER_ID: u32 = 1;
        pub const SCRIPT_SCOPE: u32 = 2;
        pub const COUNT: u32 = 3;
    }

    pub mod button {
        pub const LABEL_TEXT: u32 = 0;
        pub const ICON_ASSET_ID: u32 = 1;
        pub const ASSET_COLLECTION_ID: u32 = 2;
        pub const POSITION: u32 = 3;
        pub const ROTATION: u32 = 4;
        pub const SCALE: u32 = 5;
        pub const IS_VISIBLE: u32 = 6;
        pub const IS_ENABLED: u32 = 7;
        pub const COUNT: u32 = 8;
    }
}

/// Built-in component types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    Custom,
    StaticModel,
    Light,
    Hotspot,
    Conversation,
    ScriptData,
    Button,
}

impl ComponentType {
    /// Size of the reserved core-property range `[0, N)`
    pub fn reserved_properties(&self) -> usize {
        let count = match self {
            ComponentType::Custom => keys::custom::COUNT,
            ComponentType::StaticModel => keys::static_model::COUNT,
            ComponentType::Light => keys::light::COUNT,
            ComponentType::Hotspot => keys::hotspot::COUNT,
            ComponentType::Conversation => keys::conversation::COUNT,
            ComponentType::ScriptData => keys::script_data::COUNT,
            ComponentType::Button => keys::button::COUNT,
        };
        count as usize
    }

    /// Default values for the core properties of this type
    pub fn default_properties(&self) -> BTreeMap<u32, ReplicatedValue> {
        use ReplicatedValue as V;

        let defaults: Vec<(u32, ReplicatedValue)> = match self {
            ComponentType::Custom => vec![
                (keys::custom::APPLICATION_ORIGIN, V::from("")),
                (keys::custom::PROPERTY_KEYS, V::from("")),
            ],
            ComponentType::StaticModel => {
                use keys::static_model::*;
                vec![
                    (EXTERNAL_RESOURCE_ASSET_ID, V::from("")),
                    (EXTERNAL_RESOURCE_ASSET_COLLECTION_ID, V::from("")),
                    (POSITION, V::from(Vector3::ZERO)),
                    (ROTATION, V::from(Vector4::IDENTITY)),
                    (SCALE, V::from(Vector3::ONE)),
                    (IS_VISIBLE, V::from(true)),
                    (IS_AR_VISIBLE, V::from(true)),
                    (THIRD_PARTY_REF, V::from("")),
                    (IS_SHADOW_CASTER, V::from(true)),
                ]
            }
            ComponentType::Light => {
                use keys::light::*;
                vec![
                    (LIGHT_TYPE, V::from(0i64)),
                    (INTENSITY, V::from(5000.0f32)),
                    (RANGE, V::from(1000.0f32)),
                    (INNER_CONE_ANGLE, V::from(0.0f32)),
                    (OUTER_CONE_ANGLE, V::from(std::f32::consts::FRAC_PI_4)),
                    (POSITION, V::from(Vector3::ZERO)),
                    (ROTATION, V::from(Vector4::IDENTITY)),
                    (COLOR, V::from(Vector3::new(255.0, 255.0, 255.0))),
                    (IS_VISIBLE, V::from(true)),
                ]
            }
            ComponentType::Hotspot => {
                use keys::hotspot::*;
                vec![
                    (POSITION, V::from(Vector3::ZERO)),
                    (ROTATION, V::from(Vector4::IDENTITY)),
                    (NAME, V::from("")),
                    (IS_VISIBLE, V::from(true)),
                    (IS_AR_VISIBLE, V::from(true)),
                    (IS_SPAWN_POINT, V::from(false)),
                    (IS_TELEPORT_POINT, V::from(true)),
                ]
            }
            ComponentType::Conversation => {
                use keys::conversation::*;
                vec![
                    (IS_VISIBLE, V::from(true)),
                    (IS_ACTIVE, V::from(true)),
                    (POSITION, V::from(Vector3::ZERO)),
                    (ROTATION, V::from(Vector4::IDENTITY)),
                    (TITLE, V::from("")),
                    (RESOLVED, V::from(false)),
                    (CONVERSATION_ID, V::from("")),
                ]
            }
            ComponentType::ScriptData => {
                use keys::script_data::*;
                vec![
                    (SCRIPT_SOURCE, V::from("")),
                    (OWNER_ID, V::from(0i64)),
                    (SCRIPT_SCOPE, V::from(0i64)),
                ]
            }
            ComponentType::Button => {
                use keys::button::*;
                vec![
                    (LABEL_TEXT, V::from("")),
                    (ICON_ASSET_ID, V::from("")),
                    (ASSET_COLLECTION_ID, V::from("")),
                    (POSITION, V::from(Vector3::ZERO)),
                    (ROTATION, V::from(Vector4::IDENTITY)),
                    (SCALE, V::from(Vector3::ONE)),
                    (IS_VISIBLE, V::from(true)),
                    (IS_ENABLED, V::from(true)),
                ]
            }
        };

        defaults.into_iter().collect()
    }
}

/// A typed bag of replicated properties owned by one entity.
///
/// Local writes go straight into the property map and mark the key dirty;
/// the owning entity collects dirty keys when it builds its next patch.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentBase {
    id: u16,
    component_type: ComponentType,
    properties: BTreeMap<u32, ReplicatedValue>,
    /// Fixed at construction; never recomputed once properties exist
    extension_range: usize,
    dirty: BTreeSet<u32>,
}

impl ComponentBase {
    /// Create a component populated with its type's default properties
    pub fn new(id: u16, component_type: ComponentType) -> Self {
        Self {
            id,
            component_type,
            properties: component_type.default_properties(),
            extension_range: component_type.reserved_properties(),
            dirty: BTreeSet::new(),
        }
    }

    /// Rebuild a component from replicated state
    pub fn from_properties(
        id: u16,
        component_type: ComponentType,
        properties: BTreeMap<u32, ReplicatedValue>,
    ) -> Self {
        let mut component = Self::new(id, component_type);
        component.properties.extend(properties);
        component
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn component_type(&self) -> ComponentType {
        self.component_type
    }

    pub fn extension_range(&self) -> usize {
        self.extension_range
    }

    pub fn properties(&self) -> &BTreeMap<u32, ReplicatedValue> {
        &self.properties
    }

    /// Get a property, or `Invalid` if it is absent
    pub fn get_property(&self, key: u32) -> ReplicatedValue {
        self.properties.get(&key).cloned().unwrap_or_default()
    }

    pub fn set_property(&mut self, key: u32, value: ReplicatedValue) {
        self.properties.insert(key, value);
        self.dirty.insert(key);
    }

    pub fn remove_property(&mut self, key: u32) -> bool {
        let existed = self.properties.remove(&key).is_some();
        if existed {
            // An explicit Invalid in the patch tells peers to drop the key
            self.dirty.insert(key);
        }
        existed
    }

    /// String-keyed access above the reserved range
    pub fn extensions(&mut self) -> ComponentExtensions<'_> {
        ComponentExtensions::new(Some(self))
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Drain dirty keys with their current values. Removed keys report `Invalid`.
    pub fn take_dirty(&mut self) -> BTreeMap<u32, ReplicatedValue> {
        std::mem::take(&mut self.dirty)
            .into_iter()
            .map(|key| (key, self.get_property(key)))
            .collect()
    }

    /// Apply replicated values without marking them dirty
    pub fn apply_remote(&mut self, properties: &BTreeMap<u32, ReplicatedValue>) {
        for (key, value) in properties {
            if value.is_valid() {
                self.properties.insert(*key, value.clone());
            } else {
                self.properties.remove(key);
            }
        }
    }
}
