//! Property extensions - string-keyed properties on top of a component
//!
//! A component reserves the property keys `[0, N)` for its core properties.
//! Extensions map arbitrary string keys into `[N + 1, 0xFFFFFFFF]` with a
//! deterministic hash, so every client derives the same slot for the same key
//! regardless of platform or byte order.

use crate::component::ComponentBase;
use crate::value::ReplicatedValue;
use tracing::error;

const FNV_OFFSET_BASIS: u32 = 0x811C_9DC5;
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a over the UTF-8 bytes of `key`
fn fnv1a_32(key: &str) -> u32 {
    key.as_bytes().iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Map a string key to a property key strictly above `reserved_range`.
///
/// The 32-bit hash is remapped into the free range with a 64-bit
/// multiply-shift instead of a modulo to keep the distribution uniform.
pub fn hash_property_key(key: &str, reserved_range: usize) -> u32 {
    let reserved: u32 = if reserved_range >= 0xFFFF_FFFF {
        0xFFFF_FFFE
    } else {
        reserved_range as u32
    };

    let range_size = 0xFFFF_FFFFu32 - reserved;
    let hash = fnv1a_32(key);
    let remapped = ((u64::from(hash) * u64::from(range_size)) >> 32) as u32;

    remapped + reserved + 1
}

/// Non-owning view that proxies string-keyed property access to a component.
///
/// A missing component turns every call into a logged no-op.
pub struct ComponentExtensions<'a> {
    component: Option<&'a mut ComponentBase>,
    reserved_range: usize,
}

impl<'a> ComponentExtensions<'a> {
    /// Extend a component using the range it fixed at construction
    pub fn new(component: Option<&'a mut ComponentBase>) -> Self {
        let reserved_range = component
            .as_ref()
            .map(|c| c.extension_range())
            .unwrap_or(0);
        Self { component, reserved_range }
    }

    /// Extend a component with an explicit reserved range
    pub fn with_range(component: Option<&'a mut ComponentBase>, reserved_range: usize) -> Self {
        Self { component, reserved_range }
    }

    pub fn reserved_range(&self) -> usize {
        self.reserved_range
    }

    pub fn set_property(&mut self, key: &str, value: ReplicatedValue) {
        let slot = hash_property_key(key, self.reserved_range);
        match self.component.as_deref_mut() {
            Some(component) => component.set_property(slot, value),
            None => error!(key, "Cannot set extension property: component does not exist"),
        }
    }

    pub fn get_property(&self, key: &str) -> ReplicatedValue {
        let slot = hash_property_key(key, self.reserved_range);
        match self.component.as_deref() {
            Some(component) => component.get_property(slot),
            None => {
                error!(key, "Cannot get extension property: component does not exist");
                ReplicatedValue::Invalid
            }
        }
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.component.is_some() && self.get_property(key) != ReplicatedValue::Invalid
    }

    /// Remove an extension property, returning whether it existed
    pub fn remove_property(&mut self, key: &str) -> bool {
        let slot = hash_property_key(key, self.reserved_range);
        match self.component.as_deref_mut() {
            Some(component) => component.remove_property(slot),
            None => {
                error!(key, "Cannot remove extension property: component does not exist");
                false
            }
        }
    }
}
