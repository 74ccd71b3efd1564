//! Replicated property values and vector types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Two-component vector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Three-component vector, used for positions and scales
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3::new(0.0, 0.0, 0.0);
    pub const ONE: Vector3 = Vector3::new(1.0, 1.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn add(self, other: Vector3) -> Vector3 {
        Vector3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Component-wise product
    pub fn mul(self, other: Vector3) -> Vector3 {
        Vector3::new(self.x * other.x, self.y * other.y, self.z * other.z)
    }

    pub fn scale(self, s: f32) -> Vector3 {
        Vector3::new(self.x * s, self.y * s, self.z * s)
    }

    pub fn cross(self, other: Vector3) -> Vector3 {
        Vector3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }
}

/// Four-component vector. Rotations are stored as `(x, y, z, w)` quaternions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Vector4 {
    pub const IDENTITY: Vector4 = Vector4::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Hamilton product `self * other`
    pub fn quat_mul(self, o: Vector4) -> Vector4 {
        Vector4::new(
            self.w * o.x + self.x * o.w + self.y * o.z - self.z * o.y,
            self.w * o.y - self.x * o.z + self.y * o.w + self.z * o.x,
            self.w * o.z + self.x * o.y - self.y * o.x + self.z * o.w,
            self.w * o.w - self.x * o.x - self.y * o.y - self.z * o.z,
        )
    }

    /// Rotate a vector by this (unit) quaternion
    pub fn rotate(self, v: Vector3) -> Vector3 {
        let q = Vector3::new(self.x, self.y, self.z);
        let t = q.cross(v).scale(2.0);
        v.add(t.scale(self.w)).add(q.cross(t))
    }
}

/// Type tag of a [`ReplicatedValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicatedValueType {
    Invalid,
    Boolean,
    Integer,
    Float,
    String,
    Vector2,
    Vector3,
    Vector4,
    StringMap,
}

/// A value carried by every replicated property.
///
/// `Invalid` is the default and doubles as the "property absent" sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplicatedValue {
    Invalid,
    Boolean(bool),
    Integer(i64),
    Float(f32),
    String(String),
    Vector2(Vector2),
    Vector3(Vector3),
    Vector4(Vector4),
    StringMap(BTreeMap<String, ReplicatedValue>),
}

impl ReplicatedValue {
    pub fn value_type(&self) -> ReplicatedValueType {
        match self {
            ReplicatedValue::Invalid => ReplicatedValueType::Invalid,
            ReplicatedValue::Boolean(_) => ReplicatedValueType::Boolean,
            ReplicatedValue::Integer(_) => ReplicatedValueType::Integer,
            ReplicatedValue::Float(_) => ReplicatedValueType::Float,
            ReplicatedValue::String(_) => ReplicatedValueType::String,
            ReplicatedValue::Vector2(_) => ReplicatedValueType::Vector2,
            ReplicatedValue::Vector3(_) => ReplicatedValueType::Vector3,
            ReplicatedValue::Vector4(_) => ReplicatedValueType::Vector4,
            ReplicatedValue::StringMap(_) => ReplicatedValueType::StringMap,
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, ReplicatedValue::Invalid)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ReplicatedValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ReplicatedValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            ReplicatedValue::Float(n) => Some(*n),
            ReplicatedValue::Integer(n) => Some(*n as f32),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ReplicatedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector3(&self) -> Option<Vector3> {
        match self {
            ReplicatedValue::Vector3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector4(&self) -> Option<Vector4> {
        match self {
            ReplicatedValue::Vector4(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string_map(&self) -> Option<&BTreeMap<String, ReplicatedValue>> {
        match self {
            ReplicatedValue::StringMap(m) => Some(m),
            _ => None,
        }
    }
}

impl Default for ReplicatedValue {
    fn default() -> Self {
        ReplicatedValue::Invalid
    }
}

impl From<bool> for ReplicatedValue {
    fn from(v: bool) -> Self {
        ReplicatedValue::Boolean(v)
    }
}

impl From<i64> for ReplicatedValue {
    fn from(v: i64) -> Self {
        ReplicatedValue::Integer(v)
    }
}

impl From<f32> for ReplicatedValue {
    fn from(v: f32) -> Self {
        ReplicatedValue::Float(v)
    }
}

impl From<String> for ReplicatedValue {
    fn from(v: String) -> Self {
        ReplicatedValue::String(v)
    }
}

impl From<&str> for ReplicatedValue {
    fn from(v: &str) -> Self {
        ReplicatedValue::String(v.to_string())
    }
}

impl From<Vector2> for ReplicatedValue {
    fn from(v: Vector2) -> Self {
        ReplicatedValue::Vector2(v)
    }
}

impl From<Vector3> for ReplicatedValue {
    fn from(v: Vector3) -> Self {
        ReplicatedValue::Vector3(v)
    }
}

impl From<Vector4> for ReplicatedValue {
    fn from(v: Vector4) -> Self {
        ReplicatedValue::Vector4(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_tag_and_value() {
        assert_eq!(ReplicatedValue::Integer(1), ReplicatedValue::from(1i64));
        assert_ne!(ReplicatedValue::Integer(1), ReplicatedValue::Float(1.0));
        assert_ne!(ReplicatedValue::Boolean(false), ReplicatedValue::Invalid);
        assert_eq!(ReplicatedValue::default(), ReplicatedValue::Invalid);
    }

    #[test]
    fn test_typed_accessors() {
        let v = ReplicatedValue::from("hello");
        assert_eq!(v.value_type(), ReplicatedValueType::String);
        assert_eq!(v.as_str(), Some("hello"));
        assert_eq!(v.as_bool(), None);
        assert_eq!(ReplicatedValue::Integer(3).as_f32(), Some(3.0));
    }

    #[test]
    fn test_quaternion_rotation() {
        // 90 degrees about +Y maps +X to -Z
        let half = std::f32::consts::FRAC_PI_4;
        let q = Vector4::new(0.0, half.sin(), 0.0, half.cos());
        let r = q.rotate(Vector3::new(1.0, 0.0, 0.0));
        assert!((r.x).abs() < 1e-5);
        assert!((r.z + 1.0).abs() < 1e-5);

        let unchanged = Vector4::IDENTITY.rotate(Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(unchanged, Vector3::new(1.0, 2.0, 3.0));
    }
}
