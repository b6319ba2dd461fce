//! Values held by entity fields and lookup keys.
//!
//! A `Value` is anything a field can hold, including nested entities and
//! (possibly multi-level) lists of them. A `Key` is the hashable subset used
//! to address container records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityRef, TypeName};
use crate::error::AccessError;

/// Possible values an entity field can hold.
///
/// # Examples
///
/// ```
/// use joinery::Value;
///
/// let int_val = Value::Int(7);
/// let string_val = Value::String("hello".to_string());
///
/// assert!(int_val.is_int());
/// assert!(string_val.is_string());
/// assert!(Value::Null.is_null());
/// ```
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Entity(EntityRef),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float(_))
    }

    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    pub const fn is_entity(&self) -> bool {
        matches!(self, Self::Entity(_))
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Self::Entity(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Entity(_) => "entity",
        }
    }

    /// Converts this value into plain JSON, expanding nested entities.
    ///
    /// Entity graphs are assumed acyclic.
    ///
    /// # Errors
    ///
    /// Returns `AccessError::Poisoned` if a nested entity lock is poisoned.
    pub fn to_json(&self) -> Result<serde_json::Value, AccessError> {
        use serde_json::Value as Json;

        Ok(match self {
            Self::Null => Json::Null,
            Self::Bool(v) => Json::Bool(*v),
            Self::Int(v) => Json::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v).map_or(Json::Null, Json::Number),
            Self::String(v) => Json::String(v.clone()),
            Self::List(items) => Json::Array(
                items
                    .iter()
                    .map(Self::to_json)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Self::Entity(entity) => entity.to_json()?,
        })
    }

    /// Builds a value from JSON; nested JSON objects become schema-less
    /// entities of type `type_name`.
    #[must_use]
    pub fn from_json(json: serde_json::Value, type_name: &TypeName) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Self::Null,
            Json::Bool(v) => Self::Bool(v),
            Json::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Int),
            Json::String(v) => Self::String(v),
            Json::Array(items) => Self::List(
                items
                    .into_iter()
                    .map(|item| Self::from_json(item, type_name))
                    .collect(),
            ),
            Json::Object(map) => {
                let mut entity = Entity::new(type_name.clone());
                for (field, value) in map {
                    entity.set(field, Self::from_json(value, type_name));
                }
                Self::Entity(entity.into_ref())
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            // Entities compare by identity.
            (Self::Entity(a), Self::Entity(b)) => EntityRef::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::List(v) => write!(f, "list[{}]", v.len()),
            Self::Entity(v) => write!(f, "entity:{}", v.type_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<EntityRef> for Value {
    fn from(v: EntityRef) -> Self {
        Self::Entity(v)
    }
}

impl From<Entity> for Value {
    fn from(v: Entity) -> Self {
        Self::Entity(v.into_ref())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<Key> for Value {
    fn from(v: Key) -> Self {
        match v {
            Key::Bool(b) => Self::Bool(b),
            Key::Int(i) => Self::Int(i),
            Key::String(s) => Self::String(s),
            Key::Entity(e) => Self::Entity(e),
        }
    }
}

/// A hashable lookup key addressing one container record.
///
/// `Entity` keys come from operations without a key field: the target itself
/// is handed to the container, compared by instance identity. They are never
/// serialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Bool(bool),
    Int(i64),
    String(String),
    #[serde(skip)]
    Entity(EntityRef),
}

impl Key {
    /// Returns the target entity of an identity key.
    #[must_use]
    pub const fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Self::Entity(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_entity(&self) -> bool {
        matches!(self, Self::Entity(_))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Entity(v) => write!(f, "entity:{}", v.type_name()),
        }
    }
}

impl From<EntityRef> for Key {
    fn from(v: EntityRef) -> Self {
        Self::Entity(v)
    }
}

impl From<bool> for Key {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Runtime key type an assemble operation normalizes its key values to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// Use the value's natural key form.
    #[default]
    Any,
    /// Integer keys; numeric strings are parsed.
    Int,
    /// String keys; scalars are rendered as strings.
    String,
}

impl KeyType {
    /// Returns a human-readable name for error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Any => "scalar",
            Self::Int => "int",
            Self::String => "string",
        }
    }

    /// Converts a non-null scalar value into a key of this type.
    ///
    /// Returns `None` if the value cannot be represented (lists, entities,
    /// non-integral or out-of-range floats for integer keys, unparseable
    /// strings).
    #[must_use]
    pub fn convert(self, value: &Value) -> Option<Key> {
        // 2^63 is exact as f64; `i64::MAX as f64` rounds up to it.
        const UPPER: f64 = 9_223_372_036_854_775_808.0;
        #[allow(clippy::cast_possible_truncation)]
        let integral = |f: f64| (f.fract() == 0.0 && (-UPPER..UPPER).contains(&f)).then(|| f as i64);

        match (self, value) {
            (Self::Any, Value::Bool(v)) => Some(Key::Bool(*v)),
            (Self::Any | Self::Int, Value::Int(v)) => Some(Key::Int(*v)),
            (Self::Any | Self::Int, Value::Float(v)) => integral(*v).map(Key::Int),
            (Self::Any, Value::String(v)) => Some(Key::String(v.clone())),
            (Self::Int, Value::String(v)) => v.trim().parse().ok().map(Key::Int),
            (Self::String, Value::String(v)) => Some(Key::String(v.clone())),
            (Self::String, Value::Int(v)) => Some(Key::String(v.to_string())),
            (Self::String, Value::Bool(v)) => Some(Key::String(v.to_string())),
            (Self::String, Value::Float(v)) => Some(Key::String(v.to_string())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_int() {
        let val = Value::Int(42);
        assert!(val.is_int());
        assert_eq!(val.as_int(), Some(42));
        assert_eq!(val.type_name(), "int");
    }

    #[test]
    fn test_value_string() {
        let val = Value::String("hello".to_string());
        assert!(val.is_string());
        assert_eq!(val.as_string(), Some("hello"));
        assert_eq!(val.type_name(), "string");
    }

    #[test]
    fn test_value_null_default() {
        let val = Value::default();
        assert!(val.is_null());
        assert_eq!(val.type_name(), "null");
    }

    #[test]
    fn test_value_entity_equality_is_identity() {
        let a = Entity::new("User").with("id", 1).into_ref();
        let b = Entity::new("User").with("id", 1).into_ref();
        assert_eq!(Value::Entity(a.clone()), Value::Entity(a.clone()));
        assert_ne!(Value::Entity(a), Value::Entity(b));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(format!("{}", Value::Bool(true)), "true");
        assert_eq!(format!("{}", Value::Int(42)), "42");
        assert_eq!(format!("{}", Value::String("hi".into())), "\"hi\"");
        assert_eq!(format!("{}", Value::Null), "null");
        assert_eq!(format!("{}", Value::from(vec![1, 2, 3])), "list[3]");
    }

    #[test]
    fn test_value_from_option() {
        assert_eq!(Value::from(Some("a")), Value::String("a".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_value_json_nested() {
        let json = serde_json::json!({"id": 1, "tags": ["a", "b"], "dept": {"id": 7}});
        let value = Value::from_json(json.clone(), &TypeName::new("Doc"));
        let entity = value.as_entity().unwrap();
        assert_eq!(entity.type_name().as_str(), "Doc");
        assert_eq!(entity.get("id").unwrap().unwrap(), Value::Int(1));
        assert!(entity.get("dept").unwrap().unwrap().is_entity());
        assert_eq!(value.to_json().unwrap(), json);
    }

    #[test]
    fn test_key_type_any() {
        assert_eq!(KeyType::Any.convert(&Value::Int(3)), Some(Key::Int(3)));
        assert_eq!(KeyType::Any.convert(&Value::Float(3.0)), Some(Key::Int(3)));
        assert_eq!(KeyType::Any.convert(&Value::Float(3.5)), None);
        assert_eq!(KeyType::Any.convert(&Value::from("x")), Some(Key::from("x")));
        assert_eq!(KeyType::Any.convert(&Value::from(vec![1])), None);
    }

    #[test]
    fn test_key_type_int_rejects_out_of_range_floats() {
        assert_eq!(KeyType::Int.convert(&Value::Float(9.223_372_036_854_775_808e18)), None);
        assert_eq!(KeyType::Int.convert(&Value::Float(1e19)), None);
        assert_eq!(KeyType::Int.convert(&Value::Float(-1e19)), None);
        assert_eq!(KeyType::Int.convert(&Value::Float(f64::INFINITY)), None);
        assert_eq!(KeyType::Int.convert(&Value::Float(f64::NAN)), None);
        assert_eq!(
            KeyType::Int.convert(&Value::Float(-9.223_372_036_854_775_808e18)),
            Some(Key::Int(i64::MIN))
        );
        assert_eq!(KeyType::Int.convert(&Value::Float(4_503_599_627_370_496.0)), Some(Key::Int(1 << 52)));
    }

    #[test]
    fn test_key_type_int_parses_strings() {
        assert_eq!(KeyType::Int.convert(&Value::from(" 12 ")), Some(Key::Int(12)));
        assert_eq!(KeyType::Int.convert(&Value::from("abc")), None);
        assert_eq!(KeyType::Int.convert(&Value::Bool(true)), None);
    }

    #[test]
    fn test_key_type_string_renders_scalars() {
        assert_eq!(KeyType::String.convert(&Value::Int(12)), Some(Key::from("12")));
        assert_eq!(KeyType::String.convert(&Value::Bool(false)), Some(Key::from("false")));
    }

    #[test]
    fn test_key_serialization_untagged() {
        let json = serde_json::to_string(&vec![Key::Int(1), Key::from("a")]).unwrap();
        assert_eq!(json, "[1,\"a\"]");
        let back: Vec<Key> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Key::Int(1), Key::from("a")]);
    }

    #[test]
    fn test_key_into_value() {
        assert_eq!(Value::from(Key::Int(5)), Value::Int(5));
        assert_eq!(Value::from(Key::from("k")), Value::from("k"));
    }

    #[test]
    fn test_entity_key_identity() {
        let a = Entity::new("User").with("id", 1).into_ref();
        let twin = Entity::new("User").with("id", 1).into_ref();
        let key = Key::from(a.clone());

        assert!(key.is_entity());
        assert_eq!(key, Key::Entity(a.clone()));
        assert_ne!(key, Key::Entity(twin));
        assert!(key.as_entity().is_some_and(|e| EntityRef::ptr_eq(e, &a)));
        assert_eq!(Value::from(key), Value::Entity(a));
        assert!(serde_json::to_string(&Key::from(Entity::new("User").into_ref())).is_err());
    }
}
