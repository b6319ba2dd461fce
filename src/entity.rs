//! Entity types and type identity.
//!
//! An `Entity` is an enrichable object: a runtime type name plus named fields.
//! Entities are shared through `EntityRef` so the same nested instance can be
//! reachable from several parents and enriched in place.

use std::collections::BTreeMap;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::AccessError;
use crate::value::Value;

/// Runtime type identity of an entity.
///
/// Descriptors are keyed by `TypeName`. Cloning is cheap.
///
/// # Examples
///
/// ```
/// use joinery::TypeName;
///
/// let ty = TypeName::new("Order");
/// assert_eq!(ty.as_str(), "Order");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName(Arc<str>);

impl TypeName {
    /// Creates a type name.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Returns the type name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TypeName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl AsRef<str> for TypeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An owned, not yet shared entity.
///
/// # Examples
///
/// ```
/// use joinery::{Entity, Value};
///
/// let order = Entity::new("Order").with("id", 1).with("user_id", 7);
/// assert_eq!(order.get("user_id"), Some(&Value::Int(7)));
/// ```
#[derive(Debug, Clone)]
pub struct Entity {
    type_name: TypeName,
    fields: BTreeMap<String, Value>,
}

impl Entity {
    /// Creates an entity with no fields.
    #[must_use]
    pub fn new(type_name: impl Into<TypeName>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Sets a field and returns the entity (builder style).
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Returns the entity's runtime type.
    #[must_use]
    pub const fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    /// Returns a field value, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Returns all fields in name order.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Moves the entity behind a shared handle.
    #[must_use]
    pub fn into_ref(self) -> EntityRef {
        EntityRef {
            inner: Arc::new(EntityCell {
                type_name: self.type_name,
                fields: RwLock::new(self.fields),
            }),
        }
    }
}

struct EntityCell {
    type_name: TypeName,
    fields: RwLock<BTreeMap<String, Value>>,
}

/// Shared handle to an entity.
///
/// The runtime type is fixed at construction; fields are guarded by a lock so
/// enrichment can write through any handle to the same instance. Equality,
/// ordering and hashing follow instance identity, not field contents.
#[derive(Clone)]
pub struct EntityRef {
    inner: Arc<EntityCell>,
}

impl EntityRef {
    /// Returns the entity's runtime type.
    #[must_use]
    pub fn type_name(&self) -> &TypeName {
        &self.inner.type_name
    }

    /// Returns true if both handles point to the same instance.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Reads a field, cloning its value.
    ///
    /// # Errors
    ///
    /// Returns `AccessError::Poisoned` if the entity lock is poisoned.
    pub fn get(&self, field: &str) -> Result<Option<Value>, AccessError> {
        Ok(self.read()?.get(field).cloned())
    }

    /// Returns true if the field is present (even if `Null`).
    ///
    /// # Errors
    ///
    /// Returns `AccessError::Poisoned` if the entity lock is poisoned.
    pub fn contains(&self, field: &str) -> Result<bool, AccessError> {
        Ok(self.read()?.contains_key(field))
    }

    /// Writes a field.
    ///
    /// # Errors
    ///
    /// Returns `AccessError::Poisoned` if the entity lock is poisoned.
    pub fn set(&self, field: impl Into<String>, value: impl Into<Value>) -> Result<(), AccessError> {
        self.write()?.insert(field.into(), value.into());
        Ok(())
    }

    /// Copies the current state into an owned entity.
    ///
    /// # Errors
    ///
    /// Returns `AccessError::Poisoned` if the entity lock is poisoned.
    pub fn snapshot(&self) -> Result<Entity, AccessError> {
        Ok(Entity {
            type_name: self.type_name().clone(),
            fields: self.read()?.clone(),
        })
    }

    /// Renders the entity (and everything nested in it) as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `AccessError::Poisoned` if any lock in the graph is poisoned.
    pub fn to_json(&self) -> Result<serde_json::Value, AccessError> {
        let fields = self.read()?.clone();
        let mut map = serde_json::Map::with_capacity(fields.len());
        for (field, value) in &fields {
            map.insert(field.clone(), value.to_json()?);
        }
        Ok(serde_json::Value::Object(map))
    }

    /// Builds a schema-less entity from a JSON object.
    ///
    /// Nested objects become entities of the same type; a non-object JSON
    /// value yields an entity with no fields.
    #[must_use]
    pub fn from_json(type_name: impl Into<TypeName>, json: serde_json::Value) -> Self {
        let type_name = type_name.into();
        match Value::from_json(json, &type_name) {
            Value::Entity(entity) => entity,
            _ => Entity::new(type_name).into_ref(),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Value>>, AccessError> {
        self.inner.fields.read().map_err(|_| self.poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Value>>, AccessError> {
        self.inner.fields.write().map_err(|_| self.poisoned())
    }

    fn poisoned(&self) -> AccessError {
        AccessError::Poisoned {
            type_name: self.type_name().clone(),
        }
    }
}

impl From<Entity> for EntityRef {
    fn from(entity: Entity) -> Self {
        entity.into_ref()
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl Eq for EntityRef {}

impl PartialOrd for EntityRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntityRef {
    fn cmp(&self, other: &Self) -> Ordering {
        Arc::as_ptr(&self.inner).cmp(&Arc::as_ptr(&other.inner))
    }
}

impl Hash for EntityRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("EntityRef");
        out.field("type_name", self.type_name());
        match self.inner.fields.try_read() {
            Ok(fields) => out.field("fields", &*fields),
            Err(_) => out.field("fields", &"<locked>"),
        };
        out.finish()
    }
}
