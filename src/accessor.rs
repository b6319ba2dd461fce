//! Property access over entities.
//!
//! The engine never touches entity fields directly; it reads keys and nested
//! values and writes mapped results through a `PropertyAccessor`. Which fields
//! exist, and what happens for unknown ones, is the accessor's decision.

use std::collections::{HashMap, HashSet};

use crate::entity::{EntityRef, TypeName};
use crate::error::AccessError;
use crate::value::Value;

/// Reads and writes named fields on entities.
///
/// Implementations must be thread-safe; one accessor is shared by every call
/// an executor runs.
pub trait PropertyAccessor: Send + Sync {
    /// Reads `field` from `target`. An existing field holding `Null` reads as `Null`.
    ///
    /// # Errors
    ///
    /// Returns `AccessError::MissingField` if the field cannot be read on `type_name`.
    fn read(&self, type_name: &TypeName, target: &EntityRef, field: &str) -> Result<Value, AccessError>;

    /// Writes `value` into `field` on `target`.
    ///
    /// # Errors
    ///
    /// Returns `AccessError::MissingField` if the field cannot be written on `type_name`.
    fn write(
        &self,
        type_name: &TypeName,
        target: &EntityRef,
        field: &str,
        value: Value,
    ) -> Result<(), AccessError>;
}

/// Schema-less access: every field exists, absent ones read as `Null`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicAccessor;

impl PropertyAccessor for DynamicAccessor {
    fn read(&self, _type_name: &TypeName, target: &EntityRef, field: &str) -> Result<Value, AccessError> {
        Ok(target.get(field)?.unwrap_or_default())
    }

    fn write(
        &self,
        _type_name: &TypeName,
        target: &EntityRef,
        field: &str,
        value: Value,
    ) -> Result<(), AccessError> {
        target.set(field, value)
    }
}

/// Access restricted to fields declared per type.
///
/// # Example
/// ```
/// use joinery::{Entity, PropertyAccessor, SchemaAccessor, TypeName};
///
/// let accessor = SchemaAccessor::new().declare("User", ["id", "name"]);
/// let user = Entity::new("User").with("id", 1).into_ref();
/// let ty = TypeName::new("User");
///
/// assert!(accessor.read(&ty, &user, "name").unwrap().is_null());
/// assert!(accessor.read(&ty, &user, "email").is_err());
/// ```
#[derive(Debug, Default, Clone)]
pub struct SchemaAccessor {
    fields: HashMap<TypeName, HashSet<String>>,
}

impl SchemaAccessor {
    /// Creates an accessor with no declared types.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the fields of a type, adding to any previous declaration.
    #[must_use]
    pub fn declare<I, S>(mut self, type_name: impl Into<TypeName>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields
            .entry(type_name.into())
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// Returns true if `field` is declared on `type_name`.
    #[must_use]
    pub fn has_field(&self, type_name: &TypeName, field: &str) -> bool {
        self.fields
            .get(type_name)
            .is_some_and(|fields| fields.contains(field))
    }

    fn check(&self, type_name: &TypeName, field: &str) -> Result<(), AccessError> {
        if self.has_field(type_name, field) {
            Ok(())
        } else {
            Err(AccessError::MissingField {
                type_name: type_name.clone(),
                field: field.to_string(),
            })
        }
    }
}

impl PropertyAccessor for SchemaAccessor {
    fn read(&self, type_name: &TypeName, target: &EntityRef, field: &str) -> Result<Value, AccessError> {
        self.check(type_name, field)?;
        Ok(target.get(field)?.unwrap_or_default())
    }

    fn write(
        &self,
        type_name: &TypeName,
        target: &EntityRef,
        field: &str,
        value: Value,
    ) -> Result<(), AccessError> {
        self.check(type_name, field)?;
        target.set(field, value)
    }
}

/// Decorator resolving dotted paths such as `dept.name` through nested entities.
///
/// A `Null` intermediate reads as `Null` and turns a write into a no-op.
#[derive(Debug, Clone)]
pub struct ChainAccessor<A> {
    delegate: A,
    separator: char,
}

impl<A: PropertyAccessor> ChainAccessor<A> {
    /// Wraps `delegate` using `.` as the path separator.
    pub const fn new(delegate: A) -> Self {
        Self::with_separator(delegate, '.')
    }

    /// Wraps `delegate` with a custom path separator.
    pub const fn with_separator(delegate: A, separator: char) -> Self {
        Self { delegate, separator }
    }

    /// Walks every segment but the last, returning the entity that owns it.
    fn owner<'p>(
        &self,
        type_name: &TypeName,
        target: &EntityRef,
        path: &'p str,
    ) -> Result<Option<(EntityRef, &'p str)>, AccessError> {
        let mut segments: Vec<&str> = path.split(self.separator).collect();
        let last = segments.pop().unwrap_or(path);

        let mut current = target.clone();
        let mut current_type = type_name.clone();
        for segment in segments {
            match self.delegate.read(&current_type, &current, segment)? {
                Value::Null => return Ok(None),
                Value::Entity(next) => {
                    current_type = next.type_name().clone();
                    current = next;
                }
                other => {
                    return Err(AccessError::NotNested {
                        type_name: current_type,
                        field: segment.to_string(),
                        found: other.type_name(),
                    })
                }
            }
        }
        Ok(Some((current, last)))
    }
}

impl<A: PropertyAccessor> PropertyAccessor for ChainAccessor<A> {
    fn read(&self, type_name: &TypeName, target: &EntityRef, field: &str) -> Result<Value, AccessError> {
        if !field.contains(self.separator) {
            return self.delegate.read(type_name, target, field);
        }
        match self.owner(type_name, target, field)? {
            Some((owner, last)) => self.delegate.read(owner.type_name(), &owner, last),
            None => Ok(Value::Null),
        }
    }

    fn write(
        &self,
        type_name: &TypeName,
        target: &EntityRef,
        field: &str,
        value: Value,
    ) -> Result<(), AccessError> {
        if !field.contains(self.separator) {
            return self.delegate.write(type_name, target, field, value);
        }
        match self.owner(type_name, target, field)? {
            Some((owner, last)) => self.delegate.write(owner.type_name(), &owner, last, value),
            None => Ok(()),
        }
    }
}
