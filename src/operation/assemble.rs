//! Assemble operations: how to fill target fields from a container.

use std::collections::BTreeSet;

use crate::value::KeyType;

/// One source-field to target-field copy rule.
///
/// A mapping without a source field copies the whole source record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyMapping {
    source: Option<String>,
    target: String,
}

impl PropertyMapping {
    /// Copies `source` on the record into `target` on the entity.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            source: (!source.is_empty()).then_some(source),
            target: target.into(),
        }
    }

    /// Copies the whole source record into `target`.
    #[must_use]
    pub fn whole(target: impl Into<String>) -> Self {
        Self {
            source: None,
            target: target.into(),
        }
    }

    /// Returns the source field, if any.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Returns the target field.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns true if a source field is named.
    #[must_use]
    pub const fn has_source(&self) -> bool {
        self.source.is_some()
    }
}

/// Cardinality of the relation between a target and its source records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum MappingKind {
    /// One key, one source record.
    #[default]
    OneToOne,
    /// One key, the source record is a list; each mapping collects a list.
    OneToMany,
    /// The key value is a list (or a delimited string) of keys; matched
    /// records are collected into a list.
    ManyToMany {
        /// Delimiter used when the key value is a string.
        separator: String,
    },
}

impl MappingKind {
    /// Many-to-many with the default `,` separator.
    #[must_use]
    pub fn many_to_many() -> Self {
        Self::ManyToMany {
            separator: ",".to_string(),
        }
    }

    /// Returns true if the assembled value is a list.
    #[must_use]
    pub const fn is_collection(&self) -> bool {
        !matches!(self, Self::OneToOne)
    }
}

/// One enrichment rule of a `BeanOperations` descriptor.
///
/// # Example
/// ```
/// use joinery::{AssembleOperation, KeyType, PropertyMapping};
///
/// let op = AssembleOperation::new("user_id", "users")
///     .key_type(KeyType::Int)
///     .mapping(PropertyMapping::new("name", "user_name"))
///     .group("detail")
///     .sort(10);
///
/// assert_eq!(op.container(), "users");
/// assert!(op.belongs_to("detail"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembleOperation {
    key: String,
    key_type: KeyType,
    container: String,
    mappings: BTreeSet<PropertyMapping>,
    groups: BTreeSet<String>,
    sort: i32,
    kind: MappingKind,
}

impl AssembleOperation {
    /// Creates an operation reading its key from `key` and fetching from `container`.
    ///
    /// An empty `key` makes the target itself the lookup key: the container
    /// receives the target entity as a `Key::Entity`. With the identity
    /// container (`""`) the target is also its own source.
    #[must_use]
    pub fn new(key: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            key_type: KeyType::Any,
            container: container.into(),
            mappings: BTreeSet::new(),
            groups: BTreeSet::new(),
            sort: 0,
            kind: MappingKind::OneToOne,
        }
    }

    /// Sets the key normalization type.
    #[must_use]
    pub fn key_type(mut self, key_type: KeyType) -> Self {
        self.key_type = key_type;
        self
    }

    /// Adds a property mapping.
    #[must_use]
    pub fn mapping(mut self, mapping: PropertyMapping) -> Self {
        self.mappings.insert(mapping);
        self
    }

    /// Adds a `source -> target` mapping.
    #[must_use]
    pub fn map(self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.mapping(PropertyMapping::new(source, target))
    }

    /// Adds a whole-record mapping into `target`.
    #[must_use]
    pub fn map_whole(self, target: impl Into<String>) -> Self {
        self.mapping(PropertyMapping::whole(target))
    }

    /// Tags the operation with a group.
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    /// Sets the execution order; lower runs first.
    #[must_use]
    pub fn sort(mut self, sort: i32) -> Self {
        self.sort = sort;
        self
    }

    /// Sets the mapping cardinality.
    #[must_use]
    pub fn kind(mut self, kind: MappingKind) -> Self {
        self.kind = kind;
        self
    }

    /// Field holding the lookup key; empty means the target itself.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub const fn key_type_of(&self) -> KeyType {
        self.key_type
    }

    /// Namespace of the container this operation reads from.
    #[must_use]
    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn mappings(&self) -> impl Iterator<Item = &PropertyMapping> {
        self.mappings.iter()
    }

    #[must_use]
    pub const fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    #[must_use]
    pub fn belongs_to(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    #[must_use]
    pub const fn sort_value(&self) -> i32 {
        self.sort
    }

    #[must_use]
    pub const fn mapping_kind(&self) -> &MappingKind {
        &self.kind
    }

    /// Returns true if the target is its own key (and source).
    #[must_use]
    pub fn is_self_keyed(&self) -> bool {
        self.key.is_empty()
    }
}
