//! Disassemble operations: how to reach nested enrichable entities.

use std::sync::Arc;

use crate::entity::TypeName;

use super::BeanOperations;

/// Where the descriptor for flattened nested entities comes from.
#[derive(Debug, Clone)]
pub enum NestedOperations {
    /// Resolved lazily through the descriptor cache by the declared type.
    /// Self-referential types use this form.
    Declared(TypeName),
    /// Resolved per flattened instance from its runtime type.
    Dynamic,
    /// A descriptor fixed at build time.
    Fixed(Arc<BeanOperations>),
}

/// One flattening rule of a `BeanOperations` descriptor.
#[derive(Debug, Clone)]
pub struct DisassembleOperation {
    key: String,
    nested: NestedOperations,
}

impl DisassembleOperation {
    #[must_use]
    pub fn new(key: impl Into<String>, nested: NestedOperations) -> Self {
        Self {
            key: key.into(),
            nested,
        }
    }

    /// Nested entities under `key` use the descriptor of `type_name`.
    #[must_use]
    pub fn declared(key: impl Into<String>, type_name: impl Into<TypeName>) -> Self {
        Self::new(key, NestedOperations::Declared(type_name.into()))
    }

    /// Nested entities under `key` use their own runtime type's descriptor.
    #[must_use]
    pub fn dynamic(key: impl Into<String>) -> Self {
        Self::new(key, NestedOperations::Dynamic)
    }

    /// Nested entities under `key` use `operations`.
    #[must_use]
    pub fn fixed(key: impl Into<String>, operations: Arc<BeanOperations>) -> Self {
        Self::new(key, NestedOperations::Fixed(operations))
    }

    /// Field on the parent holding the nested value.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub const fn nested(&self) -> &NestedOperations {
        &self.nested
    }

    /// Declared nested type, when known before execution.
    #[must_use]
    pub fn source_type(&self) -> Option<&TypeName> {
        match &self.nested {
            NestedOperations::Declared(ty) => Some(ty),
            NestedOperations::Fixed(ops) => Some(ops.target_type()),
            NestedOperations::Dynamic => None,
        }
    }
}
