//! Descriptor supply.
//!
//! The executor never builds descriptors itself. It asks a `DescriptorProvider`
//! for the `BeanOperations` of a type, normally through a `DescriptorCache`
//! so each type is resolved once for the life of the cache.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::entity::TypeName;
use crate::error::ParseError;
use crate::operation::{BeanOperations, BeanOperationsBuilder};

/// Resolves the operation descriptor of a type.
pub trait DescriptorProvider: Send + Sync {
    /// Returns the descriptor for `type_name`.
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` if the descriptor for the type is malformed.
    fn resolve(&self, type_name: &TypeName) -> Result<Arc<BeanOperations>, ParseError>;
}

impl<F> DescriptorProvider for F
where
    F: Fn(&TypeName) -> Result<Arc<BeanOperations>, ParseError> + Send + Sync,
{
    fn resolve(&self, type_name: &TypeName) -> Result<Arc<BeanOperations>, ParseError> {
        self(type_name)
    }
}

/// Descriptors registered up front by the caller.
///
/// Types with no registration resolve to an empty descriptor, so leaf types
/// reached through dynamic disassembly need not be listed.
#[derive(Debug, Default)]
pub struct StaticDescriptors {
    entries: HashMap<TypeName, Result<Arc<BeanOperations>, ParseError>>,
}

impl StaticDescriptors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a built descriptor under its target type.
    #[must_use]
    pub fn with(mut self, operations: BeanOperations) -> Self {
        self.entries
            .insert(operations.target_type().clone(), Ok(Arc::new(operations)));
        self
    }

    /// Registers a builder; a validation failure surfaces when the type is resolved.
    #[must_use]
    pub fn with_builder(mut self, builder: BeanOperationsBuilder) -> Self {
        let type_name = builder.target_type().clone();
        self.entries.insert(type_name, builder.build().map(Arc::new));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DescriptorProvider for StaticDescriptors {
    fn resolve(&self, type_name: &TypeName) -> Result<Arc<BeanOperations>, ParseError> {
        match self.entries.get(type_name) {
            Some(entry) => entry.clone(),
            None => Ok(Arc::new(BeanOperations::empty(type_name.clone()))),
        }
    }
}

type Snapshot = HashMap<TypeName, Arc<BeanOperations>>;

/// Memoizing front for a `DescriptorProvider`.
///
/// Readers load an immutable snapshot; a miss resolves through the provider
/// and publishes a new snapshot with a compare-and-swap loop. Concurrent
/// readers see either the old or the new map, never a partial one.
/// Parse errors are returned to the caller and not memoized.
pub struct DescriptorCache {
    provider: Arc<dyn DescriptorProvider>,
    snapshot: ArcSwap<Snapshot>,
}

impl DescriptorCache {
    pub fn new(provider: Arc<dyn DescriptorProvider>) -> Self {
        Self {
            provider,
            snapshot: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Returns the cached descriptor, resolving and memoizing it on first use.
    ///
    /// # Errors
    ///
    /// Returns the provider's `ParseError` for a malformed descriptor.
    pub fn get(&self, type_name: &TypeName) -> Result<Arc<BeanOperations>, ParseError> {
        if let Some(found) = self.snapshot.load().get(type_name) {
            return Ok(Arc::clone(found));
        }

        let resolved = self.provider.resolve(type_name)?;
        tracing::debug!(type_name = %type_name, "descriptor resolved");
        Ok(self.publish(type_name, resolved, false))
    }

    /// Replaces the descriptor of its target type.
    pub fn register(&self, operations: BeanOperations) {
        let type_name = operations.target_type().clone();
        self.publish(&type_name, Arc::new(operations), true);
    }

    /// Drops the memoized descriptor of `type_name`; the next `get` resolves it again.
    pub fn invalidate(&self, type_name: &TypeName) -> bool {
        loop {
            let cur = self.snapshot.load_full();
            if !cur.contains_key(type_name) {
                return false;
            }
            let mut next = (*cur).clone();
            next.remove(type_name);
            let prev = self.snapshot.compare_and_swap(&cur, Arc::new(next));
            if Arc::ptr_eq(&prev, &cur) {
                return true;
            }
        }
    }

    pub fn clear(&self) {
        self.snapshot.store(Arc::new(HashMap::new()));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    /// Inserts `operations` and returns the descriptor now published for the type.
    /// Without `replace`, a descriptor published by a racing caller wins.
    fn publish(&self, type_name: &TypeName, operations: Arc<BeanOperations>, replace: bool) -> Arc<BeanOperations> {
        loop {
            let cur = self.snapshot.load_full();
            if !replace {
                if let Some(existing) = cur.get(type_name) {
                    return Arc::clone(existing);
                }
            }
            let mut next = (*cur).clone();
            next.insert(type_name.clone(), Arc::clone(&operations));
            let prev = self.snapshot.compare_and_swap(&cur, Arc::new(next));
            if Arc::ptr_eq(&prev, &cur) {
                return operations;
            }
        }
    }
}

impl std::fmt::Debug for DescriptorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorCache")
            .field("cached", &self.len())
            .finish_non_exhaustive()
    }
}
