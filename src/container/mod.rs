//! Containers: named batch key-to-record sources.
//!
//! A container answers one question: given a set of keys, which source
//! records exist for them. Keys without a record are simply left out of the
//! result; absence of data is never an error.

mod interceptor;
mod registry;

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::FetchError;
use crate::value::{Key, Value};

pub use interceptor::{interceptor_fn, CacheInterceptor, FnInterceptor, RegistrationInterceptor, RegistrationLogger};
pub use registry::ContainerRegistry;

/// Distinct keys requested in one fetch, in key order.
pub type KeySet = BTreeSet<Key>;

/// Records returned by one fetch.
pub type SourceMap = HashMap<Key, Value>;

/// Namespace reserved for the identity container.
pub const EMPTY_NAMESPACE: &str = "";

/// A named batch lookup source.
///
/// `get` is called at most once per namespace and key per execution and must
/// be free of side effects visible to the engine.
pub trait Container: Send + Sync {
    /// Namespace the container is registered under.
    fn namespace(&self) -> &str;

    /// Fetches the records for `keys`. Unknown keys are omitted from the result.
    ///
    /// # Errors
    ///
    /// Returns a `FetchError` if the underlying source fails.
    fn get(&self, keys: &KeySet) -> Result<SourceMap, FetchError>;
}

/// Identity container: the target is its own source.
///
/// The executor never fetches from it; operations on this namespace read
/// their mappings straight from the target entity.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyContainer;

impl Container for EmptyContainer {
    fn namespace(&self) -> &str {
        EMPTY_NAMESPACE
    }

    fn get(&self, _keys: &KeySet) -> Result<SourceMap, FetchError> {
        Ok(SourceMap::new())
    }
}

/// Container over a fixed in-memory map, for constants and enumerations.
///
/// # Example
/// ```
/// use joinery::{Container, Key, MapContainer};
///
/// let genders = MapContainer::new("gender", [(1, "male"), (2, "female")]);
/// let keys = [Key::Int(2), Key::Int(9)].into_iter().collect();
/// let found = genders.get(&keys).unwrap();
/// assert_eq!(found.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MapContainer {
    namespace: String,
    data: HashMap<Key, Value>,
}

impl MapContainer {
    pub fn new<I, K, V>(namespace: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        Self {
            namespace: namespace.into(),
            data: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Container for MapContainer {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn get(&self, keys: &KeySet) -> Result<SourceMap, FetchError> {
        Ok(keys
            .iter()
            .filter_map(|key| self.data.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }
}

type FetchFn = dyn Fn(&KeySet) -> Result<SourceMap, FetchError> + Send + Sync;

/// Container backed by a closure, typically wrapping a service or query call.
pub struct FnContainer {
    namespace: String,
    fetch: Box<FetchFn>,
}

impl FnContainer {
    pub fn new<F>(namespace: impl Into<String>, fetch: F) -> Self
    where
        F: Fn(&KeySet) -> Result<SourceMap, FetchError> + Send + Sync + 'static,
    {
        Self {
            namespace: namespace.into(),
            fetch: Box::new(fetch),
        }
    }
}

impl Container for FnContainer {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn get(&self, keys: &KeySet) -> Result<SourceMap, FetchError> {
        (self.fetch)(keys)
    }
}

impl fmt::Debug for FnContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnContainer")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys<const N: usize>(ks: [i64; N]) -> KeySet {
        ks.into_iter().map(Key::Int).collect()
    }

    #[test]
    fn map_container_returns_requested_subset() {
        let c = MapContainer::new("names", [(1, "a"), (2, "b"), (3, "c")]);
        let found = c.get(&keys([1, 3, 4])).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found.get(&Key::Int(1)), Some(&Value::from("a")));
        assert!(!found.contains_key(&Key::Int(4)));
        assert!(c.get(&KeySet::new()).unwrap().is_empty());
    }

    #[test]
    fn fn_container_delegates() {
        let c = FnContainer::new("double", |keys: &KeySet| {
            Ok(keys
                .iter()
                .filter_map(|k| match k {
                    Key::Int(i) => Some((k.clone(), Value::Int(i * 2))),
                    _ => None,
                })
                .collect())
        });
        assert_eq!(c.namespace(), "double");
        let found = c.get(&keys([2])).unwrap();
        assert_eq!(found.get(&Key::Int(2)), Some(&Value::Int(4)));
    }

    #[test]
    fn fn_container_propagates_failure() {
        let c = FnContainer::new("broken", |_: &KeySet| Err(FetchError::new("offline")));
        assert_eq!(c.get(&keys([1])).unwrap_err().message(), "offline");
    }

    #[test]
    fn empty_container_is_identity_namespace() {
        assert_eq!(EmptyContainer.namespace(), EMPTY_NAMESPACE);
        assert!(EmptyContainer.get(&keys([1])).unwrap().is_empty());
    }
}
