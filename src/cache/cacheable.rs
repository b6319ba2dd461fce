//! Cache-aside decorator for containers.

use std::sync::Arc;

use crate::container::{Container, KeySet, SourceMap};
use crate::error::FetchError;

use super::CacheManager;

/// Serves cached records and fetches only the missing keys from `inner`.
///
/// Fetched records are stored with `put_if_absent`, so a racing caller that
/// cached a key first keeps its entry. Keys the inner container does not
/// return, `Null` records and entity keys are never cached.
pub struct CacheableContainer {
    inner: Arc<dyn Container>,
    cache_name: String,
    manager: Arc<dyn CacheManager>,
}

impl CacheableContainer {
    pub fn new(inner: Arc<dyn Container>, cache_name: impl Into<String>, manager: Arc<dyn CacheManager>) -> Self {
        Self {
            inner,
            cache_name: cache_name.into(),
            manager,
        }
    }

    #[must_use]
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    #[must_use]
    pub fn inner(&self) -> &Arc<dyn Container> {
        &self.inner
    }
}

impl Container for CacheableContainer {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    fn get(&self, keys: &KeySet) -> Result<SourceMap, FetchError> {
        let cache = self.manager.cache(&self.cache_name)?;
        let mut found = cache.get_all(keys)?;

        let missing: KeySet = keys
            .iter()
            .filter(|key| !found.contains_key(*key))
            .cloned()
            .collect();
        tracing::debug!(
            namespace = self.namespace(),
            cache = self.cache_name.as_str(),
            hits = found.len(),
            misses = missing.len(),
            "cache lookup"
        );
        if missing.is_empty() {
            return Ok(found);
        }

        let fetched = self.inner.get(&missing)?;
        for (key, value) in fetched {
            if value.is_null() || !missing.contains(&key) {
                continue;
            }
            if key.is_entity() {
                found.insert(key, value);
                continue;
            }
            cache.put_if_absent(key.clone(), value.clone())?;
            found.insert(key, value);
        }
        Ok(found)
    }
}

impl std::fmt::Debug for CacheableContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheableContainer")
            .field("namespace", &self.namespace())
            .field("cache_name", &self.cache_name)
            .finish_non_exhaustive()
    }
}
