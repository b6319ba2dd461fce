//! Named caches for container results.
//!
//! A `CacheManager` hands out caches by name; `CacheableContainer` uses one to
//! put a cache-aside layer in front of any `Container`.

mod cacheable;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};

use crate::container::{KeySet, SourceMap};
use crate::error::CacheError;
use crate::value::{Key, Value};

pub use cacheable::CacheableContainer;

/// A named key-value cache of fetched source records.
///
/// Implementations must be thread-safe and `put_if_absent` must be atomic per key.
pub trait Cache: Send + Sync {
    /// Name the cache is registered under.
    fn name(&self) -> &str;

    /// Returns the cached value for `key`.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if the backend cannot be read.
    fn get(&self, key: &Key) -> Result<Option<Value>, CacheError>;

    /// Returns the cached subset of `keys`; absent keys are omitted.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if the backend cannot be read.
    fn get_all(&self, keys: &KeySet) -> Result<SourceMap, CacheError> {
        let mut found = SourceMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key)? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    /// Stores `value`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if the backend cannot be written.
    fn put(&self, key: Key, value: Value) -> Result<(), CacheError>;

    /// Stores `value` unless an entry exists; returns the entry now cached.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if the backend cannot be written.
    fn put_if_absent(&self, key: Key, value: Value) -> Result<Value, CacheError>;

    /// Removes and returns the entry for `key`.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if the backend cannot be written.
    fn remove(&self, key: &Key) -> Result<Option<Value>, CacheError>;

    /// Removes every entry.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if the backend cannot be written.
    fn clear(&self) -> Result<(), CacheError>;
}

/// Hands out caches by name.
pub trait CacheManager: Send + Sync {
    /// Returns the cache called `name`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if the manager's state cannot be accessed.
    fn cache(&self, name: &str) -> Result<Arc<dyn Cache>, CacheError>;

    /// Registers `cache` under `name`, returning any cache it replaces.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if the manager's state cannot be accessed.
    fn register(&self, name: &str, cache: Arc<dyn Cache>) -> Result<Option<Arc<dyn Cache>>, CacheError>;

    /// Removes and clears the cache called `name`.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if the manager's state cannot be accessed.
    fn remove(&self, name: &str) -> Result<Option<Arc<dyn Cache>>, CacheError>;

    /// Clears every managed cache.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if any cache cannot be cleared.
    fn clear_all(&self) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Entry count below which writes never sweep.
const MIN_SWEEP_LEN: usize = 64;

#[derive(Debug)]
struct Entries {
    map: HashMap<Key, CacheEntry>,
    /// Size at which the next write drops expired entries.
    sweep_at: usize,
}

impl Default for Entries {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            sweep_at: MIN_SWEEP_LEN,
        }
    }
}

impl Entries {
    fn insert(&mut self, key: Key, entry: CacheEntry, now: DateTime<Utc>) {
        self.map.insert(key, entry);
        if self.map.len() >= self.sweep_at {
            self.purge(now);
        }
    }

    /// Drops expired entries; returns how many were removed.
    fn purge(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.map.len();
        self.map.retain(|_, entry| entry.is_live(now));
        self.sweep_at = (self.map.len() * 2).max(MIN_SWEEP_LEN);
        before - self.map.len()
    }
}

/// In-memory cache with an optional time-to-live.
///
/// Expired entries read as absent. Writes drop them once the map has doubled
/// since the last sweep, and `purge_expired` drops them on demand.
#[derive(Debug)]
pub struct MapCache {
    name: String,
    ttl: Option<Duration>,
    entries: RwLock<Entries>,
}

impl MapCache {
    /// Creates a cache whose entries never expire.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ttl: None,
            entries: RwLock::new(Entries::default()),
        }
    }

    /// Sets the time-to-live applied to new entries.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub const fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Number of live entries.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Poisoned` if the cache lock is poisoned.
    pub fn len(&self) -> Result<usize, CacheError> {
        let now = Utc::now();
        let entries = self.entries.read().map_err(|_| self.poisoned())?;
        Ok(entries.map.values().filter(|entry| entry.is_live(now)).count())
    }

    /// Returns true if no live entry remains.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Poisoned` if the cache lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    /// Drops every expired entry; returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Poisoned` if the cache lock is poisoned.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let removed = self
            .entries
            .write()
            .map_err(|_| self.poisoned())?
            .purge(Utc::now());
        if removed > 0 {
            tracing::debug!(cache = self.name.as_str(), removed, "expired entries purged");
        }
        Ok(removed)
    }

    fn entry(&self, value: Value, now: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            value,
            expires_at: self.ttl.map(|ttl| now + ttl),
        }
    }

    fn poisoned(&self) -> CacheError {
        CacheError::Poisoned {
            name: self.name.clone(),
        }
    }
}

impl Cache for MapCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &Key) -> Result<Option<Value>, CacheError> {
        let now = Utc::now();
        let entries = self.entries.read().map_err(|_| self.poisoned())?;
        Ok(entries
            .map
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    fn get_all(&self, keys: &KeySet) -> Result<SourceMap, CacheError> {
        let now = Utc::now();
        let entries = self.entries.read().map_err(|_| self.poisoned())?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                entries
                    .map
                    .get(key)
                    .filter(|entry| entry.is_live(now))
                    .map(|entry| (key.clone(), entry.value.clone()))
            })
            .collect())
    }

    fn put(&self, key: Key, value: Value) -> Result<(), CacheError> {
        let now = Utc::now();
        let entry = self.entry(value, now);
        self.entries
            .write()
            .map_err(|_| self.poisoned())?
            .insert(key, entry, now);
        Ok(())
    }

    fn put_if_absent(&self, key: Key, value: Value) -> Result<Value, CacheError> {
        let now = Utc::now();
        let mut entries = self.entries.write().map_err(|_| self.poisoned())?;
        if let Some(existing) = entries.map.get(&key).filter(|entry| entry.is_live(now)) {
            return Ok(existing.value.clone());
        }
        entries.insert(key, self.entry(value.clone(), now), now);
        Ok(value)
    }

    fn remove(&self, key: &Key) -> Result<Option<Value>, CacheError> {
        let now = Utc::now();
        let removed = self.entries.write().map_err(|_| self.poisoned())?.map.remove(key);
        Ok(removed.filter(|entry| entry.is_live(now)).map(|entry| entry.value))
    }

    fn clear(&self) -> Result<(), CacheError> {
        *self.entries.write().map_err(|_| self.poisoned())? = Entries::default();
        Ok(())
    }
}

/// Creates `MapCache` instances on demand.
#[derive(Default)]
pub struct MapCacheManager {
    ttl: Option<Duration>,
    caches: RwLock<HashMap<String, Arc<dyn Cache>>>,
}

impl MapCacheManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches created from now on use `ttl`.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Names of the managed caches, sorted.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Poisoned` if the manager lock is poisoned.
    pub fn names(&self) -> Result<Vec<String>, CacheError> {
        let caches = self.caches.read().map_err(|_| Self::poisoned("*"))?;
        let mut names: Vec<String> = caches.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn poisoned(name: &str) -> CacheError {
        CacheError::Poisoned {
            name: name.to_string(),
        }
    }
}

impl CacheManager for MapCacheManager {
    fn cache(&self, name: &str) -> Result<Arc<dyn Cache>, CacheError> {
        {
            let caches = self.caches.read().map_err(|_| Self::poisoned(name))?;
            if let Some(cache) = caches.get(name) {
                return Ok(Arc::clone(cache));
            }
        }

        let mut caches = self.caches.write().map_err(|_| Self::poisoned(name))?;
        let cache = caches.entry(name.to_string()).or_insert_with(|| {
            let cache = MapCache::new(name);
            let cache = match self.ttl {
                Some(ttl) => cache.with_ttl(ttl),
                None => cache,
            };
            tracing::debug!(cache = name, "cache created");
            let cache: Arc<dyn Cache> = Arc::new(cache);
            cache
        });
        Ok(Arc::clone(cache))
    }

    fn register(&self, name: &str, cache: Arc<dyn Cache>) -> Result<Option<Arc<dyn Cache>>, CacheError> {
        let mut caches = self.caches.write().map_err(|_| Self::poisoned(name))?;
        Ok(caches.insert(name.to_string(), cache))
    }

    fn remove(&self, name: &str) -> Result<Option<Arc<dyn Cache>>, CacheError> {
        let removed = self
            .caches
            .write()
            .map_err(|_| Self::poisoned(name))?
            .remove(name);
        if let Some(cache) = &removed {
            cache.clear()?;
        }
        Ok(removed)
    }

    fn clear_all(&self) -> Result<(), CacheError> {
        let caches: Vec<Arc<dyn Cache>> = self
            .caches
            .read()
            .map_err(|_| Self::poisoned("*"))?
            .values()
            .cloned()
            .collect();
        for cache in caches {
            cache.clear()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for MapCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapCacheManager")
            .field("ttl", &self.ttl)
            .field("caches", &self.names().unwrap_or_default())
            .finish()
    }
}
