//! Namespace to container registry.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::cache::{Cache, CacheManager, MapCacheManager};
use crate::error::{CacheError, ExecutionError, RegistryError};

use super::{Container, EmptyContainer, RegistrationInterceptor, EMPTY_NAMESPACE};

type ContainerMap = HashMap<String, Arc<dyn Container>>;

/// Registry of containers by namespace, shared by every execution.
///
/// Reads load an immutable snapshot and never block; each change publishes a
/// new snapshot with a compare-and-swap loop, so a concurrent reader sees the
/// map either before or after the change.
///
/// The empty namespace is reserved: it always resolves to `EmptyContainer`.
pub struct ContainerRegistry {
    containers: ArcSwap<ContainerMap>,
    interceptors: ArcSwap<Vec<Arc<dyn RegistrationInterceptor>>>,
    cache_manager: Arc<dyn CacheManager>,
    identity: Arc<dyn Container>,
}

impl ContainerRegistry {
    /// Creates an empty registry with an in-memory cache manager.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cache_manager(Arc::new(MapCacheManager::new()))
    }

    /// Creates an empty registry using `cache_manager` for named caches.
    #[must_use]
    pub fn with_cache_manager(cache_manager: Arc<dyn CacheManager>) -> Self {
        Self {
            containers: ArcSwap::from_pointee(HashMap::new()),
            interceptors: ArcSwap::from_pointee(Vec::new()),
            cache_manager,
            identity: Arc::new(EmptyContainer),
        }
    }

    /// Adds an interceptor and returns the registry (builder style).
    #[must_use]
    pub fn with_interceptor(self, interceptor: Arc<dyn RegistrationInterceptor>) -> Self {
        self.add_interceptor(interceptor);
        self
    }

    /// Appends an interceptor to the chain. Applies to later registrations only.
    pub fn add_interceptor(&self, interceptor: Arc<dyn RegistrationInterceptor>) {
        self.interceptors.rcu(|cur| {
            let mut next = (**cur).clone();
            next.push(Arc::clone(&interceptor));
            next
        });
    }

    /// Runs the interceptor chain and stores the resulting container.
    ///
    /// Returns `false` if an interceptor vetoed the registration.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::ReservedNamespace` for the identity namespace.
    pub fn register(&self, container: Arc<dyn Container>) -> Result<bool, RegistryError> {
        let interceptors = self.interceptors.load_full();

        let mut container = container;
        for interceptor in interceptors.iter() {
            let requested = container.namespace().to_string();
            match interceptor.before_register(self, container) {
                Some(next) => container = next,
                None => {
                    tracing::warn!(namespace = requested.as_str(), "container registration vetoed");
                    return Ok(false);
                }
            }
        }

        let namespace = container.namespace().to_string();
        if namespace == EMPTY_NAMESPACE {
            return Err(RegistryError::ReservedNamespace { namespace });
        }

        let previous = loop {
            let cur = self.containers.load_full();
            let mut next = (*cur).clone();
            let previous = next.insert(namespace.clone(), Arc::clone(&container));
            let prev = self.containers.compare_and_swap(&cur, Arc::new(next));
            if Arc::ptr_eq(&prev, &cur) {
                break previous;
            }
        };

        for interceptor in interceptors.iter() {
            interceptor.after_register(self, &container, previous.as_ref());
        }
        Ok(true)
    }

    /// Registers an owned container.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::ReservedNamespace` for the identity namespace.
    pub fn register_container<C>(&self, container: C) -> Result<bool, RegistryError>
    where
        C: Container + 'static,
    {
        self.register(Arc::new(container))
    }

    /// Returns the container for `namespace`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::ContainerNotFound` for an unregistered, non-empty namespace.
    pub fn get(&self, namespace: &str) -> Result<Arc<dyn Container>, ExecutionError> {
        if namespace == EMPTY_NAMESPACE {
            return Ok(Arc::clone(&self.identity));
        }
        self.containers
            .load()
            .get(namespace)
            .cloned()
            .ok_or_else(|| ExecutionError::ContainerNotFound {
                namespace: namespace.to_string(),
            })
    }

    /// Returns true if `namespace` resolves to a container.
    #[must_use]
    pub fn contains(&self, namespace: &str) -> bool {
        namespace == EMPTY_NAMESPACE || self.containers.load().contains_key(namespace)
    }

    /// Registered namespaces, sorted. The identity namespace is not listed.
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self.containers.load().keys().cloned().collect();
        namespaces.sort();
        namespaces
    }

    /// Removes the container for `namespace`, returning it.
    pub fn deregister(&self, namespace: &str) -> Option<Arc<dyn Container>> {
        let removed = loop {
            let cur = self.containers.load_full();
            if !cur.contains_key(namespace) {
                return None;
            }
            let mut next = (*cur).clone();
            let removed = next.remove(namespace);
            let prev = self.containers.compare_and_swap(&cur, Arc::new(next));
            if Arc::ptr_eq(&prev, &cur) {
                break removed?;
            }
        };

        for interceptor in self.interceptors.load().iter() {
            interceptor.on_deregister(self, &removed);
        }
        Some(removed)
    }

    /// Registers `cache` under `name` with the cache manager.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if the cache manager cannot be updated.
    pub fn register_cache(
        &self,
        name: &str,
        cache: Arc<dyn Cache>,
    ) -> Result<Option<Arc<dyn Cache>>, CacheError> {
        tracing::info!(cache = name, "cache registered");
        self.cache_manager.register(name, cache)
    }

    /// Returns the cache called `name`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if the cache manager cannot be accessed.
    pub fn cache(&self, name: &str) -> Result<Arc<dyn Cache>, CacheError> {
        self.cache_manager.cache(name)
    }

    #[must_use]
    pub const fn cache_manager(&self) -> &Arc<dyn CacheManager> {
        &self.cache_manager
    }
}

impl Default for ContainerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContainerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerRegistry")
            .field("namespaces", &self.namespaces())
            .field("interceptors", &self.interceptors.load().len())
            .finish_non_exhaustive()
    }
}
