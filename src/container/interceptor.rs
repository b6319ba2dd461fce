//! Registration interceptors.
//!
//! Interceptors run in the order they were added. `before_register` may
//! replace the container or veto the registration by returning `None`;
//! `after_register` and `on_deregister` only observe.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::CacheableContainer;

use super::{Container, ContainerRegistry};

/// Hook around container registration.
pub trait RegistrationInterceptor: Send + Sync {
    /// Transforms `container` before it is stored; `None` vetoes the registration.
    fn before_register(
        &self,
        _registry: &ContainerRegistry,
        container: Arc<dyn Container>,
    ) -> Option<Arc<dyn Container>> {
        Some(container)
    }

    /// Observes a stored container and the one it replaced, if any.
    fn after_register(
        &self,
        _registry: &ContainerRegistry,
        _container: &Arc<dyn Container>,
        _previous: Option<&Arc<dyn Container>>,
    ) {
    }

    /// Observes a container removed from the registry.
    fn on_deregister(&self, _registry: &ContainerRegistry, _container: &Arc<dyn Container>) {}
}

/// Interceptor built from a `container -> Option<container>` function.
pub struct FnInterceptor<F> {
    f: F,
}

impl<F> RegistrationInterceptor for FnInterceptor<F>
where
    F: Fn(Arc<dyn Container>) -> Option<Arc<dyn Container>> + Send + Sync,
{
    fn before_register(
        &self,
        _registry: &ContainerRegistry,
        container: Arc<dyn Container>,
    ) -> Option<Arc<dyn Container>> {
        (self.f)(container)
    }
}

/// Wraps a function as a `before_register` interceptor.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use joinery::{interceptor_fn, ContainerRegistry, MapContainer};
///
/// let registry = ContainerRegistry::new();
/// registry.add_interceptor(Arc::new(interceptor_fn(|c| {
///     (!c.namespace().starts_with("tmp_")).then_some(c)
/// })));
///
/// assert!(!registry.register_container(MapContainer::new("tmp_users", [(1, "a")])).unwrap());
/// assert!(registry.register_container(MapContainer::new("users", [(1, "a")])).unwrap());
/// ```
pub fn interceptor_fn<F>(f: F) -> FnInterceptor<F>
where
    F: Fn(Arc<dyn Container>) -> Option<Arc<dyn Container>> + Send + Sync,
{
    FnInterceptor { f }
}

/// Emits a `tracing` event for every registry change.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegistrationLogger;

impl RegistrationInterceptor for RegistrationLogger {
    fn after_register(
        &self,
        _registry: &ContainerRegistry,
        container: &Arc<dyn Container>,
        previous: Option<&Arc<dyn Container>>,
    ) {
        if previous.is_some() {
            tracing::info!(namespace = container.namespace(), "container replaced");
        } else {
            tracing::info!(namespace = container.namespace(), "container registered");
        }
    }

    fn on_deregister(&self, _registry: &ContainerRegistry, container: &Arc<dyn Container>) {
        tracing::info!(namespace = container.namespace(), "container deregistered");
    }
}

/// Puts a cache-aside layer in front of selected namespaces.
///
/// Caches are looked up through the registry's `CacheManager` at fetch time.
#[derive(Debug, Default, Clone)]
pub struct CacheInterceptor {
    caches: HashMap<String, String>,
}

impl CacheInterceptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches containers registered under `namespace` in the cache `cache_name`.
    #[must_use]
    pub fn cache(mut self, namespace: impl Into<String>, cache_name: impl Into<String>) -> Self {
        self.caches.insert(namespace.into(), cache_name.into());
        self
    }

    /// Caches `namespace` in a cache of the same name.
    #[must_use]
    pub fn cache_namespace(self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.cache(namespace.clone(), namespace)
    }
}

impl RegistrationInterceptor for CacheInterceptor {
    fn before_register(
        &self,
        registry: &ContainerRegistry,
        container: Arc<dyn Container>,
    ) -> Option<Arc<dyn Container>> {
        let Some(cache_name) = self.caches.get(container.namespace()) else {
            return Some(container);
        };
        tracing::debug!(
            namespace = container.namespace(),
            cache = cache_name.as_str(),
            "wrapping container in cache"
        );
        Some(Arc::new(CacheableContainer::new(
            container,
            cache_name.clone(),
            Arc::clone(registry.cache_manager()),
        )))
    }
}
