use joinery::{
    AssembleOperation, BeanOperations, Cache, CacheInterceptor, CacheableContainer, Container,
    ContainerRegistry, DescriptorCache, DynamicAccessor, Entity, EntityRef, Executor, FetchError,
    Key, KeySet, MapCache, MapCacheManager, MapContainer, SourceMap, StaticDescriptors, Value,
};
use std::sync::{Arc, Mutex};

/// Records every key set it is asked for.
struct Recording {
    inner: MapContainer,
    requests: Mutex<Vec<KeySet>>,
}

impl Recording {
    fn names() -> Arc<Self> {
        Arc::new(Self {
            inner: MapContainer::new("names", [(1, "a"), (2, "b"), (3, "c")]),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<KeySet> {
        self.requests.lock().unwrap().clone()
    }
}

impl Container for Recording {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    fn get(&self, keys: &KeySet) -> Result<SourceMap, FetchError> {
        self.requests.lock().unwrap().push(keys.clone());
        self.inner.get(keys)
    }
}

fn keys(ids: &[i64]) -> KeySet {
    ids.iter().copied().map(Key::Int).collect()
}

fn users(ids: &[i64]) -> Vec<EntityRef> {
    ids.iter()
        .map(|&id| Entity::new("User").with("id", id).with("name", Value::Null).into_ref())
        .collect()
}

fn cached_executor(recording: &Arc<Recording>) -> Executor {
    let registry = ContainerRegistry::new()
        .with_interceptor(Arc::new(CacheInterceptor::new().cache_namespace("names")));
    registry.register(recording.clone()).unwrap();

    let descriptors = StaticDescriptors::new().with(
        BeanOperations::builder("User")
            .assemble(AssembleOperation::new("id", "names").map_whole("name"))
            .build()
            .unwrap(),
    );
    Executor::new(
        Arc::new(registry),
        Arc::new(DescriptorCache::new(Arc::new(descriptors))),
        Arc::new(DynamicAccessor),
    )
}

#[test]
fn second_call_fetches_only_uncached_keys() {
    let recording = Recording::names();
    let executor = cached_executor(&recording);

    executor.execute(&users(&[1, 2]), None).unwrap();
    assert_eq!(recording.requests(), vec![keys(&[1, 2])]);

    let second = users(&[1, 2, 3]);
    executor.execute(&second, None).unwrap();
    assert_eq!(recording.requests(), vec![keys(&[1, 2]), keys(&[3])]);

    let names: Vec<Value> = second.iter().map(|u| u.get("name").unwrap().unwrap()).collect();
    assert_eq!(names, vec![Value::from("a"), Value::from("b"), Value::from("c")]);
}

#[test]
fn fully_cached_call_skips_inner_container() {
    let recording = Recording::names();
    let executor = cached_executor(&recording);

    executor.execute(&users(&[1, 2, 3]), None).unwrap();
    executor.execute(&users(&[3, 2]), None).unwrap();
    assert_eq!(recording.requests().len(), 1);
}

#[test]
fn absent_keys_are_asked_again() {
    let recording = Recording::names();
    let executor = cached_executor(&recording);

    executor.execute(&users(&[4]), None).unwrap();
    executor.execute(&users(&[4]), None).unwrap();
    assert_eq!(recording.requests(), vec![keys(&[4]), keys(&[4])]);

    let cache = executor.registry().cache("names").unwrap();
    assert_eq!(cache.get(&Key::Int(4)).unwrap(), None);
}

#[test]
fn registered_cache_is_used_and_preloaded_entries_win() {
    let recording = Recording::names();
    let executor = cached_executor(&recording);

    let preloaded = Arc::new(MapCache::new("names"));
    preloaded.put(Key::Int(1), Value::from("from-cache")).unwrap();
    executor
        .registry()
        .register_cache("names", preloaded.clone())
        .unwrap();

    let u = users(&[1, 2]);
    executor.execute(&u, None).unwrap();
    assert_eq!(u[0].get("name").unwrap(), Some(Value::from("from-cache")));
    assert_eq!(u[1].get("name").unwrap(), Some(Value::from("b")));
    assert_eq!(recording.requests(), vec![keys(&[2])]);
    assert_eq!(preloaded.len().unwrap(), 2);
}

#[test]
fn cache_manager_clear_forces_refetch() {
    let recording = Recording::names();
    let manager = Arc::new(MapCacheManager::new());
    let container = CacheableContainer::new(recording.clone(), "names", manager.clone());

    container.get(&keys(&[1])).unwrap();
    joinery::CacheManager::clear_all(manager.as_ref()).unwrap();
    container.get(&keys(&[1])).unwrap();
    assert_eq!(recording.requests(), vec![keys(&[1]), keys(&[1])]);
}
