use joinery::{
    AssembleOperation, BeanOperations, Cache, Container, ContainerRegistry, DescriptorCache,
    DynamicAccessor, Entity, EntityRef, ExecutionError, Executor, ExecutorConfig, FetchError,
    FnContainer, JoineryError, Key, KeySet, MapCache, MapContainer, SourceMap, StaticDescriptors,
    Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn descriptors() -> StaticDescriptors {
    StaticDescriptors::new().with(
        BeanOperations::builder("User")
            .assemble(AssembleOperation::new("id", "names").map_whole("name"))
            .assemble(AssembleOperation::new("dept_id", "depts").map_whole("dept"))
            .assemble(AssembleOperation::new("city_id", "cities").map_whole("city"))
            .build()
            .unwrap(),
    )
}

fn user(id: i64) -> EntityRef {
    Entity::new("User")
        .with("id", id)
        .with("dept_id", id)
        .with("city_id", id)
        .into_ref()
}

fn parallel_executor(registry: ContainerRegistry, config: ExecutorConfig) -> Executor {
    Executor::with_config(
        Arc::new(registry),
        Arc::new(DescriptorCache::new(Arc::new(descriptors()))),
        Arc::new(DynamicAccessor),
        config.parallel_fetch(true),
    )
    .unwrap()
}

fn full_registry() -> ContainerRegistry {
    let registry = ContainerRegistry::new();
    registry
        .register_container(MapContainer::new("names", [(1, "a"), (2, "b")]))
        .unwrap();
    registry
        .register_container(MapContainer::new("depts", [(1, "ops"), (2, "dev")]))
        .unwrap();
    registry
        .register_container(MapContainer::new("cities", [(1, "Oslo"), (2, "Rome")]))
        .unwrap();
    registry
}

#[test]
fn parallel_fetch_fills_every_namespace() {
    let executor = parallel_executor(full_registry(), ExecutorConfig::default().fetch_workers(3));
    let users = [user(1), user(2)];
    let report = executor.execute(&users, None).unwrap();

    assert_eq!(report.fetches, 3);
    assert_eq!(users[0].get("dept").unwrap(), Some(Value::from("ops")));
    assert_eq!(users[1].get("city").unwrap(), Some(Value::from("Rome")));
    assert_eq!(users[1].get("name").unwrap(), Some(Value::from("b")));
}

#[test]
fn parallel_fetch_fails_fast_without_writes() {
    let registry = full_registry();
    registry
        .register_container(FnContainer::new("depts", |_: &KeySet| {
            Err(FetchError::new("dept service down"))
        }))
        .unwrap();
    registry
        .register_container(FnContainer::new("cities", |_: &KeySet| {
            thread::sleep(Duration::from_millis(200));
            Ok(SourceMap::new())
        }))
        .unwrap();

    let executor = parallel_executor(registry, ExecutorConfig::default().fetch_workers(3));
    let u = user(1);
    let err = executor.execute(&[u.clone()], None).unwrap_err();

    assert!(matches!(
        err,
        JoineryError::Execution(ExecutionError::Fetch { ref namespace, .. }) if namespace == "depts"
    ));
    assert_eq!(u.get("name").unwrap(), None);
}

#[test]
fn batch_size_splits_fetches_without_repeating_keys() {
    let seen = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let (seen_in, calls_in) = (seen.clone(), calls.clone());

    let registry = full_registry();
    registry
        .register_container(FnContainer::new("names", move |keys: &KeySet| {
            calls_in.fetch_add(1, Ordering::SeqCst);
            seen_in.fetch_add(keys.len(), Ordering::SeqCst);
            Ok(keys.iter().map(|k| (k.clone(), Value::from(k.to_string()))).collect())
        }))
        .unwrap();

    let executor = parallel_executor(registry, ExecutorConfig::default().fetch_batch_size(2));
    let users: Vec<EntityRef> = (1..=5).map(user).collect();
    executor.execute(&users, None).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(seen.load(Ordering::SeqCst), 5);
    assert_eq!(users[4].get("name").unwrap(), Some(Value::from("5")));
}

#[test]
fn more_batches_than_queue_slots_still_succeed() {
    let config = ExecutorConfig::default()
        .fetch_workers(1)
        .queue_capacity(2)
        .fetch_batch_size(1);
    let executor = parallel_executor(full_registry(), config);
    let users: Vec<EntityRef> = (1..=10).map(user).collect();

    let report = executor.execute(&users, None).unwrap();
    assert_eq!(report.fetches, 30);
    assert_eq!(users[0].get("name").unwrap(), Some(Value::from("a")));
    assert_eq!(users[1].get("city").unwrap(), Some(Value::from("Rome")));
    assert_eq!(users[9].get("dept").unwrap(), None);
}

#[test]
fn concurrent_calls_share_a_small_fetch_queue() {
    let config = ExecutorConfig::default()
        .fetch_workers(2)
        .queue_capacity(1)
        .fetch_batch_size(1);
    let executor = Arc::new(parallel_executor(full_registry(), config));

    thread::scope(|scope| {
        for i in 0..8 {
            let executor = Arc::clone(&executor);
            scope.spawn(move || {
                let users: Vec<EntityRef> = (0..10).map(|n| user(1 + (n + i) % 2)).collect();
                let report = executor.execute(&users, None).unwrap();
                assert_eq!(report.fetches, 6);
                for u in &users {
                    assert!(u.get("dept").unwrap().is_some());
                }
            });
        }
    });
}

#[test]
fn rejecting_pool_reports_full_queue() {
    let registry = full_registry();
    // Fetched first: namespaces are batched in name order.
    registry
        .register_container(FnContainer::new("cities", |keys: &KeySet| {
            thread::sleep(Duration::from_millis(20));
            Ok(keys.iter().map(|k| (k.clone(), Value::from(k.to_string()))).collect())
        }))
        .unwrap();
    let config = ExecutorConfig::default()
        .fetch_workers(1)
        .queue_capacity(1)
        .fetch_batch_size(1)
        .reject_when_full(true);
    let executor = parallel_executor(registry, config);
    let users: Vec<EntityRef> = (1..=6).map(user).collect();

    let err = executor.execute(&users, None).unwrap_err();
    assert!(matches!(err, JoineryError::Execution(ExecutionError::QueueFull { capacity: 1 })));
    assert!(err.is_retryable());
}

#[test]
fn concurrent_calls_share_one_executor() {
    let executor = Arc::new(parallel_executor(full_registry(), ExecutorConfig::default()));

    thread::scope(|scope| {
        for i in 0..8 {
            let executor = Arc::clone(&executor);
            scope.spawn(move || {
                let users: Vec<EntityRef> = (0..20).map(|n| user(1 + (n + i) % 2)).collect();
                executor.execute(&users, None).unwrap();
                for u in &users {
                    assert!(u.get("name").unwrap().is_some());
                }
            });
        }
    });
}

#[test]
fn reads_during_reregistration_see_a_whole_container() {
    let registry = Arc::new(full_registry());

    thread::scope(|scope| {
        let writer = Arc::clone(&registry);
        scope.spawn(move || {
            for round in 0..200 {
                let label = if round % 2 == 0 { "even" } else { "odd" };
                writer
                    .register_container(MapContainer::new("names", [(1, label)]))
                    .unwrap();
            }
        });

        for _ in 0..4 {
            let reader = Arc::clone(&registry);
            scope.spawn(move || {
                let keys: KeySet = [Key::Int(1)].into_iter().collect();
                for _ in 0..200 {
                    let container = reader.get("names").unwrap();
                    let found = container.get(&keys).unwrap();
                    assert!(found.contains_key(&Key::Int(1)));
                }
            });
        }
    });
}

#[test]
fn put_if_absent_has_a_single_winner() {
    let cache = Arc::new(MapCache::new("race"));

    let results: Vec<Value> = thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let cache = Arc::clone(&cache);
                scope.spawn(move || cache.put_if_absent(Key::Int(1), Value::Int(i)).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winner = cache.get(&Key::Int(1)).unwrap().unwrap();
    assert!(results.iter().all(|v| *v == winner));
}
