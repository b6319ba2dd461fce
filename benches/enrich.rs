use std::sync::Arc;
use std::time::Instant;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use joinery::{
    AssembleOperation, BeanOperations, CacheInterceptor, ContainerRegistry, DescriptorCache,
    DisassembleOperation, DynamicAccessor, Entity, EntityRef, Executor, ExecutorConfig,
    MapContainer, StaticDescriptors, Value,
};

const ORDERS: i64 = 256;
const ITEMS_PER_ORDER: i64 = 4;

fn registry(cached: bool) -> ContainerRegistry {
    let registry = if cached {
        ContainerRegistry::new()
            .with_interceptor(Arc::new(CacheInterceptor::new().cache_namespace("users")))
    } else {
        ContainerRegistry::new()
    };
    registry
        .register_container(MapContainer::new(
            "users",
            (0..ORDERS).map(|id| (id, Entity::new("User").with("name", format!("user-{id}")))),
        ))
        .unwrap();
    registry
        .register_container(MapContainer::new(
            "products",
            (0..ITEMS_PER_ORDER * 8).map(|id| (id, format!("product-{id}"))),
        ))
        .unwrap();
    registry
}

fn descriptors() -> StaticDescriptors {
    StaticDescriptors::new()
        .with(
            BeanOperations::builder("Order")
                .assemble(AssembleOperation::new("user_id", "users").map("name", "user_name"))
                .disassemble(DisassembleOperation::declared("items", "Item"))
                .build()
                .unwrap(),
        )
        .with(
            BeanOperations::builder("Item")
                .assemble(AssembleOperation::new("product_id", "products").map_whole("product"))
                .build()
                .unwrap(),
        )
}

fn orders() -> Vec<EntityRef> {
    (0..ORDERS)
        .map(|id| {
            let items: Vec<Value> = (0..ITEMS_PER_ORDER)
                .map(|n| Entity::new("Item").with("product_id", (id + n) % (ITEMS_PER_ORDER * 8)).into())
                .collect();
            Entity::new("Order")
                .with("user_id", id)
                .with("items", Value::List(items))
                .into_ref()
        })
        .collect()
}

fn executor(cached: bool, config: ExecutorConfig) -> Executor {
    Executor::with_config(
        Arc::new(registry(cached)),
        Arc::new(DescriptorCache::new(Arc::new(descriptors()))),
        Arc::new(DynamicAccessor),
        config,
    )
    .unwrap()
}

fn bench_nested_orders(c: &mut Criterion) {
    let mut group = c.benchmark_group("enrich");
    group.throughput(Throughput::Elements((ORDERS * (ITEMS_PER_ORDER + 1)) as u64));

    for (name, cached, parallel) in [
        ("sequential", false, false),
        ("parallel_fetch", false, true),
        ("cached", true, false),
    ] {
        group.bench_function(name, |b| {
            b.iter_custom(|iters| {
                let executor = executor(cached, ExecutorConfig::default().parallel_fetch(parallel));
                let start = Instant::now();
                for _ in 0..iters {
                    executor.execute(&orders(), None).unwrap();
                }
                start.elapsed()
            })
        });
    }
    group.finish();
}

criterion_group!(enrich, bench_nested_orders);
criterion_main!(enrich);
