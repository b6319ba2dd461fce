//! Execution orchestrator.
//!
//! A call runs in two phases. Disassembly walks the entity graph level by
//! level, tagging every reachable entity with its own descriptor, until a
//! level contributes no new entities. Assembly then turns every descriptor's
//! assemble operations into executions, fetches each namespace once for the
//! whole call, and writes results back in ascending `sort` order.

mod assemble;
mod config;
mod disassemble;
mod pool;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accessor::PropertyAccessor;
use crate::container::{Container, ContainerRegistry, KeySet, SourceMap};
use crate::descriptor::DescriptorCache;
use crate::entity::{EntityRef, TypeName};
use crate::error::{ExecutionError, JoineryResult};
use crate::operation::{BeanOperations, GroupFilter, NestedOperations};

use self::assemble::{collect_keys, TargetKeys};
use self::pool::{FetchBatch, FetchPool};

pub use assemble::{process, AssembleExecution};
pub use config::ExecutorConfig;
pub use disassemble::flatten;

/// Unique identifier of one `execute` call, attached to its tracing span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    /// Creates a new random execution ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    filter: GroupFilter,
}

impl ExecuteOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs only operations belonging to at least one of `groups`.
    #[must_use]
    pub fn groups<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filter: GroupFilter::any_of(groups),
        }
    }

    /// Sets the group filter.
    #[must_use]
    pub fn filter(mut self, filter: GroupFilter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub const fn group_filter(&self) -> &GroupFilter {
        &self.filter
    }
}

/// Summary of one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    /// Identifier of the call, also recorded on its tracing span.
    pub id: ExecutionId,
    /// Root entities passed in.
    pub roots: usize,
    /// Nested entities reached by disassembly, counted per occurrence.
    pub flattened: usize,
    /// Assemble executions run.
    pub executions: usize,
    /// Container fetches issued.
    pub fetches: usize,
    /// Fields written.
    pub written: usize,
    /// Wall time of the call, in microseconds.
    pub elapsed_us: u64,
}

impl ExecutionReport {
    fn empty(id: ExecutionId) -> Self {
        Self {
            id,
            roots: 0,
            flattened: 0,
            executions: 0,
            fetches: 0,
            written: 0,
            elapsed_us: 0,
        }
    }
}

/// Entities grouped by the descriptor that applies to them, in first-seen order.
#[derive(Default)]
struct TargetGroups {
    groups: Vec<(Arc<BeanOperations>, Vec<EntityRef>)>,
    index: HashMap<*const BeanOperations, usize>,
}

impl TargetGroups {
    fn push(&mut self, descriptor: &Arc<BeanOperations>, entity: EntityRef) {
        self.extend(descriptor, std::iter::once(entity));
    }

    fn extend(&mut self, descriptor: &Arc<BeanOperations>, entities: impl IntoIterator<Item = EntityRef>) {
        if descriptor.is_empty() {
            return;
        }
        let key = Arc::as_ptr(descriptor);
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.groups.push((Arc::clone(descriptor), Vec::new()));
                self.index.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[slot].1.extend(entities);
    }

    fn merge(&mut self, other: &Self) {
        for (descriptor, entities) in &other.groups {
            self.extend(descriptor, entities.iter().cloned());
        }
    }

    fn entity_count(&self) -> usize {
        self.groups.iter().map(|(_, entities)| entities.len()).sum()
    }

    fn is_empty(&self) -> bool {
        self.groups.iter().all(|(_, entities)| entities.is_empty())
    }
}

/// Runs enrichment calls against a shared registry and descriptor cache.
///
/// An executor is `Send + Sync`; concurrent calls share configuration but
/// keep all per-call state local.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use joinery::{
///     AssembleOperation, BeanOperations, ContainerRegistry, DescriptorCache, DynamicAccessor,
///     Entity, Executor, MapContainer, StaticDescriptors, Value,
/// };
///
/// let registry = Arc::new(ContainerRegistry::new());
/// registry.register_container(MapContainer::new("names", [(1, "a"), (2, "b")])).unwrap();
///
/// let descriptors = StaticDescriptors::new().with(
///     BeanOperations::builder("User")
///         .assemble(AssembleOperation::new("id", "names").map_whole("name"))
///         .build()
///         .unwrap(),
/// );
/// let executor = Executor::new(
///     registry,
///     Arc::new(DescriptorCache::new(Arc::new(descriptors))),
///     Arc::new(DynamicAccessor),
/// );
///
/// let user = Entity::new("User").with("id", 2).into_ref();
/// executor.execute(&[user.clone()], None).unwrap();
/// assert_eq!(user.get("name").unwrap(), Some(Value::from("b")));
/// ```
pub struct Executor {
    registry: Arc<ContainerRegistry>,
    descriptors: Arc<DescriptorCache>,
    accessor: Arc<dyn PropertyAccessor>,
    config: ExecutorConfig,
    pool: Option<FetchPool>,
}

impl Executor {
    /// Creates an executor that fetches sequentially on the calling thread.
    pub fn new(
        registry: Arc<ContainerRegistry>,
        descriptors: Arc<DescriptorCache>,
        accessor: Arc<dyn PropertyAccessor>,
    ) -> Self {
        Self {
            registry,
            descriptors,
            accessor,
            config: ExecutorConfig::default(),
            pool: None,
        }
    }

    /// Creates an executor with `config`, starting the fetch pool if enabled.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a fetch worker thread cannot be spawned.
    pub fn with_config(
        registry: Arc<ContainerRegistry>,
        descriptors: Arc<DescriptorCache>,
        accessor: Arc<dyn PropertyAccessor>,
        config: ExecutorConfig,
    ) -> JoineryResult<Self> {
        let pool = if config.parallel_fetch {
            Some(FetchPool::start(
                config.fetch_workers,
                config.queue_capacity,
                config.reject_when_full,
            )?)
        } else {
            None
        };
        Ok(Self {
            registry,
            descriptors,
            accessor,
            config,
            pool,
        })
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ContainerRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn descriptors(&self) -> &Arc<DescriptorCache> {
        &self.descriptors
    }

    #[must_use]
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Enriches `roots` and everything reachable from them.
    ///
    /// With `root_type`, every root uses that type's descriptor; otherwise
    /// each root is resolved by its own runtime type. Empty input is a no-op.
    ///
    /// # Errors
    ///
    /// See `execute_with`.
    pub fn execute(&self, roots: &[EntityRef], root_type: Option<&TypeName>) -> JoineryResult<ExecutionReport> {
        self.execute_with(roots, root_type, &ExecuteOptions::default())
    }

    /// Enriches `roots` with per-call options.
    ///
    /// Writes already made when an error occurs are not rolled back.
    ///
    /// # Errors
    ///
    /// - `ParseError` if a descriptor is malformed.
    /// - `AccessError` if a key, nested or mapped field cannot be accessed.
    /// - `ExecutionError::ContainerNotFound` if an operation names an unregistered
    ///   namespace; raised before any fetch.
    /// - `ExecutionError::Fetch` if a container fails.
    pub fn execute_with(
        &self,
        roots: &[EntityRef],
        root_type: Option<&TypeName>,
        options: &ExecuteOptions,
    ) -> JoineryResult<ExecutionReport> {
        let id = ExecutionId::new();
        if roots.is_empty() {
            return Ok(ExecutionReport::empty(id));
        }

        let span = tracing::debug_span!("execute", execution_id = %id, roots = roots.len());
        let _enter = span.enter();
        let started = Instant::now();

        let roots_by_descriptor = self.group_roots(roots, root_type)?;
        let (targets, flattened) = self.disassemble(roots_by_descriptor)?;
        tracing::debug!(flattened, groups = targets.groups.len(), "disassembly complete");

        let executions = plan(&targets, options.group_filter());
        let containers = self.resolve_containers(&executions)?;

        let accessor = self.accessor.as_ref();
        let mut resolved: Vec<Option<Vec<TargetKeys>>> = Vec::with_capacity(executions.len());
        let mut keys_by_namespace: BTreeMap<&str, KeySet> = BTreeMap::new();
        for execution in &executions {
            if execution.is_identity() {
                resolved.push(None);
                continue;
            }
            let target_keys = execution.resolve_keys(accessor)?;
            collect_keys(
                &target_keys,
                keys_by_namespace.entry(execution.operation().container()).or_default(),
            );
            resolved.push(Some(target_keys));
        }

        let (sources, fetches) = self.fetch(keys_by_namespace, &containers)?;
        tracing::debug!(fetches, "fetch complete");

        let empty = SourceMap::new();
        let mut written = 0;
        for (execution, target_keys) in executions.iter().zip(&resolved) {
            written += match target_keys {
                None => execution.complete_identity(accessor)?,
                Some(target_keys) => {
                    let found = sources.get(execution.operation().container()).unwrap_or(&empty);
                    execution.complete(accessor, target_keys, found)?
                }
            };
        }

        let elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        tracing::debug!(executions = executions.len(), written, elapsed_us, "assembly complete");

        Ok(ExecutionReport {
            id,
            roots: roots.len(),
            flattened,
            executions: executions.len(),
            fetches,
            written,
            elapsed_us,
        })
    }

    fn group_roots(&self, roots: &[EntityRef], root_type: Option<&TypeName>) -> JoineryResult<TargetGroups> {
        let mut groups = TargetGroups::default();
        if let Some(root_type) = root_type {
            let descriptor = self.descriptors.get(root_type)?;
            groups.extend(&descriptor, roots.iter().cloned());
            return Ok(groups);
        }
        for root in roots {
            let descriptor = self.descriptors.get(root.type_name())?;
            groups.push(&descriptor, root.clone());
        }
        Ok(groups)
    }

    /// Flattens level by level; returns every group to assemble and the
    /// number of nested entities reached.
    fn disassemble(&self, roots: TargetGroups) -> JoineryResult<(TargetGroups, usize)> {
        let accessor = self.accessor.as_ref();
        let mut all = TargetGroups::default();
        all.merge(&roots);

        let mut level = roots;
        let mut depth = 0usize;
        let mut flattened = 0;
        while !level.is_empty() {
            let mut next = TargetGroups::default();
            for (descriptor, parents) in &level.groups {
                for operation in descriptor.disassemble_operations() {
                    let nested = flatten(accessor, descriptor.target_type(), operation, parents)?;
                    if nested.is_empty() {
                        continue;
                    }
                    match operation.nested() {
                        NestedOperations::Fixed(ops) => next.extend(ops, nested),
                        NestedOperations::Declared(type_name) => {
                            next.extend(&self.descriptors.get(type_name)?, nested);
                        }
                        NestedOperations::Dynamic => {
                            for entity in nested {
                                let ops = self.descriptors.get(entity.type_name())?;
                                next.push(&ops, entity);
                            }
                        }
                    }
                }
            }

            depth += 1;
            let count = next.entity_count();
            tracing::debug!(depth, entities = count, "disassembled level");
            flattened += count;
            all.merge(&next);
            level = next;
        }
        Ok((all, flattened))
    }

    /// Resolves every referenced namespace before anything is fetched.
    fn resolve_containers(&self, executions: &[AssembleExecution]) -> JoineryResult<HashMap<String, Arc<dyn Container>>> {
        let mut containers: HashMap<String, Arc<dyn Container>> = HashMap::new();
        for execution in executions {
            if execution.is_identity() {
                continue;
            }
            let namespace = execution.operation().container();
            if !containers.contains_key(namespace) {
                containers.insert(namespace.to_string(), self.registry.get(namespace)?);
            }
        }
        Ok(containers)
    }

    /// Fetches every namespace once, split into batches when configured.
    fn fetch(
        &self,
        keys_by_namespace: BTreeMap<&str, KeySet>,
        containers: &HashMap<String, Arc<dyn Container>>,
    ) -> JoineryResult<(HashMap<String, SourceMap>, usize)> {
        let mut batches = Vec::new();
        for (namespace, keys) in keys_by_namespace {
            let container = containers
                .get(namespace)
                .ok_or_else(|| ExecutionError::ContainerNotFound {
                    namespace: namespace.to_string(),
                })?;
            for chunk in split_keys(keys, self.config.fetch_batch_size) {
                batches.push(FetchBatch {
                    namespace: namespace.to_string(),
                    container: Arc::clone(container),
                    keys: chunk,
                });
            }
        }

        let fetches = batches.len();
        let results = match &self.pool {
            Some(pool) if batches.len() > 1 => {
                let namespaces: Vec<String> = batches.iter().map(|b| b.namespace.clone()).collect();
                namespaces.into_iter().zip(pool.fetch_all(batches)?).collect::<Vec<_>>()
            }
            _ => {
                let mut results = Vec::with_capacity(batches.len());
                for batch in batches {
                    let found = batch.run().map_err(|source| ExecutionError::Fetch {
                        namespace: batch.namespace.clone(),
                        source,
                    })?;
                    results.push((batch.namespace, found));
                }
                results
            }
        };

        let mut sources: HashMap<String, SourceMap> = HashMap::new();
        for (namespace, found) in results {
            sources.entry(namespace).or_default().extend(found);
        }
        Ok((sources, fetches))
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("registry", &self.registry)
            .field("descriptors", &self.descriptors)
            .field("config", &self.config)
            .field("fetch_workers", &self.pool.as_ref().map_or(0, FetchPool::worker_count))
            .finish_non_exhaustive()
    }
}

/// Builds the executions for every group, stable-sorted by `sort`.
fn plan(targets: &TargetGroups, filter: &GroupFilter) -> Vec<AssembleExecution> {
    let mut executions = Vec::new();
    for (descriptor, entities) in &targets.groups {
        if entities.is_empty() {
            continue;
        }
        for operation in descriptor.assemble_operations() {
            if !filter.matches(operation.groups()) {
                continue;
            }
            executions.push(AssembleExecution::new(
                descriptor.target_type().clone(),
                operation.clone(),
                entities.clone(),
            ));
        }
    }
    executions.sort_by_key(|execution| execution.operation().sort_value());
    executions
}

/// Splits a key set into chunks of at most `size` keys. An empty set yields
/// one empty chunk so the container is still called.
fn split_keys(keys: KeySet, size: Option<usize>) -> Vec<KeySet> {
    let Some(size) = size.filter(|&size| size > 0 && keys.len() > size) else {
        return vec![keys];
    };
    let mut chunks = Vec::with_capacity(keys.len().div_ceil(size));
    let mut current = KeySet::new();
    for key in keys {
        current.insert(key);
        if current.len() == size {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::DynamicAccessor;
    use crate::container::MapContainer;
    use crate::descriptor::StaticDescriptors;
    use crate::entity::Entity;
    use crate::operation::{AssembleOperation, DisassembleOperation};
    use crate::value::{Key, Value};

    fn executor(descriptors: StaticDescriptors) -> Executor {
        let registry = Arc::new(ContainerRegistry::new());
        registry
            .register_container(MapContainer::new("names", [(1, "a"), (2, "b"), (3, "c")]))
            .unwrap();
        Executor::new(
            registry,
            Arc::new(DescriptorCache::new(Arc::new(descriptors))),
            Arc::new(DynamicAccessor),
        )
    }

    #[test]
    fn empty_input_is_noop() {
        let report = executor(StaticDescriptors::new()).execute(&[], None).unwrap();
        assert_eq!(report.roots, 0);
        assert_eq!(report.fetches, 0);
    }

    #[test]
    fn root_type_overrides_runtime_type() {
        let descriptors = StaticDescriptors::new().with(
            BeanOperations::builder("Person")
                .assemble(AssembleOperation::new("id", "names").map_whole("name"))
                .build()
                .unwrap(),
        );
        let exec = executor(descriptors);
        let user = Entity::new("User").with("id", 1).into_ref();

        exec.execute(&[user.clone()], None).unwrap();
        assert_eq!(user.get("name").unwrap(), None);

        let report = exec.execute(&[user.clone()], Some(&TypeName::new("Person"))).unwrap();
        assert_eq!(user.get("name").unwrap(), Some(Value::from("a")));
        assert_eq!(report.fetches, 1);
        assert_eq!(report.written, 1);
    }

    #[test]
    fn heterogeneous_roots_resolved_individually() {
        let descriptors = StaticDescriptors::new()
            .with(
                BeanOperations::builder("User")
                    .assemble(AssembleOperation::new("id", "names").map_whole("name"))
                    .build()
                    .unwrap(),
            )
            .with(
                BeanOperations::builder("Team")
                    .assemble(AssembleOperation::new("lead_id", "names").map_whole("lead"))
                    .build()
                    .unwrap(),
            );
        let user = Entity::new("User").with("id", 1).into_ref();
        let team = Entity::new("Team").with("lead_id", 3).into_ref();

        let report = executor(descriptors).execute(&[user.clone(), team.clone()], None).unwrap();
        assert_eq!(user.get("name").unwrap(), Some(Value::from("a")));
        assert_eq!(team.get("lead").unwrap(), Some(Value::from("c")));
        assert_eq!(report.executions, 2);
        assert_eq!(report.fetches, 1);
    }

    #[test]
    fn nested_levels_are_assembled() {
        let descriptors = StaticDescriptors::new()
            .with(
                BeanOperations::builder("Order")
                    .disassemble(DisassembleOperation::declared("items", "Item"))
                    .build()
                    .unwrap(),
            )
            .with(
                BeanOperations::builder("Item")
                    .assemble(AssembleOperation::new("sku", "names").map_whole("label"))
                    .disassemble(DisassembleOperation::dynamic("parts"))
                    .build()
                    .unwrap(),
            )
            .with(
                BeanOperations::builder("Part")
                    .assemble(AssembleOperation::new("code", "names").map_whole("label"))
                    .build()
                    .unwrap(),
            );

        let part = Entity::new("Part").with("code", 3).into_ref();
        let item = Entity::new("Item")
            .with("sku", 2)
            .with("parts", Value::List(vec![part.clone().into()]))
            .into_ref();
        let order = Entity::new("Order").with("items", Value::List(vec![item.clone().into()])).into_ref();

        let report = executor(descriptors).execute(&[order], None).unwrap();
        assert_eq!(item.get("label").unwrap(), Some(Value::from("b")));
        assert_eq!(part.get("label").unwrap(), Some(Value::from("c")));
        assert_eq!(report.flattened, 2);
        assert_eq!(report.fetches, 1);
    }

    #[test]
    fn unknown_container_fails_before_fetch() {
        let descriptors = StaticDescriptors::new().with(
            BeanOperations::builder("User")
                .assemble(AssembleOperation::new("id", "names").map_whole("name"))
                .assemble(AssembleOperation::new("dept_id", "depts").map_whole("dept"))
                .build()
                .unwrap(),
        );
        let user = Entity::new("User").with("id", 1).with("dept_id", 1).into_ref();
        let err = executor(descriptors).execute(&[user.clone()], None).unwrap_err();
        assert!(err.is_execution());
        assert_eq!(user.get("name").unwrap(), None);
    }

    #[test]
    fn split_keys_chunks() {
        let keys: KeySet = (1..=5).map(Key::Int).collect();
        let chunks = split_keys(keys.clone(), Some(2));
        assert_eq!(chunks.iter().map(KeySet::len).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert_eq!(split_keys(keys.clone(), None).len(), 1);
        assert_eq!(split_keys(keys, Some(10)).len(), 1);
        assert_eq!(split_keys(KeySet::new(), Some(2)), vec![KeySet::new()]);
    }

    #[test]
    fn execution_id_display_is_uuid() {
        let id = ExecutionId::new();
        assert_eq!(id.to_string().len(), 36);
        assert_ne!(id, ExecutionId::new());
    }

    #[test]
    fn report_serializes() {
        let report = ExecutionReport::empty(ExecutionId::new());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["fetches"], 0);
        assert!(json["id"].is_string());
    }
}
