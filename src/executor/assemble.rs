//! Batched assembly: key resolution, source lookup and write-back.
//!
//! An execution pairs one assemble operation with the targets it applies to.
//! Assembly runs in three steps so the orchestrator can batch fetches across
//! executions: resolve every target's keys, fetch each namespace once, then
//! write the matched sources back.

use std::sync::Arc;

use crate::accessor::PropertyAccessor;
use crate::container::{Container, KeySet, SourceMap, EMPTY_NAMESPACE};
use crate::entity::{EntityRef, TypeName};
use crate::error::{AccessError, ExecutionError, JoineryResult};
use crate::operation::{AssembleOperation, MappingKind, PropertyMapping};
use crate::value::{Key, Value};

/// Keys resolved from one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TargetKeys {
    /// Null key: the target takes no part in the fetch.
    Skip,
    One(Key),
    Many(Vec<Key>),
}

impl TargetKeys {
    fn extend_into(&self, keys: &mut KeySet) {
        match self {
            Self::Skip => {}
            Self::One(key) => {
                keys.insert(key.clone());
            }
            Self::Many(many) => keys.extend(many.iter().cloned()),
        }
    }
}

/// One assemble operation applied to a batch of targets.
#[derive(Debug, Clone)]
pub struct AssembleExecution {
    target_type: TypeName,
    operation: Arc<AssembleOperation>,
    targets: Vec<EntityRef>,
}

impl AssembleExecution {
    /// Creates an execution of `operation` over `targets`, read and written as `target_type`.
    pub fn new(target_type: TypeName, operation: impl Into<Arc<AssembleOperation>>, targets: Vec<EntityRef>) -> Self {
        Self {
            target_type,
            operation: operation.into(),
            targets,
        }
    }

    #[must_use]
    pub const fn target_type(&self) -> &TypeName {
        &self.target_type
    }

    #[must_use]
    pub fn operation(&self) -> &AssembleOperation {
        &self.operation
    }

    #[must_use]
    pub fn targets(&self) -> &[EntityRef] {
        &self.targets
    }

    /// Returns true if the target is its own source.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.operation.container() == EMPTY_NAMESPACE
    }

    /// Reads and normalizes the key of every target, in target order.
    ///
    /// Without a key field the target itself is the key.
    pub(crate) fn resolve_keys(&self, accessor: &dyn PropertyAccessor) -> Result<Vec<TargetKeys>, AccessError> {
        self.targets
            .iter()
            .map(|target| self.target_keys(accessor, target))
            .collect()
    }

    fn target_keys(&self, accessor: &dyn PropertyAccessor, target: &EntityRef) -> Result<TargetKeys, AccessError> {
        let op = &*self.operation;
        if op.is_self_keyed() {
            let key = Key::Entity(target.clone());
            return Ok(match op.mapping_kind() {
                MappingKind::ManyToMany { .. } => TargetKeys::Many(vec![key]),
                _ => TargetKeys::One(key),
            });
        }
        let raw = accessor.read(&self.target_type, target, op.key())?;
        match (&raw, op.mapping_kind()) {
            (Value::Null, _) => Ok(TargetKeys::Skip),
            (Value::List(items), MappingKind::ManyToMany { .. }) => items
                .iter()
                .filter(|item| !item.is_null())
                .map(|item| self.convert(item))
                .collect::<Result<Vec<_>, _>>()
                .map(TargetKeys::Many),
            (Value::String(joined), MappingKind::ManyToMany { separator }) => joined
                .split(separator.as_str())
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| self.convert(&Value::String(part.to_string())))
                .collect::<Result<Vec<_>, _>>()
                .map(TargetKeys::Many),
            (value, MappingKind::ManyToMany { .. }) => Ok(TargetKeys::Many(vec![self.convert(value)?])),
            (value, _) => Ok(TargetKeys::One(self.convert(value)?)),
        }
    }

    fn convert(&self, value: &Value) -> Result<Key, AccessError> {
        let key_type = self.operation.key_type_of();
        key_type.convert(value).ok_or_else(|| AccessError::InvalidKey {
            type_name: self.target_type.clone(),
            field: self.operation.key().to_string(),
            value: value.to_string(),
            expected: key_type.name(),
        })
    }

    /// Writes matched sources into the targets; returns the number of fields written.
    ///
    /// `keys` must come from `resolve_keys` on this execution. Targets whose
    /// source is absent are left untouched.
    pub(crate) fn complete(
        &self,
        accessor: &dyn PropertyAccessor,
        keys: &[TargetKeys],
        sources: &SourceMap,
    ) -> Result<usize, AccessError> {
        let mut written = 0;
        for (target, keys) in self.targets.iter().zip(keys) {
            let source = match keys {
                TargetKeys::Skip => continue,
                TargetKeys::One(key) => match sources.get(key) {
                    Some(source) => source.clone(),
                    None => continue,
                },
                TargetKeys::Many(many) => {
                    let found: Vec<Value> = many.iter().filter_map(|k| sources.get(k).cloned()).collect();
                    if found.is_empty() {
                        continue;
                    }
                    Value::List(found)
                }
            };
            written += self.apply(accessor, target, &source)?;
        }
        Ok(written)
    }

    /// Maps each target onto itself; used for the identity container.
    ///
    /// A keyless operation reads mappings from the target entity; with a key,
    /// the key field's value is the source.
    pub(crate) fn complete_identity(&self, accessor: &dyn PropertyAccessor) -> Result<usize, AccessError> {
        let mut written = 0;
        for target in &self.targets {
            let source = if self.operation.is_self_keyed() {
                Value::Entity(target.clone())
            } else {
                accessor.read(&self.target_type, target, self.operation.key())?
            };
            if source.is_null() {
                continue;
            }
            written += self.apply_one(accessor, target, &source)?;
        }
        Ok(written)
    }

    fn apply(&self, accessor: &dyn PropertyAccessor, target: &EntityRef, source: &Value) -> Result<usize, AccessError> {
        match self.operation.mapping_kind() {
            MappingKind::OneToOne => self.apply_one(accessor, target, source),
            MappingKind::OneToMany | MappingKind::ManyToMany { .. } => self.apply_many(accessor, target, source),
        }
    }

    fn apply_one(&self, accessor: &dyn PropertyAccessor, target: &EntityRef, source: &Value) -> Result<usize, AccessError> {
        let mut written = 0;
        for mapping in self.operation.mappings() {
            let value = read_source(accessor, source, mapping)?;
            written += self.write(accessor, target, mapping, value)?;
        }
        Ok(written)
    }

    /// Collection kinds: every mapping collects its value from each source element.
    fn apply_many(&self, accessor: &dyn PropertyAccessor, target: &EntityRef, source: &Value) -> Result<usize, AccessError> {
        let elements: &[Value] = match source {
            Value::List(items) => items,
            single => std::slice::from_ref(single),
        };

        let mut written = 0;
        for mapping in self.operation.mappings() {
            let mut collected = Vec::with_capacity(elements.len());
            for element in elements {
                let value = read_source(accessor, element, mapping)?;
                if !value.is_null() {
                    collected.push(value);
                }
            }
            written += self.write(accessor, target, mapping, Value::List(collected))?;
        }
        Ok(written)
    }

    fn write(
        &self,
        accessor: &dyn PropertyAccessor,
        target: &EntityRef,
        mapping: &PropertyMapping,
        value: Value,
    ) -> Result<usize, AccessError> {
        if value.is_null() {
            return Ok(0);
        }
        accessor.write(&self.target_type, target, mapping.target(), value)?;
        Ok(1)
    }
}

fn read_source(accessor: &dyn PropertyAccessor, source: &Value, mapping: &PropertyMapping) -> Result<Value, AccessError> {
    let Some(field) = mapping.source() else {
        return Ok(source.clone());
    };
    match source {
        Value::Null => Ok(Value::Null),
        Value::Entity(entity) => accessor.read(entity.type_name(), entity, field),
        other => Err(AccessError::NotAnEntity {
            field: field.to_string(),
            found: other.type_name(),
        }),
    }
}

/// Runs `executions` against a single container with one batched fetch.
///
/// Every execution is expected to reference `container`'s namespace. The
/// fetch is issued even when no target yields a key. Returns the number of
/// fields written.
///
/// # Errors
///
/// Returns an `AccessError` if a key or mapped field cannot be accessed, and
/// `ExecutionError::Fetch` if the container fails.
pub fn process(
    accessor: &dyn PropertyAccessor,
    container: &dyn Container,
    executions: &[AssembleExecution],
) -> JoineryResult<usize> {
    if container.namespace() == EMPTY_NAMESPACE {
        let mut written = 0;
        for execution in executions {
            written += execution.complete_identity(accessor)?;
        }
        return Ok(written);
    }

    let mut keys = KeySet::new();
    let mut resolved = Vec::with_capacity(executions.len());
    for execution in executions {
        let target_keys = execution.resolve_keys(accessor)?;
        collect_keys(&target_keys, &mut keys);
        resolved.push(target_keys);
    }

    let sources = container.get(&keys).map_err(|source| ExecutionError::Fetch {
        namespace: container.namespace().to_string(),
        source,
    })?;

    let mut written = 0;
    for (execution, target_keys) in executions.iter().zip(&resolved) {
        written += execution.complete(accessor, target_keys, &sources)?;
    }
    Ok(written)
}

/// Adds every key in `resolved` to `keys`.
pub(crate) fn collect_keys(resolved: &[TargetKeys], keys: &mut KeySet) {
    for k in resolved {
        k.extend_into(keys);
    }
}
