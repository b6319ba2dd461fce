//! Flattening of nested entity graphs.

use crate::accessor::PropertyAccessor;
use crate::entity::{EntityRef, TypeName};
use crate::error::AccessError;
use crate::operation::DisassembleOperation;
use crate::value::Value;

/// Collects the nested entities that `operation` reaches from `parents`.
///
/// The field is read from each parent as `parent_type`. A `Null` field or
/// element contributes nothing; lists are flattened at any depth, following
/// the runtime shape. Output order follows parent order, then element order.
/// Aliased instances are returned once per occurrence.
///
/// # Errors
///
/// Returns the accessor's `AccessError` if the field cannot be read, and
/// `AccessError::NotNested` if it holds a scalar instead of an entity or list.
pub fn flatten(
    accessor: &dyn PropertyAccessor,
    parent_type: &TypeName,
    operation: &DisassembleOperation,
    parents: &[EntityRef],
) -> Result<Vec<EntityRef>, AccessError> {
    let mut out = Vec::new();
    for parent in parents {
        let value = accessor.read(parent_type, parent, operation.key())?;
        collect(parent_type, operation.key(), value, &mut out)?;
    }
    Ok(out)
}

fn collect(
    parent_type: &TypeName,
    field: &str,
    value: Value,
    out: &mut Vec<EntityRef>,
) -> Result<(), AccessError> {
    match value {
        Value::Null => Ok(()),
        Value::Entity(entity) => {
            out.push(entity);
            Ok(())
        }
        Value::List(items) => {
            for item in items {
                collect(parent_type, field, item, out)?;
            }
            Ok(())
        }
        other => Err(AccessError::NotNested {
            type_name: parent_type.clone(),
            field: field.to_string(),
            found: other.type_name(),
        }),
    }
}
