//! Descriptor validation.
//!
//! Runs once when a `BeanOperations` is built; execution assumes a
//! descriptor that passed these checks.

use std::collections::HashSet;

use crate::entity::TypeName;
use crate::error::ParseError;

use super::{AssembleOperation, DisassembleOperation, MappingKind};

pub(super) fn validate(
    type_name: &TypeName,
    assemble: &[AssembleOperation],
    disassemble: &[DisassembleOperation],
) -> Result<(), ParseError> {
    let mut nested_keys = HashSet::with_capacity(disassemble.len());
    for op in disassemble {
        if op.key().trim().is_empty() {
            return Err(ParseError::Invalid {
                type_name: type_name.clone(),
                reason: "disassemble operation has an empty key".to_string(),
            });
        }
        if !nested_keys.insert(op.key()) {
            return Err(ParseError::DuplicateDisassembleKey {
                type_name: type_name.clone(),
                key: op.key().to_string(),
            });
        }
    }

    for op in assemble {
        validate_assemble(type_name, op)?;
        if nested_keys.contains(op.key()) {
            return Err(ParseError::ConflictingKey {
                type_name: type_name.clone(),
                key: op.key().to_string(),
            });
        }
    }
    Ok(())
}

fn validate_assemble(type_name: &TypeName, op: &AssembleOperation) -> Result<(), ParseError> {
    if let MappingKind::ManyToMany { separator } = op.mapping_kind() {
        if separator.is_empty() {
            return Err(ParseError::EmptySeparator {
                type_name: type_name.clone(),
                key: op.key().to_string(),
            });
        }
    }

    let mut targets = HashSet::new();
    for mapping in op.mappings() {
        if mapping.target().trim().is_empty() {
            return Err(ParseError::EmptyMappingTarget {
                type_name: type_name.clone(),
            });
        }
        if !targets.insert(mapping.target()) {
            return Err(ParseError::ConflictingMapping {
                type_name: type_name.clone(),
                key: op.key().to_string(),
                field: mapping.target().to_string(),
            });
        }
    }
    Ok(())
}
