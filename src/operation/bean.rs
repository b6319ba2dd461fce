//! Per-type operation descriptors.

use crate::entity::TypeName;
use crate::error::ParseError;

use super::validation::validate;
use super::{AssembleOperation, DisassembleOperation};

/// The full set of assemble and disassemble rules for one target type.
///
/// Assemble operations are kept in ascending `sort` order; ties keep
/// declaration order. A descriptor is immutable once built and is shared
/// between concurrent executions behind an `Arc`.
///
/// # Example
/// ```
/// use joinery::{AssembleOperation, BeanOperations, DisassembleOperation};
///
/// let ops = BeanOperations::builder("Order")
///     .assemble(AssembleOperation::new("user_id", "users").map("name", "user_name"))
///     .disassemble(DisassembleOperation::declared("items", "OrderItem"))
///     .build()
///     .unwrap();
///
/// assert_eq!(ops.assemble_operations().len(), 1);
/// assert_eq!(ops.disassemble_operations().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct BeanOperations {
    target_type: TypeName,
    assemble: Vec<AssembleOperation>,
    disassemble: Vec<DisassembleOperation>,
}

impl BeanOperations {
    /// Starts building a descriptor for `target_type`.
    #[must_use]
    pub fn builder(target_type: impl Into<TypeName>) -> BeanOperationsBuilder {
        BeanOperationsBuilder {
            target_type: target_type.into(),
            assemble: Vec::new(),
            disassemble: Vec::new(),
        }
    }

    /// A descriptor with no operations.
    #[must_use]
    pub fn empty(target_type: impl Into<TypeName>) -> Self {
        Self {
            target_type: target_type.into(),
            assemble: Vec::new(),
            disassemble: Vec::new(),
        }
    }

    #[must_use]
    pub const fn target_type(&self) -> &TypeName {
        &self.target_type
    }

    /// Assemble operations in execution order.
    #[must_use]
    pub fn assemble_operations(&self) -> &[AssembleOperation] {
        &self.assemble
    }

    #[must_use]
    pub fn disassemble_operations(&self) -> &[DisassembleOperation] {
        &self.disassemble
    }

    /// Returns true if the descriptor has no operations at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assemble.is_empty() && self.disassemble.is_empty()
    }
}

/// Builder for `BeanOperations`.
#[derive(Debug, Clone)]
pub struct BeanOperationsBuilder {
    target_type: TypeName,
    assemble: Vec<AssembleOperation>,
    disassemble: Vec<DisassembleOperation>,
}

impl BeanOperationsBuilder {
    /// Appends an assemble operation.
    #[must_use]
    pub fn assemble(mut self, operation: AssembleOperation) -> Self {
        self.assemble.push(operation);
        self
    }

    /// Appends a disassemble operation.
    #[must_use]
    pub fn disassemble(mut self, operation: DisassembleOperation) -> Self {
        self.disassemble.push(operation);
        self
    }

    /// Type the descriptor is being built for.
    #[must_use]
    pub const fn target_type(&self) -> &TypeName {
        &self.target_type
    }

    /// Validates and builds the descriptor.
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` for malformed descriptors: empty or duplicated
    /// mapping targets, duplicated disassemble keys, a field used both as an
    /// assemble key and a disassemble key, an empty many-to-many separator,
    /// or a keyless operation on a real container.
    pub fn build(self) -> Result<BeanOperations, ParseError> {
        let Self {
            target_type,
            mut assemble,
            disassemble,
        } = self;

        validate(&target_type, &assemble, &disassemble)?;
        // Stable: equal sort values keep declaration order.
        assemble.sort_by_key(AssembleOperation::sort_value);

        Ok(BeanOperations {
            target_type,
            assemble,
            disassemble,
        })
    }
}
