//! Operation descriptor model.
//!
//! A `BeanOperations` descriptor lists, for one target type, the assemble
//! operations that fill its fields from containers and the disassemble
//! operations that reach nested entities needing their own enrichment.

mod assemble;
mod bean;
mod disassemble;
mod group;
mod validation;

pub use assemble::{AssembleOperation, MappingKind, PropertyMapping};
pub use bean::{BeanOperations, BeanOperationsBuilder};
pub use disassemble::{DisassembleOperation, NestedOperations};
pub use group::GroupFilter;
