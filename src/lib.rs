//! # Joinery - batch-join enrichment for in-memory entity graphs
//!
//! Joinery fills designated fields of in-memory entities from named key-value
//! sources. Each entity type carries a declarative descriptor: which field
//! holds a lookup key, which container to ask, and which source fields land in
//! which target fields. Joinery walks nested entity graphs, gathers every key
//! needed by a call, fetches each container once, and writes the results back.
//!
//! ## Core Concepts
//!
//! - **Container**: a named batch lookup source (`keys -> records`)
//! - **AssembleOperation**: fills target fields from a container, keyed by a field
//! - **DisassembleOperation**: reaches nested entities that need their own enrichment
//! - **BeanOperations**: all operations for one entity type
//! - **Executor**: runs the disassemble/assemble pipeline for a call
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use joinery::{
//!     AssembleOperation, BeanOperations, ContainerRegistry, DescriptorCache, DynamicAccessor,
//!     Entity, Executor, MapContainer, StaticDescriptors, Value,
//! };
//!
//! let registry = Arc::new(ContainerRegistry::new());
//! registry
//!     .register_container(MapContainer::new("names", [(1, "a"), (2, "b"), (3, "c")]))
//!     .unwrap();
//!
//! let descriptors = StaticDescriptors::new().with(
//!     BeanOperations::builder("User")
//!         .assemble(AssembleOperation::new("id", "names").map_whole("name"))
//!         .build()
//!         .unwrap(),
//! );
//!
//! let executor = Executor::new(
//!     registry,
//!     Arc::new(DescriptorCache::new(Arc::new(descriptors))),
//!     Arc::new(DynamicAccessor),
//! );
//!
//! let users: Vec<_> = (1..=4)
//!     .map(|id| Entity::new("User").with("id", id).with("name", Value::Null).into_ref())
//!     .collect();
//! executor.execute(&users, None).unwrap();
//!
//! assert_eq!(users[0].get("name").unwrap(), Some(Value::from("a")));
//! assert_eq!(users[3].get("name").unwrap(), Some(Value::Null));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data model
pub mod entity;
pub mod error;
pub mod value;

// Descriptors and access
pub mod accessor;
pub mod descriptor;
pub mod operation;

// Sources
pub mod cache;
pub mod container;

// Execution
pub mod executor;

// Re-export primary types at crate root for convenience
pub use accessor::{ChainAccessor, DynamicAccessor, PropertyAccessor, SchemaAccessor};
pub use cache::{Cache, CacheManager, CacheableContainer, MapCache, MapCacheManager};
pub use container::{
    interceptor_fn, CacheInterceptor, Container, ContainerRegistry, EmptyContainer, FnContainer,
    FnInterceptor, KeySet, MapContainer, RegistrationInterceptor, RegistrationLogger, SourceMap,
    EMPTY_NAMESPACE,
};
pub use descriptor::{DescriptorCache, DescriptorProvider, StaticDescriptors};
pub use entity::{Entity, EntityRef, TypeName};
pub use error::{
    AccessError, CacheError, ExecutionError, FetchError, JoineryError, JoineryResult, ParseError,
    RegistryError,
};
pub use executor::{
    AssembleExecution, ExecuteOptions, ExecutionId, ExecutionReport, Executor, ExecutorConfig,
};
pub use operation::{
    AssembleOperation, BeanOperations, BeanOperationsBuilder, DisassembleOperation, GroupFilter,
    MappingKind, NestedOperations, PropertyMapping,
};
pub use value::{Key, KeyType, Value};
