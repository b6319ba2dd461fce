//! Error types for Joinery.
//!
//! All errors in Joinery are strongly typed using thiserror.
//! Structural problems (a missing accessor, an unknown container) are errors;
//! absent data never is.

use thiserror::Error;

use crate::entity::TypeName;

/// Errors raised while building an operation descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Property mapping on '{type_name}' has an empty target field")]
    EmptyMappingTarget {
        type_name: TypeName,
    },

    #[error("Assemble operation on '{type_name}.{key}' maps target field '{field}' more than once")]
    ConflictingMapping {
        type_name: TypeName,
        key: String,
        field: String,
    },

    #[error("Field '{type_name}.{key}' is declared by more than one disassemble operation")]
    DuplicateDisassembleKey {
        type_name: TypeName,
        key: String,
    },

    #[error("Field '{type_name}.{key}' cannot be both an assemble key and a disassemble key")]
    ConflictingKey {
        type_name: TypeName,
        key: String,
    },

    #[error("Many-to-many operation on '{type_name}.{key}' has an empty key separator")]
    EmptySeparator {
        type_name: TypeName,
        key: String,
    },

    #[error("Descriptor for '{type_name}' is invalid: {reason}")]
    Invalid {
        type_name: TypeName,
        reason: String,
    },
}

/// Errors raised by a `PropertyAccessor`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("Type '{type_name}' has no accessible field '{field}'")]
    MissingField {
        type_name: TypeName,
        field: String,
    },

    #[error("Field '{type_name}.{field}' holds a {found} where an entity or list was expected")]
    NotNested {
        type_name: TypeName,
        field: String,
        found: &'static str,
    },

    #[error("Cannot read field '{field}' from a {found} source value")]
    NotAnEntity {
        field: String,
        found: &'static str,
    },

    #[error("Key value {value} on '{type_name}.{field}' cannot be used as a {expected} key")]
    InvalidKey {
        type_name: TypeName,
        field: String,
        value: String,
        expected: &'static str,
    },

    #[error("Entity lock poisoned while accessing '{type_name}'")]
    Poisoned {
        type_name: TypeName,
    },
}

/// Failure reported by a container's batch fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FetchError {
    message: String,
}

impl FetchError {
    /// Creates a fetch error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message reported by the container.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors raised while changing the container registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Namespace '{namespace}' is reserved for the identity container")]
    ReservedNamespace {
        namespace: String,
    },
}

/// Errors raised by a cache backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Cache '{name}' lock poisoned")]
    Poisoned {
        name: String,
    },

    #[error("Cache '{name}' backend error: {message}")]
    Backend {
        name: String,
        message: String,
    },
}

impl From<CacheError> for FetchError {
    fn from(err: CacheError) -> Self {
        Self::new(err.to_string())
    }
}

/// Execution errors that occur while running an enrichment call.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Container not found: '{namespace}'")]
    ContainerNotFound {
        namespace: String,
    },

    #[error("Fetch from container '{namespace}' failed: {source}")]
    Fetch {
        namespace: String,
        #[source]
        source: FetchError,
    },

    #[error("Fetch queue full (capacity: {capacity})")]
    QueueFull {
        capacity: usize,
    },

    #[error("Fetch pool disconnected")]
    Disconnected,
}

/// Top-level error type for Joinery.
#[derive(Debug, Error)]
pub enum JoineryError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl JoineryError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a container-not-found error.
    #[must_use]
    pub fn container_not_found(namespace: impl Into<String>) -> Self {
        Self::Execution(ExecutionError::ContainerNotFound {
            namespace: namespace.into(),
        })
    }

    /// Returns true if this is a descriptor parse error.
    #[must_use]
    pub const fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }

    /// Returns true if this is a property access error.
    #[must_use]
    pub const fn is_access(&self) -> bool {
        matches!(self, Self::Access(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is a registry error.
    #[must_use]
    pub const fn is_registry(&self) -> bool {
        matches!(self, Self::Registry(_))
    }

    /// Returns true if this is a cache error.
    #[must_use]
    pub const fn is_cache(&self) -> bool {
        matches!(self, Self::Cache(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if retrying the same call may succeed.
    ///
    /// Only transient pool saturation qualifies; fetch failures belong to the
    /// container's own retry policy.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::QueueFull { .. }))
    }
}

/// Result type alias for Joinery operations.
pub type JoineryResult<T> = Result<T, JoineryError>;
