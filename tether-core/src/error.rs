//! Error types for Tether operations

use crate::EntityKind;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity {entity} has no primary key field")]
    NoPrimaryKey { entity: String },

    #[error("Cannot {operation} {entity}: primary key is not assigned")]
    MissingId { entity: String, operation: String },

    #[error("Insert failed for {entity}: {reason}")]
    InsertFailed { entity: String, reason: String },

    #[error("Update failed for {entity} with key {key}: {reason}")]
    UpdateFailed {
        entity: String,
        key: String,
        reason: String,
    },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Object cache binding errors.
///
/// Every variant is an invalid-argument failure: the caller handed a cache to
/// an entity type it does not serve.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("Object cache is already bound to {bound}, cannot bind it to {requested}")]
    AlreadyBound {
        bound: EntityKind,
        requested: EntityKind,
    },

    #[error("Object cache is not bound to any entity type (requested {requested})")]
    NotBound { requested: EntityKind },

    #[error("Object cache belongs to {bound}, not {requested}")]
    TypeMismatch {
        bound: EntityKind,
        requested: EntityKind,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Tether errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TetherError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid argument: {0}")]
    Binding(#[from] BindingError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl TetherError {
    /// True for caller mistakes such as handing a cache to the wrong entity type.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, TetherError::Binding(_))
    }

    /// True for failures raised by (or on behalf of) the storage layer.
    pub fn is_storage(&self) -> bool {
        matches!(self, TetherError::Storage(_))
    }
}

/// Result type alias for Tether operations.
pub type TetherResult<T> = Result<T, TetherError>;

// =============================================================================
// TESTS
// =============================================================================
