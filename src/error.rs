//! Error taxonomy shared by every layer of the crate.
//!
//! All operations propagate synchronously to the caller; there are no internal
//! retries. Trigger vetoes are not errors and never surface here.

use thiserror::Error;

/// Errors raised by the registry, entities, collections and adapters
#[derive(Debug, Error)]
pub enum OrmError {
    /// A row looked up by id does not exist
    #[error("{kind} with id {id} not found")]
    NotFound { kind: String, id: i64 },

    /// A `BelongsTo` foreign key points at a missing row
    #[error("related {related} #{id} referenced by {kind}.{foreign_key} is missing")]
    RelatedMissing {
        kind: String,
        related: String,
        foreign_key: String,
        id: i64,
    },

    /// The entity kind was never declared on the registry
    #[error("class {0} is unknown")]
    UnknownClass(String),

    /// The kind maps to a table missing from the store
    #[error("table {table} for class {kind} is unknown")]
    UnknownTable { kind: String, table: String },

    /// No relation is declared between the two kinds
    #[error("no relation between {from} and {to}")]
    RelationUndefined { from: String, to: String },

    /// Two distinct kinds both declare `HasMany` of each other
    #[error("ambiguous reciprocal has-many relation between {0} and {1}")]
    AmbiguousRelation(String, String),

    /// A caller passed a value of the wrong shape or kind
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Attempt to assign a field that can never be changed
    #[error("field {field} of {kind} is immutable")]
    ImmutableField { kind: String, field: String },

    /// Unparsable condition, or a raw SQL condition evaluated in memory
    #[error("condition error: {0}")]
    ConditionParse(String),

    /// Failure reported by the database driver
    #[error("database error: {message} [{statement}]")]
    Driver { message: String, statement: String },

    /// Failure reported by a cache provider
    #[error("cache error: {0}")]
    Cache(String),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrmError {
    /// Build a driver error carrying the offending statement
    pub fn driver(message: impl Into<String>, statement: impl Into<String>) -> Self {
        OrmError::Driver {
            message: message.into(),
            statement: statement.into(),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, OrmError>;
