//! Error types for SchemaBridge

use thiserror::Error;

use crate::schema::types::Dialect;

/// Result type for SchemaBridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for SchemaBridge
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported type '{type_name}' for dialect {dialect}")]
    UnsupportedType { type_name: String, dialect: Dialect },

    #[error("Malformed DDL ({reason}): {statement}")]
    MalformedDdl { reason: String, statement: String },

    #[error("Cyclic schema: {}", .cycle.join(" -> "))]
    CyclicSchema { cycle: Vec<String> },

    #[error("Column {table}.{column} references unknown target '{target}'")]
    UnknownReference {
        table: String,
        column: String,
        target: String,
    },

    #[error("Identifier collision in {scope} on '{name}': {reason}")]
    IdentifierCollision {
        scope: String,
        name: String,
        reason: String,
    },

    #[error("Introspection failure while {context}: {source}")]
    IntrospectionFailure {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Record '{record}' has no primary key to reference from field '{field}'")]
    MissingPrimaryKey { record: String, field: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Model registration error: {0}")]
    ModelRegistrationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Syntax error: {0}")]
    SyntaxError(String),

    #[error("Cannot decode column '{column}' as {expected}")]
    DecodeError { column: String, expected: String },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>, statement: impl Into<String>) -> Self {
        Error::MalformedDdl {
            reason: reason.into(),
            statement: statement.into(),
        }
    }
}

/// Convert Serde JSON errors to SchemaBridge errors
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert YAML errors to SchemaBridge errors
impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert TOML deserialization errors to SchemaBridge errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}
