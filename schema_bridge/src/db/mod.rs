//! Database module for SchemaBridge
//!
//! This module handles connections, provisioning and record access.

pub mod connection;
pub mod executor;
pub mod read_write;
pub mod value;

// Re-export key types
pub use connection::{DatabaseConnection, Row, SqlConnection};
pub use executor::{provision, setup_database, SqlExecutor};
pub use read_write::{delete_all, get_where, raw_query, write, WriteOptions, WriteSummary};
pub use value::{FromSqlValue, SqlValue, ToSqlValue};
