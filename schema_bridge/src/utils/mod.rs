//! Utilities for SchemaBridge
//!
//! This module provides utility functions used across the library.

pub mod logging;
pub mod naming;

// Re-export key utility functions
pub use naming::{
    field_name_for_column, find_identifier_conflict, quote_identifier, sanitize_identifier,
    struct_name_for_table,
};
