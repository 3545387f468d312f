//! Schema module for SchemaBridge
//!
//! This module maps types between Rust and SQL, generates DDL, and recovers
//! descriptors from DDL text or a live catalog.

pub mod analyzer;
pub mod emitter;
pub mod generator;
pub mod mapping;
pub mod parser;
pub mod types;

// Re-export key types
pub use analyzer::{introspect, SchemaAnalyzer};
pub use emitter::{emit_models, SourceEmitter};
pub use generator::{generate_sql, CreateStatement, DdlGenerator, DdlScript};
pub use mapping::{from_sql_type, to_sql_type};
pub use parser::{parse_ddl, DdlParser};
pub use types::{
    Dialect, FieldDescriptor, ForeignKeyRef, RecordDescriptor, RecoveredSchema, SemanticType,
    SkippedStatement, TypeFallback,
};
