//! Models module for SchemaBridge
//!
//! This module handles record reflection and model discovery.

pub mod record;
pub mod registry;

// Re-export key types
pub use record::{
    descriptors_for, FieldKind, FieldShape, NestedTarget, RecordModel, RecordShape, ScalarField,
};
pub use registry::{ModelInfo, ModelRegistry};
