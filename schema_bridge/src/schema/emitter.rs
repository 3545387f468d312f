//! Descriptor-to-source emitter
//!
//! Renders record descriptors as Rust structs deriving `Record`, so a schema
//! recovered from DDL or a live database can be checked into a crate and used
//! with the read/write helpers.

use std::fmt::{self, Write as _};
use tracing::debug;

use crate::error::{Error, Result};
use crate::schema::types::{FieldDescriptor, RecordDescriptor, SemanticType};
use crate::utils::naming::{field_name_for_column, find_identifier_conflict, struct_name_for_table};

/// First line of every emitted file
pub const GENERATED_MARKER: &str = "// @generated by schema_bridge. Do not edit by hand.";

/// Rust type used for a semantic type in emitted structs
pub fn rust_type(semantic_type: SemanticType) -> &'static str {
    match semantic_type {
        SemanticType::Integer => "i64",
        SemanticType::Float => "f64",
        SemanticType::Text => "String",
        SemanticType::Boolean => "bool",
        SemanticType::Date => "chrono::NaiveDate",
        SemanticType::DateTime => "chrono::NaiveDateTime",
        SemanticType::Binary => "Vec<u8>",
    }
}

/// Emits Rust source for a set of descriptors
#[derive(Debug, Clone)]
pub struct SourceEmitter {
    derives: Vec<String>,
}

impl Default for SourceEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceEmitter {
    pub fn new() -> Self {
        Self {
            derives: vec!["Debug".to_string(), "Clone".to_string(), "PartialEq".to_string()],
        }
    }

    /// Add a derive (for example `serde::Serialize`) ahead of `Record`
    pub fn with_derive(mut self, derive: &str) -> Self {
        self.derives.push(derive.to_string());
        self
    }

    /// Render every descriptor, in order, as one source file
    pub fn emit(&self, descriptors: &[RecordDescriptor]) -> Result<String> {
        let struct_names: Vec<String> = descriptors.iter().map(|d| struct_name_for_table(&d.name)).collect();
        if let Some((first, second)) = find_identifier_conflict(&struct_names, false) {
            return Err(Error::IdentifierCollision {
                scope: "module".to_string(),
                name: struct_names[second].clone(),
                reason: format!(
                    "tables '{}' and '{}' map to the same struct",
                    descriptors[first].name, descriptors[second].name
                ),
            });
        }

        let mut out = String::new();
        out.push_str(GENERATED_MARKER);
        out.push_str("\n\nuse schema_bridge::Record;\n");

        for (descriptor, struct_name) in descriptors.iter().zip(&struct_names) {
            let field_names: Vec<String> = descriptor.fields.iter().map(|f| field_name_for_column(&f.name)).collect();
            if let Some((first, second)) = find_identifier_conflict(&field_names, false) {
                return Err(Error::IdentifierCollision {
                    scope: struct_name.clone(),
                    name: field_names[second].clone(),
                    reason: format!(
                        "columns '{}' and '{}' map to the same field",
                        descriptor.fields[first].name, descriptor.fields[second].name
                    ),
                });
            }

            debug!(table = %descriptor.name, struct_name = %struct_name, "Emitting struct");
            out.push('\n');
            self.write_struct(&mut out, struct_name, descriptor, &field_names)
                .map_err(|e| Error::SerializationError(format!("failed to render '{}': {}", descriptor.name, e)))?;
        }

        // Anything we cannot parse back is a bug in the emitter, not in the input
        syn::parse_file(&out).map_err(|e| Error::SyntaxError(format!("emitted source does not parse: {}", e)))?;

        Ok(out)
    }

    fn write_struct(
        &self,
        out: &mut String,
        struct_name: &str,
        descriptor: &RecordDescriptor,
        field_names: &[String],
    ) -> fmt::Result {
        writeln!(out, "#[derive({}, Record)]", self.derives.join(", "))?;
        if descriptor.view {
            writeln!(out, "#[record(table = {:?}, view)]", descriptor.name)?;
        } else {
            writeln!(out, "#[record(table = {:?})]", descriptor.name)?;
        }
        writeln!(out, "pub struct {} {{", struct_name)?;

        for (field, field_name) in descriptor.fields.iter().zip(field_names) {
            let attributes = field_attributes(field, field_name);
            if !attributes.is_empty() {
                writeln!(out, "    #[record({})]", attributes.join(", "))?;
            }

            let ty = rust_type(field.semantic_type);
            if field.nullable {
                writeln!(out, "    pub {}: Option<{}>,", field_name, ty)?;
            } else {
                writeln!(out, "    pub {}: {},", field_name, ty)?;
            }
        }

        writeln!(out, "}}")
    }
}

fn field_attributes(field: &FieldDescriptor, field_name: &str) -> Vec<String> {
    let mut attributes = Vec::new();
    if field.is_primary_key {
        attributes.push("primary_key".to_string());
    }
    if field.unique {
        attributes.push("unique".to_string());
    }
    if let Some(reference) = &field.references {
        attributes.push(format!("references = {:?}", reference.to_string()));
    }
    if field_name != field.name {
        attributes.push(format!("rename = {:?}", field.name));
    }
    attributes
}

/// Render descriptors with the default emitter
pub fn emit_models(descriptors: &[RecordDescriptor]) -> Result<String> {
    SourceEmitter::new().emit(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_emits_portfolio_struct() {
        let descriptors = vec![
            RecordDescriptor::new("Portfolio")
                .with_field(FieldDescriptor::new("sedol", SemanticType::Text).primary_key())
                .with_field(FieldDescriptor::new("cluster", SemanticType::Text).nullable(true)),
            RecordDescriptor::new("Holding")
                .with_field(FieldDescriptor::new("Id", SemanticType::Integer).primary_key())
                .with_field(FieldDescriptor::new("sedol", SemanticType::Text).references("Portfolio", "sedol"))
                .with_field(FieldDescriptor::new("type", SemanticType::Text).unique())
                .with_field(FieldDescriptor::new("AsOf", SemanticType::Date).nullable(true)),
            RecordDescriptor::view("master")
                .with_field(FieldDescriptor::new("sedol", SemanticType::Text)),
        ];

        let expected = r#"// @generated by schema_bridge. Do not edit by hand.

use schema_bridge::Record;

#[derive(Debug, Clone, PartialEq, Record)]
#[record(table = "Portfolio")]
pub struct PortfolioRow {
    #[record(primary_key)]
    pub sedol: String,
    pub cluster: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Record)]
#[record(table = "Holding")]
pub struct HoldingRow {
    #[record(primary_key, rename = "Id")]
    pub id: i64,
    #[record(references = "Portfolio.sedol")]
    pub sedol: String,
    #[record(unique, rename = "type")]
    pub type_: String,
    #[record(rename = "AsOf")]
    pub as_of: Option<chrono::NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Record)]
#[record(table = "master", view)]
pub struct MasterRow {
    pub sedol: String,
}
"#;

        assert_eq!(emit_models(&descriptors).unwrap(), expected);
    }

    #[test]
    fn test_field_collision() {
        let descriptors = vec![RecordDescriptor::new("t")
            .with_field(FieldDescriptor::new("user name", SemanticType::Text))
            .with_field(FieldDescriptor::new("user_name", SemanticType::Text))];

        match emit_models(&descriptors) {
            Err(Error::IdentifierCollision { scope, name, .. }) => {
                assert_eq!(scope, "TRow");
                assert_eq!(name, "user_name");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_struct_collision() {
        let descriptors = vec![RecordDescriptor::new("order_item"), RecordDescriptor::new("OrderItem")];
        assert!(matches!(
            emit_models(&descriptors),
            Err(Error::IdentifierCollision { .. })
        ));
    }

    #[test]
    fn test_extra_derives() {
        let source = SourceEmitter::new()
            .with_derive("serde::Serialize")
            .emit(&[RecordDescriptor::new("t").with_field(FieldDescriptor::new("x", SemanticType::Binary))])
            .unwrap();
        assert!(source.contains("#[derive(Debug, Clone, PartialEq, serde::Serialize, Record)]"));
        assert!(source.contains("pub x: Vec<u8>,"));
    }
}
