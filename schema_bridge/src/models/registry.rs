//! Model registry for SchemaBridge
//!
//! This module discovers `#[derive(Record)]` structs by scanning Rust source
//! files, so DDL can be generated without compiling the crate that defines
//! them. Types are mapped by name, the way they are spelled in the source.

use glob::Pattern;
use indexmap::IndexMap;
use quote::ToTokens;
use std::path::{Path, PathBuf};
use syn::{parse_file, Attribute, Fields, GenericArgument, Item, ItemStruct, LitStr, PathArguments, Type};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::ModelsConfig;
use crate::error::{Error, Result};
use crate::models::record::{default_table_name, descriptors_for, FieldShape, NestedTarget, RecordShape};
use crate::schema::types::{RecordDescriptor, SemanticType};

/// Information about a registered model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub file_path: PathBuf,
    pub shape: RecordShape,
}

/// Registry for models found in source files
pub struct ModelRegistry {
    models: IndexMap<String, ModelInfo>,
    config: ModelsConfig,
}

impl ModelRegistry {
    /// Create a new model registry
    pub fn new(config: &ModelsConfig) -> Self {
        Self {
            models: IndexMap::new(),
            config: config.clone(),
        }
    }

    /// Scan the configured paths for model definitions and register them
    pub fn scan_and_register(&mut self) -> Result<()> {
        let exclude = self
            .config
            .exclude_paths
            .clone()
            .unwrap_or_default()
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|e| Error::ConfigError(format!("Invalid exclude pattern '{}': {}", p, e)))
            })
            .collect::<Result<Vec<Pattern>>>()?;

        for path in self.config.paths.clone() {
            let base_path = Path::new(&path);
            if !base_path.exists() {
                return Err(Error::ModelRegistrationError(format!("Path does not exist: {}", path)));
            }

            let mut walker = WalkDir::new(base_path).follow_links(true).sort_by_file_name();
            if !self.config.recursive_scan {
                walker = walker.max_depth(1);
            }

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(error = %e, "Skipping unreadable path");
                        continue;
                    }
                };
                let file_path = entry.path();
                if is_excluded(file_path, &exclude) {
                    debug!(path = %file_path.display(), "Skipping excluded path");
                    continue;
                }
                if file_path.is_file() && file_path.extension().map_or(false, |ext| ext == "rs") {
                    let source = std::fs::read_to_string(file_path)?;
                    self.register_source(file_path, &source)?;
                }
            }
        }

        info!(models = self.models.len(), "Model scan complete");
        Ok(())
    }

    /// Register every record struct defined in `source`
    pub fn register_source(&mut self, file_path: &Path, source: &str) -> Result<()> {
        let syntax = parse_file(source)
            .map_err(|e| Error::SyntaxError(format!("Failed to parse {}: {}", file_path.display(), e)))?;
        self.register_items(file_path, &syntax.items)
    }

    fn register_items(&mut self, file_path: &Path, items: &[Item]) -> Result<()> {
        for item in items {
            match item {
                Item::Struct(item_struct) if derives_record(file_path, item_struct) => {
                    self.register_model(file_path, item_struct)?;
                }
                Item::Mod(module) => {
                    if let Some((_, items)) = &module.content {
                        self.register_items(file_path, items)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Register a model from a struct definition
    fn register_model(&mut self, file_path: &Path, item_struct: &ItemStruct) -> Result<()> {
        let shape = shape_from_struct(item_struct)?;
        let name = shape.rust_name.clone();

        if let Some(existing) = self.models.get(&name) {
            return Err(Error::ModelRegistrationError(format!(
                "Model '{}' is defined in both {} and {}",
                name,
                existing.file_path.display(),
                file_path.display()
            )));
        }

        debug!(model = %name, table = %shape.name, path = %file_path.display(), "Registered model");
        self.models.insert(
            name.clone(),
            ModelInfo {
                name,
                file_path: file_path.to_owned(),
                shape,
            },
        );
        Ok(())
    }

    /// Shapes of all registered models, in discovery order
    pub fn shapes(&self) -> Vec<RecordShape> {
        self.models.values().map(|m| m.shape.clone()).collect()
    }

    /// Descriptors of all registered models, nested fields resolved by name
    pub fn to_descriptors(&self) -> Result<Vec<RecordDescriptor>> {
        descriptors_for(&self.shapes())
    }

    /// Get all registered models
    pub fn get_models(&self) -> &IndexMap<String, ModelInfo> {
        &self.models
    }

    /// Get a specific model by name
    pub fn get_model(&self, name: &str) -> Option<&ModelInfo> {
        self.models.get(name)
    }
}

fn is_excluded(path: &Path, patterns: &[Pattern]) -> bool {
    patterns.iter().any(|pattern| {
        pattern.matches_path(path) || path.ancestors().any(|ancestor| pattern.matches_path(ancestor))
    })
}

/// Check whether a `#[derive(...)]` list names `Record`
fn derives_record(file_path: &Path, item_struct: &ItemStruct) -> bool {
    item_struct.attrs.iter().filter(|a| a.path().is_ident("derive")).any(|attr| {
        let mut found = false;
        let parsed = attr.parse_nested_meta(|meta| {
            if meta.path.segments.last().map_or(false, |s| s.ident == "Record") {
                found = true;
            }
            Ok(())
        });
        if let Err(e) = parsed {
            warn!(
                path = %file_path.display(),
                model = %item_struct.ident,
                error = %e,
                "Skipping struct with an unreadable derive list"
            );
            return false;
        }
        found
    })
}

fn shape_from_struct(item_struct: &ItemStruct) -> Result<RecordShape> {
    let rust_name = item_struct.ident.to_string();
    let mut table = None;
    let mut view = false;

    for attr in item_struct.attrs.iter().filter(|a| a.path().is_ident("record")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                table = Some(value.value());
            } else if meta.path.is_ident("view") {
                view = true;
            } else {
                return Err(meta.error("unsupported record attribute"));
            }
            Ok(())
        })
        .map_err(|e| Error::ModelRegistrationError(format!("{}: {}", rust_name, e)))?;
    }

    let mut shape = RecordShape::new(
        &table.unwrap_or_else(|| default_table_name(&rust_name)),
        &rust_name,
    );
    shape.view = view;

    let Fields::Named(fields) = &item_struct.fields else {
        return Err(Error::ModelRegistrationError(format!(
            "Only named fields are supported in struct: {}",
            rust_name
        )));
    };

    for field in &fields.named {
        let Some(ident) = &field.ident else {
            continue;
        };
        let field_shape = field_shape(&rust_name, &ident.to_string(), &field.ty, &field.attrs)?;
        shape.fields.push(field_shape);
    }

    Ok(shape)
}

fn field_shape(record: &str, name: &str, ty: &Type, attrs: &[Attribute]) -> Result<FieldShape> {
    let mut primary_key = false;
    let mut unique = false;
    let mut has_default = false;
    let mut nested = false;
    let mut references = None;
    let mut rename = None;

    for attr in attrs.iter().filter(|a| a.path().is_ident("record")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("primary_key") {
                primary_key = true;
            } else if meta.path.is_ident("unique") {
                unique = true;
            } else if meta.path.is_ident("default") {
                has_default = true;
            } else if meta.path.is_ident("nested") {
                nested = true;
            } else if meta.path.is_ident("references") {
                let value: LitStr = meta.value()?.parse()?;
                references = Some(value.value());
            } else if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                rename = Some(value.value());
            } else {
                return Err(meta.error("unsupported record attribute"));
            }
            Ok(())
        })
        .map_err(|e| Error::ModelRegistrationError(format!("{}.{}: {}", record, name, e)))?;
    }

    let name = name.trim_start_matches("r#");
    let (optional, inner) = match unwrap_type(ty, "Option") {
        Some(inner) => (true, inner),
        None => (false, ty),
    };

    let mut shape = if nested {
        let target = unwrap_type(inner, "Box").unwrap_or(inner);
        FieldShape::nested(name, NestedTarget::named(&last_segment(target)))
    } else {
        let semantic_type = semantic_type_for(inner).ok_or_else(|| {
            Error::ModelRegistrationError(format!(
                "{}.{}: no column type for Rust type `{}`",
                record,
                name,
                inner.to_token_stream()
            ))
        })?;
        FieldShape::scalar(name, semantic_type)
    };

    shape = shape.optional(optional);
    if let Some(column) = &rename {
        shape = shape.column(column);
    }
    if has_default {
        shape = shape.with_default();
    }
    if primary_key {
        shape = shape.primary_key();
    }
    if unique {
        shape = shape.unique();
    }
    if let Some(reference) = references {
        let (table, column) = reference.rsplit_once('.').ok_or_else(|| {
            Error::ModelRegistrationError(format!(
                "{}.{}: references must be \"Table.column\", got \"{}\"",
                record, name, reference
            ))
        })?;
        shape = shape.references(table, column);
    }

    Ok(shape)
}

fn unwrap_type<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first() {
        Some(GenericArgument::Type(inner)) if args.args.len() == 1 => Some(inner),
        _ => None,
    }
}

fn last_segment(ty: &Type) -> String {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|s| s.ident.to_string())
            .unwrap_or_default(),
        other => other.to_token_stream().to_string(),
    }
}

/// Semantic type of a scalar Rust type, by name
fn semantic_type_for(ty: &Type) -> Option<SemanticType> {
    if let Some(inner) = unwrap_type(ty, "Vec") {
        return (last_segment(inner) == "u8").then_some(SemanticType::Binary);
    }
    if let Type::Reference(reference) = ty {
        return (last_segment(&reference.elem) == "str").then_some(SemanticType::Text);
    }

    match last_segment(ty).as_str() {
        "i8" | "i16" | "i32" | "i64" | "u8" | "u16" | "u32" => Some(SemanticType::Integer),
        "f32" | "f64" => Some(SemanticType::Float),
        "String" => Some(SemanticType::Text),
        "bool" => Some(SemanticType::Boolean),
        "NaiveDate" => Some(SemanticType::Date),
        "NaiveDateTime" => Some(SemanticType::DateTime),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::FieldDescriptor;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = r#"
        use schema_bridge::Record;

        #[derive(Debug, Record)]
        pub struct UserRow {
            #[record(primary_key)]
            pub id: i64,
            #[record(default)]
            pub name: String,
        }

        pub mod accounts {
            #[derive(Debug, Clone, schema_bridge::Record)]
            #[record(table = "CheckingAccount")]
            pub struct Checking {
                #[record(primary_key)]
                pub id: i64,
                #[record(nested)]
                pub user: Box<super::UserRow>,
                pub balance: f64,
                #[record(rename = "opened")]
                pub opened_on: Option<chrono::NaiveDate>,
            }
        }

        pub struct NotAModel {
            pub id: i64,
        }
    "#;

    #[test]
    fn test_register_source() {
        let mut registry = ModelRegistry::new(&ModelsConfig::default());
        registry.register_source(Path::new("models.rs"), SOURCE).unwrap();

        assert_eq!(registry.get_models().len(), 2);
        assert_eq!(registry.get_model("UserRow").unwrap().shape.name, "User");

        let descriptors = registry.to_descriptors().unwrap();
        assert_eq!(
            descriptors[1],
            RecordDescriptor::new("CheckingAccount")
                .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key())
                .with_field(FieldDescriptor::new("user_id", SemanticType::Integer).references("User", "id"))
                .with_field(FieldDescriptor::new("balance", SemanticType::Float))
                .with_field(FieldDescriptor::new("opened", SemanticType::Date).nullable(true))
        );
    }

    #[test]
    fn test_unsupported_field_type() {
        let mut registry = ModelRegistry::new(&ModelsConfig::default());
        let result = registry.register_source(
            Path::new("bad.rs"),
            "#[derive(Record)] struct Bad { id: std::collections::HashMap<String, String> }",
        );
        assert!(matches!(result, Err(Error::ModelRegistrationError(_))));
    }

    #[test]
    fn test_duplicate_model_names() {
        let mut registry = ModelRegistry::new(&ModelsConfig::default());
        let source = "#[derive(Record)] struct A { #[record(primary_key)] id: i64 }";
        registry.register_source(Path::new("a.rs"), source).unwrap();
        assert!(registry.register_source(Path::new("b.rs"), source).is_err());
    }

    #[test]
    fn test_unreadable_derive_list_is_skipped() {
        let mut registry = ModelRegistry::new(&ModelsConfig::default());
        let source = r#"
            #[derive(Debug = "odd", Record)]
            struct Odd { #[record(primary_key)] id: i64 }

            #[derive(Record)]
            struct Even { #[record(primary_key)] id: i64 }
        "#;
        registry.register_source(Path::new("odd.rs"), source).unwrap();

        assert!(registry.get_model("Odd").is_none());
        assert!(registry.get_model("Even").is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_continues_past_broken_links() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("models.rs"),
            "#[derive(Record)] struct Kept { #[record(primary_key)] id: i64 }",
        )
        .unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing.rs"), dir.path().join("dangling.rs")).unwrap();

        let config = ModelsConfig {
            paths: vec![dir.path().to_string_lossy().into_owned()],
            exclude_paths: None,
            recursive_scan: true,
        };
        let mut registry = ModelRegistry::new(&config);
        registry.scan_and_register().unwrap();

        assert_eq!(registry.get_models().len(), 1);
        assert!(registry.get_model("Kept").is_some());
    }
}
