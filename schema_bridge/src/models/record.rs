//! Record reflection
//!
//! A record type describes itself as a `RecordShape`: its table name and, per
//! field, the column it maps to, its scalar type or nested record, and its
//! annotations. Shapes come from `#[derive(Record)]` or from the source
//! scanner in `registry`; turning a shape into a `RecordDescriptor` is the
//! same explicit extraction either way.

use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

use crate::db::connection::Row;
use crate::db::value::{FromSqlValue, SqlValue, ToSqlValue};
use crate::error::{Error, Result};
use crate::schema::types::{FieldDescriptor, ForeignKeyRef, RecordDescriptor, SemanticType};

/// The record a nested field points at
#[derive(Clone)]
pub struct NestedTarget {
    /// Rust type name of the target record
    pub name: String,
    /// Shape of the target when known at compile time
    pub shape: Option<fn() -> RecordShape>,
}

impl NestedTarget {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            shape: None,
        }
    }
}

impl fmt::Debug for NestedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedTarget").field("name", &self.name).finish()
    }
}

impl PartialEq for NestedTarget {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// What a field holds
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Scalar(SemanticType),
    /// Another record, lowered to foreign key columns
    Nested(NestedTarget),
}

/// Structural description of one field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldShape {
    /// Rust field name
    pub name: String,
    /// Column name (the field name unless renamed)
    pub column: String,
    pub kind: FieldKind,
    /// Declared as `Option<T>`
    pub optional: bool,
    /// Carries a default value
    pub has_default: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub references: Option<ForeignKeyRef>,
}

impl FieldShape {
    pub fn scalar(name: &str, semantic_type: SemanticType) -> Self {
        Self {
            name: name.to_string(),
            column: name.to_string(),
            kind: FieldKind::Scalar(semantic_type),
            optional: false,
            has_default: false,
            primary_key: false,
            unique: false,
            references: None,
        }
    }

    pub fn nested(name: &str, target: NestedTarget) -> Self {
        Self {
            kind: FieldKind::Nested(target),
            ..Self::scalar(name, SemanticType::Integer)
        }
    }

    pub fn column(mut self, column: &str) -> Self {
        self.column = column.to_string();
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn references(mut self, table: &str, column: &str) -> Self {
        self.references = Some(ForeignKeyRef::new(table, column));
        self
    }

    fn nullable(&self) -> bool {
        self.optional || self.has_default
    }
}

/// Structural description of a record type
#[derive(Debug, Clone, PartialEq)]
pub struct RecordShape {
    /// Table or view name
    pub name: String,
    /// Rust type name
    pub rust_name: String,
    pub view: bool,
    pub fields: Vec<FieldShape>,
}

impl RecordShape {
    pub fn new(name: &str, rust_name: &str) -> Self {
        Self {
            name: name.to_string(),
            rust_name: rust_name.to_string(),
            view: false,
            fields: Vec::new(),
        }
    }

    pub fn as_view(mut self) -> Self {
        self.view = true;
        self
    }

    pub fn with_field(mut self, field: FieldShape) -> Self {
        self.fields.push(field);
        self
    }

    pub fn has_nested_fields(&self) -> bool {
        self.fields.iter().any(|f| matches!(f.kind, FieldKind::Nested(_)))
    }
}

/// Table name for a record type without an explicit one
pub fn default_table_name(rust_name: &str) -> String {
    match rust_name.strip_suffix("Row") {
        Some(base) if !base.is_empty() => base.to_string(),
        _ => rust_name.to_string(),
    }
}

/// Rust types that map onto a single column
pub trait ScalarField: ToSqlValue + FromSqlValue {
    const SEMANTIC_TYPE: SemanticType;
    const NULLABLE: bool = false;
}

macro_rules! scalar_field {
    ($semantic:ident: $($ty:ty),*) => {
        $(
            impl ScalarField for $ty {
                const SEMANTIC_TYPE: SemanticType = SemanticType::$semantic;
            }
        )*
    };
}

scalar_field!(Integer: i8, i16, i32, i64, u8, u16, u32);
scalar_field!(Float: f32, f64);
scalar_field!(Text: String);
scalar_field!(Boolean: bool);
scalar_field!(Date: NaiveDate);
scalar_field!(DateTime: NaiveDateTime);
scalar_field!(Binary: Vec<u8>);

impl<T: ScalarField> ScalarField for Option<T> {
    const SEMANTIC_TYPE: SemanticType = T::SEMANTIC_TYPE;
    const NULLABLE: bool = true;
}

/// A record type that can be provisioned, read and written
///
/// Implemented by `#[derive(Record)]`.
pub trait RecordModel: Sized {
    /// Structural description of this record
    fn shape() -> RecordShape;

    /// Column values in descriptor order, nested records lowered to their keys
    fn to_values(&self) -> Result<Vec<(String, SqlValue)>>;

    /// Build a record from a result row
    fn from_row(row: &Row) -> Result<Self>;

    fn descriptor() -> Result<RecordDescriptor> {
        RecordDescriptor::from_shape(&Self::shape())
    }

    /// Stable identifier of the record: its table or view name
    fn query_name() -> String {
        Self::shape().name
    }
}

impl RecordDescriptor {
    /// Build a descriptor from a shape whose nested targets carry their own
    /// shapes
    pub fn from_shape(shape: &RecordShape) -> Result<Self> {
        Self::from_shape_with(shape, &[])
    }

    /// Build a descriptor, resolving nested targets by Rust name in `known`
    /// when they do not carry a shape
    pub fn from_shape_with(shape: &RecordShape, known: &[RecordShape]) -> Result<Self> {
        let mut descriptor = if shape.view {
            RecordDescriptor::view(&shape.name)
        } else {
            RecordDescriptor::new(&shape.name)
        };

        for field in &shape.fields {
            match &field.kind {
                FieldKind::Scalar(semantic_type) => {
                    descriptor.fields.push(FieldDescriptor {
                        name: field.column.clone(),
                        semantic_type: *semantic_type,
                        nullable: field.nullable() && !field.primary_key,
                        is_primary_key: field.primary_key,
                        unique: field.unique,
                        references: field.references.clone(),
                    });
                }
                FieldKind::Nested(target) => {
                    let target_shape = resolve_target(shape, field, target, known)?;
                    let key = key_columns(&target_shape, known, &mut Vec::new())?;
                    if key.is_empty() {
                        return Err(Error::MissingPrimaryKey {
                            record: target_shape.name.clone(),
                            field: field.name.clone(),
                        });
                    }

                    for (key_column, semantic_type) in key {
                        descriptor.fields.push(FieldDescriptor {
                            name: format!("{}_{}", field.column, key_column),
                            semantic_type,
                            nullable: field.nullable() && !field.primary_key,
                            is_primary_key: field.primary_key,
                            unique: false,
                            references: Some(ForeignKeyRef::new(&target_shape.name, &key_column)),
                        });
                    }
                }
            }
        }

        descriptor.normalize_keys();
        descriptor.validate()?;
        Ok(descriptor)
    }
}

fn resolve_target(
    owner: &RecordShape,
    field: &FieldShape,
    target: &NestedTarget,
    known: &[RecordShape],
) -> Result<RecordShape> {
    if let Some(shape) = target.shape {
        return Ok(shape());
    }
    known
        .iter()
        .find(|s| s.rust_name == target.name || s.name.eq_ignore_ascii_case(&target.name))
        .cloned()
        .ok_or_else(|| Error::UnknownReference {
            table: owner.name.clone(),
            column: field.name.clone(),
            target: target.name.clone(),
        })
}

/// Primary key columns of `shape` after lowering, with their types
///
/// A key that is itself a nested record recurses into that record's key;
/// `path` tracks the records whose keys are being expanded.
fn key_columns(
    shape: &RecordShape,
    known: &[RecordShape],
    path: &mut Vec<String>,
) -> Result<Vec<(String, SemanticType)>> {
    if let Some(start) = path.iter().position(|name| name == &shape.name) {
        let mut cycle = path[start..].to_vec();
        cycle.push(shape.name.clone());
        return Err(Error::CyclicSchema { cycle });
    }
    path.push(shape.name.clone());

    let mut columns = Vec::new();
    for field in shape.fields.iter().filter(|f| f.primary_key) {
        match &field.kind {
            FieldKind::Scalar(semantic_type) => columns.push((field.column.clone(), *semantic_type)),
            FieldKind::Nested(target) => {
                let target_shape = resolve_target(shape, field, target, known)?;
                let inner = key_columns(&target_shape, known, path)?;
                if inner.is_empty() {
                    return Err(Error::MissingPrimaryKey {
                        record: target_shape.name.clone(),
                        field: field.name.clone(),
                    });
                }
                for (column, semantic_type) in inner {
                    columns.push((format!("{}_{}", field.column, column), semantic_type));
                }
            }
        }
    }

    path.pop();
    Ok(columns)
}

/// Build descriptors for a collection of shapes, rejecting duplicate names
pub fn descriptors_for(shapes: &[RecordShape]) -> Result<Vec<RecordDescriptor>> {
    let mut descriptors: Vec<RecordDescriptor> = Vec::with_capacity(shapes.len());
    for shape in shapes {
        if descriptors.iter().any(|d| d.name.eq_ignore_ascii_case(&shape.name)) {
            return Err(Error::ValidationError(format!(
                "Record '{}' is defined more than once",
                shape.name
            )));
        }
        descriptors.push(RecordDescriptor::from_shape_with(shape, shapes)?);
    }
    Ok(descriptors)
}

/// Lower a nested record value to the key columns it is stored as
pub fn nested_key_values<T: RecordModel>(column: &str, value: Option<&T>) -> Result<Vec<(String, SqlValue)>> {
    let target = T::descriptor()?;
    let key = target.primary_key_names();
    if key.is_empty() {
        return Err(Error::MissingPrimaryKey {
            record: target.name,
            field: column.to_string(),
        });
    }

    let values = match value {
        Some(record) => Some(record.to_values()?),
        None => None,
    };

    key.iter()
        .map(|key_column| {
            let name = format!("{}_{}", column, key_column);
            match &values {
                None => Ok((name, SqlValue::Null)),
                Some(values) => values
                    .iter()
                    .find(|(c, _)| c.eq_ignore_ascii_case(key_column))
                    .map(|(_, v)| (name, v.clone()))
                    .ok_or_else(|| Error::DecodeError {
                        column: key_column.clone(),
                        expected: format!("a key value of '{}'", target.name),
                    }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn user() -> RecordShape {
        RecordShape::new("User", "UserRow")
            .with_field(FieldShape::scalar("id", SemanticType::Integer).primary_key())
            .with_field(FieldShape::scalar("name", SemanticType::Text).with_default())
    }

    fn checking_account() -> RecordShape {
        RecordShape::new("CheckingAccount", "CheckingAccountRow")
            .with_field(FieldShape::scalar("id", SemanticType::Integer).primary_key())
            .with_field(FieldShape::nested("user", NestedTarget::named("UserRow")))
            .with_field(FieldShape::scalar("balance", SemanticType::Float))
    }

    #[test]
    fn test_nested_field_lowers_to_key_columns() {
        let descriptors = descriptors_for(&[user(), checking_account()]).unwrap();
        assert_eq!(
            descriptors[0],
            RecordDescriptor::new("User")
                .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key())
                .with_field(FieldDescriptor::new("name", SemanticType::Text).nullable(true))
        );
        assert_eq!(
            descriptors[1],
            RecordDescriptor::new("CheckingAccount")
                .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key())
                .with_field(FieldDescriptor::new("user_id", SemanticType::Integer).references("User", "id"))
                .with_field(FieldDescriptor::new("balance", SemanticType::Float))
        );
    }

    #[test]
    fn test_composite_and_nested_keys() {
        let listing = RecordShape::new("Listing", "Listing")
            .with_field(FieldShape::scalar("exchange", SemanticType::Text).primary_key())
            .with_field(FieldShape::scalar("ticker", SemanticType::Text).primary_key());
        let quote = RecordShape::new("Quote", "Quote")
            .with_field(FieldShape::nested("listing", NestedTarget::named("Listing")).primary_key())
            .with_field(FieldShape::scalar("day", SemanticType::Date).primary_key());
        let fill = RecordShape::new("Fill", "Fill")
            .with_field(FieldShape::nested("quote", NestedTarget::named("Quote")).optional(true));

        let descriptors = descriptors_for(&[listing, quote, fill]).unwrap();
        let names: Vec<_> = descriptors[2].fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["quote_listing_exchange", "quote_listing_ticker", "quote_day"]);
        assert!(descriptors[2].fields.iter().all(|f| f.nullable));
        assert_eq!(
            descriptors[2].fields[0].references,
            Some(ForeignKeyRef::new("Quote", "listing_exchange"))
        );
    }

    #[test]
    fn test_key_cycle_is_detected() {
        let a = RecordShape::new("A", "A").with_field(FieldShape::nested("b", NestedTarget::named("B")).primary_key());
        let b = RecordShape::new("B", "B").with_field(FieldShape::nested("a", NestedTarget::named("A")).primary_key());

        match descriptors_for(&[a, b]) {
            Err(Error::CyclicSchema { cycle }) => assert_eq!(cycle, vec!["B", "A", "B"]),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_self_reference_is_allowed() {
        let node = RecordShape::new("Node", "Node")
            .with_field(FieldShape::scalar("id", SemanticType::Integer).primary_key())
            .with_field(FieldShape::nested("parent", NestedTarget::named("Node")).optional(true));

        let descriptor = RecordDescriptor::from_shape_with(&node, &[node.clone()]).unwrap();
        assert_eq!(descriptor.fields[1].name, "parent_id");
        assert!(descriptor.fields[1].nullable);
    }

    #[test]
    fn test_missing_target_key_and_unknown_target() {
        let keyless = RecordShape::new("Note", "Note").with_field(FieldShape::scalar("body", SemanticType::Text));
        let holder = RecordShape::new("Holder", "Holder").with_field(FieldShape::nested("note", NestedTarget::named("Note")));

        assert!(matches!(
            descriptors_for(&[keyless, holder.clone()]),
            Err(Error::MissingPrimaryKey { .. })
        ));
        assert!(matches!(
            descriptors_for(&[holder]),
            Err(Error::UnknownReference { .. })
        ));
    }

    #[test]
    fn test_duplicate_records_are_rejected() {
        assert!(matches!(
            descriptors_for(&[user(), user()]),
            Err(Error::ValidationError(_))
        ));
    }

    #[test]
    fn test_default_table_name() {
        assert_eq!(default_table_name("PortfolioRow"), "Portfolio");
        assert_eq!(default_table_name("Row"), "Row");
        assert_eq!(default_table_name("Account"), "Account");
    }
}
