//! Type definitions for record descriptors and SQL dialects

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// SQL dialect selecting type names, quoting and catalog queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    #[serde(alias = "postgresql")]
    Postgres,
    #[serde(alias = "sqlserver", alias = "tsql")]
    MsSql,
    #[serde(alias = "mariadb")]
    MySql,
}

impl Dialect {
    pub const ALL: [Dialect; 4] = [Dialect::Sqlite, Dialect::Postgres, Dialect::MsSql, Dialect::MySql];

    /// Bind placeholder for the 1-based parameter `index`
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Sqlite | Dialect::MySql => "?".to_string(),
            Dialect::Postgres => format!("${}", index),
            Dialect::MsSql => format!("@P{}", index),
        }
    }

    /// Statement opening an explicit transaction
    pub fn begin_transaction(&self) -> &'static str {
        match self {
            Dialect::Sqlite | Dialect::Postgres => "BEGIN",
            Dialect::MySql => "START TRANSACTION",
            Dialect::MsSql => "BEGIN TRANSACTION",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
            Dialect::MsSql => "mssql",
            Dialect::MySql => "mysql",
        };
        f.write_str(name)
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "mssql" | "sqlserver" | "tsql" => Ok(Dialect::MsSql),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            other => Err(Error::ConfigError(format!("Unknown SQL dialect: {}", other))),
        }
    }
}

/// Scalar kinds a column can carry, independent of any dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Integer,
    Float,
    Text,
    Boolean,
    Date,
    DateTime,
    Binary,
}

impl SemanticType {
    pub const ALL: [SemanticType; 7] = [
        SemanticType::Integer,
        SemanticType::Float,
        SemanticType::Text,
        SemanticType::Boolean,
        SemanticType::Date,
        SemanticType::DateTime,
        SemanticType::Binary,
    ];
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SemanticType::Integer => "integer",
            SemanticType::Float => "float",
            SemanticType::Text => "text",
            SemanticType::Boolean => "boolean",
            SemanticType::Date => "date",
            SemanticType::DateTime => "datetime",
            SemanticType::Binary => "binary",
        };
        f.write_str(name)
    }
}

/// Target of a foreign key column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

impl ForeignKeyRef {
    pub fn new(table: &str, column: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
        }
    }
}

impl fmt::Display for ForeignKeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// One column of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub semantic_type: SemanticType,
    pub nullable: bool,
    pub is_primary_key: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignKeyRef>,
}

impl FieldDescriptor {
    /// Create a non-nullable field with the given name and type
    pub fn new(name: &str, semantic_type: SemanticType) -> Self {
        Self {
            name: name.to_string(),
            semantic_type,
            nullable: false,
            is_primary_key: false,
            unique: false,
            references: None,
        }
    }

    /// Set whether the field is nullable
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Mark the field as part of the primary key
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    /// Mark the field as carrying a single-column UNIQUE constraint
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Point the field at `table.column`
    pub fn references(mut self, table: &str, column: &str) -> Self {
        self.references = Some(ForeignKeyRef::new(table, column));
        self
    }
}

/// A table or view and its ordered fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub view: bool,
}

impl RecordDescriptor {
    /// Create a new table descriptor with no fields
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            view: false,
        }
    }

    /// Create a new view descriptor with no fields
    pub fn view(name: &str) -> Self {
        Self {
            view: true,
            ..Self::new(name)
        }
    }

    /// Return a copy of this descriptor with `field` appended
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Look a field up by name, ignoring ASCII case
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Fields forming the primary key, in declaration order
    pub fn primary_key(&self) -> Vec<&FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_primary_key).collect()
    }

    /// Names of the primary key columns, in declaration order
    pub fn primary_key_names(&self) -> Vec<String> {
        self.primary_key().into_iter().map(|f| f.name.clone()).collect()
    }

    /// Bring key flags to one canonical form
    ///
    /// Primary key columns are never nullable, and a single-column primary key
    /// does not also carry `unique`.
    pub fn normalize_keys(&mut self) {
        let single_key = self.fields.iter().filter(|f| f.is_primary_key).count() == 1;
        for field in self.fields.iter_mut().filter(|f| f.is_primary_key) {
            field.nullable = false;
            if single_key {
                field.unique = false;
            }
        }
    }

    /// True when `field` is the whole primary key on its own
    pub fn is_sole_key(&self, field: &FieldDescriptor) -> bool {
        field.is_primary_key && self.fields.iter().filter(|f| f.is_primary_key).count() == 1
    }

    /// Check the descriptor invariants
    pub fn validate(&self) -> Result<()> {
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name.eq_ignore_ascii_case(&field.name)) {
                return Err(Error::ValidationError(format!(
                    "Duplicate field '{}' in record '{}'",
                    field.name, self.name
                )));
            }
            if field.is_primary_key && field.nullable {
                return Err(Error::ValidationError(format!(
                    "Primary key field '{}.{}' cannot be nullable",
                    self.name, field.name
                )));
            }
            if self.view && (field.is_primary_key || field.references.is_some()) {
                return Err(Error::ValidationError(format!(
                    "View '{}' cannot carry constraints (field '{}')",
                    self.name, field.name
                )));
            }
        }
        Ok(())
    }
}

/// Find a descriptor by name, ignoring ASCII case
pub fn find_descriptor<'a>(
    descriptors: &'a [RecordDescriptor],
    name: &str,
) -> Option<&'a RecordDescriptor> {
    descriptors.iter().find(|d| d.name.eq_ignore_ascii_case(name))
}

/// A column whose type name could not be mapped and fell back to text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeFallback {
    pub table: String,
    pub column: String,
    pub raw_type: String,
}

/// A statement that was recognised but not turned into a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedStatement {
    pub kind: String,
    pub statement: String,
}

/// Descriptors recovered from DDL text or a live catalog, with everything
/// that had to be degraded along the way
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveredSchema {
    pub descriptors: Vec<RecordDescriptor>,
    #[serde(default)]
    pub fallbacks: Vec<TypeFallback>,
    #[serde(default)]
    pub skipped: Vec<SkippedStatement>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl RecoveredSchema {
    /// True when nothing was degraded, skipped or warned about
    pub fn is_clean(&self) -> bool {
        self.fallbacks.is_empty() && self.skipped.is_empty() && self.warnings.is_empty()
    }

    /// Look a recovered descriptor up by name, ignoring ASCII case
    pub fn descriptor(&self, name: &str) -> Option<&RecordDescriptor> {
        find_descriptor(&self.descriptors, name)
    }
}

/// A foreign key whose referenced columns still have to be filled in from the
/// target's primary key
#[derive(Debug, Clone)]
pub(crate) struct PendingReference {
    pub table: String,
    pub columns: Vec<String>,
    pub target: String,
}

/// Point pending foreign keys at their target's primary key. Unresolvable ones
/// are left without a reference and reported as warnings.
pub(crate) fn resolve_pending_references(
    descriptors: &mut [RecordDescriptor],
    pending: Vec<PendingReference>,
    warnings: &mut Vec<String>,
) {
    for reference in pending {
        let target_key = find_descriptor(descriptors, &reference.target).map(|d| d.primary_key_names());

        let key = match target_key {
            Some(key) if key.len() == reference.columns.len() => key,
            Some(_) => {
                warnings.push(format!(
                    "Foreign key {}({}) does not match the primary key of '{}'; reference dropped",
                    reference.table,
                    reference.columns.join(", "),
                    reference.target
                ));
                continue;
            }
            None => {
                warnings.push(format!(
                    "Foreign key {}({}) names no columns of '{}', which is not part of this schema; reference dropped",
                    reference.table,
                    reference.columns.join(", "),
                    reference.target
                ));
                continue;
            }
        };

        let Some(table) = descriptors
            .iter_mut()
            .find(|d| d.name.eq_ignore_ascii_case(&reference.table))
        else {
            continue;
        };

        for (column, target_column) in reference.columns.iter().zip(key) {
            if let Some(field) = table
                .fields
                .iter_mut()
                .find(|f| f.name.eq_ignore_ascii_case(column))
            {
                field.references = Some(ForeignKeyRef::new(&reference.target, &target_column));
            }
        }
    }
}
