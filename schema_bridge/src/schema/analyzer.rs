//! Database schema analyzer
//!
//! This module recovers record descriptors from a live database by reading
//! its catalog. Every catalog read is a plain query sent through
//! `SqlConnection`; the SQL for each dialect lives in `CatalogQueries`.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::db::connection::{Row, SqlConnection};
use crate::db::value::SqlValue;
use crate::error::{Error, Result};
use crate::schema::mapping::from_sql_type;
use crate::schema::types::{
    find_descriptor, resolve_pending_references, Dialect, FieldDescriptor, ForeignKeyRef,
    PendingReference, RecordDescriptor, RecoveredSchema, SemanticType, TypeFallback,
};

/// A table or view listed by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub view: bool,
}

/// A column listed by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// A foreign key; `target_columns` is empty when the catalog leaves the
/// referenced columns implicit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
    pub columns: Vec<String>,
    pub target_table: String,
    pub target_columns: Vec<String>,
}

/// Key constraints of one table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableConstraints {
    pub primary_key: Vec<String>,
    pub unique: Vec<Vec<String>>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

/// Catalog SQL for one dialect
///
/// `columns`, `constraints` and `foreign_keys` take the table name as their
/// only parameter.
struct CatalogQueries {
    tables: &'static str,
    columns: &'static str,
    constraints: &'static str,
    foreign_keys: &'static str,
}

const SQLITE_QUERIES: CatalogQueries = CatalogQueries {
    tables: r#"
        SELECT name AS table_name, type AS table_type
        FROM sqlite_master
        WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'
        ORDER BY rowid
    "#,
    columns: r#"
        SELECT name AS column_name, type AS data_type, "notnull" AS not_null
        FROM pragma_table_info(?)
        ORDER BY cid
    "#,
    // Primary key columns come from pragma_table_info, unique constraints
    // from the indexes SQLite creates for them
    constraints: r#"
        SELECT 'PRIMARY KEY' AS constraint_type, 'pk' AS constraint_name, name AS column_name, pk AS position
        FROM pragma_table_info(?1)
        WHERE pk > 0
        UNION ALL
        SELECT 'UNIQUE', il.name, ii.name, ii.seqno + 1
        FROM pragma_index_list(?1) AS il
        JOIN pragma_index_info(il.name) AS ii
        WHERE il."unique" = 1 AND il.origin = 'u'
        ORDER BY 1, 2, 4
    "#,
    foreign_keys: r#"
        SELECT id AS constraint_name, "from" AS column_name, "table" AS target_table, "to" AS target_column
        FROM pragma_foreign_key_list(?)
        ORDER BY id, seq
    "#,
};

const POSTGRES_QUERIES: CatalogQueries = CatalogQueries {
    tables: r#"
        SELECT table_name::text AS table_name, table_type::text AS table_type
        FROM information_schema.tables
        WHERE table_schema = current_schema()
        ORDER BY table_name
    "#,
    columns: r#"
        SELECT column_name::text AS column_name, data_type::text AS data_type,
               is_nullable::text AS is_nullable
        FROM information_schema.columns
        WHERE table_schema = current_schema() AND table_name = $1
        ORDER BY ordinal_position
    "#,
    constraints: r#"
        SELECT tc.constraint_type::text AS constraint_type, tc.constraint_name::text AS constraint_name,
               kcu.column_name::text AS column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON kcu.constraint_schema = tc.constraint_schema
         AND kcu.constraint_name = tc.constraint_name
         AND kcu.table_name = tc.table_name
        WHERE tc.table_schema = current_schema() AND tc.table_name = $1
          AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE')
        ORDER BY tc.constraint_type, tc.constraint_name, kcu.ordinal_position
    "#,
    foreign_keys: r#"
        SELECT kcu.constraint_name::text AS constraint_name, kcu.column_name::text AS column_name,
               target.table_name::text AS target_table, target.column_name::text AS target_column
        FROM information_schema.key_column_usage kcu
        JOIN information_schema.referential_constraints rc
          ON rc.constraint_schema = kcu.constraint_schema
         AND rc.constraint_name = kcu.constraint_name
        JOIN information_schema.key_column_usage target
          ON target.constraint_schema = rc.unique_constraint_schema
         AND target.constraint_name = rc.unique_constraint_name
         AND target.ordinal_position = kcu.position_in_unique_constraint
        WHERE kcu.table_schema = current_schema() AND kcu.table_name = $1
        ORDER BY kcu.constraint_name, kcu.ordinal_position
    "#,
};

const MYSQL_QUERIES: CatalogQueries = CatalogQueries {
    tables: r#"
        SELECT table_name AS table_name, table_type AS table_type
        FROM information_schema.tables
        WHERE table_schema = DATABASE()
        ORDER BY table_name
    "#,
    // column_type keeps the display width, so tinyint(1) stays recognisable
    columns: r#"
        SELECT column_name AS column_name, column_type AS data_type, is_nullable AS is_nullable
        FROM information_schema.columns
        WHERE table_schema = DATABASE() AND table_name = ?
        ORDER BY ordinal_position
    "#,
    constraints: r#"
        SELECT tc.constraint_type AS constraint_type, tc.constraint_name AS constraint_name,
               kcu.column_name AS column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON kcu.constraint_schema = tc.constraint_schema
         AND kcu.constraint_name = tc.constraint_name
         AND kcu.table_name = tc.table_name
        WHERE tc.table_schema = DATABASE() AND tc.table_name = ?
          AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE')
        ORDER BY tc.constraint_type, tc.constraint_name, kcu.ordinal_position
    "#,
    foreign_keys: r#"
        SELECT constraint_name AS constraint_name, column_name AS column_name,
               referenced_table_name AS target_table, referenced_column_name AS target_column
        FROM information_schema.key_column_usage
        WHERE table_schema = DATABASE() AND table_name = ?
          AND referenced_table_name IS NOT NULL
        ORDER BY constraint_name, ordinal_position
    "#,
};

const MSSQL_QUERIES: CatalogQueries = CatalogQueries {
    tables: r#"
        SELECT TABLE_NAME AS table_name, TABLE_TYPE AS table_type
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = SCHEMA_NAME()
        ORDER BY TABLE_NAME
    "#,
    columns: r#"
        SELECT COLUMN_NAME AS column_name, DATA_TYPE AS data_type, IS_NULLABLE AS is_nullable
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = SCHEMA_NAME() AND TABLE_NAME = @P1
        ORDER BY ORDINAL_POSITION
    "#,
    constraints: r#"
        SELECT tc.CONSTRAINT_TYPE AS constraint_type, tc.CONSTRAINT_NAME AS constraint_name,
               kcu.COLUMN_NAME AS column_name
        FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
        JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
          ON kcu.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
         AND kcu.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
         AND kcu.TABLE_NAME = tc.TABLE_NAME
        WHERE tc.TABLE_SCHEMA = SCHEMA_NAME() AND tc.TABLE_NAME = @P1
          AND tc.CONSTRAINT_TYPE IN ('PRIMARY KEY', 'UNIQUE')
        ORDER BY tc.CONSTRAINT_TYPE, tc.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
    "#,
    foreign_keys: r#"
        SELECT fk.name AS constraint_name, pc.name AS column_name,
               rt.name AS target_table, rc.name AS target_column
        FROM sys.foreign_key_columns fkc
        JOIN sys.foreign_keys fk ON fk.object_id = fkc.constraint_object_id
        JOIN sys.columns pc ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
        JOIN sys.tables rt ON rt.object_id = fkc.referenced_object_id
        JOIN sys.columns rc ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
        WHERE fkc.parent_object_id = OBJECT_ID(QUOTENAME(SCHEMA_NAME()) + '.' + QUOTENAME(@P1))
        ORDER BY fk.name, fkc.constraint_column_id
    "#,
};

fn catalog_queries(dialect: Dialect) -> &'static CatalogQueries {
    match dialect {
        Dialect::Sqlite => &SQLITE_QUERIES,
        Dialect::Postgres => &POSTGRES_QUERIES,
        Dialect::MySql => &MYSQL_QUERIES,
        Dialect::MsSql => &MSSQL_QUERIES,
    }
}

/// Schema analyzer for database schema introspection
///
/// Borrows the connection for its whole lifetime. The analyzer only reads;
/// the first failing catalog query aborts the analysis.
pub struct SchemaAnalyzer<'a, C: SqlConnection + ?Sized> {
    connection: &'a mut C,
    dialect: Dialect,
}

impl<'a, C: SqlConnection + ?Sized> SchemaAnalyzer<'a, C> {
    /// Create a new schema analyzer
    pub fn new(connection: &'a mut C, dialect: Dialect) -> Self {
        Self { connection, dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn catalog(&mut self, context: String, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        debug!(dialect = %self.dialect, "{}", context);
        self.connection
            .fetch_all(sql, params)
            .await
            .map_err(|source| Error::IntrospectionFailure {
                context,
                source: Box::new(source),
            })
    }

    /// List user tables and views, tables first
    pub async fn list_tables(&mut self) -> Result<Vec<TableInfo>> {
        let sql = catalog_queries(self.dialect).tables;
        let rows = self.catalog("listing tables".to_string(), sql, &[]).await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let name = required_text(row, "table_name", "listing tables")?;
            let table_type = row.text("table_type").unwrap_or_default();
            tables.push(TableInfo {
                name,
                view: table_type.to_ascii_uppercase().contains("VIEW"),
            });
        }

        // Stable: catalog order is kept within tables and within views
        tables.sort_by_key(|t| t.view);
        Ok(tables)
    }

    /// List the columns of a table or view in ordinal order
    pub async fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>> {
        let context = format!("listing columns of '{}'", table);
        let sql = catalog_queries(self.dialect).columns;
        let rows = self
            .catalog(context.clone(), sql, &[SqlValue::Text(table.to_string())])
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let nullable = match self.dialect {
                Dialect::Sqlite => !row.flag("not_null"),
                _ => row.flag("is_nullable"),
            };
            columns.push(ColumnInfo {
                name: required_text(row, "column_name", &context)?,
                data_type: row.text("data_type").unwrap_or_default(),
                nullable,
            });
        }
        Ok(columns)
    }

    /// Read the primary key, unique constraints and foreign keys of a table
    pub async fn list_constraints(&mut self, table: &str) -> Result<TableConstraints> {
        let context = format!("reading constraints of '{}'", table);
        let queries = catalog_queries(self.dialect);
        let params = [SqlValue::Text(table.to_string())];

        let mut constraints = TableConstraints::default();

        let rows = self.catalog(context.clone(), queries.constraints, &params).await?;
        let mut unique: IndexMap<String, Vec<String>> = IndexMap::new();
        for row in &rows {
            let constraint_type = row.text("constraint_type").unwrap_or_default();
            let column = required_text(row, "column_name", &context)?;
            if constraint_type.eq_ignore_ascii_case("PRIMARY KEY") {
                constraints.primary_key.push(column);
            } else {
                let name = row.get("constraint_name").map(SqlValue::key_repr).unwrap_or_default();
                unique.entry(name).or_default().push(column);
            }
        }
        constraints.unique = unique.into_values().collect();

        let context = format!("reading foreign keys of '{}'", table);
        let rows = self.catalog(context.clone(), queries.foreign_keys, &params).await?;
        let mut foreign_keys: IndexMap<String, ForeignKeyInfo> = IndexMap::new();
        for row in &rows {
            let name = row.get("constraint_name").map(SqlValue::key_repr).unwrap_or_default();
            let column = required_text(row, "column_name", &context)?;
            let target_table = required_text(row, "target_table", &context)?;
            let entry = foreign_keys.entry(name).or_insert_with(|| ForeignKeyInfo {
                columns: Vec::new(),
                target_table,
                target_columns: Vec::new(),
            });
            entry.columns.push(column);
            // SQLite leaves the target column NULL when the key is implicit
            if let Some(target_column) = row.text("target_column") {
                entry.target_columns.push(target_column);
            }
        }
        constraints.foreign_keys = foreign_keys
            .into_values()
            .map(|mut fk| {
                if fk.target_columns.len() != fk.columns.len() {
                    fk.target_columns.clear();
                }
                fk
            })
            .collect();

        Ok(constraints)
    }

    /// Introspect every table and view into record descriptors
    pub async fn analyze(&mut self) -> Result<RecoveredSchema> {
        let mut report = RecoveredSchema::default();
        let mut descriptors = Vec::new();
        let mut pending = Vec::new();

        for table in self.list_tables().await? {
            info!(table = %table.name, view = table.view, "Introspecting table");

            let mut descriptor = if table.view {
                RecordDescriptor::view(&table.name)
            } else {
                RecordDescriptor::new(&table.name)
            };

            for column in self.list_columns(&table.name).await? {
                let semantic_type = self.semantic_type(&mut report, &table.name, &column);
                descriptor
                    .fields
                    .push(FieldDescriptor::new(&column.name, semantic_type).nullable(column.nullable));
            }

            if !table.view {
                let constraints = self.list_constraints(&table.name).await?;
                apply_constraints(&mut descriptor, constraints, &mut pending, &mut report.warnings);
                descriptor.normalize_keys();
            }

            descriptors.push(descriptor);
        }

        resolve_pending_references(&mut descriptors, pending, &mut report.warnings);

        for descriptor in &descriptors {
            for field in &descriptor.fields {
                if let Some(reference) = &field.references {
                    if find_descriptor(&descriptors, &reference.table).is_none() {
                        report.warnings.push(format!(
                            "Column {}.{} references '{}', which is not part of this schema",
                            descriptor.name, field.name, reference.table
                        ));
                    }
                }
            }
        }

        for warning in &report.warnings {
            warn!("{}", warning);
        }

        report.descriptors = descriptors;
        Ok(report)
    }

    fn semantic_type(&self, report: &mut RecoveredSchema, table: &str, column: &ColumnInfo) -> SemanticType {
        match from_sql_type(&column.data_type, self.dialect) {
            Ok(semantic_type) => semantic_type,
            Err(_) => {
                warn!(table, column = %column.name, raw_type = %column.data_type, "Unknown column type, falling back to text");
                report.fallbacks.push(TypeFallback {
                    table: table.to_string(),
                    column: column.name.clone(),
                    raw_type: column.data_type.clone(),
                });
                SemanticType::Text
            }
        }
    }
}

/// Introspect the schema reachable through `connection`
pub async fn introspect<C: SqlConnection + ?Sized>(connection: &mut C, dialect: Dialect) -> Result<RecoveredSchema> {
    SchemaAnalyzer::new(connection, dialect).analyze().await
}

fn required_text(row: &Row, column: &str, context: &str) -> Result<String> {
    row.text(column).ok_or_else(|| Error::IntrospectionFailure {
        context: context.to_string(),
        source: Box::new(Error::DecodeError {
            column: column.to_string(),
            expected: "non-null text".to_string(),
        }),
    })
}

fn apply_constraints(
    descriptor: &mut RecordDescriptor,
    constraints: TableConstraints,
    pending: &mut Vec<PendingReference>,
    warnings: &mut Vec<String>,
) {
    for column in &constraints.primary_key {
        if let Some(field) = field_mut(descriptor, column) {
            field.is_primary_key = true;
            field.nullable = false;
        }
    }

    for columns in &constraints.unique {
        match columns.as_slice() {
            [column] => {
                if let Some(field) = field_mut(descriptor, column) {
                    field.unique = true;
                }
            }
            _ => warnings.push(format!(
                "Composite UNIQUE ({}) on '{}' is not kept",
                columns.join(", "),
                descriptor.name
            )),
        }
    }

    for fk in constraints.foreign_keys {
        if fk.target_columns.is_empty() {
            pending.push(PendingReference {
                table: descriptor.name.clone(),
                columns: fk.columns,
                target: fk.target_table,
            });
            continue;
        }
        for (column, target_column) in fk.columns.iter().zip(&fk.target_columns) {
            if let Some(field) = field_mut(descriptor, column) {
                field.references = Some(ForeignKeyRef::new(&fk.target_table, target_column));
            }
        }
    }
}

fn field_mut<'d>(descriptor: &'d mut RecordDescriptor, name: &str) -> Option<&'d mut FieldDescriptor> {
    descriptor
        .fields
        .iter_mut()
        .find(|f| f.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::DatabaseConnection;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    async fn sqlite_with(ddl: &[&str]) -> DatabaseConnection {
        let mut connection = DatabaseConnection::connect_url("sqlite::memory:").await.unwrap();
        for statement in ddl {
            connection.execute(statement, &[]).await.unwrap();
        }
        connection
    }

    #[tokio::test]
    async fn test_introspects_sqlite_tables() {
        let mut connection = sqlite_with(&[
            "CREATE TABLE owner (id INTEGER NOT NULL, email TEXT UNIQUE, PRIMARY KEY (id))",
            "CREATE TABLE pet (id INTEGER PRIMARY KEY, owner_id INTEGER NOT NULL REFERENCES owner, \
             born DATE, photo BLOB, shape GEOMETRY)",
            "CREATE VIEW pet_names AS SELECT id FROM pet",
        ])
        .await;

        let report = introspect(&mut connection, Dialect::Sqlite).await.unwrap();

        assert_eq!(
            report.descriptors,
            vec![
                RecordDescriptor::new("owner")
                    .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key())
                    .with_field(FieldDescriptor::new("email", SemanticType::Text).nullable(true).unique()),
                RecordDescriptor::new("pet")
                    .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key())
                    .with_field(FieldDescriptor::new("owner_id", SemanticType::Integer).references("owner", "id"))
                    .with_field(FieldDescriptor::new("born", SemanticType::Date).nullable(true))
                    .with_field(FieldDescriptor::new("photo", SemanticType::Binary).nullable(true))
                    .with_field(FieldDescriptor::new("shape", SemanticType::Text).nullable(true)),
                RecordDescriptor::view("pet_names")
                    .with_field(FieldDescriptor::new("id", SemanticType::Integer).nullable(true)),
            ]
        );
        assert_eq!(
            report.fallbacks,
            vec![TypeFallback {
                table: "pet".to_string(),
                column: "shape".to_string(),
                raw_type: "GEOMETRY".to_string(),
            }]
        );
    }

    struct FailingConnection;

    #[async_trait]
    impl SqlConnection for FailingConnection {
        async fn execute(&mut self, _sql: &str, _params: &[SqlValue]) -> Result<u64> {
            Err(Error::DatabaseError("connection reset".to_string()))
        }

        async fn fetch_all(&mut self, _sql: &str, _params: &[SqlValue]) -> Result<Vec<Row>> {
            Err(Error::DatabaseError("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn test_key_flags_agree_with_parsed_ddl() {
        let statements = [
            "CREATE TABLE code (id TEXT PRIMARY KEY UNIQUE, label TEXT UNIQUE)",
            "CREATE TABLE pair (a INTEGER NOT NULL UNIQUE, b INTEGER NOT NULL, PRIMARY KEY (a, b))",
        ];
        let mut connection = sqlite_with(&statements).await;

        let from_catalog = introspect(&mut connection, Dialect::Sqlite).await.unwrap();
        let from_text = crate::schema::parser::parse_ddl(&statements.join(";\n"), Dialect::Sqlite).unwrap();

        assert_eq!(from_catalog.descriptors, from_text.descriptors);
        let code = from_catalog.descriptor("code").unwrap();
        assert!(!code.fields[0].unique);
        assert!(code.fields[1].unique);
        let pair = from_catalog.descriptor("pair").unwrap();
        assert!(pair.fields[0].unique && pair.fields[0].is_primary_key);
    }

    #[tokio::test]
    async fn test_catalog_failure_is_wrapped() {
        let mut connection = FailingConnection;
        match introspect(&mut connection, Dialect::Postgres).await {
            Err(Error::IntrospectionFailure { context, source }) => {
                assert_eq!(context, "listing tables");
                assert!(matches!(*source, Error::DatabaseError(_)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    /// Canned catalog answering by query shape
    struct CannedCatalog;

    #[async_trait]
    impl SqlConnection for CannedCatalog {
        async fn execute(&mut self, _sql: &str, _params: &[SqlValue]) -> Result<u64> {
            Ok(0)
        }

        async fn fetch_all(&mut self, sql: &str, _params: &[SqlValue]) -> Result<Vec<Row>> {
            let text = |s: &str| SqlValue::Text(s.to_string());
            let row = |cells: &[(&str, SqlValue)]| {
                Row::new(cells.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
            };
            Ok(if sql.contains("information_schema.tables") {
                vec![row(&[("TABLE_NAME", text("flags")), ("TABLE_TYPE", text("BASE TABLE"))])]
            } else if sql.contains("information_schema.columns") {
                vec![
                    row(&[("COLUMN_NAME", text("id")), ("DATA_TYPE", text("bigint(20)")), ("IS_NULLABLE", text("NO"))]),
                    row(&[("COLUMN_NAME", text("on")), ("DATA_TYPE", text("tinyint(1)")), ("IS_NULLABLE", text("YES"))]),
                ]
            } else if sql.contains("table_constraints") {
                vec![row(&[
                    ("CONSTRAINT_TYPE", text("PRIMARY KEY")),
                    ("CONSTRAINT_NAME", text("PRIMARY")),
                    ("COLUMN_NAME", text("id")),
                ])]
            } else {
                Vec::new()
            })
        }
    }

    #[tokio::test]
    async fn test_mysql_catalog_normalisation() {
        let report = introspect(&mut CannedCatalog, Dialect::MySql).await.unwrap();
        assert_eq!(
            report.descriptors,
            vec![RecordDescriptor::new("flags")
                .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key())
                .with_field(FieldDescriptor::new("on", SemanticType::Boolean).nullable(true))]
        );
        assert!(report.is_clean());
    }
}
