//! Reading and writing records
//!
//! Typed access to tables described by `RecordModel`: statement builders,
//! filtered reads, and a keyed write that inserts, updates and optionally
//! deletes so the table matches a batch of records.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tracing::{debug, info};

use crate::db::connection::{Row, SqlConnection};
use crate::db::value::SqlValue;
use crate::error::{Error, Result};
use crate::models::record::RecordModel;
use crate::schema::types::{Dialect, RecordDescriptor};
use crate::utils::naming::quote_identifier;

/// A statement together with its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Collects parameters and hands out dialect placeholders for them
struct Params {
    dialect: Dialect,
    values: Vec<SqlValue>,
}

impl Params {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            values: Vec::new(),
        }
    }

    /// Placeholder for `value`; NULL is written inline so no driver has to
    /// guess a type for it
    fn bind(&mut self, value: &SqlValue) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        self.values.push(value.clone());
        self.dialect.placeholder(self.values.len())
    }

    fn where_clause(&mut self, constraints: &[(String, SqlValue)]) -> String {
        if constraints.is_empty() {
            return String::new();
        }
        let conditions: Vec<String> = constraints
            .iter()
            .map(|(column, value)| {
                let column = quote_identifier(column, self.dialect);
                if value.is_null() {
                    format!("{} IS NULL", column)
                } else {
                    format!("{} = {}", column, self.bind(value))
                }
            })
            .collect();
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// `SELECT` of every descriptor column, filtered by equality constraints
pub fn select_sql(descriptor: &RecordDescriptor, dialect: Dialect, constraints: &[(String, SqlValue)]) -> BoundStatement {
    let columns: Vec<String> = descriptor
        .fields
        .iter()
        .map(|f| quote_identifier(&f.name, dialect))
        .collect();
    let mut params = Params::new(dialect);
    let filter = params.where_clause(constraints);

    BoundStatement {
        sql: format!(
            "SELECT {} FROM {}{}",
            columns.join(", "),
            quote_identifier(&descriptor.name, dialect),
            filter
        ),
        params: params.values,
    }
}

/// `INSERT` of one row
pub fn insert_sql(descriptor: &RecordDescriptor, dialect: Dialect, values: &[(String, SqlValue)]) -> BoundStatement {
    let mut params = Params::new(dialect);
    let columns: Vec<String> = values.iter().map(|(c, _)| quote_identifier(c, dialect)).collect();
    let placeholders: Vec<String> = values.iter().map(|(_, v)| params.bind(v)).collect();

    BoundStatement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(&descriptor.name, dialect),
            columns.join(", "),
            placeholders.join(", ")
        ),
        params: params.values,
    }
}

/// `UPDATE` of the rows matching `key`
pub fn update_sql(
    descriptor: &RecordDescriptor,
    dialect: Dialect,
    values: &[(String, SqlValue)],
    key: &[(String, SqlValue)],
) -> BoundStatement {
    let mut params = Params::new(dialect);
    let assignments: Vec<String> = values
        .iter()
        .map(|(column, value)| format!("{} = {}", quote_identifier(column, dialect), params.bind(value)))
        .collect();
    let filter = params.where_clause(key);

    BoundStatement {
        sql: format!(
            "UPDATE {} SET {}{}",
            quote_identifier(&descriptor.name, dialect),
            assignments.join(", "),
            filter
        ),
        params: params.values,
    }
}

/// `DELETE` of the rows matching `key`; every row when `key` is empty
pub fn delete_sql(descriptor: &RecordDescriptor, dialect: Dialect, key: &[(String, SqlValue)]) -> BoundStatement {
    let mut params = Params::new(dialect);
    let filter = params.where_clause(key);

    BoundStatement {
        sql: format!("DELETE FROM {}{}", quote_identifier(&descriptor.name, dialect), filter),
        params: params.values,
    }
}

/// Run a query and return its rows as-is
pub async fn raw_query<C: SqlConnection + ?Sized>(
    connection: &mut C,
    sql: &str,
    params: &[SqlValue],
) -> Result<Vec<Row>> {
    connection.fetch_all(sql, params).await
}

fn check_columns(descriptor: &RecordDescriptor, columns: &[&str], purpose: &str) -> Result<()> {
    let missing: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|c| descriptor.field(c).is_none())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::ValidationError(format!(
            "{} columns [{}] are not present in record '{}'",
            purpose,
            missing.join(", "),
            descriptor.name
        )))
    }
}

/// Read the records matching every `(column, value)` constraint
pub async fn get_where<T: RecordModel, C: SqlConnection + ?Sized>(
    connection: &mut C,
    dialect: Dialect,
    constraints: &[(&str, SqlValue)],
) -> Result<Vec<T>> {
    let descriptor = T::descriptor()?;
    let columns: Vec<&str> = constraints.iter().map(|(c, _)| *c).collect();
    check_columns(&descriptor, &columns, "Constraint")?;

    let constraints: Vec<(String, SqlValue)> = constraints
        .iter()
        .map(|(c, v)| (c.to_string(), v.clone()))
        .collect();
    let statement = select_sql(&descriptor, dialect, &constraints);
    debug!(sql = %statement.sql, "Reading records");

    let rows = connection.fetch_all(&statement.sql, &statement.params).await?;
    rows.iter().map(T::from_row).collect()
}

/// What `write` is allowed to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Columns identifying a row; the primary key when `None`
    pub compare_on: Option<Vec<String>>,
    pub insert: bool,
    pub update: bool,
    /// Delete rows whose key is not in the batch
    pub delete: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compare_on: None,
            insert: true,
            update: true,
            delete: false,
        }
    }
}

impl WriteOptions {
    pub fn compare_on(mut self, columns: &[&str]) -> Self {
        self.compare_on = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_delete(mut self) -> Self {
        self.delete = true;
        self
    }
}

/// Row counts from a `write`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

fn row_key(values: &[SqlValue]) -> String {
    values
        .iter()
        .map(SqlValue::key_repr)
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

/// Write `records` so the table agrees with them on the comparison columns
pub async fn write<T: RecordModel, C: SqlConnection + ?Sized>(
    connection: &mut C,
    dialect: Dialect,
    records: &[T],
    options: &WriteOptions,
) -> Result<WriteSummary> {
    if records.is_empty() {
        return Err(Error::ValidationError(
            "Cannot write an empty batch; use delete_all to clear a table".to_string(),
        ));
    }

    let descriptor = T::descriptor()?;
    if descriptor.view {
        return Err(Error::UnsupportedOperation(format!("cannot write to view '{}'", descriptor.name)));
    }

    let compare_on = match &options.compare_on {
        Some(columns) => columns.clone(),
        None => descriptor.primary_key_names(),
    };
    if compare_on.is_empty() {
        return Err(Error::ValidationError(format!(
            "Record '{}' has no primary key; pass compare_on explicitly",
            descriptor.name
        )));
    }
    let compare_refs: Vec<&str> = compare_on.iter().map(String::as_str).collect();
    check_columns(&descriptor, &compare_refs, "Comparison")?;

    // Existing keys, in table order
    let key_descriptor = RecordDescriptor {
        fields: compare_on
            .iter()
            .filter_map(|c| descriptor.field(c).cloned())
            .collect(),
        ..descriptor.clone()
    };
    let statement = select_sql(&key_descriptor, dialect, &[]);
    let mut existing: IndexMap<String, Vec<SqlValue>> = IndexMap::new();
    for row in connection.fetch_all(&statement.sql, &statement.params).await? {
        let key: Vec<SqlValue> = row.columns().iter().map(|(_, v)| v.clone()).collect();
        existing.insert(row_key(&key), key);
    }

    let mut summary = WriteSummary::default();
    let mut seen: IndexSet<String> = IndexSet::new();

    for record in records {
        let values = record.to_values()?;
        let key: Vec<(String, SqlValue)> = compare_on
            .iter()
            .map(|column| {
                values
                    .iter()
                    .find(|(c, _)| c.eq_ignore_ascii_case(column))
                    .cloned()
                    .ok_or_else(|| Error::ValidationError(format!("Record value for '{}' is missing", column)))
            })
            .collect::<Result<_>>()?;
        let key_values: Vec<SqlValue> = key.iter().map(|(_, v)| v.clone()).collect();
        let key_repr = row_key(&key_values);
        seen.insert(key_repr.clone());

        if existing.contains_key(&key_repr) {
            if !options.update {
                continue;
            }
            let changes: Vec<(String, SqlValue)> = values
                .into_iter()
                .filter(|(c, _)| !compare_on.iter().any(|k| k.eq_ignore_ascii_case(c)))
                .collect();
            if changes.is_empty() {
                continue;
            }
            let statement = update_sql(&descriptor, dialect, &changes, &key);
            summary.updated += connection.execute(&statement.sql, &statement.params).await?;
        } else if options.insert {
            let statement = insert_sql(&descriptor, dialect, &values);
            summary.inserted += connection.execute(&statement.sql, &statement.params).await?;
            existing.insert(key_repr, key_values);
        }
    }

    if options.delete {
        for (key_repr, key_values) in &existing {
            if seen.contains(key_repr) {
                continue;
            }
            let key: Vec<(String, SqlValue)> = compare_on.iter().cloned().zip(key_values.iter().cloned()).collect();
            let statement = delete_sql(&descriptor, dialect, &key);
            summary.deleted += connection.execute(&statement.sql, &statement.params).await?;
        }
    }

    info!(
        table = %descriptor.name,
        inserted = summary.inserted,
        updated = summary.updated,
        deleted = summary.deleted,
        "Wrote records"
    );
    Ok(summary)
}

/// Delete every row of the record's table
pub async fn delete_all<T: RecordModel, C: SqlConnection + ?Sized>(connection: &mut C, dialect: Dialect) -> Result<u64> {
    let descriptor = T::descriptor()?;
    let statement = delete_sql(&descriptor, dialect, &[]);
    connection.execute(&statement.sql, &statement.params).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{FieldDescriptor, SemanticType};
    use pretty_assertions::assert_eq;

    fn holding() -> RecordDescriptor {
        RecordDescriptor::new("Holding")
            .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key())
            .with_field(FieldDescriptor::new("user", SemanticType::Text).nullable(true))
    }

    #[test]
    fn test_select_sql_placeholders() {
        let constraints = vec![
            ("id".to_string(), SqlValue::Integer(1)),
            ("user".to_string(), SqlValue::Text("ada".to_string())),
        ];
        let statement = select_sql(&holding(), Dialect::Postgres, &constraints);
        assert_eq!(statement.sql, r#"SELECT id, "user" FROM "Holding" WHERE id = $1 AND "user" = $2"#);
        assert_eq!(statement.params.len(), 2);

        let statement = select_sql(&holding(), Dialect::MsSql, &constraints);
        assert_eq!(statement.sql, "SELECT id, [user] FROM Holding WHERE id = @P1 AND [user] = @P2");
    }

    #[test]
    fn test_nulls_are_inlined() {
        let values = vec![
            ("id".to_string(), SqlValue::Integer(7)),
            ("user".to_string(), SqlValue::Null),
        ];
        let statement = insert_sql(&holding(), Dialect::Sqlite, &values);
        assert_eq!(statement.sql, "INSERT INTO Holding (id, user) VALUES (?, NULL)");
        assert_eq!(statement.params, vec![SqlValue::Integer(7)]);

        let statement = delete_sql(&holding(), Dialect::Sqlite, &[("user".to_string(), SqlValue::Null)]);
        assert_eq!(statement.sql, "DELETE FROM Holding WHERE user IS NULL");
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_update_sql_numbers_placeholders_in_order() {
        let statement = update_sql(
            &holding(),
            Dialect::Postgres,
            &[("user".to_string(), SqlValue::Text("bob".to_string()))],
            &[("id".to_string(), SqlValue::Integer(3))],
        );
        assert_eq!(statement.sql, r#"UPDATE "Holding" SET "user" = $1 WHERE id = $2"#);
        assert_eq!(
            statement.params,
            vec![SqlValue::Text("bob".to_string()), SqlValue::Integer(3)]
        );
    }
}
