//! SQL executor
//!
//! This module runs generated DDL against a connection: statement batches,
//! optionally inside a transaction, and table provisioning from descriptors.

use tracing::{debug, info, warn};

use crate::db::connection::SqlConnection;
use crate::error::Result;
use crate::schema::generator::{DdlGenerator, DdlScript};
use crate::schema::types::{Dialect, RecordDescriptor};

/// SQL executor for running statements on a borrowed connection
pub struct SqlExecutor<'a, C: SqlConnection + ?Sized> {
    connection: &'a mut C,
    dialect: Dialect,
}

impl<'a, C: SqlConnection + ?Sized> SqlExecutor<'a, C> {
    /// Create a new SQL executor
    pub fn new(connection: &'a mut C, dialect: Dialect) -> Self {
        Self { connection, dialect }
    }

    /// Execute a single SQL statement
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        debug!(dialect = %self.dialect, sql, "Executing statement");
        self.connection.execute(sql, &[]).await
    }

    /// Execute multiple SQL statements in order, stopping at the first failure
    pub async fn execute_batch(&mut self, statements: &[String]) -> Result<()> {
        for statement in statements {
            self.execute(statement).await?;
        }

        Ok(())
    }

    /// Execute multiple SQL statements in a transaction
    ///
    /// MySQL commits DDL implicitly, so a failed batch of `CREATE TABLE`
    /// statements is only partially rolled back there.
    pub async fn execute_in_transaction(&mut self, statements: &[String]) -> Result<()> {
        self.execute(self.dialect.begin_transaction()).await?;

        match self.execute_batch(statements).await {
            Ok(_) => {
                self.execute("COMMIT").await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.execute("ROLLBACK").await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Get the dialect statements are written in
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}

/// Create the tables for `descriptors`, referenced tables first
///
/// Returns the script that was executed. Nothing is created when the
/// descriptors fail validation or ordering. The statements run in one
/// transaction, so a failure leaves no tables behind on SQLite, PostgreSQL
/// and MSSQL; MySQL commits each `CREATE TABLE` on its own.
pub async fn provision<C: SqlConnection + ?Sized>(
    connection: &mut C,
    descriptors: &[RecordDescriptor],
    dialect: Dialect,
) -> Result<DdlScript> {
    let script = DdlGenerator::new(dialect).generate(descriptors)?;
    if script.statements.is_empty() {
        return Ok(script);
    }

    let statements: Vec<String> = script.statements.iter().map(|s| s.sql.clone()).collect();
    SqlExecutor::new(connection, dialect)
        .execute_in_transaction(&statements)
        .await?;

    for statement in &script.statements {
        info!(table = %statement.table, "Provisioned table");
    }

    Ok(script)
}

/// Alias of [`provision`]
pub async fn setup_database<C: SqlConnection + ?Sized>(
    connection: &mut C,
    descriptors: &[RecordDescriptor],
    dialect: Dialect,
) -> Result<DdlScript> {
    provision(connection, descriptors, dialect).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::{DatabaseConnection, Row};
    use crate::db::value::SqlValue;
    use crate::error::Error;
    use crate::schema::types::{FieldDescriptor, SemanticType};
    use async_trait::async_trait;

    /// Records every statement it is asked to run
    #[derive(Default)]
    struct Recorder {
        statements: Vec<String>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl SqlConnection for Recorder {
        async fn execute(&mut self, sql: &str, _params: &[SqlValue]) -> Result<u64> {
            self.statements.push(sql.to_string());
            match self.fail_on {
                Some(marker) if sql.contains(marker) => Err(Error::DatabaseError("boom".to_string())),
                _ => Ok(0),
            }
        }

        async fn fetch_all(&mut self, _sql: &str, _params: &[SqlValue]) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_failure() {
        let mut recorder = Recorder {
            fail_on: Some("bad"),
            ..Recorder::default()
        };
        let statements = vec!["CREATE TABLE a (x INT)".to_string(), "bad".to_string(), "never".to_string()];

        let result = SqlExecutor::new(&mut recorder, Dialect::MySql)
            .execute_in_transaction(&statements)
            .await;

        assert!(result.is_err());
        assert_eq!(
            recorder.statements,
            vec!["START TRANSACTION", "CREATE TABLE a (x INT)", "bad", "ROLLBACK"]
        );
    }

    #[tokio::test]
    async fn test_provision_sqlite_in_dependency_order() {
        let descriptors = vec![
            RecordDescriptor::new("CheckingAccount")
                .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key())
                .with_field(FieldDescriptor::new("user_id", SemanticType::Integer).references("User", "id")),
            RecordDescriptor::new("User")
                .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key()),
        ];

        let mut connection = DatabaseConnection::connect_url("sqlite::memory:").await.unwrap();
        let script = provision(&mut connection, &descriptors, Dialect::Sqlite).await.unwrap();
        assert_eq!(script.tables(), vec!["User", "CheckingAccount"]);

        let rows = connection
            .fetch_all("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY rowid", &[])
            .await
            .unwrap();
        let names: Vec<_> = rows.iter().filter_map(|r| r.text("name")).collect();
        assert_eq!(names, vec!["User", "CheckingAccount"]);
    }

    #[tokio::test]
    async fn test_provision_runs_in_one_transaction() {
        let descriptors = vec![
            RecordDescriptor::new("User")
                .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key()),
            RecordDescriptor::new("CheckingAccount")
                .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key())
                .with_field(FieldDescriptor::new("user_id", SemanticType::Integer).references("User", "id")),
        ];

        let mut recorder = Recorder {
            fail_on: Some("CheckingAccount"),
            ..Recorder::default()
        };
        let result = provision(&mut recorder, &descriptors, Dialect::Postgres).await;

        assert!(result.is_err());
        assert_eq!(recorder.statements.len(), 4);
        assert_eq!(recorder.statements[0], "BEGIN");
        assert!(recorder.statements[1].starts_with("CREATE TABLE \"User\""));
        assert!(recorder.statements[2].starts_with("CREATE TABLE \"CheckingAccount\""));
        assert_eq!(recorder.statements[3], "ROLLBACK");
    }

    #[tokio::test]
    async fn test_failed_provision_leaves_no_tables_on_sqlite() {
        let descriptors = vec![
            RecordDescriptor::new("User")
                .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key()),
            RecordDescriptor::new("CheckingAccount")
                .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key())
                .with_field(FieldDescriptor::new("user_id", SemanticType::Integer).references("User", "id")),
        ];

        let mut connection = DatabaseConnection::connect_url("sqlite::memory:").await.unwrap();
        connection
            .execute("CREATE TABLE CheckingAccount (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();

        assert!(provision(&mut connection, &descriptors, Dialect::Sqlite).await.is_err());

        let rows = connection
            .fetch_all("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY rowid", &[])
            .await
            .unwrap();
        let names: Vec<_> = rows.iter().filter_map(|r| r.text("name")).collect();
        assert_eq!(names, vec!["CheckingAccount"]);
    }

    #[tokio::test]
    async fn test_provision_rejects_cycles_before_executing() {
        let descriptors = vec![
            RecordDescriptor::new("A")
                .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key())
                .with_field(FieldDescriptor::new("b_id", SemanticType::Integer).references("B", "id")),
            RecordDescriptor::new("B")
                .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key())
                .with_field(FieldDescriptor::new("a_id", SemanticType::Integer).references("A", "id")),
        ];

        let mut recorder = Recorder::default();
        let result = setup_database(&mut recorder, &descriptors, Dialect::Postgres).await;
        assert!(matches!(result, Err(Error::CyclicSchema { .. })));
        assert!(recorder.statements.is_empty());
    }
}
