//! Database connection handling
//!
//! This module defines the `SqlConnection` boundary every connection-bound
//! operation goes through, implements it for the sqlx drivers, and provides
//! `DatabaseConnection` to open one of them from a URL.

use async_trait::async_trait;
use sqlx::error::BoxDynError;
use sqlx::mysql::{MySql, MySqlConnection, MySqlValueRef};
use sqlx::postgres::{PgConnection, PgValueRef, Postgres};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqliteConnection, SqliteValueRef};
use sqlx::{Column as _, ConnectOptions as _, Connection as _, Decode, Row as _, TypeInfo as _, ValueRef as _};
use std::str::FromStr;

use crate::config::DatabaseConfig;
use crate::db::value::{FromSqlValue, SqlValue};
use crate::error::{Error, Result};
use crate::schema::types::Dialect;

/// A result row: ordered column labels with their values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    /// Create a row from ordered (label, value) pairs
    pub fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Self { columns }
    }

    /// Look a value up by column label, ignoring ASCII case
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    /// Value at a position
    pub fn get_at(&self, index: usize) -> Option<&SqlValue> {
        self.columns.get(index).map(|(_, value)| value)
    }

    pub fn columns(&self) -> &[(String, SqlValue)] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Decode a column into a Rust value
    pub fn decode<T: FromSqlValue>(&self, column: &str) -> Result<T> {
        let value = self.get(column).ok_or_else(|| Error::DecodeError {
            column: column.to_string(),
            expected: "a column of the result set".to_string(),
        })?;
        T::from_sql_value(column, value)
    }

    /// Text of a column, `None` when missing or NULL
    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).and_then(SqlValue::as_text)
    }

    /// Catalog flag of a column, `false` when missing
    pub fn flag(&self, column: &str) -> bool {
        self.get(column).map_or(false, SqlValue::as_flag)
    }
}

/// Minimal asynchronous connection used for provisioning, introspection and
/// data access
///
/// Implementations run one statement at a time on a connection owned by the
/// caller; they neither pool nor retry.
#[async_trait]
pub trait SqlConnection: Send {
    /// Execute a statement and return the number of affected rows
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Run a query and return every row
    async fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;
}

macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                SqlValue::Null => query.bind(None::<String>),
                SqlValue::Integer(i) => query.bind(*i),
                SqlValue::Float(f) => query.bind(*f),
                SqlValue::Text(s) => query.bind(s.clone()),
                SqlValue::Boolean(b) => query.bind(*b),
                SqlValue::Date(d) => query.bind(*d),
                SqlValue::DateTime(dt) => query.bind(*dt),
                SqlValue::Binary(bytes) => query.bind(bytes.clone()),
            };
        }
        query
    }};
}

macro_rules! collect_row {
    ($row:expr, $decode:ident) => {{
        let row = $row;
        let mut columns = Vec::with_capacity(row.columns().len());
        for (i, column) in row.columns().iter().enumerate() {
            let raw = row.try_get_raw(i)?;
            let value = $decode(raw).map_err(|e| Error::DecodeError {
                column: column.name().to_string(),
                expected: e.to_string(),
            })?;
            columns.push((column.name().to_string(), value));
        }
        Row::new(columns)
    }};
}

macro_rules! impl_sql_connection {
    ($connection:ty, $database:ty, $decode:ident) => {
        #[async_trait]
        impl SqlConnection for $connection {
            async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
                // Unprepared, so transaction control works on every driver
                if params.is_empty() {
                    let result = sqlx::Executor::execute(&mut *self, sql).await?;
                    return Ok(result.rows_affected());
                }

                let query = bind_params!(sqlx::query::<$database>(sql), params);
                let result = query.execute(&mut *self).await?;
                Ok(result.rows_affected())
            }

            async fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
                let query = bind_params!(sqlx::query::<$database>(sql), params);
                let rows = query.fetch_all(&mut *self).await?;

                let mut result = Vec::with_capacity(rows.len());
                for row in &rows {
                    result.push(collect_row!(row, $decode));
                }
                Ok(result)
            }
        }
    };
}

fn sqlite_value(raw: SqliteValueRef<'_>) -> std::result::Result<SqlValue, BoxDynError> {
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }

    // SQLite reports the storage class of the value itself
    let type_name = raw.type_info().name().to_ascii_uppercase();
    Ok(match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => SqlValue::Integer(<i64 as Decode<Sqlite>>::decode(raw)?),
        "REAL" | "NUMERIC" => SqlValue::Float(<f64 as Decode<Sqlite>>::decode(raw)?),
        "BLOB" => SqlValue::Binary(<Vec<u8> as Decode<Sqlite>>::decode(raw)?),
        _ => SqlValue::Text(<String as Decode<Sqlite>>::decode(raw)?),
    })
}

fn postgres_value(raw: PgValueRef<'_>) -> std::result::Result<SqlValue, BoxDynError> {
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }

    let type_name = raw.type_info().name().to_ascii_uppercase();
    Ok(match type_name.as_str() {
        "INT2" => SqlValue::Integer(<i16 as Decode<Postgres>>::decode(raw)? as i64),
        "INT4" => SqlValue::Integer(<i32 as Decode<Postgres>>::decode(raw)? as i64),
        "INT8" => SqlValue::Integer(<i64 as Decode<Postgres>>::decode(raw)?),
        "FLOAT4" => SqlValue::Float(<f32 as Decode<Postgres>>::decode(raw)? as f64),
        "FLOAT8" => SqlValue::Float(<f64 as Decode<Postgres>>::decode(raw)?),
        "BOOL" => SqlValue::Boolean(<bool as Decode<Postgres>>::decode(raw)?),
        "DATE" => SqlValue::Date(<chrono::NaiveDate as Decode<Postgres>>::decode(raw)?),
        "TIMESTAMP" => SqlValue::DateTime(<chrono::NaiveDateTime as Decode<Postgres>>::decode(raw)?),
        "TIMESTAMPTZ" => SqlValue::DateTime(
            <chrono::DateTime<chrono::Utc> as Decode<Postgres>>::decode(raw)?.naive_utc(),
        ),
        "BYTEA" => SqlValue::Binary(<Vec<u8> as Decode<Postgres>>::decode(raw)?),
        _ => SqlValue::Text(<String as Decode<Postgres>>::decode(raw)?),
    })
}

fn mysql_value(raw: MySqlValueRef<'_>) -> std::result::Result<SqlValue, BoxDynError> {
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }

    let type_name = raw.type_info().name().to_ascii_uppercase();
    if type_name.ends_with("UNSIGNED") {
        let value = <u64 as Decode<MySql>>::decode(raw)?;
        return Ok(SqlValue::Integer(i64::try_from(value)?));
    }

    Ok(match type_name.as_str() {
        "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            SqlValue::Integer(<i64 as Decode<MySql>>::decode(raw)?)
        }
        "FLOAT" => SqlValue::Float(<f32 as Decode<MySql>>::decode(raw)? as f64),
        "DOUBLE" => SqlValue::Float(<f64 as Decode<MySql>>::decode(raw)?),
        "DECIMAL" => SqlValue::Float(<String as Decode<MySql>>::decode(raw)?.parse::<f64>()?),
        "DATE" => SqlValue::Date(<chrono::NaiveDate as Decode<MySql>>::decode(raw)?),
        "DATETIME" | "TIMESTAMP" => SqlValue::DateTime(<chrono::NaiveDateTime as Decode<MySql>>::decode(raw)?),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
            SqlValue::Binary(<Vec<u8> as Decode<MySql>>::decode(raw)?)
        }
        _ => SqlValue::Text(<String as Decode<MySql>>::decode(raw)?),
    })
}

impl_sql_connection!(SqliteConnection, Sqlite, sqlite_value);
impl_sql_connection!(PgConnection, Postgres, postgres_value);
impl_sql_connection!(MySqlConnection, MySql, mysql_value);

/// A connection to one of the databases with a bundled driver
///
/// SQL Server has catalog queries and DDL support but no bundled driver;
/// implement `SqlConnection` for your own client to use it.
#[derive(Debug)]
pub enum DatabaseConnection {
    Postgres(PgConnection),
    MySql(MySqlConnection),
    Sqlite(SqliteConnection),
}

impl DatabaseConnection {
    /// Create a new database connection from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let dialect = match config.dialect {
            Some(dialect) => dialect,
            None => dialect_from_url(&config.url)?,
        };
        Self::open(dialect, &config.url).await
    }

    /// Open a connection, inferring the dialect from the URL scheme
    pub async fn connect_url(url: &str) -> Result<Self> {
        Self::open(dialect_from_url(url)?, url).await
    }

    async fn open(dialect: Dialect, url: &str) -> Result<Self> {
        tracing::debug!(dialect = %dialect, "Opening database connection");

        match dialect {
            Dialect::Sqlite => {
                let connection = SqliteConnectOptions::from_str(url)?
                    .create_if_missing(true)
                    .foreign_keys(true)
                    .connect()
                    .await?;
                Ok(DatabaseConnection::Sqlite(connection))
            }
            Dialect::Postgres => Ok(DatabaseConnection::Postgres(PgConnection::connect(url).await?)),
            Dialect::MySql => Ok(DatabaseConnection::MySql(MySqlConnection::connect(url).await?)),
            Dialect::MsSql => Err(Error::UnsupportedOperation(
                "no SQL Server driver is bundled; implement SqlConnection for your client".to_string(),
            )),
        }
    }

    /// Dialect spoken by this connection
    pub fn dialect(&self) -> Dialect {
        match self {
            DatabaseConnection::Postgres(_) => Dialect::Postgres,
            DatabaseConnection::MySql(_) => Dialect::MySql,
            DatabaseConnection::Sqlite(_) => Dialect::Sqlite,
        }
    }

    /// Close the connection gracefully
    pub async fn close(self) -> Result<()> {
        match self {
            DatabaseConnection::Postgres(connection) => connection.close().await?,
            DatabaseConnection::MySql(connection) => connection.close().await?,
            DatabaseConnection::Sqlite(connection) => connection.close().await?,
        }
        Ok(())
    }
}

#[async_trait]
impl SqlConnection for DatabaseConnection {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        match self {
            DatabaseConnection::Postgres(connection) => connection.execute(sql, params).await,
            DatabaseConnection::MySql(connection) => connection.execute(sql, params).await,
            DatabaseConnection::Sqlite(connection) => connection.execute(sql, params).await,
        }
    }

    async fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        match self {
            DatabaseConnection::Postgres(connection) => connection.fetch_all(sql, params).await,
            DatabaseConnection::MySql(connection) => connection.fetch_all(sql, params).await,
            DatabaseConnection::Sqlite(connection) => connection.fetch_all(sql, params).await,
        }
    }
}

/// Infer the dialect from a connection URL scheme
pub fn dialect_from_url(url: &str) -> Result<Dialect> {
    let scheme = url
        .split_once(':')
        .map(|(scheme, _)| scheme)
        .ok_or_else(|| Error::ConfigError(format!("Connection URL has no scheme: {}", url)))?;
    scheme.parse()
}
