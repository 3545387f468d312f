//! SchemaBridge: typed records and SQL schemas, in both directions
//!
//! Record-first: derive `Record` on your structs (or let the registry scan
//! their source), generate `CREATE TABLE` DDL in dependency order, or create
//! the tables on a live connection. SQL-first: parse a DDL script or
//! introspect a database, then emit Rust structs for what was found.

// Lets the derive's `::schema_bridge::...` paths resolve inside this crate
extern crate self as schema_bridge;

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod schema;
pub mod utils;

// Re-export main types for easier access
pub use config::Config;
pub use db::connection::{DatabaseConnection, Row, SqlConnection};
pub use db::executor::{provision, setup_database};
pub use db::read_write::{delete_all, get_where, raw_query, write, WriteOptions, WriteSummary};
pub use db::value::{FromSqlValue, SqlValue, ToSqlValue};
pub use error::{Error, Result};
pub use models::record::{RecordModel, RecordShape};
pub use models::registry::ModelRegistry;
pub use schema::analyzer::{introspect, SchemaAnalyzer};
pub use schema::emitter::{emit_models, SourceEmitter};
pub use schema::generator::{generate_sql, DdlGenerator, DdlScript};
pub use schema::parser::parse_ddl;
pub use schema::types::{
    Dialect, FieldDescriptor, ForeignKeyRef, RecordDescriptor, RecoveredSchema, SemanticType,
};
pub use schema_bridge_macros::Record;

use config::OutputFormat;

/// Initialize SchemaBridge with the specified configuration file
pub fn init(config_path: &str) -> Result<SchemaBridgeClient> {
    let config = config::load_from_file(config_path)?;
    SchemaBridgeClient::new(config)
}

/// Parse a DDL script and emit Rust source for its tables and views
pub fn create_models_from_sql(ddl: &str, dialect: Dialect) -> Result<String> {
    let recovered = parse_ddl(ddl, dialect)?;
    emit_models(&recovered.descriptors)
}

/// Introspect a live database and emit Rust source for its tables and views
pub async fn create_models_from_db<C: SqlConnection + ?Sized>(connection: &mut C, dialect: Dialect) -> Result<String> {
    let recovered = introspect(connection, dialect).await?;
    emit_models(&recovered.descriptors)
}

/// Render recovered descriptors in the requested output format
pub fn render_descriptors(descriptors: &[RecordDescriptor], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Rust => emit_models(descriptors),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(descriptors)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(descriptors)?),
    }
}

/// The main client tying configuration, model discovery, generation and
/// emission together
pub struct SchemaBridgeClient {
    config: Config,
    dialect: Dialect,
    model_registry: ModelRegistry,
}

impl SchemaBridgeClient {
    /// Create a new SchemaBridge client from configuration
    pub fn new(config: Config) -> Result<Self> {
        let dialect = config.dialect()?;
        let model_registry = ModelRegistry::new(&config.models);

        Ok(Self {
            config,
            dialect,
            model_registry,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Scan the configured paths for model definitions and register them
    pub fn register_models(&mut self) -> Result<()> {
        self.model_registry.scan_and_register()
    }

    /// Descriptors of every registered model
    pub fn descriptors(&self) -> Result<Vec<RecordDescriptor>> {
        self.model_registry.to_descriptors()
    }

    /// Generate DDL for the registered models
    pub fn generate_ddl(&self) -> Result<DdlScript> {
        DdlGenerator::new(self.dialect).generate(&self.descriptors()?)
    }

    /// Open a connection to the configured database
    pub async fn connect(&self) -> Result<DatabaseConnection> {
        DatabaseConnection::connect(&self.config.database).await
    }

    /// Create the tables of the registered models on the configured database
    pub async fn provision(&self) -> Result<DdlScript> {
        let descriptors = self.descriptors()?;
        let mut connection = self.connect().await?;
        let script = provision(&mut connection, &descriptors, self.dialect).await?;
        connection.close().await?;
        Ok(script)
    }

    /// Recover descriptors from a DDL script
    pub fn recover_from_sql(&self, ddl: &str) -> Result<RecoveredSchema> {
        parse_ddl(ddl, self.dialect)
    }

    /// Recover descriptors from the configured database
    pub async fn recover_from_database(&self) -> Result<RecoveredSchema> {
        let mut connection = self.connect().await?;
        let recovered = introspect(&mut connection, self.dialect).await?;
        connection.close().await?;
        Ok(recovered)
    }

    /// Render descriptors in the configured output format
    pub fn render(&self, descriptors: &[RecordDescriptor]) -> Result<String> {
        render_descriptors(descriptors, self.config.output.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_models_from_sql() {
        let source = create_models_from_sql(
            "CREATE TABLE Portfolio (sedol TEXT PRIMARY KEY, cluster TEXT)",
            Dialect::Sqlite,
        )
        .unwrap();
        assert!(source.contains("#[record(table = \"Portfolio\")]"));
        assert!(source.contains("pub struct PortfolioRow {"));
        assert!(source.contains("pub cluster: Option<String>,"));
    }

    #[test]
    fn test_render_json() {
        let descriptors = vec![RecordDescriptor::new("t")
            .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key())];
        let json = render_descriptors(&descriptors, OutputFormat::Json).unwrap();
        let back: Vec<RecordDescriptor> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, descriptors);
    }

    #[test]
    fn test_client_from_dialect_defaults() {
        let client = SchemaBridgeClient::new(Config::for_dialect(Dialect::MySql)).unwrap();
        assert_eq!(client.dialect(), Dialect::MySql);
        assert!(client.generate_ddl().unwrap().statements.is_empty());
    }
}
