//! Configuration handling for SchemaBridge
//!
//! Configuration only feeds the CLI and `SchemaBridgeClient`; the library
//! operations take their dialect and connection explicitly.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::schema::types::Dialect;

/// Load configuration from a TOML file
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path)
        .map_err(|e| Error::ConfigError(format!("Failed to read config file {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&config_str)
        .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?;

    Ok(config)
}

/// Represents the complete SchemaBridge configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    /// Defaults for a dialect, without a configuration file
    pub fn for_dialect(dialect: Dialect) -> Self {
        let url = match dialect {
            Dialect::Sqlite => "sqlite::memory:",
            Dialect::Postgres => "postgres://localhost/postgres",
            Dialect::MySql => "mysql://localhost/mysql",
            Dialect::MsSql => "mssql://localhost/master",
        };
        Self {
            database: DatabaseConfig {
                dialect: Some(dialect),
                url: url.to_string(),
            },
            models: ModelsConfig::default(),
            output: OutputConfig::default(),
            logging: None,
        }
    }

    /// Dialect named in the configuration, or inferred from the URL scheme
    pub fn dialect(&self) -> Result<Dialect> {
        match self.database.dialect {
            Some(dialect) => Ok(dialect),
            None => crate::db::connection::dialect_from_url(&self.database.url),
        }
    }
}

/// Database connection configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// Inferred from the URL scheme when absent
    pub dialect: Option<Dialect>,
    pub url: String,
}

/// Model discovery configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelsConfig {
    #[serde(default = "default_model_paths")]
    pub paths: Vec<String>,
    /// Glob patterns of files or directories to skip
    pub exclude_paths: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub recursive_scan: bool,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            paths: default_model_paths(),
            exclude_paths: None,
            recursive_scan: true,
        }
    }
}

/// Output format for recovered schemas
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Rust source with `#[derive(Record)]` structs
    #[default]
    Rust,
    Json,
    Yaml,
}

/// Where generated artifacts go
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct OutputConfig {
    pub ddl_file: Option<String>,
    pub models_file: Option<String>,
    #[serde(default)]
    pub format: OutputFormat,
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    pub file: Option<String>,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub stdout: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
            format: default_log_format(),
            stdout: true,
        }
    }
}

fn default_model_paths() -> Vec<String> {
    vec!["src".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[database]
dialect = "sqlite"
url = "sqlite://app.db"

[models]
paths = ["src/models"]
exclude_paths = ["src/models/legacy/*"]
recursive_scan = false

[output]
ddl_file = "schema.sql"
format = "yaml"

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.dialect().unwrap(), Dialect::Sqlite);
        assert_eq!(config.models.paths, vec!["src/models"]);
        assert!(!config.models.recursive_scan);
        assert_eq!(config.output.format, OutputFormat::Yaml);
        assert_eq!(config.output.ddl_file.as_deref(), Some("schema.sql"));
        assert_eq!(
            config.logging,
            Some(LoggingConfig {
                level: "debug".to_string(),
                ..LoggingConfig::default()
            })
        );
    }

    #[test]
    fn test_dialect_inferred_from_url() {
        let config: Config = toml::from_str("[database]\nurl = \"postgres://localhost/app\"\n").unwrap();
        assert_eq!(config.dialect().unwrap(), Dialect::Postgres);
        assert_eq!(config.models, ModelsConfig::default());
    }

    #[test]
    fn test_invalid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[database]\ndialect = \"oracle\"\nurl = \"x\"\n").unwrap();
        assert!(matches!(load_from_file(file.path()), Err(Error::ConfigError(_))));
    }
}
