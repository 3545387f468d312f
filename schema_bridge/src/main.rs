//! schema_bridge CLI: generate DDL from record structs, or Rust structs from
//! DDL and live databases.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use schema_bridge::config::{self, OutputFormat};
use schema_bridge::utils::logging::init_logging;
use schema_bridge::{
    introspect, parse_ddl, provision, render_descriptors, Config, DatabaseConnection, Dialect,
    ModelRegistry, RecoveredSchema,
};

#[derive(Parser)]
#[command(name = "schema_bridge")]
#[command(about = "Bridge typed Rust records and SQL schemas in both directions")]
#[command(version)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQL dialect: sqlite, postgres, mssql or mysql
    #[arg(short, long)]
    dialect: Option<Dialect>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Rust,
    Json,
    Yaml,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Rust => OutputFormat::Rust,
            Format::Json => OutputFormat::Json,
            Format::Yaml => OutputFormat::Yaml,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Scan model sources and print the CREATE TABLE script
    Ddl {
        /// Directories or files to scan (defaults to the configured model paths)
        paths: Vec<String>,

        /// Write the script to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Scan model sources and create their tables on a database
    Provision {
        /// Connection URL (defaults to the configured database)
        #[arg(long)]
        url: Option<String>,

        /// Directories or files to scan (defaults to the configured model paths)
        paths: Vec<String>,
    },

    /// Parse a DDL script and print Rust structs for it
    Models {
        /// DDL script to read
        ddl_file: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum)]
        format: Option<Format>,
    },

    /// Read a live database catalog and print Rust structs for it
    Introspect {
        /// Connection URL (defaults to the configured database)
        #[arg(long)]
        url: Option<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum)]
        format: Option<Format>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::for_dialect(cli.dialect.unwrap_or(Dialect::Sqlite)),
    };
    if let Some(dialect) = cli.dialect {
        config.database.dialect = Some(dialect);
    }

    let mut logging = config.logging.clone().unwrap_or_default();
    match cli.verbose {
        0 => {}
        1 => logging.level = "debug".to_string(),
        _ => logging.level = "trace".to_string(),
    }
    init_logging(&Some(logging))?;

    match cli.command {
        Commands::Ddl { paths, output } => {
            let dialect = config.dialect()?;
            let descriptors = scan_models(&config, paths)?;
            let script = schema_bridge::DdlGenerator::new(dialect).generate(&descriptors)?;
            let output = output.or_else(|| config.output.ddl_file.clone().map(PathBuf::from));
            emit(&script.to_sql(), output.as_deref())?;
        }
        Commands::Provision { url, paths } => {
            if let Some(url) = url {
                config.database.url = url;
                config.database.dialect = cli.dialect;
            }
            let dialect = config.dialect()?;
            let descriptors = scan_models(&config, paths)?;

            let mut connection = DatabaseConnection::connect(&config.database)
                .await
                .context("connecting to the database")?;
            let script = provision(&mut connection, &descriptors, dialect).await?;
            connection.close().await?;
            info!(tables = script.statements.len(), "Provisioning complete");
        }
        Commands::Models { ddl_file, output, format } => {
            let dialect = config.dialect()?;
            let ddl = std::fs::read_to_string(&ddl_file)
                .with_context(|| format!("reading {}", ddl_file.display()))?;
            let recovered = parse_ddl(&ddl, dialect)?;
            write_recovered(&config, &recovered, output, format)?;
        }
        Commands::Introspect { url, output, format } => {
            if let Some(url) = url {
                config.database.url = url;
                config.database.dialect = cli.dialect;
            }
            let dialect = config.dialect()?;
            let mut connection = DatabaseConnection::connect(&config.database)
                .await
                .context("connecting to the database")?;
            let recovered = introspect(&mut connection, dialect).await?;
            connection.close().await?;
            write_recovered(&config, &recovered, output, format)?;
        }
    }

    Ok(())
}

fn scan_models(config: &Config, paths: Vec<String>) -> anyhow::Result<Vec<schema_bridge::RecordDescriptor>> {
    let mut models = config.models.clone();
    if !paths.is_empty() {
        models.paths = paths;
    }

    let mut registry = ModelRegistry::new(&models);
    registry.scan_and_register()?;
    if registry.get_models().is_empty() {
        bail!("no #[derive(Record)] structs found in {}", models.paths.join(", "));
    }
    Ok(registry.to_descriptors()?)
}

fn write_recovered(
    config: &Config,
    recovered: &RecoveredSchema,
    output: Option<PathBuf>,
    format: Option<Format>,
) -> anyhow::Result<()> {
    for fallback in &recovered.fallbacks {
        eprintln!(
            "note: {}.{} has unsupported type '{}', emitted as text",
            fallback.table, fallback.column, fallback.raw_type
        );
    }
    for skipped in &recovered.skipped {
        eprintln!("note: skipped {} statement", skipped.kind);
    }

    let format = format.map(OutputFormat::from).unwrap_or(config.output.format);
    let rendered = render_descriptors(&recovered.descriptors, format)?;
    let output = output.or_else(|| config.output.models_file.clone().map(PathBuf::from));
    emit(&rendered, output.as_deref())
}

fn emit(text: &str, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "Wrote output");
        }
        None => println!("{}", text),
    }
    Ok(())
}
