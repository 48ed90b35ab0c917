use std::path::PathBuf;
use std::sync::Arc;
use clap::{Parser, Subcommand};
use csv_ingestion::{
    application::import_service::ImportService,
    config::AppConfig,
    http_service,
    infrastructure::postgres::PgTableRepository,
};
use tracing::{info, debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "csv_ingestion", about = "Chunked CSV import and CSV upload service")]
struct Cli {
    /// YAML configuration file; environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a CSV file into a freshly created table in chunks
    Import {
        #[arg(long)]
        csv_path: Option<PathBuf>,
        #[arg(long)]
        table: Option<String>,
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Serve the CSV upload endpoint
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("csv_ingestion=info".parse()?)
            .add_directive("sqlx=warn".parse()?))
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    debug!("Database: {}@{}:{}/{}", config.database.user, config.database.host,
        config.database.port, config.database.database);

    match cli.command {
        Command::Import { csv_path, table, chunk_size } => {
            if let Some(path) = csv_path {
                config.import.csv_path = path;
            }
            if let Some(table) = table {
                config.import.table_name = table;
            }
            if let Some(size) = chunk_size {
                config.import.chunk_size = size;
            }
            config.validate()?;

            let repo = Arc::new(PgTableRepository::new(config.database.connect_options()));
            let service = ImportService::new(repo);
            let summary = service.run(&config.import).await
                .map_err(|e| {
                    error!("✗ IMPORT FAILED: {}", e);
                    e
                })?;
            info!("Imported {} rows into {} in {} chunks",
                summary.total_rows, summary.table, summary.chunks.len());
            if let Ok(json) = serde_json::to_string(&summary) {
                debug!("Import summary: {}", json);
            }
        }
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind_addr = bind;
            }
            http_service::serve(&config).await?;
        }
    }

    Ok(())
}
