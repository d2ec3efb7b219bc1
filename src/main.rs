use clap::Parser;
use milvus_ingest::commands::{IngestRequest, ingest_csv};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "milvus-ingest")]
#[command(about = "Load a CSV of text chunks and embeddings into a Milvus collection")]
#[command(version)]
struct Cli {
    /// CSV file with `chunks`, `embedding` and `num_tokens` columns
    input: PathBuf,
    /// Destination collection; characters outside [A-Za-z0-9_] are removed
    collection: String,
    /// Path to a TOML config file (defaults to ~/.milvus-ingest/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Milvus host, overrides HOST / MILVUS_HOST
    #[arg(long)]
    host: Option<String>,
    /// Milvus port, overrides PORT / MILVUS_PORT
    #[arg(long)]
    port: Option<u16>,
    /// Maximum rows per insert request
    #[arg(long)]
    batch_size: Option<usize>,
    /// Skip re-creating the index after the insert
    #[arg(long)]
    no_reindex: bool,
    /// Validate and load into an in-memory store instead of Milvus
    #[arg(long)]
    dry_run: bool,
}

impl From<Cli> for IngestRequest {
    fn from(cli: Cli) -> Self {
        Self {
            input: cli.input,
            collection: cli.collection,
            config_path: cli.config,
            host: cli.host,
            port: cli.port,
            batch_size: cli.batch_size,
            no_reindex: cli.no_reindex,
            dry_run: cli.dry_run,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match ingest_csv(cli.into()).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", failure_message(&e));
            ExitCode::FAILURE
        }
    }
}

/// Full error chain, printed regardless of the log filter
fn failure_message(error: &anyhow::Error) -> String {
    format!("Error: {:#}", error)
}
