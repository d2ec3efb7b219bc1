use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use tracing::info;

use crate::config::Config;
use crate::loader::{IngestSummary, Loader, LoaderOptions};
use crate::store::{MemoryStore, MilvusClient, VectorStore};

/// Everything the `milvus-ingest` command line can ask for
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub input: PathBuf,
    pub collection: String,
    pub config_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub batch_size: Option<usize>,
    pub no_reindex: bool,
    pub dry_run: bool,
}

/// Apply command line overrides on top of file and environment settings
#[inline]
pub fn apply_overrides(config: &mut Config, request: &IngestRequest) -> Result<()> {
    if let Some(host) = &request.host {
        config.milvus.set_host(host.clone())?;
    }
    if let Some(port) = request.port {
        config.milvus.set_port(port)?;
    }
    if let Some(batch_size) = request.batch_size {
        config.ingest.batch_size = batch_size;
    }
    if request.no_reindex {
        config.ingest.rebuild_index_after_insert = false;
    }

    config
        .validate()
        .context("Invalid configuration after applying command line options")?;
    Ok(())
}

/// Load a CSV file of chunks and embeddings into a collection
#[inline]
pub async fn ingest_csv(request: IngestRequest) -> Result<IngestSummary> {
    let mut config =
        Config::resolve(request.config_path.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &request)?;

    let options = LoaderOptions {
        show_progress: true,
        ..LoaderOptions::from(&config.ingest)
    };

    let summary = if request.dry_run {
        info!("Dry run: loading into an in-memory store");
        run_loader(MemoryStore::new(), &config, options, &request).await?
    } else {
        info!("Connecting to Milvus at {}", config.milvus.address());
        let client =
            MilvusClient::new(&config.milvus).context("Failed to initialize Milvus client")?;
        run_loader(client, &config, options, &request).await?
    };

    print_summary(&summary, request.dry_run);
    Ok(summary)
}

async fn run_loader<S: VectorStore>(
    store: S,
    config: &Config,
    options: LoaderOptions,
    request: &IngestRequest,
) -> Result<IngestSummary> {
    let loader = Loader::new(store, config.schema.clone()).with_options(options);

    loader
        .ingest_file(&request.input, &request.collection)
        .await
        .with_context(|| {
            format!(
                "Failed to load {} into collection {:?}",
                request.input.display(),
                request.collection
            )
        })
}

fn print_summary(summary: &IngestSummary, dry_run: bool) {
    if dry_run {
        eprintln!("{}", style("Dry run, nothing was written to Milvus").yellow());
    }
    println!("{}", format_summary(summary));
}

// Collection creation is already reported by the loader's log line
fn format_summary(summary: &IngestSummary) -> String {
    format!(
        "{} Inserted {} of {} records into {} ({} batches)",
        style("✓").green(),
        summary.inserted,
        summary.records,
        style(&summary.collection).cyan(),
        summary.batches
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn write_fixture(dir: &TempDir) -> (PathBuf, PathBuf) {
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "[schema]\ndimension = 2\n").expect("should write config");

        let csv_path = dir.path().join("chunks.csv");
        fs::write(
            &csv_path,
            "chunks,embedding,num_tokens\nhello,\"[0.1,0.2]\",2\nworld,\"[0.3,0.4]\",1\n",
        )
        .expect("should write csv");

        (config_path, csv_path)
    }

    #[test]
    fn overrides_take_precedence() {
        let mut config = Config::default();
        let request = IngestRequest {
            host: Some("milvus.internal".to_string()),
            port: Some(29530),
            batch_size: Some(10),
            no_reindex: true,
            ..IngestRequest::default()
        };

        apply_overrides(&mut config, &request).expect("overrides apply");
        assert_eq!(config.milvus.address(), "milvus.internal:29530");
        assert_eq!(config.ingest.batch_size, 10);
        assert!(!config.ingest.rebuild_index_after_insert);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let mut config = Config::default();
        let request = IngestRequest {
            batch_size: Some(0),
            ..IngestRequest::default()
        };
        assert!(apply_overrides(&mut config, &request).is_err());

        let request = IngestRequest {
            port: Some(0),
            ..IngestRequest::default()
        };
        assert!(apply_overrides(&mut config, &request).is_err());
    }

    #[test]
    fn summary_reports_counts_without_repeating_creation() {
        let summary = IngestSummary {
            collection: "MyOrg".to_string(),
            created: true,
            records: 2,
            inserted: 2,
            batches: 1,
        };

        let text = console::strip_ansi_codes(&format_summary(&summary)).into_owned();
        assert!(text.contains("Inserted 2 of 2 records into MyOrg (1 batches)"));
        assert!(!text.contains("has been created"));
    }

    #[tokio::test]
    #[serial]
    async fn dry_run_ingests_into_memory() {
        let dir = TempDir::new().expect("should create temp dir");
        let (config_path, csv_path) = write_fixture(&dir);

        let summary = ingest_csv(IngestRequest {
            input: csv_path,
            collection: "My Org!".to_string(),
            config_path: Some(config_path),
            dry_run: true,
            ..IngestRequest::default()
        })
        .await
        .expect("dry run succeeds");

        assert_eq!(summary.collection, "MyOrg");
        assert!(summary.created);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.inserted, 2);
    }

    #[tokio::test]
    #[serial]
    async fn dry_run_reports_missing_input() {
        let dir = TempDir::new().expect("should create temp dir");
        let (config_path, _) = write_fixture(&dir);

        let result = ingest_csv(IngestRequest {
            input: dir.path().join("missing.csv"),
            collection: "docs".to_string(),
            config_path: Some(config_path),
            dry_run: true,
            ..IngestRequest::default()
        })
        .await;

        let error = result.expect_err("missing input fails");
        assert!(format!("{:#}", error).contains("missing.csv"));
    }
}
