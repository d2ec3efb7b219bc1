// Collection provisioning and bulk loading
// Runs the fixed sequence: exists? -> create -> index -> load -> insert -> index


use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_BATCH_SIZE, IngestConfig};
use crate::records::{Record, parse_csv_file};
use crate::schema::{CollectionSchema, sanitize_collection_name};
use crate::store::{VectorStore, validate_records};
use crate::{IngestError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderOptions {
    pub batch_size: usize,
    pub rebuild_index_after_insert: bool,
    pub show_progress: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            rebuild_index_after_insert: true,
            show_progress: false,
        }
    }
}

impl From<&IngestConfig> for LoaderOptions {
    #[inline]
    fn from(config: &IngestConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            rebuild_index_after_insert: config.rebuild_index_after_insert,
            show_progress: false,
        }
    }
}

/// Result of making sure a collection is ready for inserts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    /// Sanitized collection name actually used
    pub collection: String,
    /// Whether this call created the collection
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub collection: String,
    pub created: bool,
    pub records: usize,
    pub inserted: u64,
    pub batches: usize,
}

/// Provisions a collection and loads records into it through a [`VectorStore`]
pub struct Loader<S: VectorStore> {
    store: S,
    schema: CollectionSchema,
    options: LoaderOptions,
}

impl<S: VectorStore> Loader<S> {
    #[inline]
    pub fn new(store: S, schema: CollectionSchema) -> Self {
        Self {
            store,
            schema,
            options: LoaderOptions::default(),
        }
    }

    #[inline]
    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = LoaderOptions {
            batch_size: options.batch_size.max(1),
            ..options
        };
        self
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    /// Make sure the collection exists, is indexed and is loaded.
    ///
    /// Creation is skipped when the collection already exists. The index and
    /// load calls are always issued.
    #[inline]
    pub async fn provision(&self, requested_name: &str) -> Result<ProvisionOutcome> {
        let collection = sanitize_collection_name(requested_name);
        if collection.is_empty() {
            return Err(IngestError::InvalidCollectionName(
                requested_name.to_string(),
            ));
        }
        if collection != requested_name {
            debug!(
                "Sanitized collection name {:?} to {:?}",
                requested_name, collection
            );
        }

        let exists = self.store.has_collection(&collection).await?;

        let created = if exists {
            debug!("Collection {} already exists", collection);
            false
        } else {
            self.store
                .create_collection(&collection, &self.schema)
                .await?;
            info!("Collection {} has been created", collection);
            true
        };

        self.store.create_index(&collection, &self.schema).await?;
        debug!(
            "Index {} ensured on collection {}",
            self.schema.index.name, collection
        );

        self.store.load_collection(&collection).await?;
        debug!("Collection {} loaded", collection);

        Ok(ProvisionOutcome {
            collection,
            created,
        })
    }

    /// Provision the collection and insert every record, in batches.
    ///
    /// Records are checked against the schema before the first insert, so a
    /// bad row never leaves part of the input behind in the collection.
    #[inline]
    pub async fn ingest(&self, records: &[Record], requested_name: &str) -> Result<IngestSummary> {
        let outcome = self.provision(requested_name).await?;
        let collection = outcome.collection;

        validate_records(&self.schema, records, 1)?;

        let bar = self.progress_bar(records.len());
        let mut inserted = 0_u64;
        let mut batches = 0_usize;

        for batch in records.chunks(self.options.batch_size) {
            let first_row = batches * self.options.batch_size + 1;
            let count = self
                .store
                .insert(&collection, &self.schema, batch, first_row)
                .await?;
            inserted += count;
            batches += 1;
            bar.inc(batch.len() as u64);
            debug!(
                "Inserted batch {} ({} rows) into {}",
                batches,
                batch.len(),
                collection
            );
        }
        bar.finish_and_clear();

        if inserted != records.len() as u64 {
            warn!(
                "Store reported {} inserted rows for {} records",
                inserted,
                records.len()
            );
        }

        if self.options.rebuild_index_after_insert && batches > 0 {
            self.store.create_index(&collection, &self.schema).await?;
        }

        info!("Done insertion and indexing");

        Ok(IngestSummary {
            collection,
            created: outcome.created,
            records: records.len(),
            inserted,
            batches,
        })
    }

    /// Parse a CSV file completely, then ingest its records
    #[inline]
    pub async fn ingest_file<P: AsRef<Path>>(
        &self,
        path: P,
        requested_name: &str,
    ) -> Result<IngestSummary> {
        let records = parse_csv_file(path)?;
        self.ingest(&records, requested_name).await
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if self.options.show_progress && console::user_attended_stderr() {
            ProgressBar::new(len as u64).with_style(
                ProgressStyle::with_template("{bar:40} [{pos}/{len}] Inserting rows")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        }
    }
}
