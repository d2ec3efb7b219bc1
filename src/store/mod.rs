// Vector store backends
// The loader only talks to the `VectorStore` trait; Milvus and an in-memory store implement it

pub mod memory;
pub mod milvus;

use async_trait::async_trait;
use thiserror::Error;

use crate::records::Record;
use crate::schema::CollectionSchema;

pub use memory::{MemoryStore, StoreCall};
pub use milvus::{MilvusClient, MilvusError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Collection '{0}' does not exist")]
    CollectionNotFound(String),

    #[error("Collection '{0}' already exists")]
    CollectionExists(String),

    #[error("Index '{index}' on collection '{collection}' already exists with different parameters")]
    IndexConflict { collection: String, index: String },

    #[error("Collection '{0}' has no index on its vector field")]
    IndexNotFound(String),

    #[error("Embedding dimension mismatch at row {row}: expected {expected}, got {actual}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Content at row {row} is {bytes} bytes long (limit {limit})")]
    ContentTooLong {
        row: usize,
        bytes: usize,
        limit: usize,
    },

    #[error("num_tokens at row {row} is not an integer: {value:?}")]
    InvalidNumTokens { row: usize, value: String },

    #[error("Milvus error: {0}")]
    Milvus(#[from] MilvusError),
}

/// Operations the loader needs from a vector database
///
/// Every call is awaited to completion before the next one is issued.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn has_collection(&self, name: &str) -> Result<bool, StoreError>;

    /// Create a collection with `id`, `embedding`, `content` and `numToken` fields
    async fn create_collection(
        &self,
        name: &str,
        schema: &CollectionSchema,
    ) -> Result<(), StoreError>;

    /// Create the HNSW index on the embedding field. An identical existing index is not an error.
    async fn create_index(&self, name: &str, schema: &CollectionSchema) -> Result<(), StoreError>;

    /// Load the collection into memory, returning once it is queryable
    async fn load_collection(&self, name: &str) -> Result<(), StoreError>;

    /// Insert records and return the number of rows written
    ///
    /// `first_row` is the 1-based input row number of `records[0]`, used in error reports.
    async fn insert(
        &self,
        name: &str,
        schema: &CollectionSchema,
        records: &[Record],
        first_row: usize,
    ) -> Result<u64, StoreError>;
}

/// Check records against the schema before they are sent anywhere
///
/// `first_row` is the 1-based row number of `records[0]` in the input file.
#[inline]
pub fn validate_records(
    schema: &CollectionSchema,
    records: &[Record],
    first_row: usize,
) -> Result<(), StoreError> {
    for (offset, record) in records.iter().enumerate() {
        let row = first_row + offset;

        if record.embedding.len() != schema.dimension() {
            return Err(StoreError::DimensionMismatch {
                row,
                expected: schema.dimension(),
                actual: record.embedding.len(),
            });
        }

        // VarChar max_length is enforced on the UTF-8 encoded size
        let bytes = record.content.len();
        if bytes > schema.max_content_length() {
            return Err(StoreError::ContentTooLong {
                row,
                bytes,
                limit: schema.max_content_length(),
            });
        }

        if record.num_tokens_value().is_none() {
            return Err(StoreError::InvalidNumTokens {
                row,
                value: record.num_tokens.clone(),
            });
        }
    }

    Ok(())
}
