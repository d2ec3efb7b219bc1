// Collection schema shared by the CSV parser, the loader and every store backend


use serde::{Deserialize, Serialize};

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;
pub const DEFAULT_MAX_CONTENT_LENGTH: u32 = 30_000;
pub const DEFAULT_DESCRIPTION: &str = "Job Handlers";

/// Field names as they appear in the collection
pub const ID_FIELD: &str = "id";
pub const EMBEDDING_FIELD: &str = "embedding";
pub const CONTENT_FIELD: &str = "content";
pub const NUM_TOKENS_FIELD: &str = "numToken";

/// Column names expected in the input CSV header
pub const CHUNKS_COLUMN: &str = "chunks";
pub const EMBEDDING_COLUMN: &str = "embedding";
pub const NUM_TOKENS_COLUMN: &str = "num_tokens";

/// Distance metric used by the vector index
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MetricType {
    /// Squared Euclidean distance
    #[default]
    L2,
    #[serde(rename = "IP")]
    InnerProduct,
    #[serde(rename = "COSINE")]
    Cosine,
}

impl MetricType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::L2 => "L2",
            Self::InnerProduct => "IP",
            Self::Cosine => "COSINE",
        }
    }
}

/// HNSW index parameters for the embedding field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexSpec {
    pub name: String,
    pub metric: MetricType,
    /// Maximum graph degree
    pub m: u32,
    /// Candidate list size during graph construction
    pub ef_construction: u32,
}

impl Default for IndexSpec {
    fn default() -> Self {
        Self {
            name: "myindex".to_string(),
            metric: MetricType::L2,
            m: 4,
            ef_construction: 10,
        }
    }
}

impl IndexSpec {
    #[inline]
    pub fn index_type(&self) -> &'static str {
        "HNSW"
    }
}

/// Shape of the destination collection.
///
/// A single value of this type describes the vector dimension, text bounds
/// and index parameters, so the records produced by the parser and the
/// collection created by the loader always agree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectionSchema {
    pub dimension: u32,
    pub max_content_length: u32,
    pub description: String,
    pub enable_dynamic_field: bool,
    pub index: IndexSpec,
}

impl Default for CollectionSchema {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            description: DEFAULT_DESCRIPTION.to_string(),
            enable_dynamic_field: true,
            index: IndexSpec::default(),
        }
    }
}

impl CollectionSchema {
    #[inline]
    pub fn with_dimension(mut self, dimension: u32) -> Self {
        self.dimension = dimension;
        self
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension as usize
    }

    #[inline]
    pub fn max_content_length(&self) -> usize {
        self.max_content_length as usize
    }
}

/// Strip every character outside `[A-Za-z0-9_]` from a requested collection name
#[inline]
pub fn sanitize_collection_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}
