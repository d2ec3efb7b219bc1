// CSV record parsing
// Turns rows of `chunks`, `embedding`, `num_tokens` into records ready for insertion


use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::schema::{CHUNKS_COLUMN, EMBEDDING_COLUMN, NUM_TOKENS_COLUMN};

/// One ingestible row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Chunk text, unmodified from the `chunks` column
    pub content: String,
    pub embedding: Vec<f32>,
    /// Raw `num_tokens` cell. Coerced to an integer only when the insert payload is built.
    pub num_tokens: String,
}

impl Record {
    /// Integer value of the `num_tokens` cell, if it holds one
    #[inline]
    pub fn num_tokens_value(&self) -> Option<i64> {
        self.num_tokens.trim().parse().ok()
    }
}

#[derive(Debug, Error)]
pub enum EmbeddingFormatError {
    #[error("value must be enclosed in '[' and ']'")]
    MissingBrackets,
    #[error("element {index} ({token:?}) is not a number")]
    InvalidNumber { index: usize, token: String },
    #[error("element {index} is not finite")]
    NonFinite { index: usize },
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Missing required column '{0}' in CSV header")]
    MissingColumn(&'static str),
    #[error("Invalid embedding format at row {row}: {reason}")]
    InvalidEmbeddingFormat {
        row: usize,
        #[source]
        reason: EmbeddingFormatError,
    },
}

/// Parse a bracketed, comma separated list of numbers such as `[0.1,0.2,0.3]`
///
/// `[]` yields an empty vector. Whitespace around the brackets and around each
/// element is ignored.
#[inline]
pub fn parse_embedding(cell: &str) -> Result<Vec<f32>, EmbeddingFormatError> {
    let inner = cell
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or(EmbeddingFormatError::MissingBrackets)?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .enumerate()
        .map(|(index, token)| {
            let token = token.trim();
            let value: f32 = token
                .parse()
                .map_err(|_| EmbeddingFormatError::InvalidNumber {
                    index,
                    token: token.to_string(),
                })?;
            if value.is_finite() {
                Ok(value)
            } else {
                Err(EmbeddingFormatError::NonFinite { index })
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct ColumnIndices {
    chunks: usize,
    embedding: usize,
    num_tokens: usize,
}

impl ColumnIndices {
    fn from_headers(headers: &StringRecord) -> Result<Self, ParseError> {
        let find = |name: &'static str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or(ParseError::MissingColumn(name))
        };

        Ok(Self {
            chunks: find(CHUNKS_COLUMN)?,
            embedding: find(EMBEDDING_COLUMN)?,
            num_tokens: find(NUM_TOKENS_COLUMN)?,
        })
    }
}

/// Streaming reader yielding one [`Record`] per CSV data row
pub struct RecordReader<R: Read> {
    reader: csv::Reader<R>,
    columns: ColumnIndices,
    row: usize,
    buffer: StringRecord,
}

impl RecordReader<File> {
    #[inline]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ParseError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Self::new(file)
    }
}

impl<R: Read> RecordReader<R> {
    /// Wrap a CSV source and validate its header row
    #[inline]
    pub fn new(source: R) -> Result<Self, ParseError> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(source);
        let columns = ColumnIndices::from_headers(reader.headers()?)?;
        debug!("Resolved CSV columns: {:?}", columns);

        Ok(Self {
            reader,
            columns,
            row: 0,
            buffer: StringRecord::new(),
        })
    }

    /// Number of data rows read so far
    #[inline]
    pub fn rows_read(&self) -> usize {
        self.row
    }

    fn build_record(&self) -> Result<Record, ParseError> {
        let field = |index: usize| self.buffer.get(index).unwrap_or_default();

        let embedding = parse_embedding(field(self.columns.embedding)).map_err(|reason| {
            ParseError::InvalidEmbeddingFormat {
                row: self.row,
                reason,
            }
        })?;

        Ok(Record {
            content: field(self.columns.chunks).to_string(),
            embedding,
            num_tokens: field(self.columns.num_tokens).to_string(),
        })
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record(&mut self.buffer) {
            Ok(true) => {
                self.row += 1;
                Some(self.build_record())
            }
            Ok(false) => None,
            Err(e) => Some(Err(e.into())),
        }
    }
}

/// Read every record of a CSV file into memory.
///
/// Either all rows parse, or the first failure is returned and nothing is kept.
#[inline]
pub fn parse_csv_file<P: AsRef<Path>>(path: P) -> Result<Vec<Record>, ParseError> {
    let path = path.as_ref();
    debug!("Parsing CSV file {}", path.display());

    let records = RecordReader::from_path(path)?.collect::<Result<Vec<_>, _>>()?;

    info!("Parsed {} records from {}", records.len(), path.display());
    Ok(records)
}
