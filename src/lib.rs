use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Parse error: {0}")]
    Parse(#[from] records::ParseError),

    #[error("Vector store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Invalid collection name {0:?}: nothing left after removing characters outside [A-Za-z0-9_]")]
    InvalidCollectionName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod loader;
pub mod records;
pub mod schema;
pub mod store;
