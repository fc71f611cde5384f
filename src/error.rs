//! Error types for the ingestion, storage and query layers.

use thiserror::Error;

/// Failure fetching a remote source document.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Connection failure or timeout.
    #[error("network error fetching {path}: {message}")]
    Network { path: String, message: String },

    /// The remote answered with a non-success status.
    #[error("GET {path} returned HTTP {status}: {body}")]
    Remote {
        path: String,
        status: u16,
        body: String,
    },

    #[error("malformed JSON in {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SourceError {
    pub fn path(&self) -> &str {
        match self {
            Self::Network { path, .. } | Self::Remote { path, .. } | Self::Decode { path, .. } => {
                path
            }
        }
    }
}

/// A source record that could not be mapped onto the canonical model.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("unrecognized {document} document shape")]
    UnrecognizedShape { document: &'static str },

    #[error("missing or invalid field '{field}'")]
    MissingField { field: &'static str },

    #[error("malformed record: {reason}")]
    Malformed { reason: String },

    #[error("cannot resolve verse ordinal from '{key}'")]
    BadOrdinal { key: String },

    #[error("verse {verse} has empty text")]
    EmptyText { verse: u32 },
}

/// Persistence failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failure that ends an ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("chapter {chapter}: {source}")]
    Source {
        chapter: u32,
        #[source]
        source: SourceError,
    },

    #[error("chapter index: {0}")]
    Index(#[source] SourceError),

    #[error("chapter index: {0}")]
    IndexShape(#[source] NormalizeError),

    #[error("chapter {chapter}: {source}")]
    Normalize {
        chapter: u32,
        #[source]
        source: NormalizeError,
    },

    #[error("chapter {chapter}: no usable chapter index entry")]
    NotIndexed { chapter: u32 },

    #[error("chapter index contained no usable entries")]
    EmptyIndex,

    #[error("ingestion cancelled")]
    Cancelled,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Failure answering a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Caller supplied a bad argument; always a client-side error.
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;
