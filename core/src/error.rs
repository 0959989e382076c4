use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// No document with this id is indexed.
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("duplicate document id: {0}")]
    DuplicateDocumentId(String),

    #[error("unsupported retrieval model: {0} (expected BM25, TF_IDF or DirichletLM)")]
    UnsupportedModel(String),

    #[error("invalid result count: {0} (must be greater than zero)")]
    InvalidResultCount(i64),

    /// A corpus document could not be indexed; the previous index is untouched.
    #[error("index build failed at document {doc_id:?}: {reason}")]
    IndexBuildFailure { doc_id: String, reason: String },

    #[error("query exceeded its time budget of {budget_ms} ms")]
    QueryTimeout { budget_ms: u64 },

    #[error("index format version {found} is not supported (expected {expected})")]
    IncompatibleFormat { found: u32, expected: u32 },

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
