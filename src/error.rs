pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid backend {0:?}: expected bm25, instructor, e5, or gtr")]
    InvalidBackend(String),

    #[error("invalid granularity {0:?}: expected paragraphs or propositions")]
    InvalidGranularity(String),

    #[error("index is not empty: create a new index or clear the existing one")]
    IndexNotEmpty,

    #[error("no index loaded: build a new index or load one from disk first")]
    IndexNotLoaded,

    #[error("unsupported index type: {0}")]
    UnsupportedIndexType(String),

    #[error("document too long: {len} chars exceeds the {max} char segmenter ceiling")]
    DocumentTooLong { len: usize, max: usize },

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("encoder error: {0}")]
    Encode(String),

    #[error("configuration error: {0}")]
    Config(String),
}
