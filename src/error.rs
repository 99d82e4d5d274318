use std::io;

use thiserror::Error;

/// Errors surfaced by the index core. Only `AlreadyIndexed` situations are
/// recoverable and those are reported through `IndexerStatus`, not here.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("corpus directory not found: {0}")]
    CorpusNotFound(String),

    #[error("io failure: {0}")]
    Io(#[from] io::Error),

    /// The declared byte sizes and the decoded element count disagree. The
    /// index is considered corrupt; the current query is aborted.
    #[error("codec mismatch: expected {expected} elements, decoded {decoded}")]
    CodecMismatch { expected: usize, decoded: usize },

    #[error("unknown encoding id: {0}")]
    UnknownEncoding(u8),

    #[error("corrupt index data: {0}")]
    Corrupt(String),

    /// Programmer error (block misuse, bad candidate sets, out-of-domain
    /// values for a codec).
    #[error("usage error: {0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
