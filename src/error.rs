//! Error taxonomy for the sync, storage, index and search pipeline.
//!
//! Every variant here terminates the operation that raised it. Malformed
//! per-issue data is reported separately through
//! [`ProjectionError`](crate::issue::ProjectionError) and never aborts a
//! sync batch; an operator interrupt is not an error at all (see
//! [`CancellationReport`](crate::fetcher::CancellationReport)).

use thiserror::Error;

use crate::codec::CodecError;

#[derive(Debug, Error)]
pub enum Error {
    /// The remote source answered with a non-success status. Carries the
    /// raw response body so the operator can see what the server said.
    #[error("remote source returned HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    #[error("request to remote source failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The response arrived but could not be decoded into issue records.
    #[error("malformed search response: {0}")]
    Payload(String),

    #[error("ticket store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("ticket payload codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("search index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("unsupported index language: {0}")]
    UnsupportedLanguage(String),

    /// A fetch worker panicked or was torn down unexpectedly.
    #[error("fetch worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
