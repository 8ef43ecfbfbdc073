//! Error taxonomy shared by the ingestion and query pipelines.
//!
//! Variants separate caller mistakes ([`Error::Validation`]) from transient
//! service failures ([`Error::Connection`], the only retryable class) and
//! from services that answered with something unusable
//! ([`Error::Generation`]). Storage failures arrive as `anyhow::Error`
//! from the [`Store`](crate::store::Store) trait and become
//! [`Error::Internal`].

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid caller input.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("text extraction failed: {0}")]
    Parsing(String),

    /// The embedding or generation service could not be reached in time.
    #[error("service unavailable: {0}")]
    Connection(String),

    /// The service answered, but with a non-success status or a body we
    /// could not use.
    #[error("service returned an unusable response: {0}")]
    Generation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Whether the caller may retry the failed operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Stable machine-readable class name.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::UnsupportedFormat(_) => "unsupported_format",
            Error::Parsing(_) => "parsing",
            Error::Connection(_) => "connection",
            Error::Generation(_) => "generation",
            Error::NotFound(_) => "not_found",
            Error::Internal(_) => "internal",
        }
    }

    /// Short message suitable for end users.
    ///
    /// Internal failures are reduced to a generic sentence so that storage
    /// details never leave the process.
    pub fn public_message(&self) -> String {
        match self {
            Error::Internal(_) => "internal error while processing the request".to_string(),
            Error::Connection(_) => "the AI service is unavailable, try again later".to_string(),
            other => other.to_string(),
        }
    }
}
