//! Error type for the indexing/query engine, layered on top of `CoreError`.

use search_core::CoreError;
use thiserror::Error;

/// Error kinds produced by the tokenizer, query parser, document encoder,
/// registry, and service facade.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Wraps a `search-core` error (schema / conversion / I/O / ...).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Malformed query string or unknown output field.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The registry was asked to act on an index with no such schema.
    #[error("index not found: {0}")]
    NotFound(String),

    /// `Service::*` called while `running == false`.
    #[error("the service is stopped")]
    ServiceStopped,

    /// The underlying `SearchEngine` implementation failed.
    #[error("engine error: {0}")]
    Engine(String),

    /// Filesystem or network I/O failure not already wrapped by `CoreError`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;

impl IndexError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    #[must_use]
    pub fn not_found(index: impl Into<String>) -> Self {
        Self::NotFound(index.into())
    }

    #[must_use]
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }

    /// The stable error-code string a transport layer can map onto a status code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Core(inner) => inner.error_code(),
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ServiceStopped => "SERVICE_STOPPED",
            Self::Engine(_) => "INTERNAL_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Whether retrying the same operation unchanged could plausibly succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Core(CoreError::Io(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_stopped_has_stable_code() {
        assert_eq!(IndexError::ServiceStopped.error_code(), "SERVICE_STOPPED");
    }

    #[test]
    fn core_error_codes_pass_through() {
        let err = IndexError::from(CoreError::not_found("articles"));
        assert_eq!(err.error_code(), "NOT_FOUND");
    }
}
