//! Error types shared across the search service.

use thiserror::Error;

/// Error kinds produced by schema loading, field conversion, and query assembly.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Requested schema does not exist.
    #[error("index not found: {0}")]
    NotFound(String),

    /// Schema creation requested for an index that already exists.
    #[error("index already exists: {0}")]
    AlreadyExists(String),

    /// Schema JSON failed validation (duplicate field, unknown type, no PK field, ...).
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Malformed request from the caller (bad query syntax, unknown output field, ...).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A field value could not be converted to its schema-declared native type.
    #[error("cannot convert field {field}: {message}")]
    ConversionError { field: String, message: String },

    /// Filesystem or network I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected failure with no more specific kind.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout `search-core`.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

impl CoreError {
    #[must_use]
    pub fn not_found(index: impl Into<String>) -> Self {
        Self::NotFound(index.into())
    }

    #[must_use]
    pub fn already_exists(index: impl Into<String>) -> Self {
        Self::AlreadyExists(index.into())
    }

    #[must_use]
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema(message.into())
    }

    #[must_use]
    pub fn conversion(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConversionError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// The stable error-code string a transport layer can map onto a status code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::InvalidSchema(_) => "INVALID_SCHEMA",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::ConversionError { .. } => "CONVERSION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying the same operation unchanged could plausibly succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
