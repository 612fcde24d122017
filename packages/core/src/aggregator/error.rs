//! Error types for flight aggregation

use thiserror::Error;

/// A query that cannot be searched. The only error surfaced to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing or invalid parameters: {fields}")]
    MissingParameters { fields: String },

    #[error("Invalid travel_date '{value}', expected YYYY-MM-DD")]
    InvalidDate { value: String },

    /// A record offered to the cache store lacks a required field.
    #[error("Missing required fields")]
    MissingFields,
}

impl ValidationError {
    pub fn missing(fields: impl Into<String>) -> Self {
        Self::MissingParameters { fields: fields.into() }
    }

    pub fn invalid_date(value: impl Into<String>) -> Self {
        Self::InvalidDate { value: value.into() }
    }
}

/// Coarse classification of a provider failure, used for metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    UpstreamTimeout,
    UpstreamHttpError,
    MalformedResponse,
}

impl FailureKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            FailureKind::UpstreamTimeout => "timeout",
            FailureKind::UpstreamHttpError => "http_error",
            FailureKind::MalformedResponse => "malformed",
        }
    }
}

/// Errors from flight data providers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Upstream timeout: {message}")]
    UpstreamTimeout { message: String },

    #[error("Upstream returned HTTP {status}: {body}")]
    UpstreamHttp { status: u16, body: String },

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },
}

impl ProviderError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::UpstreamTimeout { message: message.into() }
    }

    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::UpstreamHttp { status, body: body.into() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse { message: message.into() }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::UpstreamTimeout { .. } => FailureKind::UpstreamTimeout,
            ProviderError::UpstreamHttp { .. } => FailureKind::UpstreamHttpError,
            ProviderError::MalformedResponse { .. } => FailureKind::MalformedResponse,
        }
    }
}

/// Errors from the quote cache store
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache unavailable: {message}")]
    Unavailable { message: String },

    #[error("Cache rejected write: {message}")]
    Rejected { message: String },

    #[error("Cache storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected { message: message.into() }
    }
}
