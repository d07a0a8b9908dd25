/// Top-level Sift error type.
///
/// All fallible operations in `sift-core` return [`Result<T, SiftError>`](Result).
/// Each variant wraps a domain-specific error enum, allowing callers to
/// match on the error source without losing type information.
#[derive(thiserror::Error, Debug)]
pub enum SiftError {
    /// Error from the paper store layer (`SQLite` operations, schema setup).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error communicating with a text-generation provider.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error while ingesting a single candidate record.
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),
}

/// Errors from the SQLite-backed paper store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema setup failed.
    #[error("Schema setup failed: {0}")]
    Schema(String),

    /// A referenced paper was not found in the store.
    #[error("Paper not found: {0}")]
    NotFound(String),
}

/// Errors in Sift configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),

    /// A required credential environment variable is unset or empty.
    #[error("Missing credential: {0} is not set")]
    MissingCredential(String),
}

/// Errors while ingesting a candidate paper.
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    /// The candidate's external identifier is empty after normalization.
    #[error("Candidate has no usable external id (title: {0:?})")]
    MissingId(String),
}

/// Errors from text-generation provider interactions.
///
/// Every variant classifies itself as transient or fatal through
/// [`ProviderError::is_transient`]; only transient errors are retried.
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    /// Network-level failure connecting to the provider.
    #[error("Network error: {message}")]
    Network {
        /// Description of the network failure.
        message: String,
        /// Whether the fault is worth retrying (timeout, connection reset).
        transient: bool,
    },

    /// Provider API returned a non-success HTTP status.
    #[error("API error (HTTP {status}): {body}")]
    Api {
        /// HTTP status code from the provider.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// Provider response could not be parsed into the expected format.
    #[error("Response parse error: {0}")]
    Parse(String),

    /// Provider configuration is missing or invalid (API key, model, mode).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transient failures persisted through every allowed attempt.
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made, including the first.
        attempts: u32,
        /// The failure from the final attempt.
        last: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Whether the error is a transient fault the adapter should retry:
    /// rate limiting, request timeouts, server errors, and flaky network.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { transient, .. } => *transient,
            Self::Api { status, .. } => is_transient_status(*status),
            Self::Parse(_) | Self::Config(_) | Self::RetriesExhausted { .. } => false,
        }
    }

    /// Classify a `reqwest` transport error.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Api {
                status: status.as_u16(),
                body: err.to_string(),
            };
        }
        if err.is_decode() {
            return Self::Parse(err.to_string());
        }
        if err.is_builder() {
            return Self::Config(err.to_string());
        }
        Self::Network {
            message: err.to_string(),
            transient: err.is_timeout()
                || err.is_connect()
                || err.is_request()
                || err.is_body(),
        }
    }
}

/// HTTP statuses that indicate a retryable provider condition.
///
/// 529 is Anthropic's "overloaded" status.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

/// Convenience alias for `Result<T, SiftError>`.
pub type Result<T> = std::result::Result<T, SiftError>;
