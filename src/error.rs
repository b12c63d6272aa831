//! Error types for apptrack
//!
//! This module provides the crate-wide error type, including:
//! - Distinguished fetch conditions (aborted, reauthentication required, rate limited)
//! - Nested error types for the key-value database and the encryption codec
//! - Machine-readable error codes for consumers that relay task errors

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for apptrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for apptrack
///
/// Each variant carries enough context to be recorded verbatim as a task's
/// terminal error message.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.page_size_cap")
        key: Option<String>,
    },

    /// The fetch was cancelled while waiting on the provider or a backoff sleep
    #[error("fetch aborted")]
    Aborted,

    /// The provider rejected the access token; the user must sign in again
    #[error("reauthentication required: {0}")]
    ReauthenticationRequired(String),

    /// No authenticated mail client is available
    #[error("mail client is not authenticated")]
    NotAuthenticated,

    /// The provider signalled a rate limit
    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    /// The provider answered with a non-success status
    #[error("provider error (HTTP {status}): {message}")]
    Provider {
        /// HTTP status code returned by the provider
        status: u16,
        /// Error message extracted from the response body
        message: String,
    },

    /// The provider answered successfully but the message lacks a usable field
    #[error("malformed message {id}: {reason}")]
    MalformedMessage {
        /// Provider message id
        id: String,
        /// What is missing or unparsable
        reason: String,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Invalid URL (provider base URL or derived endpoint)
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Key-value database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Encryption or decryption failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to write or read a persisted file
    #[error("failed to {operation} {}: {source}", path.display())]
    Persistence {
        /// The operation that failed ("write", "read", "create directory for")
        operation: &'static str,
        /// The file involved
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Task not found in the registry
    #[error("task not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new fetch tasks")]
    ShuttingDown,

    /// Resolution name not recognised
    #[error("unknown resolution: {0}")]
    UnknownResolution(String),

    /// Even the coarsest resolution has more buckets than the point budget allows
    #[error(
        "data is too large to plot: {buckets} yearly buckets exceed the budget of {max_points}"
    )]
    TooManyPoints {
        /// Number of buckets at the coarsest resolution
        buckets: usize,
        /// The maximum number of points requested
        max_points: usize,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Key-value database errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Encryption codec errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The encryption key is missing from the environment
    #[error("encryption key is not set; set the {0} environment variable")]
    MissingKey(&'static str),

    /// The encryption key does not have the required length
    #[error("encryption key must be 32 bytes (256 bits) long, got {0} bytes")]
    InvalidKeyLength(usize),

    /// The stored IV is not valid base64 or not 16 bytes
    #[error("invalid initialization vector: {0}")]
    InvalidIv(String),

    /// The stored ciphertext is not valid base64
    #[error("invalid ciphertext encoding: {0}")]
    InvalidCiphertext(String),

    /// Padding check failed (wrong key, wrong IV or corrupted ciphertext)
    #[error("decryption failed: bad padding")]
    BadPadding,
}

impl Error {
    /// Machine-readable error code (e.g., "aborted", "reauth_required")
    ///
    /// Pollers can use this for programmatic handling of terminal task errors.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Aborted => "aborted",
            Error::ReauthenticationRequired(_) => "reauth_required",
            Error::NotAuthenticated => "not_authenticated",
            Error::RateLimited(_) => "rate_limited",
            Error::Provider { .. } => "provider_error",
            Error::MalformedMessage { .. } => "malformed_message",
            Error::Network(_) => "network_error",
            Error::Url(_) => "invalid_url",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Crypto(_) => "crypto_error",
            Error::Io(_) => "io_error",
            Error::Persistence { .. } => "persistence_error",
            Error::Serialization(_) => "serialization_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::UnknownResolution(_) => "unknown_resolution",
            Error::TooManyPoints { .. } => "too_many_points",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether this error represents a cancellation rather than a failure
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_displays_fetch_aborted() {
        assert_eq!(Error::Aborted.to_string(), "fetch aborted");
        assert!(Error::Aborted.is_aborted());
        assert!(!Error::NotAuthenticated.is_aborted());
    }

    #[test]
    fn reauth_message_is_distinguishable() {
        let err = Error::ReauthenticationRequired("token expired".into());
        assert!(err.to_string().starts_with("reauthentication required"));
        assert_eq!(err.code(), "reauth_required");
    }

    #[test]
    fn codes_for_representative_variants() {
        let cases = vec![
            (
                Error::Config {
                    message: "bad".into(),
                    key: Some("fetch.page_size_cap".into()),
                },
                "config_error",
            ),
            (Error::RateLimited("429".into()), "rate_limited"),
            (
                Error::Provider {
                    status: 500,
                    message: "backend".into(),
                },
                "provider_error",
            ),
            (
                Error::Database(DatabaseError::QueryFailed("locked".into())),
                "database_error",
            ),
            (Error::Crypto(CryptoError::BadPadding), "crypto_error"),
            (
                Error::MalformedMessage {
                    id: "m1".into(),
                    reason: "no internalDate".into(),
                },
                "malformed_message",
            ),
            (Error::NotFound("task-1".into()), "not_found"),
            (Error::ShuttingDown, "shutting_down"),
            (
                Error::TooManyPoints {
                    buckets: 20,
                    max_points: 15,
                },
                "too_many_points",
            ),
            (Error::Other("boom".into()), "internal_error"),
        ];

        for (err, code) in cases {
            assert_eq!(err.code(), code, "wrong code for {err}");
        }
    }

    #[test]
    fn key_length_error_mentions_actual_length() {
        let err = Error::Crypto(CryptoError::InvalidKeyLength(12));
        assert_eq!(
            err.to_string(),
            "crypto error: encryption key must be 32 bytes (256 bits) long, got 12 bytes"
        );
    }

    #[test]
    fn persistence_error_names_path_and_operation() {
        let err = Error::Persistence {
            operation: "write",
            path: PathBuf::from("/data/email_results.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("write"));
        assert!(msg.contains("/data/email_results.json"));
    }
}
