//! Common error types for the dead-drop client.

use thiserror::Error;

/// Top-level error type for dead-drop operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A required setting is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key material could not be located or read.
    #[error("Key access error: {0}")]
    KeyAccess(String),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Envelope authentication tag did not match.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Downloaded object does not match its reference checksum.
    #[error("Object integrity compromised, discarding unsafe pull: {0}")]
    IntegrityViolation(String),

    /// Malformed object reference.
    #[error("Format error: {0}")]
    Format(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The token endpoint refused to issue a token.
    #[error("Token request failed: {0}")]
    AuthRequest(String),

    /// The issued token could not be decrypted with the local private key.
    #[error("Failed to decrypt authorization token: {0}")]
    TokenDecrypt(String),

    /// Remote rejected the token on both the first attempt and the retry.
    #[error("Authentication exhausted: remote answered unauthorized {attempts} times")]
    AuthExhausted { attempts: u32 },

    /// Request failed at the transport level (`status` is None) or with a
    /// non-success status.
    #[error("Request failed{}: {message}", status.map(|s| format!(" with status {}", s)).unwrap_or_default())]
    RequestFailed { status: Option<u16>, message: String },

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Build a transport-level request failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status: None,
            message: message.into(),
        }
    }

    /// Build a request failure for an unexpected response status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status: Some(status),
            message: message.into(),
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
