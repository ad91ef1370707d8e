//! Error types used throughout the engine

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::Direction;

/// Main error type for Pelagic
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum PelagicError {
    /// A request body could not be encoded or decoded by the body codec.
    #[error("Unsupported body kind: {0}")]
    UnsupportedBodyKind(String),

    /// The authentication flow failed or was denied.
    #[error("Authentication failed: {0}")]
    FailedAuthentication(String),

    /// The transport failed or the server answered with a non-2xx status.
    #[error("Transport error{}: {message}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Transport {
        /// HTTP status, when a response was received at all.
        status: Option<u16>,
        /// Human-readable description.
        message: String,
    },

    /// Pagination was requested past the last available cursor.
    #[error("No page available {0}")]
    NoSuchPage(Direction),

    /// The request store could not be read or written.
    #[error("Store I/O error: {0}")]
    StoreIo(String),

    /// The in-flight attempt was torn down by `interrupt()` or `abandon()`.
    #[error("Request {0} was interrupted")]
    Interrupted(Uuid),

    /// A response or persisted record could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A caller passed a value the engine cannot use.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Broken internal invariant.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PelagicError {
    /// Build a transport error for a response with the given status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport { status: Some(status), message: message.into() }
    }

    /// Build a transport error for a failure that produced no response.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Transport { status: None, message: message.into() }
    }

    /// Whether the operation that produced this error can be retried.
    ///
    /// Authentication and transport failures are recoverable; interrupted
    /// requests are resumable. Everything else needs a code or config change.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FailedAuthentication(_) | Self::Transport { .. } | Self::Interrupted(_)
        )
    }
}

/// Result type alias for Pelagic operations
pub type Result<T> = std::result::Result<T, PelagicError>;
