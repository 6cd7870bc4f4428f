//! Error types for the sync engine.

use deltaflow_codec::CodecError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while tracking a collection.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A response body could not be parsed or re-streamed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The server answered with a status outside the success range.
    #[error("{method} {url} failed with status {status}: {body}")]
    UnexpectedStatus {
        /// Request method.
        method: String,
        /// Request URL.
        url: String,
        /// Response status code.
        status: u16,
        /// Leading part of the response body.
        body: String,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server sent a link that cannot be followed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Tracking was cancelled.
    #[error("tracking cancelled")]
    Cancelled,

    /// Configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The server is too old to support change tracking.
    #[error("server version {version} is below the required {minimum}")]
    UnsupportedServer {
        /// Version reported by the server.
        version: String,
        /// Minimum supported version.
        minimum: String,
    },

    /// The parser thread ended without delivering a continuation.
    #[error("parser ended without delivering a continuation")]
    HandoffLost,

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a supervising process may restart tracking after this error.
    ///
    /// The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::UnexpectedStatus { status, .. } => *status == 429 || *status >= 500,
            SyncError::Codec(CodecError::TransportInterrupted(_)) => true,
            _ => false,
        }
    }
}
