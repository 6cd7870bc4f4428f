//! Error types for the codec crate.

use std::io;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while parsing a collection body.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The body does not follow the expected JSON grammar.
    #[error("malformed structure: {message}")]
    MalformedStructure {
        /// Description of the structural error.
        message: String,
    },

    /// One collection element could not be decoded into a record.
    #[error("record {index} could not be decoded: {message}")]
    RecordDecodeFailed {
        /// Zero-based position of the element in the collection.
        index: u64,
        /// Description of the decoding error.
        message: String,
    },

    /// Reading the body or writing the outbound stream failed.
    #[error("transport interrupted: {0}")]
    TransportInterrupted(#[from] io::Error),
}

impl CodecError {
    /// Create a malformed structure error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedStructure {
            message: message.into(),
        }
    }

    /// Create a record decode error.
    pub fn record_decode_failed(index: u64, message: impl Into<String>) -> Self {
        Self::RecordDecodeFailed {
            index,
            message: message.into(),
        }
    }

    /// Returns true if the error was caused by the body's content rather than I/O.
    pub fn is_content_error(&self) -> bool {
        !matches!(self, CodecError::TransportInterrupted(_))
    }
}
