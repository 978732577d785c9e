//! Typed leaf errors for the frame codec and the response validator.
//!
//! Everything above these layers propagates `anyhow::Error` with step context.

use serde_json::Value;
use std::io;
use thiserror::Error;

/// Why a frame could not be read off the stream
#[derive(Debug, Error)]
pub enum FrameError {
    /// Peer closed the stream before the frame was complete
    #[error("connection closed by peer ({got}/{expected} bytes of {part})")]
    Closed {
        part: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{part} too large: {size} bytes (max: {max})")]
    TooLarge {
        part: &'static str,
        size: usize,
        max: usize,
    },

    /// Header bytes are not a UTF-8 JSON object
    #[error("malformed header: {0}")]
    Header(String),

    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

/// First contract check a response failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no response from server: {0}")]
    NoResponse(String),

    #[error("unexpected operation: expected {expected}, got {got}")]
    Operation { expected: String, got: String },

    #[error("unexpected direction: expected {expected}, got {got}")]
    Direction { expected: String, got: String },

    #[error("unexpected type: expected {expected}, got {got}")]
    Type { expected: String, got: String },

    #[error("status {status} != {expected}: {message}")]
    Status {
        status: String,
        expected: i64,
        message: String,
    },

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("mismatched field {field}: expected {expected}, got {got}")]
    Mismatch {
        field: String,
        expected: Value,
        got: Value,
    },

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

impl ValidationError {
    /// Short machine-friendly name of the failed check
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::NoResponse(_) => "no_response",
            ValidationError::Operation { .. } => "operation",
            ValidationError::Direction { .. } => "direction",
            ValidationError::Type { .. } => "type",
            ValidationError::Status { .. } => "status",
            ValidationError::MissingField(_) => "missing_field",
            ValidationError::Mismatch { .. } => "mismatch",
            ValidationError::InvalidField { .. } => "invalid_field",
        }
    }
}
