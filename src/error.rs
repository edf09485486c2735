use thiserror::Error;

use crate::models::TransportKind;

/// Why a payload produced no reading at all
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RejectedRecord {
    #[error("malformed record: expected at least {expected} fields, got {found}")]
    Malformed { expected: usize, found: usize },

    #[error("notification payload is not valid base64: {0}")]
    InvalidEncoding(String),
}

/// Session-scoped failures surfaced by transports and the session controller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("{kind} transport is not supported on this platform: {reason}")]
    UnsupportedTransport { kind: TransportKind, reason: String },

    #[error("{kind} error: {message}")]
    TransportConnect { kind: TransportKind, message: String },

    #[error("{kind} read error: {message}")]
    TransportRead { kind: TransportKind, message: String },

    #[error("a {0} session is already active")]
    AlreadyConnected(TransportKind),
}

impl IngestError {
    pub fn connect(kind: TransportKind, err: impl std::fmt::Display) -> Self {
        IngestError::TransportConnect {
            kind,
            message: err.to_string(),
        }
    }

    pub fn read(kind: TransportKind, err: impl std::fmt::Display) -> Self {
        IngestError::TransportRead {
            kind,
            message: err.to_string(),
        }
    }
}
