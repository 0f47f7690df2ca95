use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::TimestampError;

/// Failures raised by a store backend while acquiring a connection or
/// running a statement.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Missing result: {0}")]
    MissingResult(String),
}

/// The fixed set of failure kinds a caller can observe.
///
/// Numeric codes follow the gRPC status code space so a transport can map
/// them without a lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The requested API version is not the implemented one.
    Unimplemented,
    /// The request carried a malformed value.
    InvalidArgument,
    /// The targeted Id does not exist.
    NotFound,
    /// Connectivity, statement, or store integrity failure.
    Unknown,
}

impl ErrorKind {
    pub fn code(self) -> u32 {
        match self {
            ErrorKind::Unknown => 2,
            ErrorKind::InvalidArgument => 3,
            ErrorKind::NotFound => 5,
            ErrorKind::Unimplemented => 12,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Unimplemented => "Unimplemented",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// A classified failure returned by every service operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    kind: ErrorKind,
    message: String,
    field: Option<&'static str>,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field: None,
        }
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unimplemented, message)
    }

    pub fn invalid_argument(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidArgument,
            message: message.into(),
            field: Some(field),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Wrap a store failure, prefixing the stage that produced it.
    pub fn storage(context: &str, err: StorageError) -> Self {
        Self::unknown(format!("{}: {}", context, err))
    }

    /// A wire timestamp from the caller could not be decoded.
    pub fn bad_timestamp(field: &'static str, err: TimestampError) -> Self {
        Self::invalid_argument(field, format!("{} field has invalid format: {}", field, err))
    }

    /// A stored timestamp could not be encoded for the wire.
    pub fn corrupt_timestamp(field: &'static str, err: TimestampError) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            message: format!("{} field has invalid format: {}", field, err),
            field: Some(field),
        }
    }

    pub fn deadline_exceeded() -> Self {
        Self::unknown("deadline exceeded before the store operation completed")
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> u32 {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Name of the offending request field, when one is known.
    pub fn field(&self) -> Option<&'static str> {
        self.field
    }
}
