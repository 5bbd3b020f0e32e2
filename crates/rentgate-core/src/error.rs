use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation and contract errors exposed by `rentgate-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid RFC3339 timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("supplier base url cannot be empty")]
    EmptyBaseUrl,
    #[error("supplier base url must start with http:// or https://: '{value}'")]
    InvalidBaseUrl { value: String },

    #[error("default timeout must be greater than zero")]
    ZeroTimeout,
    #[error("timeout override for phase '{phase}' must be greater than zero")]
    ZeroPhaseTimeout { phase: String },
    #[error("fan-out worker count must be greater than zero")]
    ZeroWorkers,
    #[error("page limit must be greater than zero")]
    ZeroPageLimit,

    #[error("invalid operation tag '{value}'")]
    InvalidOperationTag { value: String },

    #[error("field '{field}' cannot be empty")]
    EmptyField { field: &'static str },
    #[error("drop-off time must be after pick-up time")]
    InvalidRentalPeriod,
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("environment variable '{name}' is invalid: {reason}")]
    InvalidEnv { name: &'static str, reason: String },
}

/// The three outcome classes every failed supplier call collapses into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "TimeoutError")]
    Timeout,
    #[serde(rename = "ConnectionError")]
    Connection,
    #[serde(rename = "SupplierError")]
    Supplier,
}

impl ErrorKind {
    pub const fn code(self) -> &'static str {
        match self {
            Self::Timeout => "TimeoutError",
            Self::Connection => "ConnectionError",
            Self::Supplier => "SupplierError",
        }
    }

    /// Transport-level failures; the supplier itself is unreachable or too slow.
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Timeout | Self::Connection)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A classified `(kind, message)` pair as it appears in the `errors` list of an envelope.
///
/// Serializes as `{"code": "SupplierError", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ClassifiedError {
    #[serde(rename = "code")]
    pub code: ErrorKind,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(code: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    pub fn supplier(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Supplier, message)
    }

    pub fn status_code(status: u16) -> Self {
        Self::supplier(format!("supplier returned status code {status}"))
    }

    /// Supplier error for a body that could not be decoded.
    pub fn malformed_body(detail: impl Display) -> Self {
        Self::supplier(format!("unable to decode supplier response: {detail}"))
    }

    pub const fn kind(&self) -> ErrorKind {
        self.code
    }

    pub const fn is_fatal(&self) -> bool {
        self.code.is_fatal()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
