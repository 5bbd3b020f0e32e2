//! Collapses raw call outcomes into the three [`ErrorKind`]s.
//!
//! Transport-level rules, applied in order:
//!
//! 1. deadline exceeded → [`ErrorKind::Timeout`]
//! 2. any other transport fault → [`ErrorKind::Connection`]
//! 3. status outside `200..=299` → [`ErrorKind::Supplier`]
//! 4. otherwise the response passes through untouched
//!
//! Domain-level errors found in an already decoded body go through
//! [`classify_domain`] and reuse the same [`ClassifiedError`] shape.

use crate::error::{ClassifiedError, ErrorKind};
use crate::http_client::{HttpError, HttpErrorKind, HttpResponse};

pub fn classify(outcome: Result<HttpResponse, HttpError>) -> Result<HttpResponse, ClassifiedError> {
    match outcome {
        Err(error) if is_deadline_exceeded(&error) => {
            Err(ClassifiedError::timeout(error.message()))
        }
        Err(error) => Err(ClassifiedError::connection(error.message())),
        Ok(response) if !response.is_success() => Err(ClassifiedError::status_code(response.status)),
        Ok(response) => Ok(response),
    }
}

/// Turns a decoded domain error message into a supplier error; blank messages are not errors.
pub fn classify_domain(message: Option<&str>) -> Option<ClassifiedError> {
    message
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(ClassifiedError::supplier)
}

pub fn is_deadline_exceeded(error: &HttpError) -> bool {
    if error.kind() == HttpErrorKind::Timeout {
        return true;
    }

    let message = error.message().to_ascii_lowercase();
    message.contains("deadline exceeded") || message.contains("timed out")
}

impl ClassifiedError {
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}
