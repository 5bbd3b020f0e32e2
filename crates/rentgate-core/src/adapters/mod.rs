//! Supplier adapter boundary.
//!
//! An adapter owns a supplier's wire format: it builds the request for each
//! canonical call and decodes the raw body into a domain type or a classified
//! error. Transport, timeouts, credentials, ledgers and fan-out stay with the
//! orchestrator.

mod json_rest;

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::classify::classify_domain;
use crate::domain::{
    BookingConfirmation, BookingRequest, Cancellation, LocationPage, RateRequest,
    VehicleCandidate, VehicleRate,
};
use crate::error::ClassifiedError;
use crate::http_client::HttpRequest;
use crate::operation::{CredentialMaterial, SupplierEndpoint};

pub use json_rest::JsonRestSupplier;

/// A token handed out by a supplier's authentication endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    /// Lifetime reported by the supplier; drives the cache ttl.
    pub expires_in: Duration,
}

pub type BuildResult = Result<HttpRequest, ClassifiedError>;
pub type DecodeResult<T> = Result<T, ClassifiedError>;

/// Request builders and response decoders for one supplier API.
pub trait SupplierAdapter: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn token_request(&self, endpoint: &SupplierEndpoint, credentials: &CredentialMaterial)
        -> BuildResult;
    fn decode_token(&self, body: &str) -> DecodeResult<IssuedToken>;

    /// Pages are 1-based.
    fn locations_page(&self, endpoint: &SupplierEndpoint, page: u32) -> BuildResult;
    fn decode_locations_page(&self, body: &str) -> DecodeResult<LocationPage>;

    fn availability(&self, endpoint: &SupplierEndpoint, request: &RateRequest) -> BuildResult;
    fn decode_availability(&self, body: &str) -> DecodeResult<Vec<VehicleCandidate>>;

    fn quote(
        &self,
        endpoint: &SupplierEndpoint,
        request: &RateRequest,
        candidate: &VehicleCandidate,
    ) -> BuildResult;
    fn decode_quote(&self, body: &str) -> DecodeResult<VehicleRate>;

    fn booking(&self, endpoint: &SupplierEndpoint, request: &BookingRequest) -> BuildResult;
    fn decode_booking(&self, body: &str) -> DecodeResult<BookingConfirmation>;

    fn booking_status(&self, endpoint: &SupplierEndpoint, reference: &str) -> BuildResult;
    fn decode_booking_status(&self, body: &str) -> DecodeResult<BookingConfirmation>;

    fn cancel(&self, endpoint: &SupplierEndpoint, reference: &str) -> BuildResult;
    fn decode_cancel(&self, body: &str) -> DecodeResult<Cancellation>;
}

/// Decodes a JSON body whose top-level `error` field carries a supplier's domain error.
///
/// A non-blank `error` wins over the rest of the payload.
pub fn decode_json_with_error_field<T: DeserializeOwned>(body: &str) -> DecodeResult<T> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(ClassifiedError::malformed_body)?;

    if let Some(error) = classify_domain(value.get("error").and_then(serde_json::Value::as_str)) {
        return Err(error);
    }

    serde_json::from_value(value).map_err(ClassifiedError::malformed_body)
}

/// Wraps a request-encoding failure in the error shape every call reports.
pub fn request_encoding_error(error: serde_json::Error) -> ClassifiedError {
    ClassifiedError::supplier(format!("unable to encode supplier request: {error}"))
}
