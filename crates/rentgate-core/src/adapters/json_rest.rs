use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::{
    decode_json_with_error_field, request_encoding_error, BuildResult, DecodeResult, IssuedToken,
    SupplierAdapter,
};
use crate::domain::{
    BookingConfirmation, BookingRequest, BookingState, Cancellation, Location, LocationPage,
    RateRequest, VehicleCandidate, VehicleRate,
};
use crate::error::ClassifiedError;
use crate::http_client::HttpRequest;
use crate::operation::{CredentialMaterial, SupplierEndpoint};
use crate::UtcDateTime;

/// Reference adapter for a generic JSON/REST supplier.
///
/// | Call | Request |
/// |------|---------|
/// | token | `POST /auth/token` |
/// | locations | `GET /locations?page=N` |
/// | availability | `POST /availability` |
/// | quote | `POST /quotes` |
/// | booking | `POST /bookings` |
/// | status | `GET /bookings/{reference}` |
/// | cancel | `DELETE /bookings/{reference}` |
///
/// Every response may carry a top-level `error` string, which is reported as a
/// supplier error in place of the payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRestSupplier;

impl JsonRestSupplier {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Serialize)]
struct TokenRequestPayload<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct LocationsPagePayload {
    #[serde(default = "default_total_pages")]
    total_pages: u32,
    #[serde(default)]
    locations: Vec<Location>,
}

fn default_total_pages() -> u32 {
    1
}

#[derive(Debug, Serialize)]
struct SearchPayload<'a> {
    pickup_location: &'a str,
    dropoff_location: &'a str,
    pickup_at: UtcDateTime,
    dropoff_at: UtcDateTime,
    rental_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    driver_age: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vehicle_class: Option<&'a str>,
}

impl<'a> SearchPayload<'a> {
    fn from_request(request: &'a RateRequest) -> Self {
        Self {
            pickup_location: &request.pickup_location,
            dropoff_location: &request.dropoff_location,
            pickup_at: request.pickup_at,
            dropoff_at: request.dropoff_at,
            rental_days: request.rental_days(),
            driver_age: request.driver_age,
            vehicle_class: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AvailabilityPayload {
    #[serde(default)]
    vehicles: Vec<VehicleCandidate>,
}

#[derive(Debug, Deserialize)]
struct QuotePayload {
    vehicle_class: String,
    total: MoneyPayload,
    rate_reference: String,
}

#[derive(Debug, Deserialize)]
struct MoneyPayload {
    amount: f64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct BookingPayload {
    reference: String,
    status: BookingState,
}

#[derive(Debug, Deserialize)]
struct CancellationPayload {
    reference: String,
    #[serde(default)]
    cancelled: bool,
}

fn booking_url(endpoint: &SupplierEndpoint, reference: &str) -> Result<String, ClassifiedError> {
    if reference.trim().is_empty() {
        return Err(ClassifiedError::supplier("booking reference cannot be empty"));
    }
    Ok(endpoint.url(&format!(
        "/bookings/{}",
        urlencoding::encode(reference.trim())
    )))
}

impl SupplierAdapter for JsonRestSupplier {
    fn name(&self) -> &'static str {
        "json-rest"
    }

    fn token_request(
        &self,
        endpoint: &SupplierEndpoint,
        credentials: &CredentialMaterial,
    ) -> BuildResult {
        let CredentialMaterial::ClientCredentials {
            client_id,
            client_secret,
        } = credentials
        else {
            return Err(ClassifiedError::supplier(
                "token request requires client credentials",
            ));
        };

        HttpRequest::post(endpoint.url("/auth/token"))
            .with_header("accept", "application/json")
            .with_json(&TokenRequestPayload {
                grant_type: "client_credentials",
                client_id,
                client_secret,
            })
            .map_err(request_encoding_error)
    }

    fn decode_token(&self, body: &str) -> DecodeResult<IssuedToken> {
        let payload: TokenPayload = decode_json_with_error_field(body)?;
        if payload.access_token.trim().is_empty() {
            return Err(ClassifiedError::malformed_body("empty access_token"));
        }
        Ok(IssuedToken {
            token: payload.access_token,
            expires_in: Duration::from_secs(payload.expires_in),
        })
    }

    fn locations_page(&self, endpoint: &SupplierEndpoint, page: u32) -> BuildResult {
        Ok(HttpRequest::get(endpoint.url(&format!("/locations?page={page}")))
            .with_header("accept", "application/json"))
    }

    fn decode_locations_page(&self, body: &str) -> DecodeResult<LocationPage> {
        let payload: LocationsPagePayload = decode_json_with_error_field(body)?;
        Ok(LocationPage {
            locations: payload.locations,
            total_pages: payload.total_pages.max(1),
        })
    }

    fn availability(&self, endpoint: &SupplierEndpoint, request: &RateRequest) -> BuildResult {
        HttpRequest::post(endpoint.url("/availability"))
            .with_header("accept", "application/json")
            .with_json(&SearchPayload::from_request(request))
            .map_err(request_encoding_error)
    }

    fn decode_availability(&self, body: &str) -> DecodeResult<Vec<VehicleCandidate>> {
        let payload: AvailabilityPayload = decode_json_with_error_field(body)?;
        Ok(payload.vehicles)
    }

    fn quote(
        &self,
        endpoint: &SupplierEndpoint,
        request: &RateRequest,
        candidate: &VehicleCandidate,
    ) -> BuildResult {
        let payload = SearchPayload {
            vehicle_class: Some(&candidate.vehicle_class),
            ..SearchPayload::from_request(request)
        };
        HttpRequest::post(endpoint.url("/quotes"))
            .with_header("accept", "application/json")
            .with_json(&payload)
            .map_err(request_encoding_error)
    }

    fn decode_quote(&self, body: &str) -> DecodeResult<VehicleRate> {
        let payload: QuotePayload = decode_json_with_error_field(body)?;
        if !payload.total.amount.is_finite() || payload.total.amount < 0.0 {
            return Err(ClassifiedError::malformed_body(format!(
                "invalid total amount {}",
                payload.total.amount
            )));
        }
        Ok(VehicleRate {
            vehicle_class: payload.vehicle_class,
            total_amount: payload.total.amount,
            currency: payload.total.currency,
            rate_reference: payload.rate_reference,
        })
    }

    fn booking(&self, endpoint: &SupplierEndpoint, request: &BookingRequest) -> BuildResult {
        HttpRequest::post(endpoint.url("/bookings"))
            .with_header("accept", "application/json")
            .with_json(request)
            .map_err(request_encoding_error)
    }

    fn decode_booking(&self, body: &str) -> DecodeResult<BookingConfirmation> {
        let payload: BookingPayload = decode_json_with_error_field(body)?;
        Ok(BookingConfirmation {
            reference: payload.reference,
            state: payload.status,
        })
    }

    fn booking_status(&self, endpoint: &SupplierEndpoint, reference: &str) -> BuildResult {
        Ok(HttpRequest::get(booking_url(endpoint, reference)?)
            .with_header("accept", "application/json"))
    }

    fn decode_booking_status(&self, body: &str) -> DecodeResult<BookingConfirmation> {
        self.decode_booking(body)
    }

    fn cancel(&self, endpoint: &SupplierEndpoint, reference: &str) -> BuildResult {
        Ok(HttpRequest::delete(booking_url(endpoint, reference)?)
            .with_header("accept", "application/json"))
    }

    fn decode_cancel(&self, body: &str) -> DecodeResult<Cancellation> {
        let payload: CancellationPayload = decode_json_with_error_field(body)?;
        Ok(Cancellation {
            reference: payload.reference,
            cancelled: payload.cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::HttpMethod;

    fn endpoint() -> SupplierEndpoint {
        SupplierEndpoint::parse("https://supplier.test").expect("valid endpoint")
    }

    #[test]
    fn token_request_posts_client_credentials() {
        let request = JsonRestSupplier
            .token_request(
                &endpoint(),
                &CredentialMaterial::ClientCredentials {
                    client_id: String::from("tenant-a"),
                    client_secret: String::from("s3cret"),
                },
            )
            .expect("builds");

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "https://supplier.test/auth/token");
        let body: serde_json::Value =
            serde_json::from_str(request.body.as_deref().expect("body")).expect("json body");
        assert_eq!(body["client_id"], "tenant-a");
        assert_eq!(body["grant_type"], "client_credentials");
    }

    #[test]
    fn token_request_requires_client_credentials() {
        assert!(JsonRestSupplier
            .token_request(&endpoint(), &CredentialMaterial::None)
            .is_err());
    }

    #[test]
    fn decodes_token_lifetime() {
        let token = JsonRestSupplier
            .decode_token(r#"{"access_token":"abc","expires_in":900}"#)
            .expect("decodes");

        assert_eq!(token.token, "abc");
        assert_eq!(token.expires_in, Duration::from_secs(900));
    }

    #[test]
    fn location_pages_default_to_a_single_page() {
        let page = JsonRestSupplier
            .decode_locations_page(r#"{"locations":[{"code":"LHR","name":"Heathrow"}]}"#)
            .expect("decodes");

        assert_eq!(page.total_pages, 1);
        assert_eq!(page.locations[0].code, "LHR");
    }

    #[test]
    fn quote_request_carries_vehicle_class() {
        let request = RateRequest::new(
            "LHR",
            "LGW",
            UtcDateTime::parse("2025-06-01T10:00:00Z").expect("valid"),
            UtcDateTime::parse("2025-06-05T10:00:00Z").expect("valid"),
        )
        .expect("valid request");
        let candidate = VehicleCandidate {
            vehicle_class: String::from("CDMR"),
            description: None,
        };

        let http = JsonRestSupplier
            .quote(&endpoint(), &request, &candidate)
            .expect("builds");

        let body: serde_json::Value =
            serde_json::from_str(http.body.as_deref().expect("body")).expect("json body");
        assert_eq!(body["vehicle_class"], "CDMR");
        assert_eq!(body["pickup_at"], "2025-06-01T10:00:00Z");
        assert_eq!(body["rental_days"], 4);
    }

    #[test]
    fn rejects_negative_quote_totals() {
        let error = JsonRestSupplier
            .decode_quote(
                r#"{"vehicle_class":"CDMR","total":{"amount":-1.0,"currency":"EUR"},"rate_reference":"R1"}"#,
            )
            .expect_err("invalid amount");

        assert!(error.message().contains("invalid total amount"));
    }

    #[test]
    fn booking_references_are_url_encoded() {
        let request = JsonRestSupplier
            .booking_status(&endpoint(), "AB 12/3")
            .expect("builds");

        assert_eq!(request.url, "https://supplier.test/bookings/AB%2012%2F3");
    }

    #[test]
    fn cancellation_decodes_domain_errors() {
        let error = JsonRestSupplier
            .decode_cancel(r#"{"error":"BOOKING ALREADY CANCELLED"}"#)
            .expect_err("domain error");

        assert_eq!(error, ClassifiedError::supplier("BOOKING ALREADY CANCELLED"));
    }
}
