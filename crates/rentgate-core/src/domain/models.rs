use serde::{Deserialize, Serialize};

use crate::{UtcDateTime, ValidationError};

/// A rental branch or pick-up point as exposed by a supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// One page of a supplier's location catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationPage {
    pub locations: Vec<Location>,
    pub total_pages: u32,
}

/// Search parameters for a rate quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRequest {
    pub pickup_location: String,
    pub dropoff_location: String,
    pub pickup_at: UtcDateTime,
    pub dropoff_at: UtcDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_age: Option<u8>,
}

impl RateRequest {
    pub fn new(
        pickup_location: impl Into<String>,
        dropoff_location: impl Into<String>,
        pickup_at: UtcDateTime,
        dropoff_at: UtcDateTime,
    ) -> Result<Self, ValidationError> {
        let pickup_location = pickup_location.into();
        let dropoff_location = dropoff_location.into();
        if pickup_location.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "pickup_location",
            });
        }
        if dropoff_location.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "dropoff_location",
            });
        }
        if dropoff_at <= pickup_at {
            return Err(ValidationError::InvalidRentalPeriod);
        }

        Ok(Self {
            pickup_location,
            dropoff_location,
            pickup_at,
            dropoff_at,
            driver_age: None,
        })
    }

    /// Billable rental days, counting a started day as a full one.
    pub fn rental_days(&self) -> u32 {
        self.pickup_at.rental_days_until(self.dropoff_at)
    }

    pub fn with_driver_age(mut self, age: u8) -> Self {
        self.driver_age = Some(age);
        self
    }
}

/// A vehicle class the supplier reports as available, before it is priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleCandidate {
    pub vehicle_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A priced vehicle offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRate {
    pub vehicle_class: String,
    pub total_amount: f64,
    pub currency: String,
    pub rate_reference: String,
}

/// Driver and offer details needed to place a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub rate_reference: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl BookingRequest {
    pub fn new(
        rate_reference: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let request = Self {
            rate_reference: rate_reference.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
        };

        for (field, value) in [
            ("rate_reference", &request.rate_reference),
            ("first_name", &request.first_name),
            ("last_name", &request.last_name),
            ("email", &request.email),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyField { field });
            }
        }

        Ok(request)
    }
}

/// Reservation lifecycle state, normalized across suppliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingState {
    Confirmed,
    Pending,
    Cancelled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub reference: String,
    pub state: BookingState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reference: String,
    pub cancelled: bool,
}
