//! # Domain Models
//!
//! Canonical payload types returned by every supplier adapter.
//!
//! The field-by-field mapping of a supplier's prices, coverages and vehicle
//! attributes is owned by each adapter; these types are the smallest common
//! shape the gateway needs to hand results back to its callers.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Location`] | Rental branch / pick-up point |
//! | [`RateRequest`] | Search parameters for a quote |
//! | [`VehicleCandidate`] | Available vehicle class before pricing |
//! | [`VehicleRate`] | Priced vehicle offer |
//! | [`BookingRequest`] | Reservation request |
//! | [`BookingConfirmation`] | Reservation reference and state |
//! | [`Cancellation`] | Cancellation outcome |
//! | [`UtcDateTime`] | UTC timestamp |

mod models;
mod timestamp;

pub use models::{
    BookingConfirmation, BookingRequest, BookingState, Cancellation, Location, LocationPage,
    RateRequest, VehicleCandidate, VehicleRate,
};
pub use timestamp::UtcDateTime;
