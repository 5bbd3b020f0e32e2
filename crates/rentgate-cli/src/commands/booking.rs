use rentgate_core::{BookingRequest, Envelope, Gateway, JsonRestSupplier};
use serde_json::Value;

use crate::cli::{BookArgs, ReferenceArgs};
use crate::error::CliError;

pub async fn book(
    gateway: &Gateway<JsonRestSupplier>,
    args: &BookArgs,
) -> Result<Envelope<Value>, CliError> {
    let request = BookingRequest::new(
        args.rate_reference.as_str(),
        args.first_name.as_str(),
        args.last_name.as_str(),
        args.email.as_str(),
    )?;
    super::into_value(gateway.book(request).await)
}

pub async fn status(
    gateway: &Gateway<JsonRestSupplier>,
    args: &ReferenceArgs,
) -> Result<Envelope<Value>, CliError> {
    super::into_value(gateway.booking_status(&args.reference).await)
}

pub async fn cancel(
    gateway: &Gateway<JsonRestSupplier>,
    args: &ReferenceArgs,
) -> Result<Envelope<Value>, CliError> {
    super::into_value(gateway.cancel(&args.reference).await)
}
