use rentgate_core::{Envelope, Gateway, JsonRestSupplier, RateRequest, UtcDateTime};
use serde_json::Value;

use crate::cli::RatesArgs;
use crate::error::CliError;

pub async fn run(
    gateway: &Gateway<JsonRestSupplier>,
    args: &RatesArgs,
) -> Result<Envelope<Value>, CliError> {
    let request = build_request(args)?;
    super::into_value(gateway.rates(request).await)
}

fn build_request(args: &RatesArgs) -> Result<RateRequest, CliError> {
    let request = RateRequest::new(
        args.pickup.as_str(),
        args.dropoff.as_deref().unwrap_or(args.pickup.as_str()),
        UtcDateTime::parse(&args.pickup_at)?,
        UtcDateTime::parse(&args.dropoff_at)?,
    )?;

    Ok(match args.driver_age {
        Some(age) => request.with_driver_age(age),
        None => request,
    })
}
