use rentgate_core::{Envelope, Gateway, JsonRestSupplier};
use serde_json::Value;

use crate::error::CliError;

pub async fn run(gateway: &Gateway<JsonRestSupplier>) -> Result<Envelope<Value>, CliError> {
    super::into_value(gateway.locations().await)
}
