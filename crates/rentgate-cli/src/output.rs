use std::io::Write;

use rentgate_core::Envelope;
use serde_json::Value;

use crate::error::CliError;

pub fn render(envelope: &Envelope<Value>, pretty: bool) -> Result<(), CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(envelope)?
    } else {
        serde_json::to_string(envelope)?
    };

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{payload}")?;
    handle.flush()?;
    Ok(())
}
