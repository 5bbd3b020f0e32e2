//! CLI argument definitions for rentgate.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `locations` | Fetch the full location catalogue (all pages) |
//! | `rates` | Quote every available vehicle class for a rental |
//! | `book` | Place a reservation for a quoted rate |
//! | `status` | Look up a reservation |
//! | `cancel` | Cancel a reservation |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | env | JSON config file; `RENTGATE_*` variables otherwise |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--timeout-ms` | config | Override the default call timeout |
//! | `--log-level` | `warn` | Log filter used when `RUST_LOG` is unset |
//!
//! Exit codes: `0` success, `2` usage or configuration error, `3` the
//! envelope carries errors, `4` serialization failure, `10` I/O failure.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Canonical car-rental operations over one configured supplier.
#[derive(Debug, Parser)]
#[command(name = "rentgate", author, version, about = "Car-rental supplier gateway CLI")]
pub struct Cli {
    /// Path to a JSON configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Default call timeout in milliseconds, overriding the configuration.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch every page of the supplier's location catalogue.
    Locations,

    /// Quote every available vehicle class.
    ///
    /// # Examples
    ///
    ///   rentgate rates --pickup LHR --pickup-at 2025-06-01T10:00:00Z --dropoff-at 2025-06-05T10:00:00Z
    Rates(RatesArgs),

    /// Book a previously quoted rate.
    Book(BookArgs),

    /// Show the state of a reservation.
    Status(ReferenceArgs),

    /// Cancel a reservation.
    Cancel(ReferenceArgs),
}

#[derive(Debug, Args)]
pub struct RatesArgs {
    /// Pick-up location code.
    #[arg(long)]
    pub pickup: String,

    /// Drop-off location code; defaults to the pick-up location.
    #[arg(long)]
    pub dropoff: Option<String>,

    /// Pick-up time, RFC3339; offsets are converted to UTC.
    #[arg(long)]
    pub pickup_at: String,

    /// Drop-off time, RFC3339.
    #[arg(long)]
    pub dropoff_at: String,

    #[arg(long)]
    pub driver_age: Option<u8>,
}

#[derive(Debug, Args)]
pub struct BookArgs {
    /// Rate reference returned by `rates`.
    #[arg(long)]
    pub rate_reference: String,

    #[arg(long)]
    pub first_name: String,

    #[arg(long)]
    pub last_name: String,

    #[arg(long)]
    pub email: String,
}

#[derive(Debug, Args)]
pub struct ReferenceArgs {
    /// Supplier booking reference.
    pub reference: String,
}
