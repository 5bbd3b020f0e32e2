use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a global fmt subscriber filtered by `RUST_LOG`.
///
/// Falls back to `default_directive` (e.g. `"warn"` or `"rentgate_core=debug"`)
/// when `RUST_LOG` is unset or unparsable. Events go to stderr so JSON written
/// to stdout stays machine-readable. Returns `false` if a global subscriber was
/// already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}
