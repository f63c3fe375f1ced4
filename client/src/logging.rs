//! Tracing setup for applications embedding the client.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` is used, falling back to
/// "info". Calling this more than once (or after another subscriber was
/// installed) leaves the existing subscriber in place.
pub fn init(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));

    if fmt().with_env_filter(filter).with_target(true).try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
