//! provides logging helpers

use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// initiate the global tracing subscriber
///
/// Logs go to stderr so that command output on stdout stays machine readable.
/// `RUST_LOG` overrides `default_level`.
pub fn init(default_level: tracing::Level) {
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::from_level(default_level).into())
        .from_env_lossy();

    let fmt_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter);

    registry().with(fmt_layer).init();
}
