//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when neither `RUST_LOG` nor the config file provide one.
pub const DEFAULT_LOG_FILTER: &str = "info,kiln_rhi=info,kiln_renderer=debug";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Calling this twice is
/// harmless: the second registration is ignored.
///
/// # Example
/// ```
/// kiln_core::init_logging(kiln_core::DEFAULT_LOG_FILTER);
/// tracing::info!("engine starting");
/// ```
pub fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
