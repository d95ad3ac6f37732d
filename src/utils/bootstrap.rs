//! Bootstrap utilities for embedding processes.
//!
//! Shared initialization for binaries and integration harnesses that
//! host the ledger.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable controlling log filtering.
pub const LOG_ENV_VAR: &str = "ROLLCALL_LOG";

/// Initialize tracing with the ROLLCALL_LOG environment variable.
///
/// Defaults to "info" level if ROLLCALL_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
