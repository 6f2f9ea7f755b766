//! Observability setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes the tracing subscriber for binaries and tests that want
/// console output. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lead_intake_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();
}
