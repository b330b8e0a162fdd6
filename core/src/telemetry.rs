// Logging bootstrap for binaries embedding the engine
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install a global subscriber: `RUST_LOG`-style env filter (default `info`) plus
/// a fmt layer. Returns `false` when a subscriber was already installed.
pub fn init_tracing() -> bool {
    init_tracing_with_default("info")
}

/// Same as [`init_tracing`] with a caller-chosen fallback directive
pub fn init_tracing_with_default(default_directive: &str) -> bool {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok();

    if installed {
        info!(target: "telemetry", "Tracing initialized");
    }
    installed
}
