//! Tracing subscriber initialization.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Initialize the global tracing subscriber.
///
/// Filter resolution: `HALO_LOG` env var, then `RUST_LOG`, then the given
/// default directive. Safe to call more than once — later calls are no-ops
/// (some test harnesses initialize eagerly).
pub fn init(default_directive: &str) {
    let filter = std::env::var("HALO_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .map_or_else(
            |_| EnvFilter::new(default_directive),
            |v| EnvFilter::new(v),
        );

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::NONE)
        .with_target(true)
        .try_init();
}
