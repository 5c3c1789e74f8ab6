//! JSON subscriber with an `EnvFilter`.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `default_directive` applies when `RUST_LOG` is unset or malformed.
/// Returns `false` if a subscriber was already installed.
pub fn init(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    // One JSON object per event; the current span's fields (order_id,
    // product_id, ...) ride along under `span`.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok()
}
