//! Process-wide logging setup shared by binaries and tests.

/// Initialize structured JSON logging, filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init("info");
}

/// Subscriber construction (filters, formatting).
pub mod tracing;
