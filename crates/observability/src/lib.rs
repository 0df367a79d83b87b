//! Process-wide logging setup shared by the stock engine binaries.

/// Initialize tracing/logging.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::LogFormat;
