//! Process-wide logging setup shared by the service binary and tests.

/// Initialize tracing with the default filter.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber construction and component spans.
pub mod tracing;

pub use self::tracing::{component_span, init_with_default_filter};
