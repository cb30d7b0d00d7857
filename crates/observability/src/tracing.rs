//! Tracing/logging initialization.

use ::tracing::{Span, info_span};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Install the JSON subscriber, filtering with `RUST_LOG` or [`DEFAULT_FILTER`].
pub fn init() {
    init_with_default_filter(DEFAULT_FILTER);
}

/// Install the JSON subscriber, falling back to `default` when `RUST_LOG` is
/// unset or invalid.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_with_default_filter(default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

/// Root span for a long-lived component (`http`, `worker_pool`, `identity`).
///
/// Components are handed their span at construction and emit every event
/// inside it, so one service's output can be told apart from another's.
pub fn component_span(component: &'static str, service: &str) -> Span {
    info_span!("component", component, service = %service)
}
