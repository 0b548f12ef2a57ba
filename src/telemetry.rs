//! Structured logging bootstrap.
//!
//! Trimmed down from the teacher's OpenTelemetry-backed `telemetry::init`:
//! this crate runs in a single process with no distributed trace pipeline
//! to feed, so only the `tracing`/`tracing-subscriber` half survives. A host
//! wanting OTLP export wraps this subscriber with its own layer.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `tracing` subscriber reading its filter from
/// `RUST_LOG`, defaulting to `info` when unset. Safe to call once per
/// process; a second call is a no-op (the underlying `try_init` error is
/// swallowed, matching the teacher's "already initialized" tolerance).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
