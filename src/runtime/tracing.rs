//! # Observability & Tracing
//!
//! Every component logs through `tracing` with structured fields (`scene`, `address`,
//! `opcode`, `rpc_id`, `error`) so one scene or one call can be followed by filtering on a
//! field.
//!
//! ```bash
//! RUST_LOG=info cargo test
//! RUST_LOG=scene_router::dispatch=trace cargo test
//! ```
//!
//! At `debug`, routing decisions, lock traffic and retries become visible; `trace` adds
//! every dispatched frame.

use std::sync::Once;

/// Initializes the global subscriber, filtered by `RUST_LOG`.
///
/// Panics if a global subscriber is already installed; use [`try_setup_tracing`] where that
/// can happen.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}

/// Like [`setup_tracing`], but safe to call any number of times (e.g. from every test).
pub fn try_setup_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_target(false)
            .compact()
            .with_test_writer()
            .try_init();
    });
}
