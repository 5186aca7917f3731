//! # Observability
//!
//! Structured logging for the runtime and everything built on it.
//!
//! Log levels come from `RUST_LOG`; without it, `info` is used.
//!
//! ```bash
//! RUST_LOG=debug order-service                        # full records on every store call
//! RUST_LOG=order_runtime=debug,order_service=info order-service
//! ```
//!
//! ## What gets logged
//!
//! - **Store actor**: start, close, every write with `entity_type` and id
//! - **Task supervisor**: schedule, cancel, completion, skip, failure, panic, abort
//! - **Shutdown**: each group, each entry's outcome, total elapsed time
//!
//! The compact format hides module paths (`with_target(false)`); the `entity_type`,
//! `task_id` and `name` fields say where a line came from.

use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// Calling it more than once is harmless; later calls leave the first subscriber in place.
pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
