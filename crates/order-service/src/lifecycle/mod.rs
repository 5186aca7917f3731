//! # System Lifecycle & Orchestration
//!
//! Wires the order system together and tears it down in a fixed order.
//!
//! ## The OrderSystem Pattern
//!
//! ```rust,ignore
//! let mut system = OrderSystem::from_config(&config).await?;
//! system.engine.reconcile_pending().await?;   // orders left Pending by a previous run
//! system.serve(config.http_addr).await?;
//!
//! // ... wait for Ctrl-C / SIGTERM ...
//!
//! let report = system.shutdown(config.shutdown_timeout).await?;
//! ```
//!
//! ## Graceful Shutdown
//!
//! [`OrderSystem::shutdown`] hands an explicit manifest to the
//! [`ShutdownCoordinator`](order_runtime::ShutdownCoordinator):
//!
//! | Group | Entry | Close | On timeout |
//! |-------|-------|-------|------------|
//! | 0 | `http-listener` | stop accepting, finish in-flight requests | drop connections |
//! | 1 | `fulfillment-tasks` | refuse new tasks, wait for running ones | abort the tasks |
//! | 2 | `order-store` | close the store | |
//!
//! Groups run one after the other under a single deadline. Because the task group is
//! either drained or aborted before group 2 starts, no fulfillment can write to a
//! closed store.

pub mod order_system;

pub use order_system::*;
