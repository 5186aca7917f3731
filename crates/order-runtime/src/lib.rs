//! # Order Runtime
//!
//! Concurrency building blocks for a service that keeps records in memory, runs delayed
//! background work against them, and must stop without losing or corrupting anything.
//!
//! The crate has three layers:
//!
//! 1. **Record store** ([`StoreActor`] + [`StoreClient`]): a single-owner, keyed
//!    collection behind a message channel. Requests are processed one at a time, so a
//!    guarded update ("write only if the row is still in state X") is atomic without locks.
//! 2. **Task supervisor** ([`TaskSupervisor`]): schedules delayed tasks per key, tracks
//!    every one of them, supports cancellation, and can drain or abort them all.
//! 3. **Shutdown** ([`ShutdownCoordinator`] + [`ShutdownManifest`]): releases
//!    [`Closeable`] resources group by group under one overall deadline.
//!
//! ```text
//! ┌─────────────┐  StoreRequest   ┌─────────────┐
//! │ StoreClient │ ──────────────► │ StoreActor  │  HashMap<Id, T>
//! └─────────────┘ ◄────────────── └─────────────┘
//!                   oneshot reply
//!
//! TaskSupervisor ── schedule(key, delay, work) ──► tokio task ──► watcher removes handle
//!
//! ShutdownCoordinator ── group 0 ──► group 1 ──► group 2   (each bounded by the deadline)
//! ```
//!
//! **Further Reading**:
//! - [Actors in Rust](https://ryhl.io/blog/actors-with-tokio/) - Practical guide to implementing actors with Tokio
//!
//! ## Testing
//!
//! [`mock::MockStore`] scripts store answers for code that sits on top of a
//! [`StoreClient`]; see its module docs.

pub mod actor;
pub mod client;
pub mod error;
pub mod message;
pub mod mock;
pub mod record;
pub mod shutdown;
pub mod supervisor;
pub mod tracing;

pub use actor::StoreActor;
pub use client::StoreClient;
pub use error::{CloseError, FrameworkError, ShutdownError, SupervisorError};
pub use message::{Response, StoreRequest};
pub use record::Record;
pub use shutdown::{
    CloseOutcome, Closeable, ManifestEntry, ShutdownCoordinator, ShutdownGroup, ShutdownManifest,
    ShutdownReport,
};
pub use supervisor::{SupervisorStats, TaskHandle, TaskId, TaskOutcome, TaskSupervisor};
pub use crate::tracing::setup_tracing;
