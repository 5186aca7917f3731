//! # Framework Errors
//!
//! This module defines the error types shared by the runtime building blocks:
//! the record-store actor, the task supervisor and the shutdown coordinator.

use std::time::Duration;

/// Errors returned by the record-store actor and its client.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameworkError {
    #[error("Actor closed")]
    ActorClosed,
    #[error("Actor dropped response channel")]
    ActorDropped,
    #[error("Store closed")]
    StoreClosed,
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Item already exists: {0}")]
    AlreadyExists(String),
    #[error("Conflicting update on {id}: current state is {actual}")]
    Conflict { id: String, actual: String },
}

/// Errors returned when scheduling work on the [`TaskSupervisor`](crate::TaskSupervisor).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SupervisorError {
    /// A task for the same key is still outstanding.
    #[error("task already outstanding for key {key} (task {task_id})")]
    AlreadyScheduled { key: String, task_id: u64 },
    /// The supervisor has started draining and accepts no new work.
    #[error("task supervisor is closed")]
    Closed,
}

/// A failure reported by a [`Closeable`](crate::Closeable) resource.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct CloseError(pub String);

impl CloseError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

impl From<FrameworkError> for CloseError {
    fn from(e: FrameworkError) -> Self {
        Self(e.to_string())
    }
}

/// Errors that make a shutdown manifest unusable.
///
/// Entry failures are never reported through this type; they are recorded in the
/// [`ShutdownReport`](crate::ShutdownReport).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShutdownError {
    #[error("duplicate manifest entry name: {0}")]
    DuplicateEntry(String),
    #[error("manifest entry name must not be empty")]
    EmptyName,
    #[error("entry {name} declares a zero timeout override ({timeout:?})")]
    ZeroTimeout { name: String, timeout: Duration },
}
