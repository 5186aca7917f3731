//! # Task Supervisor
//!
//! Bookkeeping, cancellation and drain primitives over delayed background tasks.
//!
//! Every task is registered under a *key* (for orders, the order id) before it starts,
//! and its [`TaskHandle`] is removed when the task ends, whatever the outcome. At most
//! one task may be outstanding per key. Because nothing is ever spawned
//! fire-and-forget, shutdown always knows what is still running.
//!
//! ## Task anatomy
//!
//! ```text
//! schedule(key, delay, work)
//!    │
//!    ├─ wait `delay` ── cancelled? ──► Cancelled (work never runs)
//!    │
//!    └─ work(token) ──► Ok(Completed) | Ok(Skipped(reason)) | Err(e) | panic
//! ```
//!
//! Errors and panics inside `work` are logged here and counted in [`SupervisorStats`];
//! they never reach the code that scheduled the task.

use crate::error::{CloseError, SupervisorError};
use crate::shutdown::Closeable;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Identifier of a scheduled task.
pub type TaskId = u64;

/// How a task's work ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The work did what it was scheduled to do.
    Completed,
    /// The work found nothing to do (e.g., the order was no longer pending).
    Skipped(String),
}

/// Counters over every task the supervisor has finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    pub scheduled: u64,
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub aborted: u64,
}

/// The supervisor's record of one outstanding task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub id: TaskId,
    pub key: String,
    cancel: CancellationToken,
    abort: Option<AbortHandle>,
    done: CancellationToken,
}

impl TaskHandle {
    /// Whether the task has ended, whatever the outcome.
    pub fn is_finished(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Resolves once the task has ended and been removed from the registry.
    pub async fn finished(&self) {
        self.done.cancelled().await
    }
}

enum TaskExit {
    Finished(TaskOutcome),
    Cancelled,
    Failed(String),
}

#[derive(Default)]
struct Registry {
    tasks: HashMap<TaskId, TaskHandle>,
    closed: bool,
    stats: SupervisorStats,
}

struct Inner {
    next_id: AtomicU64,
    registry: Mutex<Registry>,
    idle: Notify,
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, id: TaskId, key: &str, exit: Result<TaskExit, JoinError>) {
        let empty = {
            let mut registry = self.registry();
            if let Some(task) = registry.tasks.remove(&id) {
                task.done.cancel();
            }
            let stats = &mut registry.stats;
            match &exit {
                Ok(TaskExit::Finished(TaskOutcome::Completed)) => stats.completed += 1,
                Ok(TaskExit::Finished(TaskOutcome::Skipped(_))) => stats.skipped += 1,
                Ok(TaskExit::Cancelled) => stats.cancelled += 1,
                Ok(TaskExit::Failed(_)) => stats.failed += 1,
                Err(e) if e.is_cancelled() => stats.aborted += 1,
                Err(_) => stats.failed += 1,
            }
            registry.tasks.is_empty()
        };

        match exit {
            Ok(TaskExit::Finished(TaskOutcome::Completed)) => {
                info!(task_id = id, key, "Task completed")
            }
            Ok(TaskExit::Finished(TaskOutcome::Skipped(reason))) => {
                info!(task_id = id, key, %reason, "Task skipped")
            }
            Ok(TaskExit::Cancelled) => info!(task_id = id, key, "Task cancelled before it ran"),
            Ok(TaskExit::Failed(e)) => error!(task_id = id, key, error = %e, "Task failed"),
            Err(e) if e.is_cancelled() => warn!(task_id = id, key, "Task aborted"),
            Err(e) => error!(task_id = id, key, error = %e, "Task panicked"),
        }

        if empty {
            self.idle.notify_waiters();
        }
    }
}

/// Tracks in-flight background tasks so they can be cancelled, drained or aborted.
///
/// The supervisor is cheap to clone; clones share the same registry.
///
/// ```rust
/// use order_runtime::{TaskOutcome, TaskSupervisor};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let supervisor = TaskSupervisor::new();
///     supervisor
///         .schedule("order-1", Duration::from_millis(10), |_cancel| async {
///             Ok::<_, String>(TaskOutcome::Completed)
///         })
///         .unwrap();
///
///     assert_eq!(supervisor.await_all(Duration::from_secs(1)).await, 0);
///     assert_eq!(supervisor.stats().completed, 1);
/// }
/// ```
#[derive(Clone)]
pub struct TaskSupervisor {
    inner: Arc<Inner>,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                registry: Mutex::new(Registry::default()),
                idle: Notify::new(),
            }),
        }
    }

    /// Registers and starts a task that runs `work` after `delay`.
    ///
    /// `work` receives the task's cancellation token so it can check it again before
    /// committing. Cancellation during the delay ends the task without running `work`.
    ///
    /// # Errors
    ///
    /// - [`SupervisorError::AlreadyScheduled`] if a task for `key` is still outstanding.
    /// - [`SupervisorError::Closed`] once draining has begun.
    pub fn schedule<F, Fut, E>(
        &self,
        key: impl Into<String>,
        delay: Duration,
        work: F,
    ) -> Result<TaskId, SupervisorError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<TaskOutcome, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let key = key.into();
        let cancel = CancellationToken::new();

        let id = {
            let mut registry = self.inner.registry();
            if registry.closed {
                return Err(SupervisorError::Closed);
            }
            if let Some(existing) = registry.tasks.values().find(|t| t.key == key) {
                return Err(SupervisorError::AlreadyScheduled {
                    key,
                    task_id: existing.id,
                });
            }
            let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
            registry.tasks.insert(
                id,
                TaskHandle {
                    id,
                    key: key.clone(),
                    cancel: cancel.clone(),
                    abort: None,
                    done: CancellationToken::new(),
                },
            );
            registry.stats.scheduled += 1;
            id
        };

        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => return TaskExit::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
            match work(token).await {
                Ok(outcome) => TaskExit::Finished(outcome),
                Err(e) => TaskExit::Failed(e.to_string()),
            }
        });

        // The entry cannot be gone yet: only the watcher below removes it.
        if let Some(entry) = self.inner.registry().tasks.get_mut(&id) {
            entry.abort = Some(handle.abort_handle());
        }

        let inner = Arc::clone(&self.inner);
        let watched_key = key.clone();
        tokio::spawn(async move {
            let exit = handle.await;
            inner.finish(id, &watched_key, exit);
        });

        info!(task_id = id, %key, delay_ms = delay.as_millis() as u64, "Task scheduled");
        Ok(id)
    }

    /// Requests cooperative cancellation of one task. Returns `false` if it is not
    /// outstanding (already finished, or never existed).
    pub fn cancel(&self, id: TaskId) -> bool {
        let registry = self.inner.registry();
        match registry.tasks.get(&id) {
            Some(task) => {
                task.cancel.cancel();
                info!(task_id = id, key = %task.key, "Task cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Requests cancellation of the task registered under `key`, if any.
    pub fn cancel_key(&self, key: &str) -> Option<TaskId> {
        let id = self.task_for(key)?;
        self.cancel(id).then_some(id)
    }

    /// The id of the outstanding task registered under `key`.
    pub fn task_for(&self, key: &str) -> Option<TaskId> {
        self.inner
            .registry()
            .tasks
            .values()
            .find(|t| t.key == key)
            .map(|t| t.id)
    }

    /// Snapshot of every outstanding task.
    pub fn handles(&self) -> Vec<TaskHandle> {
        self.inner.registry().tasks.values().cloned().collect()
    }

    pub fn outstanding(&self) -> usize {
        self.inner.registry().tasks.len()
    }

    pub fn stats(&self) -> SupervisorStats {
        self.inner.registry().stats
    }

    /// Refuses every further `schedule` call. Tasks already registered keep running.
    pub fn stop_accepting(&self) {
        let mut registry = self.inner.registry();
        if !registry.closed {
            registry.closed = true;
            info!(outstanding = registry.tasks.len(), "Task supervisor stopped accepting work");
        }
    }

    /// Waits until every task registered at call time has finished or `timeout`
    /// elapses. Tasks scheduled afterwards are not waited for.
    ///
    /// Returns how many of those tasks are still outstanding (0 = clean drain).
    pub async fn await_all(&self, timeout: Duration) -> usize {
        let handles = self.handles();
        let all_done = join_all(handles.iter().map(|h| h.finished()));
        match tokio::time::timeout(timeout, all_done).await {
            Ok(_) => 0,
            Err(_) => {
                let left = handles.iter().filter(|h| !h.is_finished()).count();
                warn!(outstanding = left, timeout_ms = timeout.as_millis() as u64, "Drain timed out");
                left
            }
        }
    }

    /// Waits, without a bound, until no task is registered.
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a finish in between is not missed.
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Cancels and aborts every outstanding task. Returns how many were hit.
    ///
    /// An aborted task stops at its next suspension point; its handle is removed by
    /// the usual completion path.
    pub fn abort_all(&self) -> usize {
        let registry = self.inner.registry();
        for task in registry.tasks.values() {
            task.cancel.cancel();
            if let Some(abort) = &task.abort {
                abort.abort();
            }
        }
        registry.tasks.len()
    }
}

#[async_trait]
impl Closeable for TaskSupervisor {
    /// Stops intake and waits for in-flight tasks to finish.
    async fn close(&self) -> Result<(), CloseError> {
        self.stop_accepting();
        self.drain().await;
        info!(stats = ?self.stats(), "Task supervisor drained");
        Ok(())
    }

    fn abort(&self) {
        let aborted = self.abort_all();
        if aborted > 0 {
            warn!(aborted, "Task supervisor aborted outstanding tasks");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn completes() -> impl FnOnce(CancellationToken) -> std::future::Ready<Result<TaskOutcome, String>>
    {
        |_| std::future::ready(Ok(TaskOutcome::Completed))
    }

    #[tokio::test]
    async fn test_task_runs_after_delay_and_is_removed() {
        let supervisor = TaskSupervisor::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        supervisor
            .schedule("k1", Duration::from_millis(20), move |_| async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, String>(TaskOutcome::Completed)
            })
            .unwrap();

        assert_eq!(supervisor.outstanding(), 1);
        assert!(!ran.load(Ordering::SeqCst));

        assert_eq!(supervisor.await_all(Duration::from_secs(1)).await, 0);
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(supervisor.outstanding(), 0);
        assert_eq!(supervisor.stats().completed, 1);
    }

    #[tokio::test]
    async fn test_cancel_during_delay_skips_work() {
        let supervisor = TaskSupervisor::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        let id = supervisor
            .schedule("k1", Duration::from_millis(50), move |_| async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, String>(TaskOutcome::Completed)
            })
            .unwrap();

        assert!(supervisor.cancel(id));
        assert_eq!(supervisor.await_all(Duration::from_secs(1)).await, 0);
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(supervisor.stats().cancelled, 1);
        assert!(!supervisor.cancel(id), "finished task can no longer be cancelled");
    }

    #[tokio::test]
    async fn test_one_task_per_key() {
        let supervisor = TaskSupervisor::new();
        let first = supervisor
            .schedule("k1", Duration::from_millis(50), completes())
            .unwrap();

        let second = supervisor.schedule("k1", Duration::from_millis(50), completes());
        assert_eq!(
            second,
            Err(SupervisorError::AlreadyScheduled {
                key: "k1".to_string(),
                task_id: first
            })
        );
        assert_eq!(supervisor.cancel_key("k1"), Some(first));
        assert_eq!(supervisor.cancel_key("missing"), None);
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_contained() {
        let supervisor = TaskSupervisor::new();
        supervisor
            .schedule("fails", Duration::ZERO, |_| async {
                Err::<TaskOutcome, _>("store unavailable".to_string())
            })
            .unwrap();
        supervisor
            .schedule("panics", Duration::ZERO, |_| async {
                if true {
                    panic!("boom");
                }
                Ok::<_, String>(TaskOutcome::Completed)
            })
            .unwrap();

        assert_eq!(supervisor.await_all(Duration::from_secs(1)).await, 0);
        assert_eq!(supervisor.stats().failed, 2);
    }

    #[tokio::test]
    async fn test_await_all_reports_outstanding_on_timeout() {
        let supervisor = TaskSupervisor::new();
        supervisor
            .schedule("slow", Duration::from_secs(30), completes())
            .unwrap();

        assert_eq!(supervisor.await_all(Duration::from_millis(20)).await, 1);

        assert_eq!(supervisor.abort_all(), 1);
        assert_eq!(supervisor.await_all(Duration::from_secs(1)).await, 0);
        let stats = supervisor.stats();
        assert_eq!(stats.cancelled + stats.aborted, 1);
    }

    #[tokio::test]
    async fn test_await_all_ignores_tasks_scheduled_later() {
        let supervisor = TaskSupervisor::new();
        supervisor
            .schedule("first", Duration::from_millis(20), completes())
            .unwrap();
        let first = supervisor.handles().remove(0);

        let feeder = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move {
                for n in 0..30 {
                    supervisor
                        .schedule(format!("later-{n}"), Duration::from_millis(50), completes())
                        .unwrap();
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
        };

        assert_eq!(supervisor.await_all(Duration::from_millis(300)).await, 0);
        assert!(first.is_finished());
        assert!(supervisor.outstanding() > 0, "later tasks are still running");

        feeder.await.unwrap();
        assert_eq!(supervisor.await_all(Duration::from_secs(2)).await, 0);
        assert_eq!(supervisor.stats().completed, 31);
    }

    #[tokio::test]
    async fn test_handle_signals_completion() {
        let supervisor = TaskSupervisor::new();
        supervisor
            .schedule("k1", Duration::from_millis(10), completes())
            .unwrap();
        let handle = supervisor.handles().remove(0);
        assert!(!handle.is_finished());

        tokio::time::timeout(Duration::from_secs(1), handle.finished())
            .await
            .unwrap();
        assert!(handle.is_finished());
        assert_eq!(supervisor.task_for("k1"), None);
    }

    #[tokio::test]
    async fn test_closed_supervisor_refuses_work() {
        let supervisor = TaskSupervisor::new();
        supervisor
            .schedule("k1", Duration::from_millis(10), completes())
            .unwrap();

        Closeable::close(&supervisor).await.unwrap();
        assert_eq!(supervisor.outstanding(), 0);
        assert_eq!(
            supervisor.schedule("k2", Duration::ZERO, completes()),
            Err(SupervisorError::Closed)
        );
    }
}
