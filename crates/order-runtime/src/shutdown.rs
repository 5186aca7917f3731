//! # Shutdown Coordination
//!
//! Ordered, deadline-bounded release of long-lived resources.
//!
//! A [`ShutdownManifest`] names every resource that must be released and assigns it to
//! a numeric *group*. The [`ShutdownCoordinator`] closes groups in ascending order:
//! every entry of group `n` has finished (or been given up on) before any entry of
//! group `n + 1` starts. Entries of the same group close concurrently.
//!
//! ```text
//! group 0: [http listener]            ── stop accepting requests
//! group 1: [fulfillment tasks]        ── drain in-flight work
//! group 2: [order store]              ── release storage
//! ```
//!
//! Each close is bounded by the time left until the overall deadline, or by the entry's
//! own timeout if that is shorter. A close that runs out of time is abandoned, the
//! resource's [`Closeable::abort`] hook is invoked, and the coordinator moves on.

use crate::error::{CloseError, ShutdownError};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// A resource that can be released during shutdown.
#[async_trait]
pub trait Closeable: Send + Sync {
    /// Releases the resource, waiting for whatever it still has in flight.
    async fn close(&self) -> Result<(), CloseError>;

    /// Called when `close` ran out of time. Must not block.
    fn abort(&self) {}
}

/// Ordering key for manifest entries. Lower groups close first.
pub type ShutdownGroup = u8;

/// One resource to release.
pub struct ManifestEntry {
    pub name: String,
    pub group: ShutdownGroup,
    pub timeout: Option<Duration>,
    pub resource: Arc<dyn Closeable>,
}

impl std::fmt::Debug for ManifestEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestEntry")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// The list of resources to release at shutdown.
#[derive(Debug, Default)]
pub struct ShutdownManifest {
    entries: Vec<ManifestEntry>,
}

impl ShutdownManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry bounded only by the overall deadline.
    pub fn entry(
        mut self,
        name: impl Into<String>,
        group: ShutdownGroup,
        resource: Arc<dyn Closeable>,
    ) -> Self {
        self.entries.push(ManifestEntry {
            name: name.into(),
            group,
            timeout: None,
            resource,
        });
        self
    }

    /// Adds an entry with its own timeout, capped by the overall deadline.
    pub fn entry_with_timeout(
        mut self,
        name: impl Into<String>,
        group: ShutdownGroup,
        timeout: Duration,
        resource: Arc<dyn Closeable>,
    ) -> Self {
        self.entries.push(ManifestEntry {
            name: name.into(),
            group,
            timeout: Some(timeout),
            resource,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    fn validate(&self) -> Result<(), ShutdownError> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if entry.name.is_empty() {
                return Err(ShutdownError::EmptyName);
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(ShutdownError::DuplicateEntry(entry.name.clone()));
            }
            if let Some(timeout) = entry.timeout.filter(|t| t.is_zero()) {
                return Err(ShutdownError::ZeroTimeout {
                    name: entry.name.clone(),
                    timeout,
                });
            }
        }
        Ok(())
    }
}

/// How one manifest entry ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    ClosedOk,
    ClosedWithError(String),
    TimedOut,
}

/// Result of a shutdown run: one outcome per entry, in manifest order.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub outcomes: Vec<(String, CloseOutcome)>,
    pub elapsed: Duration,
}

impl ShutdownReport {
    /// `true` if every entry closed without error or timeout.
    pub fn is_clean(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, outcome)| *outcome == CloseOutcome::ClosedOk)
    }

    pub fn outcome(&self, name: &str) -> Option<&CloseOutcome> {
        self.outcomes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, outcome)| outcome)
    }

    /// Entries that did not close cleanly.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &CloseOutcome)> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome != CloseOutcome::ClosedOk)
            .map(|(name, outcome)| (name.as_str(), outcome))
    }
}

/// Runs a [`ShutdownManifest`] under an overall deadline.
///
/// ```rust
/// use async_trait::async_trait;
/// use order_runtime::{CloseError, Closeable, ShutdownCoordinator, ShutdownManifest};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// struct Noop;
///
/// #[async_trait]
/// impl Closeable for Noop {
///     async fn close(&self) -> Result<(), CloseError> { Ok(()) }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let manifest = ShutdownManifest::new()
///         .entry("listener", 0, Arc::new(Noop))
///         .entry("store", 1, Arc::new(Noop));
///
///     let report = ShutdownCoordinator::new(Duration::from_secs(5))
///         .run(manifest)
///         .await
///         .unwrap();
///     assert!(report.is_clean());
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ShutdownCoordinator {
    deadline: Duration,
}

impl ShutdownCoordinator {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// Closes every entry, group by group, and reports what happened.
    ///
    /// # Errors
    ///
    /// Only a malformed manifest is an error; nothing is closed in that case.
    pub async fn run(&self, manifest: ShutdownManifest) -> Result<ShutdownReport, ShutdownError> {
        manifest.validate()?;

        let started = Instant::now();
        let deadline_at = started.checked_add(self.deadline);
        info!(
            entries = manifest.len(),
            deadline_ms = self.deadline.as_millis() as u64,
            "Shutdown started"
        );

        let mut groups: BTreeMap<ShutdownGroup, Vec<(usize, ManifestEntry)>> = BTreeMap::new();
        for (index, entry) in manifest.entries.into_iter().enumerate() {
            groups.entry(entry.group).or_default().push((index, entry));
        }

        let mut results = Vec::new();
        for (group, entries) in groups {
            let remaining = deadline_at
                .map_or(Duration::MAX, |at| at.saturating_duration_since(Instant::now()));
            info!(
                group,
                entries = entries.len(),
                remaining_ms = remaining.as_millis() as u64,
                "Closing shutdown group"
            );
            let closes = entries
                .into_iter()
                .map(|(index, entry)| async move {
                    let outcome = close_entry(&entry, remaining).await;
                    (index, entry.name, outcome)
                });
            results.extend(join_all(closes).await);
        }

        results.sort_by_key(|(index, _, _)| *index);
        let report = ShutdownReport {
            outcomes: results
                .into_iter()
                .map(|(_, name, outcome)| (name, outcome))
                .collect(),
            elapsed: started.elapsed(),
        };

        if report.is_clean() {
            info!(elapsed_ms = report.elapsed.as_millis() as u64, "Shutdown complete");
        } else {
            warn!(
                elapsed_ms = report.elapsed.as_millis() as u64,
                failed = report.failures().count(),
                "Shutdown complete with failures"
            );
        }
        Ok(report)
    }
}

async fn close_entry(entry: &ManifestEntry, remaining: Duration) -> CloseOutcome {
    let budget = entry.timeout.map_or(remaining, |t| t.min(remaining));
    let resource = Arc::clone(&entry.resource);
    // A separate task so a panicking close is reported instead of unwinding the coordinator.
    let mut handle = tokio::spawn(async move { resource.close().await });

    let outcome = match tokio::time::timeout(budget, &mut handle).await {
        Ok(Ok(Ok(()))) => CloseOutcome::ClosedOk,
        Ok(Ok(Err(e))) => CloseOutcome::ClosedWithError(e.to_string()),
        Ok(Err(join_error)) => CloseOutcome::ClosedWithError(format!("close panicked: {join_error}")),
        Err(_) => {
            handle.abort();
            entry.resource.abort();
            CloseOutcome::TimedOut
        }
    };

    match &outcome {
        CloseOutcome::ClosedOk => info!(name = %entry.name, group = entry.group, "Closed"),
        CloseOutcome::ClosedWithError(e) => {
            error!(name = %entry.name, group = entry.group, error = %e, "Close failed")
        }
        CloseOutcome::TimedOut => warn!(
            name = %entry.name,
            group = entry.group,
            budget_ms = budget.as_millis() as u64,
            "Close timed out, aborted"
        ),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Records the order of close start/finish events into a shared log.
    struct Recorder {
        name: &'static str,
        delay: Duration,
        fail: bool,
        log: Arc<Mutex<Vec<String>>>,
        aborted: AtomicBool,
    }

    impl Recorder {
        fn new(name: &'static str, delay_ms: u64, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                delay: Duration::from_millis(delay_ms),
                fail: false,
                log: Arc::clone(log),
                aborted: AtomicBool::new(false),
            })
        }

        fn failing(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                delay: Duration::ZERO,
                fail: true,
                log: Arc::clone(log),
                aborted: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl Closeable for Recorder {
        async fn close(&self) -> Result<(), CloseError> {
            self.log.lock().unwrap().push(format!("start:{}", self.name));
            tokio::time::sleep(self.delay).await;
            self.log.lock().unwrap().push(format!("end:{}", self.name));
            if self.fail {
                Err(CloseError::new("disk on fire"))
            } else {
                Ok(())
            }
        }

        fn abort(&self) {
            self.aborted.store(true, Ordering::SeqCst);
        }
    }

    fn position(log: &[String], event: &str) -> usize {
        log.iter().position(|e| e == event).unwrap()
    }

    #[tokio::test]
    async fn test_groups_close_in_ascending_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        // Declared out of order on purpose; group numbers decide.
        let manifest = ShutdownManifest::new()
            .entry("store", 2, Recorder::new("store", 0, &log))
            .entry("listener", 0, Recorder::new("listener", 5, &log))
            .entry("tasks", 1, Recorder::new("tasks", 10, &log))
            .entry("metrics", 0, Recorder::new("metrics", 40, &log));

        let report = ShutdownCoordinator::new(Duration::from_secs(5))
            .run(manifest)
            .await
            .unwrap();

        assert!(report.is_clean());
        let names: Vec<&str> = report.outcomes.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["store", "listener", "tasks", "metrics"]);

        let log = log.lock().unwrap();
        assert!(position(&log, "end:listener") < position(&log, "start:tasks"));
        assert!(position(&log, "end:metrics") < position(&log, "start:tasks"));
        assert!(position(&log, "end:tasks") < position(&log, "start:store"));
    }

    #[tokio::test]
    async fn test_same_group_closes_concurrently() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manifest = ShutdownManifest::new()
            .entry("a", 0, Recorder::new("a", 50, &log))
            .entry("b", 0, Recorder::new("b", 50, &log));

        ShutdownCoordinator::new(Duration::from_secs(5))
            .run(manifest)
            .await
            .unwrap();

        let log = log.lock().unwrap();
        assert!(position(&log, "start:b") < position(&log, "end:a"));
    }

    #[tokio::test]
    async fn test_timeout_aborts_entry_and_moves_on() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let slow = Recorder::new("slow", 10_000, &log);
        let manifest = ShutdownManifest::new()
            .entry_with_timeout("slow", 0, Duration::from_millis(20), slow.clone())
            .entry("next", 1, Recorder::new("next", 0, &log));

        let report = ShutdownCoordinator::new(Duration::from_secs(5))
            .run(manifest)
            .await
            .unwrap();

        assert_eq!(report.outcome("slow"), Some(&CloseOutcome::TimedOut));
        assert_eq!(report.outcome("next"), Some(&CloseOutcome::ClosedOk));
        assert!(slow.aborted.load(Ordering::SeqCst));
        assert!(report.elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_overall_deadline_caps_every_entry() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manifest = ShutdownManifest::new()
            .entry_with_timeout("slow", 0, Duration::from_secs(60), Recorder::new("slow", 10_000, &log));

        let report = ShutdownCoordinator::new(Duration::from_millis(30))
            .run(manifest)
            .await
            .unwrap();

        assert_eq!(report.outcome("slow"), Some(&CloseOutcome::TimedOut));
        assert!(report.elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_error_is_recorded_and_later_groups_still_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manifest = ShutdownManifest::new()
            .entry("broken", 0, Recorder::failing("broken", &log))
            .entry("store", 1, Recorder::new("store", 0, &log));

        let report = ShutdownCoordinator::new(Duration::from_secs(5))
            .run(manifest)
            .await
            .unwrap();

        assert!(!report.is_clean());
        assert_eq!(
            report.outcome("broken"),
            Some(&CloseOutcome::ClosedWithError("disk on fire".to_string()))
        );
        assert_eq!(report.outcome("store"), Some(&CloseOutcome::ClosedOk));
        assert_eq!(report.failures().count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_manifest_is_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));

        let duplicate = ShutdownManifest::new()
            .entry("store", 0, Recorder::new("store", 0, &log))
            .entry("store", 1, Recorder::new("store", 0, &log));
        assert_eq!(
            coordinator.run(duplicate).await.unwrap_err(),
            ShutdownError::DuplicateEntry("store".to_string())
        );

        let unnamed = ShutdownManifest::new().entry("", 0, Recorder::new("x", 0, &log));
        assert_eq!(coordinator.run(unnamed).await.unwrap_err(), ShutdownError::EmptyName);

        let zero = ShutdownManifest::new().entry_with_timeout("z", 0, Duration::ZERO, Recorder::new("z", 0, &log));
        assert!(matches!(
            coordinator.run(zero).await,
            Err(ShutdownError::ZeroTimeout { .. })
        ));

        assert!(log.lock().unwrap().is_empty(), "nothing closes when the manifest is bad");
    }

    #[tokio::test]
    async fn test_empty_manifest_is_clean() {
        let report = ShutdownCoordinator::new(Duration::from_secs(1))
            .run(ShutdownManifest::new())
            .await
            .unwrap();
        assert!(report.is_clean());
        assert!(report.outcomes.is_empty());
    }
}
