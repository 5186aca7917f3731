//! # Record Trait
//!
//! The `Record` trait is the contract every row type must satisfy to be kept by the
//! generic [`StoreActor`](crate::StoreActor). It names the key type, the ordering
//! timestamp used by `List`, and the *state* used by guarded updates.
//!
//! # Guarded Updates
//! A guarded update carries the state the caller last read. The actor applies it only
//! when the stored row still reports that same state, otherwise it answers with
//! [`FrameworkError::Conflict`](crate::FrameworkError::Conflict). Because the actor
//! processes requests one at a time, the compare and the write cannot interleave with
//! another writer.

use chrono::{DateTime, Utc};
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Trait that any row type must implement to be stored by a `StoreActor`.
///
/// # Example
///
/// ```rust
/// use chrono::{DateTime, Utc};
/// use order_runtime::Record;
///
/// #[derive(Clone, Debug)]
/// struct Note { id: String, body: String, created_at: DateTime<Utc> }
///
/// impl Record for Note {
///     type Id = String;
///     type State = ();
///
///     fn id(&self) -> &String { &self.id }
///     fn created_at(&self) -> DateTime<Utc> { self.created_at }
///     fn state(&self) {}
/// }
/// ```
pub trait Record: Clone + Send + Sync + Debug + 'static {
    /// The unique key of a row (e.g., a UUID string).
    type Id: Eq + Ord + Hash + Clone + Send + Sync + Display + Debug;

    /// The part of the row that guarded updates compare against (e.g., a status enum).
    type State: PartialEq + Clone + Send + Sync + Debug;

    /// The key under which the row is stored. Must never change after creation.
    fn id(&self) -> &Self::Id;

    /// Creation time; `List` returns rows newest first by this value.
    fn created_at(&self) -> DateTime<Utc>;

    /// The current state of the row.
    fn state(&self) -> Self::State;
}
