//! # Mock Store
//!
//! `MockStore<T>` hands out a real [`StoreClient<T>`] whose requests are answered from a
//! queue of scripted expectations instead of a running [`StoreActor`](crate::StoreActor).
//! It is the easy way to inject storage failures into code that sits on top of a store.
//!
//! | | MockStore | Real actor |
//! |---|---|---|
//! | **State** | none, answers are scripted | real rows |
//! | **Error injection** | `return_err` | hard |
//! | **Use case** | logic *around* the store | the store itself, full system |
//!
//! ```rust
//! use chrono::{DateTime, Utc};
//! use order_runtime::mock::MockStore;
//! use order_runtime::{FrameworkError, Record};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Note { id: u32, created_at: DateTime<Utc> }
//!
//! impl Record for Note {
//!     type Id = u32;
//!     type State = ();
//!     fn id(&self) -> &u32 { &self.id }
//!     fn created_at(&self) -> DateTime<Utc> { self.created_at }
//!     fn state(&self) {}
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockStore::<Note>::new();
//!     mock.expect_get(7).return_ok(None);
//!     mock.expect_create().return_err(FrameworkError::StoreClosed);
//!
//!     let client = mock.client();
//!     assert_eq!(client.get(7).await, Ok(None));
//!     let note = Note { id: 7, created_at: Utc::now() };
//!     assert_eq!(client.create(note).await, Err(FrameworkError::StoreClosed));
//!
//!     mock.verify();
//! }
//! ```

use crate::client::StoreClient;
use crate::error::FrameworkError;
use crate::message::StoreRequest;
use crate::record::Record;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

enum Expectation<T: Record> {
    Create {
        response: Result<(), FrameworkError>,
    },
    Get {
        id: T::Id,
        response: Result<Option<T>, FrameworkError>,
    },
    List {
        response: Result<Vec<T>, FrameworkError>,
    },
    Update {
        id: T::Id,
        response: Result<T, FrameworkError>,
    },
    Close {
        response: Result<(), FrameworkError>,
    },
}

impl<T: Record> Expectation<T> {
    fn op(&self) -> &'static str {
        match self {
            Expectation::Create { .. } => "create",
            Expectation::Get { .. } => "get",
            Expectation::List { .. } => "list",
            Expectation::Update { .. } => "update",
            Expectation::Close { .. } => "close",
        }
    }
}

struct Script<T: Record> {
    queue: VecDeque<Expectation<T>>,
    mismatches: Vec<String>,
}

type Shared<T> = Arc<Mutex<Script<T>>>;

fn lock<T: Record>(script: &Shared<T>) -> MutexGuard<'_, Script<T>> {
    script.lock().unwrap_or_else(PoisonError::into_inner)
}

fn push<T: Record>(script: &Shared<T>, expectation: Expectation<T>) {
    lock(script).queue.push_back(expectation);
}

/// A scripted store with expectation tracking.
///
/// Requests are matched against expectations in the order they were declared. A request
/// that does not match the next expectation is recorded, its response channel is dropped
/// (the caller sees [`FrameworkError::ActorDropped`]), and [`verify`](Self::verify)
/// reports it.
pub struct MockStore<T: Record> {
    client: StoreClient<T>,
    script: Shared<T>,
    _handle: tokio::task::JoinHandle<()>,
}

impl<T: Record> Default for MockStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> MockStore<T> {
    /// Creates a mock with no expectations. Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::channel::<StoreRequest<T>>(100);
        let script: Shared<T> = Arc::new(Mutex::new(Script {
            queue: VecDeque::new(),
            mismatches: Vec::new(),
        }));
        let shared = Arc::clone(&script);

        let handle = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                let next = lock(&shared).queue.pop_front();

                match (request, next) {
                    (StoreRequest::Create { respond_to, .. }, Some(Expectation::Create { response })) => {
                        let _ = respond_to.send(response);
                    }
                    (StoreRequest::Get { id, respond_to }, Some(Expectation::Get { id: want, response }))
                        if id == want =>
                    {
                        let _ = respond_to.send(response);
                    }
                    (StoreRequest::List { respond_to }, Some(Expectation::List { response })) => {
                        let _ = respond_to.send(response);
                    }
                    (
                        StoreRequest::Update { record, respond_to, .. },
                        Some(Expectation::Update { id: want, response }),
                    ) if *record.id() == want => {
                        let _ = respond_to.send(response);
                    }
                    (StoreRequest::Close { respond_to }, Some(Expectation::Close { response })) => {
                        let _ = respond_to.send(response);
                    }
                    (request, expectation) => {
                        let wanted = expectation.as_ref().map_or("nothing", Expectation::op);
                        lock(&shared)
                            .mismatches
                            .push(format!("got {} request, expected {wanted}", request.op()));
                    }
                }
            }
        });

        Self {
            client: StoreClient::new(sender),
            script,
            _handle: handle,
        }
    }

    /// Returns a client wired to this mock.
    pub fn client(&self) -> StoreClient<T> {
        self.client.clone()
    }

    pub fn expect_create(&self) -> UnitExpectationBuilder<T> {
        UnitExpectationBuilder {
            close: false,
            script: Arc::clone(&self.script),
        }
    }

    pub fn expect_close(&self) -> UnitExpectationBuilder<T> {
        UnitExpectationBuilder {
            close: true,
            script: Arc::clone(&self.script),
        }
    }

    pub fn expect_get(&self, id: T::Id) -> GetExpectationBuilder<T> {
        GetExpectationBuilder {
            id,
            script: Arc::clone(&self.script),
        }
    }

    pub fn expect_list(&self) -> ListExpectationBuilder<T> {
        ListExpectationBuilder {
            script: Arc::clone(&self.script),
        }
    }

    /// Expects an update (guarded or not) of the record with `id`.
    pub fn expect_update(&self, id: T::Id) -> UpdateExpectationBuilder<T> {
        UpdateExpectationBuilder {
            id,
            script: Arc::clone(&self.script),
        }
    }

    /// Panics if any expectation is unmet or any request was unexpected.
    pub fn verify(&self) {
        let script = lock(&self.script);
        if !script.mismatches.is_empty() {
            panic!("Unexpected store requests: {:?}", script.mismatches);
        }
        if !script.queue.is_empty() {
            panic!("Not all expectations were met. {} remaining", script.queue.len());
        }
    }
}

/// Builder for `create` and `close` expectations.
pub struct UnitExpectationBuilder<T: Record> {
    close: bool,
    script: Shared<T>,
}

impl<T: Record> UnitExpectationBuilder<T> {
    pub fn return_ok(self) {
        self.respond(Ok(()));
    }

    pub fn return_err(self, error: FrameworkError) {
        self.respond(Err(error));
    }

    fn respond(self, response: Result<(), FrameworkError>) {
        let expectation = if self.close {
            Expectation::Close { response }
        } else {
            Expectation::Create { response }
        };
        push(&self.script, expectation);
    }
}

/// Builder for `get` expectations.
pub struct GetExpectationBuilder<T: Record> {
    id: T::Id,
    script: Shared<T>,
}

impl<T: Record> GetExpectationBuilder<T> {
    pub fn return_ok(self, value: Option<T>) {
        push(&self.script, Expectation::Get { id: self.id, response: Ok(value) });
    }

    pub fn return_err(self, error: FrameworkError) {
        push(&self.script, Expectation::Get { id: self.id, response: Err(error) });
    }
}

/// Builder for `list` expectations.
pub struct ListExpectationBuilder<T: Record> {
    script: Shared<T>,
}

impl<T: Record> ListExpectationBuilder<T> {
    pub fn return_ok(self, rows: Vec<T>) {
        push(&self.script, Expectation::List { response: Ok(rows) });
    }

    pub fn return_err(self, error: FrameworkError) {
        push(&self.script, Expectation::List { response: Err(error) });
    }
}

/// Builder for `update` expectations.
pub struct UpdateExpectationBuilder<T: Record> {
    id: T::Id,
    script: Shared<T>,
}

impl<T: Record> UpdateExpectationBuilder<T> {
    pub fn return_ok(self, stored: T) {
        push(&self.script, Expectation::Update { id: self.id, response: Ok(stored) });
    }

    pub fn return_err(self, error: FrameworkError) {
        push(&self.script, Expectation::Update { id: self.id, response: Err(error) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    #[derive(Clone, Debug, PartialEq)]
    struct Note {
        id: u32,
        created_at: DateTime<Utc>,
    }

    impl Record for Note {
        type Id = u32;
        type State = ();

        fn id(&self) -> &u32 {
            &self.id
        }

        fn created_at(&self) -> DateTime<Utc> {
            self.created_at
        }

        fn state(&self) {}
    }

    #[tokio::test]
    async fn test_scripted_answers_in_order() {
        let note = Note { id: 1, created_at: Utc::now() };
        let mock = MockStore::<Note>::new();
        mock.expect_list().return_ok(vec![note.clone()]);
        mock.expect_update(1).return_err(FrameworkError::Conflict {
            id: "1".to_string(),
            actual: "()".to_string(),
        });
        mock.expect_close().return_ok();

        let client = mock.client();
        assert_eq!(client.list().await.unwrap(), vec![note.clone()]);
        assert!(matches!(
            client.update_guarded(note, ()).await,
            Err(FrameworkError::Conflict { .. })
        ));
        client.close().await.unwrap();

        mock.verify();
    }

    #[tokio::test]
    async fn test_mismatch_is_reported() {
        let mock = MockStore::<Note>::new();
        mock.expect_get(1).return_ok(None);

        let client = mock.client();
        assert_eq!(client.get(2).await, Err(FrameworkError::ActorDropped));

        let verdict = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| mock.verify()));
        assert!(verdict.is_err());
    }
}
