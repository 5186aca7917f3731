//! # Store Messages
//!
//! This module defines the message types exchanged between the `StoreClient` and the
//! `StoreActor`.

use crate::error::FrameworkError;
use crate::record::Record;
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by the store actor.
pub type Response<T> = oneshot::Sender<Result<T, FrameworkError>>;

/// Request sent to a [`StoreActor`](crate::StoreActor).
///
/// The variants map onto the record-store port: `Create`, `Get` (by id), `List`
/// (newest first), `Update` (optionally guarded by the state the caller read) and
/// `Close`. Once `Close` has been processed the actor answers every queued request
/// with [`FrameworkError::StoreClosed`] and exits.
#[derive(Debug)]
pub enum StoreRequest<T: Record> {
    Create {
        record: T,
        respond_to: Response<()>,
    },
    Get {
        id: T::Id,
        respond_to: Response<Option<T>>,
    },
    List {
        respond_to: Response<Vec<T>>,
    },
    Update {
        record: T,
        expected: Option<T::State>,
        respond_to: Response<T>,
    },
    Close {
        respond_to: Response<()>,
    },
}

impl<T: Record> StoreRequest<T> {
    /// Short operation name, used in logs.
    pub fn op(&self) -> &'static str {
        match self {
            StoreRequest::Create { .. } => "create",
            StoreRequest::Get { .. } => "get",
            StoreRequest::List { .. } => "list",
            StoreRequest::Update { .. } => "update",
            StoreRequest::Close { .. } => "close",
        }
    }

    /// Answers the request with `StoreClosed`, whatever its response type.
    pub(crate) fn reject_closed(self) {
        match self {
            StoreRequest::Create { respond_to, .. } => {
                let _ = respond_to.send(Err(FrameworkError::StoreClosed));
            }
            StoreRequest::Get { respond_to, .. } => {
                let _ = respond_to.send(Err(FrameworkError::StoreClosed));
            }
            StoreRequest::List { respond_to } => {
                let _ = respond_to.send(Err(FrameworkError::StoreClosed));
            }
            StoreRequest::Update { respond_to, .. } => {
                let _ = respond_to.send(Err(FrameworkError::StoreClosed));
            }
            // A second close on a closing store is a no-op.
            StoreRequest::Close { respond_to } => {
                let _ = respond_to.send(Ok(()));
            }
        }
    }
}
