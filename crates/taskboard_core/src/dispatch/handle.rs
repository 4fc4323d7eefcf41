//! Batch handles and their state machine.
//!
//! # Invariants
//! - A handle starts `Pending` (or is created already terminal).
//! - Terminal states (`Applied`, `PartiallyApplied`, `Failed`) never change.

use crate::model::ordered::{CollectionKey, ItemId};
use crate::view::ViewSnapshot;
use tokio::sync::watch;

/// Process-unique batch number.
pub type BatchId = u64;

/// One write the store rejected or failed to confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub id: ItemId,
    pub reason: String,
}

/// Lifecycle of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchState {
    /// Writes are in flight. Holds the views as they were before the
    /// optimistic patch.
    Pending {
        snapshot_before_patch: Vec<ViewSnapshot>,
    },
    /// Every write succeeded.
    Applied { writes: usize },
    /// Some writes succeeded and some failed; the collection may violate the
    /// ordering invariant until the caller repairs it.
    PartiallyApplied {
        applied: usize,
        failures: Vec<WriteFailure>,
    },
    /// Nothing was written.
    Failed {
        reason: String,
        failures: Vec<WriteFailure>,
    },
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending { .. } => "pending",
            Self::Applied { .. } => "applied",
            Self::PartiallyApplied { .. } => "partially_applied",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Caller-side view of one submitted batch.
///
/// Dropping a handle does not cancel the batch.
#[derive(Debug, Clone)]
pub struct Handle {
    id: BatchId,
    collections: Vec<CollectionKey>,
    state: watch::Receiver<BatchState>,
}

impl Handle {
    pub fn id(&self) -> BatchId {
        self.id
    }

    /// Collections the batch writes to.
    pub fn collections(&self) -> &[CollectionKey] {
        &self.collections
    }

    pub fn state(&self) -> BatchState {
        self.state.borrow().clone()
    }

    pub fn is_settled(&self) -> bool {
        self.state.borrow().is_terminal()
    }

    /// Waits until the batch reaches a terminal state.
    pub async fn settled(mut self) -> BatchState {
        self.wait().await
    }

    /// Like `settled`, without consuming the handle.
    pub async fn wait(&mut self) -> BatchState {
        loop {
            let current = self.state.borrow_and_update().clone();
            if current.is_terminal() {
                return current;
            }
            if self.state.changed().await.is_err() {
                let last = self.state.borrow().clone();
                if last.is_terminal() {
                    return last;
                }
                return BatchState::Failed {
                    reason: "batch worker stopped before settling".into(),
                    failures: Vec::new(),
                };
            }
        }
    }
}

/// Dispatcher-side end of a handle.
#[derive(Debug)]
pub(crate) struct BatchTracker {
    id: BatchId,
    sender: watch::Sender<BatchState>,
}

impl BatchTracker {
    pub(crate) fn new(
        id: BatchId,
        collections: Vec<CollectionKey>,
        initial: BatchState,
    ) -> (Self, Handle) {
        let (sender, receiver) = watch::channel(initial);
        let handle = Handle {
            id,
            collections,
            state: receiver,
        };
        (Self { id, sender }, handle)
    }

    /// Builds a handle that is already in a terminal state.
    pub(crate) fn resolved(
        id: BatchId,
        collections: Vec<CollectionKey>,
        state: BatchState,
    ) -> Handle {
        let (_, handle) = Self::new(id, collections, state);
        handle
    }

    pub(crate) fn id(&self) -> BatchId {
        self.id
    }

    /// Moves the batch to `state`.
    ///
    /// Returns `false` (and changes nothing) when the batch is already
    /// terminal or `state` is not terminal.
    pub(crate) fn settle(&self, state: BatchState) -> bool {
        self.sender.send_if_modified(|current| {
            if current.is_terminal() || !state.is_terminal() {
                return false;
            }
            *current = state;
            true
        })
    }
}
