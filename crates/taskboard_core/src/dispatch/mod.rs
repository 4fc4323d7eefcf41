//! Mutation dispatcher: turns one request into one batch of remote writes.
//!
//! # Responsibility
//! - Serialize batches per collection.
//! - Plan against freshly fetched siblings, issue the writes, track the
//!   outcome through a `Handle`.
//! - Keep collection views in step with each batch.
//!
//! # Invariants
//! - Validation, kind and planning errors are returned before any write.
//! - Write failures never surface as `Err`; they settle the handle.
//! - No automatic retry.

mod batch;
mod dispatcher;
mod handle;
mod locks;

pub use dispatcher::Dispatcher;
pub use handle::{BatchId, BatchState, Handle, WriteFailure};

use crate::model::item::{ItemPatch, NewItem};
use crate::model::ordered::{CollectionKey, CollectionKind, ItemId};
use crate::model::validation::ValidationError;
use crate::reorder::{InvariantViolation, ReorderError};
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type DispatchResult<T> = Result<T, DispatchError>;

/// One mutation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Appends `item` when `rank` is `None`.
    Insert {
        key: CollectionKey,
        item: NewItem,
        rank: Option<u32>,
    },
    Delete {
        key: CollectionKey,
        id: ItemId,
    },
    /// Repositions when `from == to`, otherwise re-parents. Without a rank
    /// the item goes last.
    Move {
        id: ItemId,
        from: CollectionKey,
        to: CollectionKey,
        rank: Option<u32>,
    },
    Edit {
        key: CollectionKey,
        id: ItemId,
        patch: ItemPatch,
    },
    /// Renumbers a broken sequence back into `1..=N`.
    Repair {
        key: CollectionKey,
    },
}

impl Mutation {
    /// Collections the mutation writes to, deduplicated.
    pub fn collections(&self) -> Vec<CollectionKey> {
        match self {
            Self::Insert { key, .. }
            | Self::Delete { key, .. }
            | Self::Edit { key, .. }
            | Self::Repair { key } => vec![*key],
            Self::Move { from, to, .. } if from == to => vec![*from],
            Self::Move { from, to, .. } => vec![*from, *to],
        }
    }

    /// Collection an item enters, which must exist before anything is
    /// written to it.
    pub fn entered_collection(&self) -> Option<CollectionKey> {
        match self {
            Self::Insert { key, .. } => Some(*key),
            Self::Move { from, to, .. } if from != to => Some(*to),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Delete { .. } => "delete",
            Self::Move { .. } => "move",
            Self::Edit { .. } => "edit",
            Self::Repair { .. } => "repair",
        }
    }
}

/// Errors returned by `Dispatcher::submit`; none of them leaves a write
/// behind.
#[derive(Debug)]
pub enum DispatchError {
    /// The board or column owning the collection does not exist.
    CollectionNotFound(CollectionKey),
    NotFound {
        key: CollectionKey,
        id: ItemId,
    },
    InvariantViolation {
        key: CollectionKey,
        violation: InvariantViolation,
    },
    /// Another batch holds the collection and the busy policy is `Reject`.
    Busy(CollectionKey),
    KindMismatch {
        expected: CollectionKind,
        actual: CollectionKind,
    },
    Validation(ValidationError),
    /// A store call made before planning failed.
    Store(StoreError),
}

impl DispatchError {
    pub(crate) fn from_reorder(key: CollectionKey, err: ReorderError) -> Self {
        match err {
            ReorderError::NotFound(id) => Self::NotFound { key, id },
            ReorderError::InvariantViolation(violation) => {
                Self::InvariantViolation { key, violation }
            }
        }
    }
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CollectionNotFound(key) => write!(f, "collection {key} does not exist"),
            Self::NotFound { key, id } => write!(f, "item {id} not found in {key}"),
            Self::InvariantViolation { key, violation } => {
                write!(f, "{key} violates ordering invariant: {violation}")
            }
            Self::Busy(key) => write!(f, "{key} has a batch in flight"),
            Self::KindMismatch { expected, actual } => {
                write!(f, "expected {expected} item, got {actual}")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DispatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvariantViolation { violation, .. } => Some(violation),
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::CollectionNotFound(_)
            | Self::NotFound { .. }
            | Self::Busy(_)
            | Self::KindMismatch { .. } => None,
        }
    }
}

impl From<ValidationError> for DispatchError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for DispatchError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
