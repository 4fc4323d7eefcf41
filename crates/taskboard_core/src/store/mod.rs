//! Remote store contract and implementations.
//!
//! # Responsibility
//! - Define the asynchronous request/response surface the dispatcher writes
//!   through: fetch a sibling sequence, create, write and delete one item.
//! - Provide a SQLite-backed store and an in-process store.
//!
//! # Invariants
//! - `fetch_siblings` returns items sorted by `order ASC, id ASC`.
//! - Every call touches at most one ordered item; renumbering a collection is
//!   a batch of calls issued by the dispatcher.
//! - Deleting a board or column cascades to everything it owns.

use crate::db::DbError;
use crate::model::board::{Board, BoardId, NewBoard};
use crate::model::item::{BoardItem, ItemPatch, NewItem};
use crate::model::ordered::{CollectionKey, ItemId};
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::{MemoryStore, StoreCall};
pub use sqlite_store::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a remote store call.
#[derive(Debug)]
pub enum StoreError {
    /// Item, column or board does not exist where the caller expected it.
    NotFound(Uuid),
    /// Store refused the write.
    Rejected(String),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
    /// Store could not be reached or its worker failed.
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "not found in store: {id}"),
            Self::Rejected(message) => write!(f, "store rejected write: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid stored data: {message}"),
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Fields written to one item. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemWrite {
    pub order: Option<u32>,
    /// New parent collection; must be of the same kind as the current one.
    pub collection: Option<CollectionKey>,
    pub patch: ItemPatch,
}

impl ItemWrite {
    pub fn order(order: u32) -> Self {
        Self {
            order: Some(order),
            ..Self::default()
        }
    }

    pub fn relocate(collection: CollectionKey, order: u32) -> Self {
        Self {
            order: Some(order),
            collection: Some(collection),
            ..Self::default()
        }
    }

    pub fn patch(patch: ItemPatch) -> Self {
        Self {
            patch,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_none() && self.collection.is_none() && self.patch.is_empty()
    }
}

/// Asynchronous persistence collaborator.
///
/// `key` arguments name the collection the caller believes the item is in;
/// stores answer `NotFound` when that belief is stale.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fails with `NotFound(parent)` when the board or column owning `key`
    /// does not exist.
    async fn ensure_collection(&self, key: CollectionKey) -> StoreResult<()>;
    /// Loads all siblings of one collection, sorted by order.
    async fn fetch_siblings(&self, key: CollectionKey) -> StoreResult<Vec<BoardItem>>;
    /// Creates one item at `order` and returns its identity.
    async fn create_item(
        &self,
        key: CollectionKey,
        item: &NewItem,
        order: u32,
    ) -> StoreResult<ItemId>;
    /// Writes the given fields of one item.
    async fn write_item(
        &self,
        key: CollectionKey,
        id: ItemId,
        fields: &ItemWrite,
    ) -> StoreResult<()>;
    /// Deletes one item and everything it owns.
    async fn delete_item(&self, key: CollectionKey, id: ItemId) -> StoreResult<()>;
    async fn create_board(&self, board: &NewBoard) -> StoreResult<BoardId>;
    async fn get_board(&self, id: BoardId) -> StoreResult<Option<Board>>;
    /// Deletes one board with all of its columns and tasks.
    async fn delete_board(&self, id: BoardId) -> StoreResult<()>;
}
