//! Ordering primitives shared by every sibling collection.
//!
//! # Responsibility
//! - Identify a sibling collection by its parent reference.
//! - Expose the `(identity, order)` projection the reorder engine works on.
//!
//! # Invariants
//! - `order` is 1-based and only meaningful inside one `CollectionKey`.
//! - Collections of different kinds never exchange items.

use crate::model::board::BoardId;
use crate::model::column::ColumnId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Identity of any ordered item (column or task).
pub type ItemId = Uuid;

/// Kind of items a sibling collection holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    /// Columns of one board.
    Columns,
    /// Tasks of one column.
    Tasks,
}

impl CollectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Columns => "columns",
            Self::Tasks => "tasks",
        }
    }
}

impl Display for CollectionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parent reference shared by one sibling sequence.
///
/// Task collections carry the owning board as well as the column so that a
/// task created or moved into the collection can be materialized without an
/// extra lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollectionKey {
    /// Columns owned by a board.
    Columns { board: BoardId },
    /// Tasks owned by a column of a board.
    Tasks { board: BoardId, column: ColumnId },
}

impl CollectionKey {
    pub fn columns(board: BoardId) -> Self {
        Self::Columns { board }
    }

    pub fn tasks(board: BoardId, column: ColumnId) -> Self {
        Self::Tasks { board, column }
    }

    /// Identity of the direct parent (board or column).
    pub fn parent_id(&self) -> Uuid {
        match self {
            Self::Columns { board } => *board,
            Self::Tasks { column, .. } => *column,
        }
    }

    /// Board the collection ultimately belongs to.
    pub fn board_id(&self) -> BoardId {
        match self {
            Self::Columns { board } | Self::Tasks { board, .. } => *board,
        }
    }

    pub fn kind(&self) -> CollectionKind {
        match self {
            Self::Columns { .. } => CollectionKind::Columns,
            Self::Tasks { .. } => CollectionKind::Tasks,
        }
    }
}

impl Display for CollectionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.parent_id())
    }
}

/// `(identity, order)` pair for one member of a sibling sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiblingEntry {
    pub id: ItemId,
    pub order: u32,
}

impl SiblingEntry {
    pub fn new(id: ItemId, order: u32) -> Self {
        Self { id, order }
    }
}

/// Value with an identity, a parent collection and a position.
pub trait OrderedItem {
    fn item_id(&self) -> ItemId;
    fn collection(&self) -> CollectionKey;
    fn order(&self) -> u32;

    fn sibling_entry(&self) -> SiblingEntry {
        SiblingEntry::new(self.item_id(), self.order())
    }
}

/// Projects an ordered slice into engine entries, preserving slice order.
pub fn sibling_entries<T: OrderedItem>(items: &[T]) -> Vec<SiblingEntry> {
    items.iter().map(OrderedItem::sibling_entry).collect()
}
