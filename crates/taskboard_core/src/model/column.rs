//! Column domain model.

use crate::model::board::BoardId;
use crate::model::ordered::{CollectionKey, ItemId, OrderedItem};
use crate::model::validation::{normalize_title, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable column identifier.
pub type ColumnId = Uuid;

/// Column read model. `order` ranks it among the board's columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub uuid: ColumnId,
    pub board_uuid: BoardId,
    pub title: String,
    pub order: u32,
}

impl OrderedItem for Column {
    fn item_id(&self) -> ItemId {
        self.uuid
    }

    fn collection(&self) -> CollectionKey {
        CollectionKey::columns(self.board_uuid)
    }

    fn order(&self) -> u32 {
        self.order
    }
}

/// Creation payload for a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewColumn {
    pub title: String,
}

impl NewColumn {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    pub fn normalized(&self) -> Result<Self, ValidationError> {
        Ok(Self {
            title: normalize_title(&self.title)?,
        })
    }
}
