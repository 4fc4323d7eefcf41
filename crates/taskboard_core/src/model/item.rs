//! Kind-erased ordered items as exchanged with the store.
//!
//! # Responsibility
//! - Carry columns and tasks through the dispatcher and views uniformly.
//! - Compute field-level edits, dropping fields whose value is unchanged.
//!
//! # Invariants
//! - `BoardItem::collection()` always matches the item's parent fields.
//! - An `ItemPatch` returned by `changes_against` never contains a field
//!   equal to the current value.

use crate::model::board::UserId;
use crate::model::column::{Column, NewColumn};
use crate::model::ordered::{CollectionKey, CollectionKind, ItemId, OrderedItem};
use crate::model::task::{NewTask, Task};
use crate::model::validation::{
    normalize_description, normalize_task_title, normalize_title, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One member of a sibling collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoardItem {
    Column(Column),
    Task(Task),
}

impl BoardItem {
    pub fn title(&self) -> &str {
        match self {
            Self::Column(column) => column.title.as_str(),
            Self::Task(task) => task.title.as_str(),
        }
    }

    pub fn kind(&self) -> CollectionKind {
        match self {
            Self::Column(_) => CollectionKind::Columns,
            Self::Task(_) => CollectionKind::Tasks,
        }
    }

    pub fn as_column(&self) -> Option<&Column> {
        match self {
            Self::Column(column) => Some(column),
            Self::Task(_) => None,
        }
    }

    pub fn as_task(&self) -> Option<&Task> {
        match self {
            Self::Task(task) => Some(task),
            Self::Column(_) => None,
        }
    }

    pub fn into_column(self) -> Option<Column> {
        match self {
            Self::Column(column) => Some(column),
            Self::Task(_) => None,
        }
    }

    pub fn into_task(self) -> Option<Task> {
        match self {
            Self::Task(task) => Some(task),
            Self::Column(_) => None,
        }
    }

    pub fn set_order(&mut self, order: u32) {
        match self {
            Self::Column(column) => column.order = order,
            Self::Task(task) => task.order = order,
        }
    }

    pub(crate) fn set_item_id(&mut self, id: ItemId) {
        match self {
            Self::Column(column) => column.uuid = id,
            Self::Task(task) => task.uuid = id,
        }
    }

    /// Re-parents the item. Keys of a different kind are ignored.
    pub fn set_collection(&mut self, key: CollectionKey) {
        match (self, key) {
            (Self::Column(column), CollectionKey::Columns { board }) => {
                column.board_uuid = board;
            }
            (Self::Task(task), CollectionKey::Tasks { board, column }) => {
                task.board_uuid = board;
                task.column_uuid = column;
            }
            _ => {}
        }
    }

    /// Applies an already-normalized patch in place.
    pub fn apply_patch(&mut self, patch: &ItemPatch) {
        match self {
            Self::Column(column) => {
                if let Some(title) = &patch.title {
                    column.title = title.clone();
                }
            }
            Self::Task(task) => {
                if let Some(title) = &patch.title {
                    task.title = title.clone();
                }
                if let Some(description) = &patch.description {
                    task.description = description.clone();
                }
                if let Some(assignees) = &patch.assignees {
                    task.assignees = assignees.clone();
                }
            }
        }
    }
}

impl OrderedItem for BoardItem {
    fn item_id(&self) -> ItemId {
        match self {
            Self::Column(column) => column.item_id(),
            Self::Task(task) => task.item_id(),
        }
    }

    fn collection(&self) -> CollectionKey {
        match self {
            Self::Column(column) => column.collection(),
            Self::Task(task) => task.collection(),
        }
    }

    fn order(&self) -> u32 {
        match self {
            Self::Column(column) => column.order,
            Self::Task(task) => task.order,
        }
    }
}

impl From<Column> for BoardItem {
    fn from(value: Column) -> Self {
        Self::Column(value)
    }
}

impl From<Task> for BoardItem {
    fn from(value: Task) -> Self {
        Self::Task(value)
    }
}

/// Creation payload for one ordered item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewItem {
    Column(NewColumn),
    Task(NewTask),
}

impl NewItem {
    pub fn kind(&self) -> CollectionKind {
        match self {
            Self::Column(_) => CollectionKind::Columns,
            Self::Task(_) => CollectionKind::Tasks,
        }
    }

    pub fn normalized(&self) -> Result<Self, ValidationError> {
        match self {
            Self::Column(column) => column.normalized().map(Self::Column),
            Self::Task(task) => task.normalized().map(Self::Task),
        }
    }

    /// Builds the read model the item will have once stored.
    ///
    /// Returns `None` when `key` holds a different kind of item.
    pub fn materialize(&self, id: ItemId, key: CollectionKey, order: u32) -> Option<BoardItem> {
        match (self, key) {
            (Self::Column(column), CollectionKey::Columns { board }) => {
                Some(BoardItem::Column(Column {
                    uuid: id,
                    board_uuid: board,
                    title: column.title.clone(),
                    order,
                }))
            }
            (Self::Task(task), CollectionKey::Tasks { board, column }) => {
                Some(BoardItem::Task(Task {
                    uuid: id,
                    board_uuid: board,
                    column_uuid: column,
                    title: task.title.clone(),
                    description: task.description.clone(),
                    order,
                    creator: task.creator,
                    assignees: task.assignees.clone(),
                }))
            }
            _ => None,
        }
    }
}

impl From<NewColumn> for NewItem {
    fn from(value: NewColumn) -> Self {
        Self::Column(value)
    }
}

impl From<NewTask> for NewItem {
    fn from(value: NewTask) -> Self {
        Self::Task(value)
    }
}

/// In-place edit of an item's payload fields. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assignees: Option<BTreeSet<UserId>>,
}

impl ItemPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_assignees(mut self, assignees: impl IntoIterator<Item = UserId>) -> Self {
        self.assignees = Some(assignees.into_iter().collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.assignees.is_none()
    }

    /// Normalizes the patch for `item` and keeps only fields that differ.
    ///
    /// # Errors
    /// - Field rules of the item's kind (blank or over-long title, blank
    ///   description).
    /// - `FieldNotApplicable` for task-only fields on a column.
    pub fn changes_against(&self, item: &BoardItem) -> Result<Self, ValidationError> {
        match item {
            BoardItem::Column(column) => {
                if self.description.is_some() {
                    return Err(ValidationError::FieldNotApplicable("description"));
                }
                if self.assignees.is_some() {
                    return Err(ValidationError::FieldNotApplicable("assignees"));
                }
                let title = match &self.title {
                    Some(value) => Some(normalize_title(value)?),
                    None => None,
                };
                Ok(Self {
                    title: title.filter(|value| *value != column.title),
                    ..Self::default()
                })
            }
            BoardItem::Task(task) => {
                let title = match &self.title {
                    Some(value) => Some(normalize_task_title(value)?),
                    None => None,
                };
                let description = match &self.description {
                    Some(value) => Some(normalize_description(value)?),
                    None => None,
                };
                Ok(Self {
                    title: title.filter(|value| *value != task.title),
                    description: description.filter(|value| *value != task.description),
                    assignees: self
                        .assignees
                        .clone()
                        .filter(|value| *value != task.assignees),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BoardItem, ItemPatch};
    use crate::model::column::Column;
    use crate::model::validation::ValidationError;
    use uuid::Uuid;

    fn column(title: &str) -> BoardItem {
        BoardItem::Column(Column {
            uuid: Uuid::new_v4(),
            board_uuid: Uuid::new_v4(),
            title: title.to_string(),
            order: 1,
        })
    }

    #[test]
    fn unchanged_title_yields_empty_patch() {
        let patch = ItemPatch::title("  Backlog ")
            .changes_against(&column("Backlog"))
            .unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn column_rejects_task_only_fields() {
        let err = ItemPatch::default()
            .with_description("details")
            .changes_against(&column("Backlog"))
            .unwrap_err();
        assert_eq!(err, ValidationError::FieldNotApplicable("description"));
    }
}
