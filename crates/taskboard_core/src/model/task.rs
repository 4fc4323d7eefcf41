//! Task domain model.
//!
//! # Invariants
//! - `board_uuid` always matches the board owning `column_uuid`.
//! - `order` ranks the task among the tasks of `column_uuid` only.

use crate::model::board::{BoardId, UserId};
use crate::model::column::ColumnId;
use crate::model::ordered::{CollectionKey, ItemId, OrderedItem};
use crate::model::validation::{normalize_description, normalize_task_title, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Stable task identifier.
pub type TaskId = Uuid;

/// Task read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub uuid: TaskId,
    pub board_uuid: BoardId,
    pub column_uuid: ColumnId,
    pub title: String,
    pub description: String,
    pub order: u32,
    /// User who created the task.
    pub creator: UserId,
    pub assignees: BTreeSet<UserId>,
}

impl OrderedItem for Task {
    fn item_id(&self) -> ItemId {
        self.uuid
    }

    fn collection(&self) -> CollectionKey {
        CollectionKey::tasks(self.board_uuid, self.column_uuid)
    }

    fn order(&self) -> u32 {
        self.order
    }
}

/// Creation payload for a task.
///
/// Assignees are passed explicitly with the payload rather than collected
/// from UI state at submit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub creator: UserId,
    pub assignees: BTreeSet<UserId>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, description: impl Into<String>, creator: UserId) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            creator,
            assignees: BTreeSet::new(),
        }
    }

    pub fn with_assignees(mut self, assignees: impl IntoIterator<Item = UserId>) -> Self {
        self.assignees.extend(assignees);
        self
    }

    pub fn normalized(&self) -> Result<Self, ValidationError> {
        Ok(Self {
            title: normalize_task_title(&self.title)?,
            description: normalize_description(&self.description)?,
            creator: self.creator,
            assignees: self.assignees.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::NewTask;
    use crate::model::validation::ValidationError;
    use uuid::Uuid;

    #[test]
    fn normalized_requires_description() {
        let err = NewTask::new("Write docs", "   ", Uuid::new_v4())
            .normalized()
            .unwrap_err();
        assert_eq!(err, ValidationError::BlankDescription);
    }
}
