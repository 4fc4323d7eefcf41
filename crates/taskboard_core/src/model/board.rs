//! Board domain model.
//!
//! # Invariants
//! - The owner is always a participant, whether or not listed in `members`.
//! - A board exclusively owns its columns; deleting it cascades.

use crate::model::validation::{normalize_title, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Stable board identifier.
pub type BoardId = Uuid;

/// Identity of a user participating in boards.
pub type UserId = Uuid;

/// Board read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub uuid: BoardId,
    pub title: String,
    pub owner: UserId,
    /// Users the board is shared with, excluding the owner.
    pub members: BTreeSet<UserId>,
}

impl Board {
    /// Returns whether `user` may create or be assigned tasks on this board.
    pub fn is_participant(&self, user: UserId) -> bool {
        self.owner == user || self.members.contains(&user)
    }

    /// Owner plus members.
    pub fn participants(&self) -> BTreeSet<UserId> {
        let mut all = self.members.clone();
        all.insert(self.owner);
        all
    }
}

/// Creation payload for a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBoard {
    pub title: String,
    pub owner: UserId,
    pub members: BTreeSet<UserId>,
}

impl NewBoard {
    pub fn new(title: impl Into<String>, owner: UserId) -> Self {
        Self {
            title: title.into(),
            owner,
            members: BTreeSet::new(),
        }
    }

    pub fn with_members(mut self, members: impl IntoIterator<Item = UserId>) -> Self {
        self.members.extend(members);
        self
    }

    /// Returns a normalized copy: trimmed title, owner removed from members.
    pub fn normalized(&self) -> Result<Self, ValidationError> {
        let mut members = self.members.clone();
        members.remove(&self.owner);
        Ok(Self {
            title: normalize_title(&self.title)?,
            owner: self.owner,
            members,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::NewBoard;
    use uuid::Uuid;

    #[test]
    fn normalized_drops_owner_from_members() {
        let owner = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let board = NewBoard::new(" Sprint ", owner)
            .with_members([owner, guest])
            .normalized()
            .unwrap();

        assert_eq!(board.title, "Sprint");
        assert_eq!(board.members.len(), 1);
        assert!(board.members.contains(&guest));
    }
}
