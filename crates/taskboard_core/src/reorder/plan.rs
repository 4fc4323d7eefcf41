//! Reorder plans: the engine's output.
//!
//! # Invariants
//! - `changes` holds only entries whose order differs from the input; an
//!   inserted item appears with `from = None`.
//! - `changes` is sorted by target order, then identity.

use crate::model::ordered::{ItemId, SiblingEntry};
use std::collections::BTreeMap;

/// New order assigned to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderChange {
    pub id: ItemId,
    /// Order before the operation; `None` for an item entering the sequence.
    pub from: Option<u32>,
    pub to: u32,
}

impl OrderChange {
    pub fn added(id: ItemId, to: u32) -> Self {
        Self { id, from: None, to }
    }

    pub fn shifted(id: ItemId, from: u32, to: u32) -> Self {
        Self {
            id,
            from: Some(from),
            to,
        }
    }
}

/// Minimal set of order changes for one sibling sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorderPlan {
    changes: Vec<OrderChange>,
    removed: Option<SiblingEntry>,
}

impl ReorderPlan {
    pub(crate) fn new(mut changes: Vec<OrderChange>, removed: Option<SiblingEntry>) -> Self {
        changes.sort_by_key(|change| (change.to, change.id));
        Self { changes, removed }
    }

    pub fn changes(&self) -> &[OrderChange] {
        &self.changes
    }

    /// Entry leaving the sequence, if any.
    pub fn removed(&self) -> Option<SiblingEntry> {
        self.removed
    }

    /// Change describing the item entering the sequence, if any.
    pub fn inserted(&self) -> Option<OrderChange> {
        self.changes.iter().copied().find(|change| change.from.is_none())
    }

    /// Changes to items that were already in the sequence.
    pub fn sibling_changes(&self) -> impl Iterator<Item = &OrderChange> + '_ {
        self.changes.iter().filter(|change| change.from.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.removed.is_none()
    }

    pub fn new_order_of(&self, id: ItemId) -> Option<u32> {
        self.changes
            .iter()
            .find(|change| change.id == id)
            .map(|change| change.to)
    }

    /// Identity to new order, for every changed item.
    pub fn mapping(&self) -> BTreeMap<ItemId, u32> {
        self.changes
            .iter()
            .map(|change| (change.id, change.to))
            .collect()
    }

    /// Returns the sequence that results from applying this plan to `siblings`.
    pub fn apply(&self, siblings: &[SiblingEntry]) -> Vec<SiblingEntry> {
        let mapping = self.mapping();
        let removed = self.removed.map(|entry| entry.id);
        let mut result: Vec<SiblingEntry> = siblings
            .iter()
            .filter(|entry| Some(entry.id) != removed)
            .map(|entry| {
                let order = mapping.get(&entry.id).copied().unwrap_or(entry.order);
                SiblingEntry::new(entry.id, order)
            })
            .collect();
        if let Some(inserted) = self.inserted() {
            result.push(SiblingEntry::new(inserted.id, inserted.to));
        }
        result.sort_by_key(|entry| (entry.order, entry.id));
        result
    }
}

/// Plans for both sequences touched by a cross-parent move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    pub item: ItemId,
    /// Closes the gap left in the source sequence.
    pub source: ReorderPlan,
    /// Opens a slot in the destination sequence; includes the moved item.
    pub destination: ReorderPlan,
}

impl MovePlan {
    /// Order the moved item receives in the destination.
    pub fn target_order(&self) -> u32 {
        self.destination
            .inserted()
            .map(|change| change.to)
            .unwrap_or(1)
    }
}
