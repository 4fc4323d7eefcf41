//! Collection views: cached, observable snapshots of sibling sequences.
//!
//! # Responsibility
//! - Hold the last known sequence per collection for rendering.
//! - Carry optimistic patches while a batch is pending.
//! - Notify subscribers whenever a view changes.
//!
//! # Invariants
//! - Items inside a view are always sorted by `order ASC, id ASC`.
//! - A view in `Optimistic` phase is never the source of truth for planning;
//!   the dispatcher plans against the store.

mod patch;
mod registry;

pub(crate) use patch::patch_items;
pub use registry::ViewRegistry;

use crate::dispatch::BatchId;
use crate::model::item::BoardItem;
use crate::model::ordered::{sibling_entries, CollectionKey, ItemId, OrderedItem, SiblingEntry};

/// Confidence level of a view's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPhase {
    /// Not fetched yet.
    Loading,
    /// Matches the store as of the last fetch or settled batch.
    Settled,
    /// Carries the unconfirmed patch of a pending batch.
    Optimistic { batch: BatchId },
    /// A refresh after a batch failed; contents may not match the store.
    Stale,
}

/// Read-side projection of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionView {
    pub key: CollectionKey,
    pub items: Vec<BoardItem>,
    pub phase: ViewPhase,
}

impl CollectionView {
    pub(crate) fn loading(key: CollectionKey) -> Self {
        Self {
            key,
            items: Vec::new(),
            phase: ViewPhase::Loading,
        }
    }

    /// Whether confirmed data is still on its way.
    pub fn is_loading(&self) -> bool {
        matches!(
            self.phase,
            ViewPhase::Loading | ViewPhase::Optimistic { .. }
        )
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn entries(&self) -> Vec<SiblingEntry> {
        sibling_entries(&self.items)
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(OrderedItem::item_id).collect()
    }

    pub fn order_of(&self, id: ItemId) -> Option<u32> {
        self.items
            .iter()
            .find(|item| item.item_id() == id)
            .map(OrderedItem::order)
    }
}

/// Contents of one view captured before an optimistic patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub key: CollectionKey,
    pub items: Vec<BoardItem>,
}

pub(crate) fn sort_items(items: &mut [BoardItem]) {
    items.sort_by_key(|item| (item.order(), item.item_id()));
}
