use crate::model::item::BoardItem;
use crate::model::ordered::CollectionKey;
use crate::view::{sort_items, CollectionView, ViewPhase, ViewSnapshot};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Per-collection view cache with change notification.
///
/// Each collection owns one `watch` channel; subscribers always observe the
/// latest published view. Forgetting a collection closes its channel.
#[derive(Default)]
pub struct ViewRegistry {
    views: Mutex<HashMap<CollectionKey, watch::Sender<CollectionView>>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a collection, creating a `Loading` view when unknown.
    pub fn subscribe(&self, key: CollectionKey) -> watch::Receiver<CollectionView> {
        self.views()
            .entry(key)
            .or_insert_with(|| watch::channel(CollectionView::loading(key)).0)
            .subscribe()
    }

    pub fn current(&self, key: CollectionKey) -> Option<CollectionView> {
        self.views().get(&key).map(|sender| sender.borrow().clone())
    }

    /// Returns the cached view if it holds fetched (or patched) data.
    pub fn loaded(&self, key: CollectionKey) -> Option<CollectionView> {
        self.current(key)
            .filter(|view| view.phase != ViewPhase::Loading)
    }

    /// Replaces a view's contents, notifies subscribers and returns the view.
    pub fn publish(
        &self,
        key: CollectionKey,
        mut items: Vec<BoardItem>,
        phase: ViewPhase,
    ) -> CollectionView {
        sort_items(&mut items);
        let view = CollectionView { key, items, phase };
        match self.views().entry(key) {
            Entry::Occupied(entry) => {
                entry.get().send_replace(view.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(watch::channel(view.clone()).0);
            }
        }
        view
    }

    /// Changes only the phase of an existing view.
    pub fn set_phase(&self, key: CollectionKey, phase: ViewPhase) {
        if let Some(sender) = self.views().get(&key) {
            sender.send_if_modified(|view| {
                if view.phase == phase {
                    return false;
                }
                view.phase = phase;
                true
            });
        }
    }

    /// Publishes a captured snapshot back as the settled view.
    pub fn restore(&self, snapshot: &ViewSnapshot) {
        self.publish(snapshot.key, snapshot.items.clone(), ViewPhase::Settled);
    }

    /// Drops a collection's view; subscribers observe a closed channel.
    pub fn forget(&self, key: CollectionKey) {
        self.views().remove(&key);
    }

    pub fn keys(&self) -> Vec<CollectionKey> {
        self.views().keys().copied().collect()
    }

    fn views(&self) -> MutexGuard<'_, HashMap<CollectionKey, watch::Sender<CollectionView>>> {
        self.views.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
