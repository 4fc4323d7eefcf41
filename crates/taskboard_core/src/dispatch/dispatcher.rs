use crate::config::{BusyPolicy, DispatcherConfig};
use crate::dispatch::batch::{Batch, WriteOp};
use crate::dispatch::handle::{BatchState, BatchTracker, Handle};
use crate::dispatch::locks::{CollectionGuard, CollectionLocks};
use crate::dispatch::{DispatchError, DispatchResult, Mutation};
use crate::model::board::BoardId;
use crate::model::item::{BoardItem, ItemPatch, NewItem};
use crate::model::ordered::{sibling_entries, CollectionKey, ItemId, OrderedItem};
use crate::reorder::{self, check_sequence, plan_compact, plan_edit, plan_move, ReorderOp};
use crate::store::{ItemWrite, RemoteStore, StoreError};
use crate::view::{patch_items, CollectionView, ViewPhase, ViewRegistry, ViewSnapshot};
use log::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use uuid::Uuid;

/// Serializes mutations per collection and writes them through a
/// `RemoteStore`.
///
/// Cloning is cheap; clones share views, locks and the store.
pub struct Dispatcher<S: ?Sized> {
    inner: Arc<Inner<S>>,
}

struct Inner<S: ?Sized> {
    config: DispatcherConfig,
    views: ViewRegistry,
    locks: CollectionLocks,
    next_batch: AtomicU64,
    store: Arc<S>,
}

impl<S: ?Sized> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Writes and view contents planned for one mutation.
struct Prepared {
    batch: Batch,
    /// Optimistic contents per touched collection.
    patched: Vec<ViewSnapshot>,
    /// Collections whose parent is gone once the primary write lands.
    orphaned: Vec<CollectionKey>,
}

impl<S> Dispatcher<S>
where
    S: RemoteStore + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, config: DispatcherConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                views: ViewRegistry::new(),
                locks: CollectionLocks::default(),
                next_batch: AtomicU64::new(0),
                store,
            }),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    pub fn views(&self) -> &ViewRegistry {
        &self.inner.views
    }

    /// Returns a receiver for `key`, loading the view first when it has
    /// never been fetched.
    pub async fn subscribe(
        &self,
        key: CollectionKey,
    ) -> DispatchResult<watch::Receiver<CollectionView>> {
        let receiver = self.inner.views.subscribe(key);
        if self.inner.views.loaded(key).is_none() {
            self.refresh(key).await?;
        }
        Ok(receiver)
    }

    /// Current items of `key`, sorted by order.
    ///
    /// Served from the view while it is settled or optimistic; fetched
    /// otherwise.
    pub async fn snapshot(&self, key: CollectionKey) -> DispatchResult<Vec<BoardItem>> {
        match self.inner.views.current(key) {
            Some(view)
                if matches!(
                    view.phase,
                    ViewPhase::Settled | ViewPhase::Optimistic { .. }
                ) =>
            {
                Ok(view.items)
            }
            _ => Ok(self.refresh(key).await?.items),
        }
    }

    /// Re-fetches `key` once no batch holds it and publishes it as settled.
    pub async fn refresh(&self, key: CollectionKey) -> DispatchResult<CollectionView> {
        let _guard = self
            .inner
            .locks
            .acquire(&[key], BusyPolicy::Queue)
            .await
            .map_err(DispatchError::Busy)?;
        Ok(self.reload(key).await?)
    }

    pub async fn request_insert(
        &self,
        key: CollectionKey,
        item: impl Into<NewItem>,
    ) -> DispatchResult<Handle> {
        self.submit(Mutation::Insert {
            key,
            item: item.into(),
            rank: None,
        })
        .await
    }

    /// Inserts at `rank`, clamped into `1..=N+1`.
    pub async fn request_insert_at(
        &self,
        key: CollectionKey,
        item: impl Into<NewItem>,
        rank: u32,
    ) -> DispatchResult<Handle> {
        self.submit(Mutation::Insert {
            key,
            item: item.into(),
            rank: Some(rank),
        })
        .await
    }

    pub async fn request_delete(&self, key: CollectionKey, id: ItemId) -> DispatchResult<Handle> {
        self.submit(Mutation::Delete { key, id }).await
    }

    pub async fn request_move(
        &self,
        id: ItemId,
        from: CollectionKey,
        to: CollectionKey,
        rank: Option<u32>,
    ) -> DispatchResult<Handle> {
        self.submit(Mutation::Move { id, from, to, rank }).await
    }

    pub async fn request_edit(
        &self,
        key: CollectionKey,
        id: ItemId,
        patch: ItemPatch,
    ) -> DispatchResult<Handle> {
        self.submit(Mutation::Edit { key, id, patch }).await
    }

    pub async fn request_repair(&self, key: CollectionKey) -> DispatchResult<Handle> {
        self.submit(Mutation::Repair { key }).await
    }

    /// Plans `mutation` against fresh store contents and starts its batch.
    ///
    /// # Errors
    /// Returned before any write: `Busy`, `KindMismatch`, `Validation`,
    /// `NotFound`, `InvariantViolation`, and `Store` when fetching siblings
    /// fails. Write failures settle the returned handle instead.
    pub async fn submit(&self, mutation: Mutation) -> DispatchResult<Handle> {
        let mutation = validate(mutation)?;
        let keys = mutation.collections();
        let guard = self
            .inner
            .locks
            .acquire(&keys, self.inner.config.busy_policy)
            .await
            .map_err(|key| {
                warn!(
                    "event=batch_submit module=dispatch status=error mutation={} collection={key} error_code=busy",
                    mutation.label()
                );
                DispatchError::Busy(key)
            })?;

        if let Some(entered) = mutation.entered_collection() {
            match self.inner.store.ensure_collection(entered).await {
                Ok(()) => {}
                Err(StoreError::NotFound(_)) => {
                    warn!(
                        "event=batch_submit module=dispatch status=error mutation={} collection={entered} error_code=collection_not_found",
                        mutation.label()
                    );
                    return Err(DispatchError::CollectionNotFound(entered));
                }
                Err(err) => return Err(err.into()),
            }
        }

        let mut fetched = Vec::with_capacity(keys.len());
        for key in &keys {
            let items = self.inner.store.fetch_siblings(*key).await?;
            fetched.push(ViewSnapshot { key: *key, items });
        }
        let prepared = prepare(&mutation, &fetched)?;
        let batch_id = self.inner.next_batch.fetch_add(1, Ordering::Relaxed) + 1;

        if prepared.batch.is_empty() {
            for snapshot in fetched {
                self.inner
                    .views
                    .publish(snapshot.key, snapshot.items, ViewPhase::Settled);
            }
            info!(
                "event=batch_settle module=dispatch status=ok batch_id={batch_id} mutation={} state=applied writes=0",
                mutation.label()
            );
            return Ok(BatchTracker::resolved(
                batch_id,
                keys,
                BatchState::Applied { writes: 0 },
            ));
        }

        let (tracker, handle) = BatchTracker::new(
            batch_id,
            keys,
            BatchState::Pending {
                snapshot_before_patch: fetched.clone(),
            },
        );
        if self.inner.config.optimistic_updates {
            for snapshot in &prepared.patched {
                self.inner.views.publish(
                    snapshot.key,
                    snapshot.items.clone(),
                    ViewPhase::Optimistic { batch: batch_id },
                );
            }
        }
        info!(
            "event=batch_submit module=dispatch status=start batch_id={batch_id} mutation={} writes={}",
            mutation.label(),
            prepared.batch.len()
        );

        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.run_batch(tracker, guard, prepared, fetched).await;
        });
        Ok(handle)
    }

    /// Deletes `board` from the store once no batch holds any of its
    /// collections, then drops their views.
    ///
    /// Batches already in flight settle before the delete is issued, so
    /// none of them can publish a view of the deleted board afterwards.
    pub async fn delete_board(&self, board: BoardId) -> DispatchResult<()> {
        let mut keys: Vec<CollectionKey> = self
            .inner
            .locks
            .keys()
            .into_iter()
            .chain(self.inner.views.keys())
            .filter(|key| key.board_id() == board)
            .collect();
        keys.push(CollectionKey::columns(board));
        let _guard = self
            .inner
            .locks
            .acquire(&keys, BusyPolicy::Queue)
            .await
            .map_err(DispatchError::Busy)?;

        self.inner.store.delete_board(board).await?;
        self.evict_board(board);
        Ok(())
    }

    /// Drops the cached view of a collection whose parent no longer exists.
    pub fn evict(&self, key: CollectionKey) {
        self.inner.views.forget(key);
    }

    /// Drops every cached collection belonging to `board`.
    pub fn evict_board(&self, board: BoardId) {
        for key in self.inner.views.keys() {
            if key.board_id() == board {
                self.evict(key);
            }
        }
    }

    async fn run_batch(
        &self,
        tracker: BatchTracker,
        guard: CollectionGuard,
        prepared: Prepared,
        snapshot: Vec<ViewSnapshot>,
    ) {
        let started_at = Instant::now();
        let report = prepared.batch.execute(self.inner.store.as_ref()).await;
        let created = report.created;
        let state = report.into_state();
        self.reconcile(&state, prepared, &snapshot, created).await;
        drop(guard);

        let batch_id = tracker.id();
        let duration_ms = started_at.elapsed().as_millis();
        match &state {
            BatchState::Applied { writes } => info!(
                "event=batch_settle module=dispatch status=ok batch_id={batch_id} state=applied writes={writes} duration_ms={duration_ms}"
            ),
            BatchState::PartiallyApplied { applied, failures } => warn!(
                "event=batch_settle module=dispatch status=error batch_id={batch_id} state=partially_applied applied={applied} failed={} duration_ms={duration_ms}",
                failures.len()
            ),
            BatchState::Failed { reason, failures } => warn!(
                "event=batch_settle module=dispatch status=error batch_id={batch_id} state=failed failed={} duration_ms={duration_ms} error={reason}",
                failures.len()
            ),
            BatchState::Pending { .. } => {}
        }
        tracker.settle(state);
    }

    async fn reconcile(
        &self,
        state: &BatchState,
        prepared: Prepared,
        snapshot: &[ViewSnapshot],
        created: Option<ItemId>,
    ) {
        match state {
            BatchState::Pending { .. } => {}
            BatchState::Failed { .. } => {
                for view in snapshot {
                    self.inner.views.restore(view);
                }
            }
            BatchState::PartiallyApplied { .. } => {
                for key in &prepared.orphaned {
                    self.evict(*key);
                }
                for view in &prepared.patched {
                    self.reload_or_mark_stale(view.key).await;
                }
            }
            BatchState::Applied { .. } => {
                for key in &prepared.orphaned {
                    self.evict(*key);
                }
                if self.inner.config.refresh_on_settle {
                    for view in &prepared.patched {
                        self.reload_or_mark_stale(view.key).await;
                    }
                    return;
                }
                let provisional = match &prepared.batch.primary {
                    Some(WriteOp::Create { provisional, .. }) => Some(*provisional),
                    _ => None,
                };
                for mut view in prepared.patched {
                    if let (Some(provisional), Some(created)) = (provisional, created) {
                        for item in &mut view.items {
                            if item.item_id() == provisional {
                                item.set_item_id(created);
                            }
                        }
                    }
                    self.inner
                        .views
                        .publish(view.key, view.items, ViewPhase::Settled);
                }
            }
        }
    }

    async fn reload(&self, key: CollectionKey) -> Result<CollectionView, StoreError> {
        let items = self.inner.store.fetch_siblings(key).await?;
        Ok(self.inner.views.publish(key, items, ViewPhase::Settled))
    }

    async fn reload_or_mark_stale(&self, key: CollectionKey) {
        if let Err(err) = self.reload(key).await {
            warn!("event=view_refresh module=dispatch status=error collection={key} error={err}");
            self.inner.views.set_phase(key, ViewPhase::Stale);
        }
    }
}

/// Checks what can be checked without the store and normalizes payloads.
fn validate(mutation: Mutation) -> DispatchResult<Mutation> {
    match mutation {
        Mutation::Insert { key, item, rank } => {
            if item.kind() != key.kind() {
                return Err(DispatchError::KindMismatch {
                    expected: key.kind(),
                    actual: item.kind(),
                });
            }
            Ok(Mutation::Insert {
                key,
                item: item.normalized()?,
                rank,
            })
        }
        Mutation::Move { from, to, .. } if from.kind() != to.kind() => {
            Err(DispatchError::KindMismatch {
                expected: from.kind(),
                actual: to.kind(),
            })
        }
        other => Ok(other),
    }
}

fn items_of(fetched: &[ViewSnapshot], key: CollectionKey) -> &[BoardItem] {
    fetched
        .iter()
        .find(|snapshot| snapshot.key == key)
        .map(|snapshot| snapshot.items.as_slice())
        .unwrap_or(&[])
}

/// Turns a validated mutation into writes and optimistic view contents.
fn prepare(mutation: &Mutation, fetched: &[ViewSnapshot]) -> DispatchResult<Prepared> {
    match mutation {
        Mutation::Insert { key, item, rank } => {
            let key = *key;
            let items = items_of(fetched, key);
            let provisional = Uuid::new_v4();
            let insert_plan = reorder::plan(
                &sibling_entries(items),
                ReorderOp::Insert {
                    id: provisional,
                    rank: *rank,
                },
            )
            .map_err(|err| DispatchError::from_reorder(key, err))?;
            let order = insert_plan.new_order_of(provisional).unwrap_or(1);
            let entering = item.materialize(provisional, key, order).ok_or(
                DispatchError::KindMismatch {
                    expected: key.kind(),
                    actual: item.kind(),
                },
            )?;
            let batch = Batch::with_primary(WriteOp::Create {
                key,
                provisional,
                item: item.clone(),
                order,
            })
            .renumber_from(key, &insert_plan);
            Ok(Prepared {
                batch,
                patched: vec![ViewSnapshot {
                    key,
                    items: patch_items(items, &insert_plan, Some(entering)),
                }],
                orphaned: Vec::new(),
            })
        }
        Mutation::Delete { key, id } => {
            let (key, id) = (*key, *id);
            let items = items_of(fetched, key);
            let delete_plan = reorder::plan(&sibling_entries(items), ReorderOp::Delete { id })
                .map_err(|err| DispatchError::from_reorder(key, err))?;
            let orphaned = match key {
                CollectionKey::Columns { board } => vec![CollectionKey::tasks(board, id)],
                CollectionKey::Tasks { .. } => Vec::new(),
            };
            Ok(Prepared {
                batch: Batch::with_primary(WriteOp::Delete { key, id })
                    .renumber_from(key, &delete_plan),
                patched: vec![ViewSnapshot {
                    key,
                    items: patch_items(items, &delete_plan, None),
                }],
                orphaned,
            })
        }
        Mutation::Move { id, from, to, rank } if from == to => {
            let (key, id) = (*from, *id);
            let items = items_of(fetched, key);
            let rank = rank.unwrap_or(items.len() as u32);
            let move_plan = reorder::plan(
                &sibling_entries(items),
                ReorderOp::Reposition { id, rank },
            )
            .map_err(|err| DispatchError::from_reorder(key, err))?;
            let batch = match move_plan.new_order_of(id) {
                Some(target) => Batch::with_primary(WriteOp::Update {
                    key,
                    id,
                    fields: ItemWrite::order(target),
                })
                .renumber_from(key, &move_plan),
                None => Batch::default(),
            };
            Ok(Prepared {
                batch,
                patched: vec![ViewSnapshot {
                    key,
                    items: patch_items(items, &move_plan, None),
                }],
                orphaned: Vec::new(),
            })
        }
        Mutation::Move { id, from, to, rank } => {
            let (id, from, to) = (*id, *from, *to);
            let source = items_of(fetched, from);
            let destination = items_of(fetched, to);
            let source_entries = sibling_entries(source);
            let destination_entries = sibling_entries(destination);
            check_sequence(&source_entries)
                .map_err(|violation| DispatchError::InvariantViolation { key: from, violation })?;
            check_sequence(&destination_entries)
                .map_err(|violation| DispatchError::InvariantViolation { key: to, violation })?;
            let move_plan = plan_move(&source_entries, &destination_entries, id, *rank)
                .map_err(|err| DispatchError::from_reorder(from, err))?;

            let target = move_plan.target_order();
            let mut moved = source
                .iter()
                .find(|item| item.item_id() == id)
                .cloned()
                .ok_or(DispatchError::NotFound { key: from, id })?;
            moved.set_collection(to);
            moved.set_order(target);

            let orphaned = match (from, to) {
                (CollectionKey::Columns { board: old }, CollectionKey::Columns { board: new })
                    if old != new =>
                {
                    vec![CollectionKey::tasks(old, id)]
                }
                _ => Vec::new(),
            };
            let batch = Batch::with_primary(WriteOp::Update {
                key: from,
                id,
                fields: ItemWrite::relocate(to, target),
            })
            .renumber_from(from, &move_plan.source)
            .renumber_from(to, &move_plan.destination);
            Ok(Prepared {
                batch,
                patched: vec![
                    ViewSnapshot {
                        key: from,
                        items: patch_items(source, &move_plan.source, None),
                    },
                    ViewSnapshot {
                        key: to,
                        items: patch_items(destination, &move_plan.destination, Some(moved)),
                    },
                ],
                orphaned,
            })
        }
        Mutation::Edit { key, id, patch } => {
            let (key, id) = (*key, *id);
            let items = items_of(fetched, key);
            let current = items
                .iter()
                .find(|item| item.item_id() == id)
                .ok_or(DispatchError::NotFound { key, id })?;
            let changes = plan_edit(current, patch)?;
            if changes.is_empty() {
                return Ok(Prepared {
                    batch: Batch::default(),
                    patched: vec![ViewSnapshot {
                        key,
                        items: items.to_vec(),
                    }],
                    orphaned: Vec::new(),
                });
            }
            let patched = items
                .iter()
                .cloned()
                .map(|mut item| {
                    if item.item_id() == id {
                        item.apply_patch(&changes);
                    }
                    item
                })
                .collect();
            Ok(Prepared {
                batch: Batch::with_primary(WriteOp::Update {
                    key,
                    id,
                    fields: ItemWrite::patch(changes),
                }),
                patched: vec![ViewSnapshot {
                    key,
                    items: patched,
                }],
                orphaned: Vec::new(),
            })
        }
        Mutation::Repair { key } => {
            let key = *key;
            let items = items_of(fetched, key);
            let compact_plan = plan_compact(&sibling_entries(items))
                .map_err(|err| DispatchError::from_reorder(key, err))?;
            Ok(Prepared {
                batch: Batch::default().renumber_from(key, &compact_plan),
                patched: vec![ViewSnapshot {
                    key,
                    items: patch_items(items, &compact_plan, None),
                }],
                orphaned: Vec::new(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Dispatcher;
    use crate::config::DispatcherConfig;
    use crate::dispatch::{BatchState, DispatchError};
    use crate::model::board::NewBoard;
    use crate::model::column::NewColumn;
    use crate::model::ordered::{CollectionKey, OrderedItem};
    use crate::model::task::NewTask;
    use crate::store::{MemoryStore, RemoteStore};
    use crate::view::ViewPhase;
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn optimistic_insert_is_visible_before_writes_land() {
        let store = Arc::new(MemoryStore::new());
        let board = store
            .create_board(&NewBoard::new("Board", Uuid::new_v4()))
            .await
            .unwrap();
        let key = CollectionKey::columns(board);
        let dispatcher = Dispatcher::new(Arc::clone(&store), DispatcherConfig::default());

        store.hold_writes();
        let handle = dispatcher
            .request_insert(key, NewColumn::new("Todo"))
            .await
            .unwrap();

        let view = dispatcher.views().current(key).unwrap();
        assert_eq!(view.phase, ViewPhase::Optimistic { batch: handle.id() });
        assert_eq!(view.items.len(), 1);
        assert!(!handle.is_settled());

        store.release_writes();
        assert_eq!(handle.settled().await, BatchState::Applied { writes: 1 });
        let view = dispatcher.views().current(key).unwrap();
        assert_eq!(view.phase, ViewPhase::Settled);
        assert_eq!(view.items[0].order(), 1);
    }

    #[tokio::test]
    async fn task_cannot_be_inserted_into_column_collection() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Dispatcher::new(Arc::clone(&store), DispatcherConfig::default());
        let key = CollectionKey::columns(Uuid::new_v4());

        let err = dispatcher
            .request_insert(key, NewTask::new("Task", "desc", Uuid::new_v4()))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::KindMismatch { .. }));
        assert!(store.calls().is_empty());
    }
}
