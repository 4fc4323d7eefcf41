//! In-process remote store.
//!
//! Mirrors the SQLite store's semantics (ordering, cascades, stale-key
//! `NotFound`) without persistence, and adds hooks to observe and disturb the
//! request stream: a call log, per-item write failures and a gate that holds
//! mutating calls until released.

use crate::model::board::{Board, BoardId, NewBoard};
use crate::model::item::{BoardItem, NewItem};
use crate::model::ordered::{CollectionKey, ItemId, OrderedItem};
use crate::store::{ItemWrite, RemoteStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;
use uuid::Uuid;

/// One fetch or mutating request received by a `MemoryStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Fetch(CollectionKey),
    Create(CollectionKey),
    Write(ItemId),
    Delete(ItemId),
}

#[derive(Default)]
struct MemoryState {
    boards: BTreeMap<BoardId, Board>,
    items: BTreeMap<ItemId, BoardItem>,
    failing: HashSet<ItemId>,
    fail_creates: bool,
    calls: Vec<StoreCall>,
}

/// Remote store kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an item verbatim, bypassing every ordering rule.
    pub fn seed(&self, item: BoardItem) {
        self.state().items.insert(item.item_id(), item);
    }

    /// Makes every write or delete targeting `id` fail with `Rejected`.
    pub fn fail_writes_to(&self, id: ItemId) {
        self.state().failing.insert(id);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.state().fail_creates = fail;
    }

    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.failing.clear();
        state.fail_creates = false;
    }

    /// Holds create/write/delete calls until `release_writes` is called.
    pub fn hold_writes(&self) {
        *self.gate_slot() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_writes(&self) {
        if let Some(gate) = self.gate_slot().take() {
            gate.close();
        }
    }

    /// Requests received so far, in arrival order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    /// Number of create/write/delete requests received so far.
    pub fn mutation_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| !matches!(call, StoreCall::Fetch(_)))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate_slot(&self) -> MutexGuard<'_, Option<Arc<Semaphore>>> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pass_gate(&self) {
        let gate = self.gate_slot().clone();
        if let Some(gate) = gate {
            // A closed gate means the writes were released.
            let _ = gate.acquire().await;
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn ensure_collection(&self, key: CollectionKey) -> StoreResult<()> {
        ensure_parent_exists(&self.state(), key)
    }

    async fn fetch_siblings(&self, key: CollectionKey) -> StoreResult<Vec<BoardItem>> {
        let mut state = self.state();
        state.calls.push(StoreCall::Fetch(key));
        let mut items: Vec<BoardItem> = state
            .items
            .values()
            .filter(|item| item.collection() == key)
            .cloned()
            .collect();
        items.sort_by_key(|item| (item.order(), item.item_id()));
        Ok(items)
    }

    async fn create_item(
        &self,
        key: CollectionKey,
        item: &NewItem,
        order: u32,
    ) -> StoreResult<ItemId> {
        self.state().calls.push(StoreCall::Create(key));
        self.pass_gate().await;

        let mut state = self.state();
        if state.fail_creates {
            return Err(StoreError::Rejected("create refused".into()));
        }
        ensure_parent_exists(&state, key)?;
        let id = Uuid::new_v4();
        let record = item.materialize(id, key, order).ok_or_else(|| {
            StoreError::Rejected(format!("cannot create {} item in {key}", item.kind()))
        })?;
        state.items.insert(id, record);
        Ok(id)
    }

    async fn write_item(
        &self,
        key: CollectionKey,
        id: ItemId,
        fields: &ItemWrite,
    ) -> StoreResult<()> {
        self.state().calls.push(StoreCall::Write(id));
        self.pass_gate().await;

        let mut state = self.state();
        if state.failing.contains(&id) {
            return Err(StoreError::Rejected(format!("write to {id} refused")));
        }
        if let Some(target) = fields.collection {
            if target.kind() != key.kind() {
                return Err(StoreError::Rejected(format!("cannot move item into {target}")));
            }
            ensure_parent_exists(&state, target)?;
        }

        let item = state
            .items
            .get_mut(&id)
            .filter(|item| item.collection() == key)
            .ok_or(StoreError::NotFound(id))?;
        if let Some(target) = fields.collection {
            item.set_collection(target);
        }
        if let Some(order) = fields.order {
            item.set_order(order);
        }
        item.apply_patch(&fields.patch);

        if let Some(CollectionKey::Columns { board }) = fields.collection {
            for child in state.items.values_mut() {
                if let BoardItem::Task(task) = child {
                    if task.column_uuid == id {
                        task.board_uuid = board;
                    }
                }
            }
        }
        Ok(())
    }

    async fn delete_item(&self, key: CollectionKey, id: ItemId) -> StoreResult<()> {
        self.state().calls.push(StoreCall::Delete(id));
        self.pass_gate().await;

        let mut state = self.state();
        if state.failing.contains(&id) {
            return Err(StoreError::Rejected(format!("delete of {id} refused")));
        }
        let present = state
            .items
            .get(&id)
            .is_some_and(|item| item.collection() == key);
        if !present {
            return Err(StoreError::NotFound(id));
        }
        state.items.remove(&id);
        state.items.retain(|_, item| match item {
            BoardItem::Task(task) => task.column_uuid != id,
            BoardItem::Column(_) => true,
        });
        Ok(())
    }

    async fn create_board(&self, board: &NewBoard) -> StoreResult<BoardId> {
        let id = Uuid::new_v4();
        self.state().boards.insert(
            id,
            Board {
                uuid: id,
                title: board.title.clone(),
                owner: board.owner,
                members: board.members.clone(),
            },
        );
        Ok(id)
    }

    async fn get_board(&self, id: BoardId) -> StoreResult<Option<Board>> {
        Ok(self.state().boards.get(&id).cloned())
    }

    async fn delete_board(&self, id: BoardId) -> StoreResult<()> {
        let mut state = self.state();
        if state.boards.remove(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        state
            .items
            .retain(|_, item| item.collection().board_id() != id);
        Ok(())
    }
}

fn ensure_parent_exists(state: &MemoryState, key: CollectionKey) -> StoreResult<()> {
    match key {
        CollectionKey::Columns { board } => {
            if !state.boards.contains_key(&board) {
                return Err(StoreError::NotFound(board));
            }
        }
        CollectionKey::Tasks { board, column } => {
            let in_board = state
                .items
                .get(&column)
                .and_then(BoardItem::as_column)
                .is_some_and(|found| found.board_uuid == board);
            if !in_board {
                return Err(StoreError::NotFound(column));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{MemoryStore, StoreCall};
    use crate::model::board::NewBoard;
    use crate::model::column::NewColumn;
    use crate::model::item::NewItem;
    use crate::model::ordered::CollectionKey;
    use crate::model::task::NewTask;
    use crate::store::RemoteStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn deleting_column_cascades_to_its_tasks() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let board = store
            .create_board(&NewBoard::new("Board", owner))
            .await
            .unwrap();
        let columns = CollectionKey::columns(board);
        let column = store
            .create_item(columns, &NewItem::Column(NewColumn::new("Todo")), 1)
            .await
            .unwrap();
        let tasks = CollectionKey::tasks(board, column);
        store
            .create_item(tasks, &NewItem::Task(NewTask::new("A", "a", owner)), 1)
            .await
            .unwrap();

        store.delete_item(columns, column).await.unwrap();

        assert!(store.fetch_siblings(tasks).await.unwrap().is_empty());
        assert!(matches!(store.calls().last(), Some(StoreCall::Fetch(_))));
    }
}
