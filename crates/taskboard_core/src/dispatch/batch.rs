//! Batches of remote writes and their execution.
//!
//! # Invariants
//! - The primary write (if any) is issued before every renumbering write.
//! - A failed primary write stops the batch; nothing else is issued.
//! - Renumbering writes target disjoint items and run concurrently.

use crate::dispatch::handle::{BatchState, WriteFailure};
use crate::model::item::NewItem;
use crate::model::ordered::{CollectionKey, ItemId};
use crate::reorder::ReorderPlan;
use crate::store::{ItemWrite, RemoteStore, StoreError};
use futures::future::join_all;
use log::warn;

/// One remote call.
#[derive(Debug, Clone)]
pub(crate) enum WriteOp {
    Create {
        key: CollectionKey,
        /// Identity used by the optimistic patch until the store assigns one.
        provisional: ItemId,
        item: NewItem,
        order: u32,
    },
    Update {
        key: CollectionKey,
        id: ItemId,
        fields: ItemWrite,
    },
    Delete {
        key: CollectionKey,
        id: ItemId,
    },
}

impl WriteOp {
    pub(crate) fn target(&self) -> ItemId {
        match self {
            Self::Create { provisional, .. } => *provisional,
            Self::Update { id, .. } | Self::Delete { id, .. } => *id,
        }
    }

    async fn issue<S: RemoteStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<Option<ItemId>, StoreError> {
        match self {
            Self::Create {
                key, item, order, ..
            } => store.create_item(*key, item, *order).await.map(Some),
            Self::Update { key, id, fields } => {
                store.write_item(*key, *id, fields).await.map(|()| None)
            }
            Self::Delete { key, id } => store.delete_item(*key, *id).await.map(|()| None),
        }
    }
}

/// Writes produced by one mutation.
#[derive(Debug, Clone, Default)]
pub(crate) struct Batch {
    pub(crate) primary: Option<WriteOp>,
    pub(crate) renumber: Vec<WriteOp>,
}

impl Batch {
    pub(crate) fn with_primary(op: WriteOp) -> Self {
        Self {
            primary: Some(op),
            renumber: Vec::new(),
        }
    }

    /// Adds one order write per sibling change in `plan`, skipping the item
    /// the primary write already places.
    pub(crate) fn renumber_from(mut self, key: CollectionKey, plan: &ReorderPlan) -> Self {
        let placed = self.primary.as_ref().map(WriteOp::target);
        self.renumber.extend(
            plan.sibling_changes()
                .filter(|change| Some(change.id) != placed)
                .map(|change| WriteOp::Update {
                    key,
                    id: change.id,
                    fields: ItemWrite::order(change.to),
                }),
        );
        self
    }

    pub(crate) fn len(&self) -> usize {
        usize::from(self.primary.is_some()) + self.renumber.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Issues every write and reports what the store confirmed.
    pub(crate) async fn execute<S: RemoteStore + ?Sized>(&self, store: &S) -> BatchReport {
        let mut report = BatchReport::default();

        if let Some(primary) = &self.primary {
            match primary.issue(store).await {
                Ok(created) => {
                    report.applied += 1;
                    report.created = created;
                }
                Err(err) => {
                    warn!(
                        "event=batch_write module=dispatch status=error role=primary item={} error={err}",
                        primary.target()
                    );
                    report.primary_failure = Some(err.to_string());
                    report.failures.push(WriteFailure {
                        id: primary.target(),
                        reason: err.to_string(),
                    });
                    return report;
                }
            }
        }

        let results = join_all(self.renumber.iter().map(|op| op.issue(store))).await;
        for (op, result) in self.renumber.iter().zip(results) {
            match result {
                Ok(_) => report.applied += 1,
                Err(err) => {
                    warn!(
                        "event=batch_write module=dispatch status=error role=renumber item={} error={err}",
                        op.target()
                    );
                    report.failures.push(WriteFailure {
                        id: op.target(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        report
    }
}

/// Outcome of executing one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct BatchReport {
    pub(crate) applied: usize,
    pub(crate) failures: Vec<WriteFailure>,
    /// Store identity of the item created by the primary write.
    pub(crate) created: Option<ItemId>,
    primary_failure: Option<String>,
}

impl BatchReport {
    pub(crate) fn into_state(self) -> BatchState {
        if let Some(reason) = self.primary_failure {
            return BatchState::Failed {
                reason,
                failures: self.failures,
            };
        }
        if self.failures.is_empty() {
            return BatchState::Applied {
                writes: self.applied,
            };
        }
        if self.applied == 0 {
            return BatchState::Failed {
                reason: "no write was applied".into(),
                failures: self.failures,
            };
        }
        BatchState::PartiallyApplied {
            applied: self.applied,
            failures: self.failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Batch, WriteOp};
    use crate::dispatch::handle::BatchState;
    use crate::model::board::NewBoard;
    use crate::model::column::NewColumn;
    use crate::model::item::NewItem;
    use crate::model::ordered::CollectionKey;
    use crate::store::{ItemWrite, MemoryStore, RemoteStore, StoreCall};
    use uuid::Uuid;

    #[tokio::test]
    async fn failed_primary_issues_no_renumbering() {
        let store = MemoryStore::new();
        let board = store
            .create_board(&NewBoard::new("Board", Uuid::new_v4()))
            .await
            .unwrap();
        let key = CollectionKey::columns(board);
        store.fail_creates(true);

        let sibling = Uuid::new_v4();
        let batch = Batch {
            primary: Some(WriteOp::Create {
                key,
                provisional: Uuid::new_v4(),
                item: NewItem::Column(NewColumn::new("Todo")),
                order: 1,
            }),
            renumber: vec![WriteOp::Update {
                key,
                id: sibling,
                fields: ItemWrite::order(2),
            }],
        };

        let state = batch.execute(&store).await.into_state();

        assert!(matches!(state, BatchState::Failed { .. }));
        assert_eq!(store.calls(), vec![StoreCall::Create(key)]);
    }

    #[tokio::test]
    async fn repair_batch_with_every_write_failing_is_failed() {
        let store = MemoryStore::new();
        let key = CollectionKey::columns(Uuid::new_v4());
        let missing = Uuid::new_v4();
        let batch = Batch {
            primary: None,
            renumber: vec![WriteOp::Update {
                key,
                id: missing,
                fields: ItemWrite::order(1),
            }],
        };

        match batch.execute(&store).await.into_state() {
            BatchState::Failed { failures, .. } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].id, missing);
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }
}
