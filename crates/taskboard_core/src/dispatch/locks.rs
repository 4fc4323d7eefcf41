use crate::config::BusyPolicy;
use crate::model::ordered::CollectionKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots = Arc<Mutex<HashMap<CollectionKey, Arc<AsyncMutex<()>>>>>;

/// One async mutex per collection; at most one batch holds it at a time.
///
/// A slot lives only while some caller holds or waits for it.
#[derive(Default)]
pub(crate) struct CollectionLocks {
    slots: Slots,
}

/// Guards for every collection a batch touches. Dropping it releases the
/// collections and prunes slots nobody else is waiting for.
pub(crate) struct CollectionGuard {
    slots: Slots,
    guards: Vec<(CollectionKey, OwnedMutexGuard<()>)>,
}

impl CollectionLocks {
    /// Locks all `keys` in sorted order so two batches sharing collections
    /// cannot deadlock.
    ///
    /// With `BusyPolicy::Reject`, returns the first busy key instead of
    /// waiting.
    pub(crate) async fn acquire(
        &self,
        keys: &[CollectionKey],
        policy: BusyPolicy,
    ) -> Result<CollectionGuard, CollectionKey> {
        let mut ordered = keys.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut held = CollectionGuard {
            slots: Arc::clone(&self.slots),
            guards: Vec::with_capacity(ordered.len()),
        };
        for key in ordered {
            let slot = self.slot(key);
            let guard = match policy {
                BusyPolicy::Queue => slot.lock_owned().await,
                BusyPolicy::Reject => slot.try_lock_owned().map_err(|_| key)?,
            };
            held.guards.push((key, guard));
        }
        Ok(held)
    }

    /// Collections currently held or awaited.
    pub(crate) fn keys(&self) -> Vec<CollectionKey> {
        lock_slots(&self.slots).keys().copied().collect()
    }

    fn slot(&self, key: CollectionKey) -> Arc<AsyncMutex<()>> {
        Arc::clone(lock_slots(&self.slots).entry(key).or_default())
    }
}

impl Drop for CollectionGuard {
    fn drop(&mut self) {
        let keys: Vec<CollectionKey> = self.guards.drain(..).map(|(key, _)| key).collect();
        let mut slots = lock_slots(&self.slots);
        for key in keys {
            if slots
                .get(&key)
                .is_some_and(|slot| Arc::strong_count(slot) == 1)
            {
                slots.remove(&key);
            }
        }
    }
}

fn lock_slots(
    slots: &Mutex<HashMap<CollectionKey, Arc<AsyncMutex<()>>>>,
) -> MutexGuard<'_, HashMap<CollectionKey, Arc<AsyncMutex<()>>>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::CollectionLocks;
    use crate::config::BusyPolicy;
    use crate::model::ordered::CollectionKey;
    use uuid::Uuid;

    #[tokio::test]
    async fn reject_policy_reports_busy_collection() {
        let locks = CollectionLocks::default();
        let key = CollectionKey::columns(Uuid::new_v4());

        let held = locks.acquire(&[key], BusyPolicy::Reject).await.unwrap();
        assert_eq!(
            locks.acquire(&[key], BusyPolicy::Reject).await.err(),
            Some(key)
        );

        drop(held);
        assert!(locks.acquire(&[key], BusyPolicy::Reject).await.is_ok());
    }

    #[tokio::test]
    async fn released_slots_are_pruned() {
        let locks = CollectionLocks::default();
        let board = Uuid::new_v4();
        let keys = [
            CollectionKey::columns(board),
            CollectionKey::tasks(board, Uuid::new_v4()),
        ];

        let held = locks.acquire(&keys, BusyPolicy::Queue).await.unwrap();
        assert_eq!(locks.keys().len(), 2);

        drop(held);
        assert!(locks.keys().is_empty());
    }

    #[tokio::test]
    async fn slot_with_waiter_survives_release() {
        let locks = std::sync::Arc::new(CollectionLocks::default());
        let key = CollectionKey::columns(Uuid::new_v4());
        let held = locks.acquire(&[key], BusyPolicy::Queue).await.unwrap();

        let waiter = {
            let locks = std::sync::Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(&[key], BusyPolicy::Queue).await;
            })
        };
        tokio::task::yield_now().await;

        drop(held);
        assert_eq!(locks.keys(), vec![key]);
        waiter.await.unwrap();
        assert!(locks.keys().is_empty());
    }
}
