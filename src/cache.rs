//! A pool of reusable, identifier-keyed entries with scope-guarded leases
//! (spec §9 "Leases and scoped release"), adapted from the `CachePool` /
//! `ScopeGuard` pair the original scheduler built its engine pool on.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::Res;

struct Entry<T, ID> {
    id: ID,
    /// Unique per-entry identity, independent of `id`. Two entries can
    /// legitimately share `id` (the same engine leased by two concurrently
    /// running matches, or both games of a game-pair), so `slot` — not
    /// `id` — is what a [`Lease`] uses to find *its own* entry again.
    slot: u64,
    available: bool,
    value: Arc<AsyncMutex<T>>,
}

/// A pool of entries identified by `ID`, each reusable once released. An
/// entry is constructed lazily on the first lookup that misses.
pub struct CachePool<T, ID> {
    entries: Mutex<Vec<Entry<T, ID>>>,
    next_slot: AtomicU64,
}

impl<T, ID> Default for CachePool<T, ID> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_slot: AtomicU64::new(0),
        }
    }
}

impl<T, ID> CachePool<T, ID>
where
    ID: Clone + PartialEq,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Leases the entry for `id`, reusing an available one if present or
    /// constructing a fresh one via `make` otherwise (e.g. because every
    /// existing entry for `id` is already leased by another concurrently
    /// running match). The lease is returned to the pool automatically
    /// when it is dropped.
    pub async fn get_entry<F, Fut>(&self, id: ID, make: F) -> Res<Lease<T, ID>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Res<T>>,
    {
        {
            let mut guard = self.entries.lock().expect("cache pool mutex poisoned");
            if let Some(entry) = guard.iter_mut().find(|e| e.id == id && e.available) {
                entry.available = false;
                return Ok(Lease {
                    pool: &self.entries,
                    slot: entry.slot,
                    value: Arc::clone(&entry.value),
                    released: false,
                });
            }
        }

        let value = Arc::new(AsyncMutex::new(make().await?));
        let slot = self.next_slot.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.entries.lock().expect("cache pool mutex poisoned");
        guard.push(Entry {
            id,
            slot,
            available: false,
            value: Arc::clone(&value),
        });
        Ok(Lease {
            pool: &self.entries,
            slot,
            value,
            released: false,
        })
    }

    /// Removes exactly the entry backing `lease` from the pool, regardless
    /// of how many other entries share its `id`, and returns its value so
    /// the caller can tear it down (spec §4.7 step 3: a restart kills and
    /// re-spawns both engines, which means evicting the stale cache entry
    /// so the next lease constructs a fresh one). The lease is consumed —
    /// its slot is already gone from the pool, so there is nothing left
    /// for its `Drop` impl to release.
    pub async fn evict(&self, lease: Lease<'_, T, ID>) -> Arc<AsyncMutex<T>> {
        let mut guard = self.entries.lock().expect("cache pool mutex poisoned");
        guard.retain(|e| e.slot != lease.slot);
        drop(guard);
        let value = Arc::clone(&lease.value);
        std::mem::forget(lease);
        value
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache pool mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once every entry has been released; used by lease-accounting
    /// tests (spec §8 invariant 9).
    pub fn all_available(&self) -> bool {
        self.entries
            .lock()
            .expect("cache pool mutex poisoned")
            .iter()
            .all(|e| e.available)
    }
}

/// An exclusive handle to a pooled entry. Marks the entry available again
/// on drop, regardless of how the lease goes out of scope (spec §9).
pub struct Lease<'pool, T, ID> {
    pool: &'pool Mutex<Vec<Entry<T, ID>>>,
    slot: u64,
    value: Arc<AsyncMutex<T>>,
    released: bool,
}

impl<'pool, T, ID> Lease<'pool, T, ID> {
    pub fn value(&self) -> &Arc<AsyncMutex<T>> {
        &self.value
    }
}

impl<'pool, T, ID> Drop for Lease<'pool, T, ID> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Ok(mut guard) = self.pool.lock() {
            if let Some(entry) = guard.iter_mut().find(|e| e.slot == self.slot) {
                entry.available = true;
            }
        }
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reuses_released_entry() {
        let pool: CachePool<u32, &'static str> = CachePool::new();
        {
            let lease = pool.get_entry("a", || async { Ok(1u32) }).await.unwrap();
            assert_eq!(*lease.value().lock().await, 1);
        }
        assert_eq!(pool.len(), 1);
        assert!(pool.all_available());

        let lease = pool.get_entry("a", || async { Ok(2u32) }).await.unwrap();
        assert_eq!(*lease.value().lock().await, 1, "should reuse, not recreate");
    }

    #[tokio::test]
    async fn concurrent_ids_each_get_their_own_entry() {
        let pool: CachePool<u32, &'static str> = CachePool::new();
        let a = pool.get_entry("a", || async { Ok(1u32) }).await.unwrap();
        let b = pool.get_entry("b", || async { Ok(2u32) }).await.unwrap();
        assert_eq!(*a.value().lock().await, 1);
        assert_eq!(*b.value().lock().await, 2);
        assert_eq!(pool.len(), 2);
        assert!(!pool.all_available());
    }

    /// Two concurrent leases for the *same* id (the scenario that bit the
    /// naive id-keyed `Drop`): dropping one must not mark the other's
    /// still-leased entry available, and must not leak a permanently
    /// unavailable duplicate either.
    #[tokio::test]
    async fn duplicate_ids_are_released_independently() {
        let pool: CachePool<u32, &'static str> = CachePool::new();
        let first = pool.get_entry("a", || async { Ok(1u32) }).await.unwrap();
        let second = pool.get_entry("a", || async { Ok(2u32) }).await.unwrap();
        assert_eq!(pool.len(), 2, "leased entry must not be reused, a fresh one is made");

        drop(first);
        assert!(!pool.all_available(), "the still-held `second` lease must stay unavailable");

        drop(second);
        assert!(pool.all_available(), "both entries must end up available");
        assert_eq!(pool.len(), 2, "dropping a lease releases it, it does not remove it");
    }

    #[tokio::test]
    async fn evict_removes_exactly_the_leased_entry() {
        let pool: CachePool<u32, &'static str> = CachePool::new();
        let keep = pool.get_entry("a", || async { Ok(1u32) }).await.unwrap();
        let doomed = pool.get_entry("a", || async { Ok(2u32) }).await.unwrap();
        assert_eq!(pool.len(), 2);

        let value = pool.evict(doomed).await;
        assert_eq!(*value.lock().await, 2);
        assert_eq!(pool.len(), 1, "only the evicted entry is gone");
        assert!(!pool.all_available(), "`keep` is still leased");

        drop(keep);
        assert!(pool.all_available());
    }
}
