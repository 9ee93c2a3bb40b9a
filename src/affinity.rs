//! CPU affinity allocation (spec §4.8).
//!
//! The original allocator discovered physical-core/SMT-sibling topology
//! through a Windows-only API (`GetLogicalProcessorInformationEx`); this
//! crate targets any platform `num_cpus` runs on, so topology is
//! approximated as consecutive logical ids grouped into SMT-sized
//! chunks rather than discovered from the OS. Allocation still prefers a
//! whole free group before falling back to any disjoint subset, per
//! spec §4.8.

use std::sync::Mutex;

/// A disjoint set of logical processor ids leased to one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuSet(pub Vec<usize>);

struct Inner {
    free: Vec<bool>,
    smt_width: usize,
}

/// Hands out disjoint [`CpuSet`]s sized to a requested thread count.
pub struct AffinityAllocator {
    inner: Mutex<Inner>,
}

impl AffinityAllocator {
    /// Builds an allocator over `logical_cpus` ids, grouped into chunks of
    /// `smt_width` (use 1 to disable grouping).
    pub fn new(logical_cpus: usize, smt_width: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                free: vec![true; logical_cpus],
                smt_width: smt_width.max(1),
            }),
        }
    }

    /// Builds an allocator sized to the host's detected logical processor
    /// count, assuming 2-way SMT (a reasonable default when the real
    /// topology is unavailable).
    pub fn detect() -> Self {
        Self::new(num_cpus::get(), 2)
    }

    /// Leases `size` logical processors, preferring a contiguous SMT group
    /// when one is entirely free, else the first disjoint subset of free
    /// ids found. Returns `None` if fewer than `size` ids are free.
    pub fn acquire(&self, size: usize) -> Option<CpuSet> {
        if size == 0 {
            return Some(CpuSet(Vec::new()));
        }
        let mut inner = self.inner.lock().expect("affinity mutex poisoned");
        let smt_width = inner.smt_width;

        if let Some(group) = inner
            .free
            .chunks(smt_width)
            .enumerate()
            .find(|(_, chunk)| chunk.len() >= size && chunk.iter().all(|&f| f))
            .map(|(i, _)| i)
        {
            let start = group * smt_width;
            let ids: Vec<usize> = (start..start + size).collect();
            for &id in &ids {
                inner.free[id] = false;
            }
            return Some(CpuSet(ids));
        }

        let ids: Vec<usize> = inner
            .free
            .iter()
            .enumerate()
            .filter(|(_, &f)| f)
            .map(|(i, _)| i)
            .take(size)
            .collect();
        if ids.len() < size {
            return None;
        }
        for &id in &ids {
            inner.free[id] = false;
        }
        Some(CpuSet(ids))
    }

    pub fn release(&self, set: &CpuSet) {
        let mut inner = self.inner.lock().expect("affinity mutex poisoned");
        for &id in &set.0 {
            if let Some(slot) = inner.free.get_mut(id) {
                *slot = true;
            }
        }
    }

    pub fn free_count(&self) -> usize {
        self.inner
            .lock()
            .expect("affinity mutex poisoned")
            .free
            .iter()
            .filter(|&&f| f)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_contiguous_smt_group() {
        let alloc = AffinityAllocator::new(8, 2);
        let set = alloc.acquire(2).unwrap();
        assert_eq!(set.0, vec![0, 1]);
    }

    #[test]
    fn falls_back_to_disjoint_subset_when_no_group_fits() {
        let alloc = AffinityAllocator::new(4, 2);
        let a = alloc.acquire(2).unwrap();
        assert_eq!(a.0, vec![0, 1]);
        let b = alloc.acquire(1).unwrap();
        assert_eq!(b.0, vec![2]);
    }

    #[test]
    fn release_returns_ids_to_the_free_pool() {
        let alloc = AffinityAllocator::new(4, 2);
        let set = alloc.acquire(4).unwrap();
        assert_eq!(alloc.free_count(), 0);
        alloc.release(&set);
        assert_eq!(alloc.free_count(), 4);
    }

    #[test]
    fn acquire_fails_when_insufficient_ids_are_free() {
        let alloc = AffinityAllocator::new(2, 2);
        let _set = alloc.acquire(2).unwrap();
        assert!(alloc.acquire(1).is_none());
    }
}
