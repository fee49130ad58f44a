//! Fixed-capacity GPU slot pool for one layer's timestep-resident slabs.
//!
//! Unlike an access-recency LRU, eviction here is driven by distance from
//! the render cursor's current time: the timestep farthest from `time` is
//! the one least likely to be needed next, regardless of when it was last
//! touched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tile_common::{EngineError, Timestep};
use tracing::instrument;

/// One slab buffer within a slot. The pool owns the byte length; the host
/// render layer owns the actual GPU resource behind `SlotHandle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabBuffer {
    pub slab_index: usize,
    pub size_bytes: usize,
}

/// Handle to an allocated slot: its index in `[0, capacity)` and the slab
/// layout it was allocated with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotHandle {
    pub slot_index: usize,
    pub slabs: Vec<SlabBuffer>,
}

#[derive(Debug, Default)]
struct SlotStats {
    allocations: AtomicU64,
    evictions: AtomicU64,
}

struct Slot {
    timestep: Timestep,
    slabs: Vec<SlabBuffer>,
    /// Set only once every slab in `slabs` has received a `write_slab`
    /// call since allocation; cleared again on `dispose`.
    populated: Vec<bool>,
}

impl Slot {
    fn is_fully_populated(&self) -> bool {
        !self.populated.is_empty() && self.populated.iter().all(|p| *p)
    }
}

/// Fixed-size pool of GPU slots for one layer. A slot holds one slab buffer
/// per declared slab size and is mapped to at most one timestep at a time.
pub struct SlotPool {
    slab_sizes: Vec<usize>,
    capacity: usize,
    free: Vec<usize>,
    slots: HashMap<usize, Slot>,
    by_timestep: HashMap<String, usize>,
    stats: SlotStats,
}

impl SlotPool {
    /// Create a pool with `capacity` slots, each holding one buffer per
    /// entry in `slab_sizes` (bytes).
    pub fn new(capacity: usize, slab_sizes: Vec<usize>) -> Self {
        Self {
            slab_sizes,
            capacity,
            free: (0..capacity).collect(),
            slots: HashMap::new(),
            by_timestep: HashMap::new(),
            stats: SlotStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn live_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_resident(&self, ts: &Timestep) -> bool {
        self.by_timestep.contains_key(ts.as_str())
    }

    /// The slot index `ts` is mapped to, for the render layer's
    /// `pool.getTimeslot(ts)` lookup.
    pub fn slot_for(&self, ts: &Timestep) -> Option<usize> {
        self.by_timestep.get(ts.as_str()).copied()
    }

    pub fn is_fully_populated(&self, ts: &Timestep) -> bool {
        self.by_timestep
            .get(ts.as_str())
            .and_then(|idx| self.slots.get(idx))
            .map(|s| s.is_fully_populated())
            .unwrap_or(false)
    }

    /// Returns the existing handle if `ts` is already mapped, allocates a
    /// fresh slot from the free list otherwise, or `None` if the pool is
    /// full (the caller must evict and retry).
    #[instrument(skip(self), fields(timestep = %ts))]
    pub fn allocate(&mut self, ts: &Timestep) -> Option<SlotHandle> {
        if let Some(&idx) = self.by_timestep.get(ts.as_str()) {
            let slot = self.slots.get(&idx).expect("by_timestep entries always have a slot");
            return Some(SlotHandle { slot_index: idx, slabs: slot.slabs.clone() });
        }

        let idx = self.free.pop()?;
        let slabs: Vec<SlabBuffer> = self
            .slab_sizes
            .iter()
            .enumerate()
            .map(|(slab_index, &size_bytes)| SlabBuffer { slab_index, size_bytes })
            .collect();
        let populated = vec![false; slabs.len()];

        self.slots.insert(idx, Slot { timestep: ts.clone(), slabs: slabs.clone(), populated });
        self.by_timestep.insert(ts.as_str().to_string(), idx);
        self.stats.allocations.fetch_add(1, Ordering::Relaxed);

        Some(SlotHandle { slot_index: idx, slabs })
    }

    /// Destroy the slot mapped to `ts`, if any, and return its index to the
    /// free list.
    #[instrument(skip(self), fields(timestep = %ts))]
    pub fn dispose(&mut self, ts: &Timestep) {
        if let Some(idx) = self.by_timestep.remove(ts.as_str()) {
            self.slots.remove(&idx);
            self.free.push(idx);
        }
    }

    /// Record that `slab_index` of `slot_index` has been written. Actual
    /// GPU buffer upload is the host render loop's responsibility; this
    /// call only advances the pool's populated-slab bookkeeping.
    pub fn write_slab(&mut self, slot_index: usize, slab_index: usize) -> Result<(), EngineError> {
        let slot = self
            .slots
            .get_mut(&slot_index)
            .ok_or_else(|| EngineError::Internal(format!("write_slab: no slot at index {slot_index}")))?;
        let flag = slot
            .populated
            .get_mut(slab_index)
            .ok_or_else(|| EngineError::Internal(format!("write_slab: slab index {slab_index} out of range")))?;
        *flag = true;
        Ok(())
    }

    /// The resident timestep farthest from `reference_time`, or `None` if
    /// the pool holds nothing. Ties favor the later timestep.
    pub fn eviction_candidate(&self, reference_time: chrono::DateTime<chrono::Utc>) -> Option<Timestep> {
        self.slots
            .values()
            .map(|slot| (tile_common::time::distance(&slot.timestep, reference_time), &slot.timestep))
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
            .map(|(_, ts)| ts.clone())
    }

    pub fn record_eviction(&self) {
        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Grow or shrink the pool. Growing preserves every resident slot and
    /// extends the free list. Shrinking destroys all slots unconditionally
    /// (a shrunk pool cannot guarantee the old slot indices stay valid), so
    /// the caller must treat every previously GPU-loaded parameter as
    /// evicted and refetch.
    #[instrument(skip(self))]
    pub fn resize(&mut self, new_capacity: usize) {
        if new_capacity >= self.capacity {
            self.free.extend(self.capacity..new_capacity);
            self.capacity = new_capacity;
            return;
        }

        self.slots.clear();
        self.by_timestep.clear();
        self.free = (0..new_capacity).collect();
        self.capacity = new_capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(s: &str) -> Timestep {
        Timestep::parse(s).unwrap()
    }

    #[test]
    fn allocate_reuses_existing_mapping() {
        let mut pool = SlotPool::new(2, vec![1024]);
        let a = pool.allocate(&ts("2026-08-01T1200")).unwrap();
        let b = pool.allocate(&ts("2026-08-01T1200")).unwrap();
        assert_eq!(a.slot_index, b.slot_index);
    }

    #[test]
    fn allocate_returns_none_when_full() {
        let mut pool = SlotPool::new(1, vec![1024]);
        pool.allocate(&ts("2026-08-01T1200")).unwrap();
        assert!(pool.allocate(&ts("2026-08-01T1300")).is_none());
    }

    #[test]
    fn dispose_frees_the_slot_for_reuse() {
        let mut pool = SlotPool::new(1, vec![1024]);
        pool.allocate(&ts("2026-08-01T1200")).unwrap();
        pool.dispose(&ts("2026-08-01T1200"));
        assert!(pool.allocate(&ts("2026-08-01T1300")).is_some());
    }

    #[test]
    fn a_slot_is_not_fully_populated_until_every_slab_is_written() {
        let mut pool = SlotPool::new(1, vec![1024, 2048]);
        let handle = pool.allocate(&ts("2026-08-01T1200")).unwrap();
        assert!(!pool.is_fully_populated(&ts("2026-08-01T1200")));
        pool.write_slab(handle.slot_index, 0).unwrap();
        assert!(!pool.is_fully_populated(&ts("2026-08-01T1200")));
        pool.write_slab(handle.slot_index, 1).unwrap();
        assert!(pool.is_fully_populated(&ts("2026-08-01T1200")));
    }

    #[test]
    fn eviction_candidate_picks_the_farthest_timestep_with_later_tiebreak() {
        let mut pool = SlotPool::new(3, vec![1024]);
        pool.allocate(&ts("2026-08-01T0600")).unwrap();
        pool.allocate(&ts("2026-08-01T1800")).unwrap();
        pool.allocate(&ts("2026-08-01T1200")).unwrap();

        let reference = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        // 0600 and 1800 are both 6h away; later timestep wins the tie.
        assert_eq!(pool.eviction_candidate(reference).unwrap().as_str(), "2026-08-01T1800");
    }

    #[test]
    fn eviction_candidate_is_none_for_an_empty_pool() {
        let pool = SlotPool::new(2, vec![1024]);
        let reference = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        assert!(pool.eviction_candidate(reference).is_none());
    }

    #[test]
    fn resize_grow_preserves_resident_slots() {
        let mut pool = SlotPool::new(1, vec![1024]);
        pool.allocate(&ts("2026-08-01T1200")).unwrap();
        pool.resize(3);
        assert!(pool.is_resident(&ts("2026-08-01T1200")));
        assert_eq!(pool.capacity(), 3);
        assert!(pool.allocate(&ts("2026-08-01T1300")).is_some());
        assert!(pool.allocate(&ts("2026-08-01T1400")).is_some());
    }

    #[test]
    fn slot_for_resolves_after_allocate_and_clears_after_dispose() {
        let mut pool = SlotPool::new(1, vec![1024]);
        let t = ts("2026-08-01T1200");
        let handle = pool.allocate(&t).unwrap();
        assert_eq!(pool.slot_for(&t), Some(handle.slot_index));
        pool.dispose(&t);
        assert_eq!(pool.slot_for(&t), None);
    }

    #[test]
    fn resize_shrink_clears_all_slots() {
        let mut pool = SlotPool::new(2, vec![1024]);
        pool.allocate(&ts("2026-08-01T1200")).unwrap();
        pool.resize(1);
        assert!(!pool.is_resident(&ts("2026-08-01T1200")));
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.capacity(), 1);
    }
}
