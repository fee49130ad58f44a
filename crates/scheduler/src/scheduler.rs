//! The reactive scheduler: input-tuple diffing, stale-task cancellation,
//! queue sort, fast/slow admission control, and completion handling.
//!
//! The scheduler itself never awaits anything; it computes what the host's
//! single orchestrator task should do next (which tokens to flip, which
//! tasks to hand the worker pool) and the caller drives the actual I/O,
//! matching the single-threaded/cooperative orchestrator tier.

use crate::inputs::Inputs;
use crate::strategy::sort_queue;
use slot_cache::SlotPool;
use std::collections::{HashMap, HashSet, VecDeque};
use tile_common::{LayerId, LayerSpec, ParamId, Task, TaskId, Timestep};
use timestep_catalog::{get_window_tasks, Catalog};
use tracing::instrument;
use worker_pool::CancelToken;

/// A locally-recoverable task failure (network error, worker crash) is
/// retried this many times before the task is dropped and logged.
const MAX_RETRIES: u8 = 1;

struct ActiveTask {
    task: Task,
    slot_index: usize,
    cancel: CancelToken,
}

/// A task the caller should hand to the worker pool, with the slot it was
/// allocated and the token that cancels it.
pub struct AdmittedTask {
    pub task: Task,
    pub slot_index: usize,
    pub cancel: CancelToken,
}

/// What changed as a result of one [`Scheduler::reconcile`] call.
#[derive(Default)]
pub struct ReconcileOutcome {
    pub cancelled: Vec<TaskId>,
    pub admitted: Vec<AdmittedTask>,
}

/// Owns one [`SlotPool`] per active layer, the in-flight/queued task sets,
/// and drives the admission algorithm described for the reactive queue.
pub struct Scheduler {
    pools: HashMap<LayerId, SlotPool>,
    in_flight: HashMap<TaskId, ActiveTask>,
    queue: VecDeque<Task>,
    last_inputs: Option<Inputs>,
    retry_counts: HashMap<TaskId, u8>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            pools: HashMap::new(),
            in_flight: HashMap::new(),
            queue: VecDeque::new(),
            last_inputs: None,
            retry_counts: HashMap::new(),
        }
    }

    pub fn pool(&self, layer: &LayerId) -> Option<&SlotPool> {
        self.pools.get(layer)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    fn ensure_pool(&mut self, layer: &LayerSpec, capacity: usize, catalog: &mut Catalog) {
        let sizes: Vec<usize> = layer.slabs.iter().map(|s| s.size_bytes).collect();
        match self.pools.get_mut(&layer.id) {
            None => {
                self.pools.insert(layer.id.clone(), SlotPool::new(capacity, sizes));
            }
            Some(pool) if pool.capacity() != capacity => {
                let shrinking = capacity < pool.capacity();
                pool.resize(capacity);
                if shrinking {
                    for param in &layer.om_params {
                        catalog.param_state_mut(param).clear_gpu();
                    }
                }
            }
            Some(_) => {}
        }
    }

    /// Allocate a slot for `ts`, evicting the resident timestep with the
    /// largest distance from `time` if the pool is full. An eviction clears
    /// `gpu` for every one of the victim's params so it re-enters the task
    /// queue instead of being silently skipped by `get_window_tasks` if it
    /// re-enters the window later (`cache` is untouched; the remote/local
    /// cache state doesn't change just because the GPU slot was reclaimed).
    fn allocate_or_evict(
        pool: &mut SlotPool,
        ts: &Timestep,
        time: &Timestep,
        om_params: &[ParamId],
        catalog: &mut Catalog,
    ) -> Option<slot_cache::SlotHandle> {
        if let Some(handle) = pool.allocate(ts) {
            return Some(handle);
        }
        if let Some(victim) = pool.eviction_candidate(time.to_datetime()) {
            pool.dispose(&victim);
            pool.record_eviction();
            for param in om_params {
                catalog.param_state_mut(param).set_gpu_loaded(&victim, false);
            }
        }
        pool.allocate(ts)
    }

    /// Run one reactive tick: diff `inputs` against the previous snapshot
    /// (no-op ticks are skipped), recompute the window, cancel/drop stale
    /// tasks, merge and sort the queue, and run admission control.
    #[instrument(skip(self, catalog, inputs), fields(time = %inputs.time))]
    pub fn reconcile(&mut self, inputs: Inputs, catalog: &mut Catalog) -> ReconcileOutcome {
        if self.last_inputs.as_ref() == Some(&inputs) {
            return ReconcileOutcome::default();
        }

        for layer in &inputs.active_layers {
            self.ensure_pool(layer, inputs.capacity, catalog);
        }

        let (window, new_tasks) = get_window_tasks(catalog, &inputs.time, inputs.capacity, &inputs.active_layers);
        let window_set: HashSet<&str> = window.iter().map(|e| e.timestep.as_str()).collect();

        let mut cancelled = Vec::new();
        let stale: Vec<TaskId> = self
            .in_flight
            .iter()
            .filter(|(_, active)| !window_set.contains(active.task.timestep.as_str()))
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Some(active) = self.in_flight.remove(&id) {
                active.cancel.cancel();
                if let Some(pool) = self.pools.get_mut(&active.task.layer) {
                    pool.dispose(&active.task.timestep);
                }
                cancelled.push(id);
            }
        }

        self.queue.retain(|t| window_set.contains(t.timestep.as_str()));

        for task in new_tasks {
            let id = task.id();
            if self.in_flight.contains_key(&id) || self.queue.iter().any(|q| q.id() == id) {
                continue;
            }
            self.queue.push_back(task);
        }

        let mut queue_vec: Vec<Task> = self.queue.drain(..).collect();
        sort_queue(&mut queue_vec, &inputs.time, inputs.strategy);
        self.queue = queue_vec.into();

        let admitted = self.admit(&inputs, catalog);
        self.last_inputs = Some(inputs);

        ReconcileOutcome { cancelled, admitted }
    }

    /// Walk the sorted queue, admitting fast tasks whenever capacity
    /// allows and slow tasks only while fewer than two are already
    /// in flight.
    fn admit(&mut self, inputs: &Inputs, catalog: &mut Catalog) -> Vec<AdmittedTask> {
        let mut admitted = Vec::new();
        let mut in_flight_count = self.in_flight.len();
        let mut slow_in_flight = self.in_flight.values().filter(|a| !a.task.is_fast).count();
        let layer_params: HashMap<&LayerId, &[ParamId]> =
            inputs.active_layers.iter().map(|l| (&l.id, l.om_params.as_slice())).collect();

        let mut remaining = VecDeque::new();
        while let Some(task) = self.queue.pop_front() {
            let can_start = in_flight_count < inputs.pool_size
                && (task.is_fast || slow_in_flight < 2);

            if !can_start {
                remaining.push_back(task);
                continue;
            }

            let om_params = layer_params.get(&task.layer).copied().unwrap_or(&[]);
            let handle = match self.pools.get_mut(&task.layer) {
                Some(pool) => Self::allocate_or_evict(pool, &task.timestep, &inputs.time, om_params, catalog),
                None => None,
            };

            let handle = match handle {
                Some(h) => h,
                None => {
                    remaining.push_back(task);
                    continue;
                }
            };

            in_flight_count += 1;
            if !task.is_fast {
                slow_in_flight += 1;
            }

            let cancel = CancelToken::new();
            let id = task.id();
            self.in_flight.insert(
                id,
                ActiveTask { task: task.clone(), slot_index: handle.slot_index, cancel: cancel.clone() },
            );
            admitted.push(AdmittedTask { task, slot_index: handle.slot_index, cancel });
        }
        self.queue = remaining;
        admitted
    }

    /// Handle a completed task: write its slab, update the catalog's
    /// cache/gpu sets (accumulating the actual decoded `bytes` into the
    /// param's learned size table), and report whether the slot is now
    /// fully populated (all of `layer`'s slabs gain `gpu = true` only then).
    pub fn on_task_complete(
        &mut self,
        layer: &LayerSpec,
        task: &Task,
        bytes: u64,
        catalog: &mut Catalog,
    ) -> Result<bool, tile_common::EngineError> {
        let active = self
            .in_flight
            .remove(&task.id())
            .ok_or_else(|| tile_common::EngineError::Internal("completion for unknown task".into()))?;
        self.retry_counts.remove(&task.id());

        let pool = self
            .pools
            .get_mut(&task.layer)
            .ok_or_else(|| tile_common::EngineError::Internal("completion for unregistered layer".into()))?;
        pool.write_slab(active.slot_index, task.slab_index)?;

        catalog.param_state_mut(&task.param).set_cached(&task.timestep, bytes);

        let fully_populated = pool.is_fully_populated(&task.timestep);
        if fully_populated {
            for param in &layer.om_params {
                catalog.param_state_mut(param).set_gpu_loaded(&task.timestep, true);
            }
        }
        Ok(fully_populated)
    }

    /// A task was cancelled (cooperatively acknowledged by the worker, or
    /// dropped before dispatch). Destroys any slot it had acquired without
    /// touching `cache`/`gpu`.
    pub fn on_task_aborted(&mut self, task_id: &TaskId) {
        self.retry_counts.remove(task_id);
        if let Some(active) = self.in_flight.remove(task_id) {
            if let Some(pool) = self.pools.get_mut(&active.task.layer) {
                pool.dispose(&active.task.timestep);
            }
        }
    }

    /// A task failed with a locally-recoverable error (network error,
    /// worker crash). Re-queues it once; returns `true` if it was
    /// re-queued, `false` once `MAX_RETRIES` is exhausted and the task is
    /// dropped (the caller should log and surface the failure then).
    /// Forces the next `reconcile` to run its full body even if the
    /// `(time, layers, poolSize, capacity)` tuple is unchanged, since the
    /// retried task otherwise sits in `queue` forever behind the no-op
    /// short-circuit.
    pub fn on_task_failed(&mut self, task: &Task) -> bool {
        let id = task.id();
        if let Some(active) = self.in_flight.remove(&id) {
            if let Some(pool) = self.pools.get_mut(&active.task.layer) {
                pool.dispose(&active.task.timestep);
            }
        }

        let attempts = self.retry_counts.entry(id).or_insert(0);
        *attempts += 1;
        let retry = *attempts <= MAX_RETRIES;
        if retry {
            self.queue.push_front(task.clone());
            self.last_inputs = None;
        } else {
            self.retry_counts.remove(&task.id());
        }
        retry
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::SortStrategy;
    use tile_common::{ParamId, SlabConfig};
    use timestep_catalog::TimestepEntry;

    fn layer(id: &str, params: &[&str]) -> LayerSpec {
        LayerSpec::new(
            LayerId::new(id),
            params.iter().map(|p| ParamId::new(*p)).collect(),
            params.iter().map(|p| SlabConfig::new(*p, 1024)).collect(),
        )
    }

    fn catalog_with(timesteps: &[&str]) -> Catalog {
        let entries = timesteps
            .iter()
            .enumerate()
            .map(|(i, ts)| TimestepEntry {
                timestep: Timestep::parse(ts).unwrap(),
                index: i,
                run: "1200Z".into(),
                url: format!("https://example.com/{ts}.om"),
            })
            .collect();
        Catalog::from_entries(entries)
    }

    fn inputs(time: &str, pool_size: usize, capacity: usize, layers: Vec<LayerSpec>) -> Inputs {
        Inputs {
            time: Timestep::parse(time).unwrap(),
            pool_size,
            capacity,
            active_layers: layers,
            strategy: SortStrategy::Alternate,
        }
    }

    #[test]
    fn cold_start_admits_up_to_pool_size_immediately() {
        let mut catalog = catalog_with(&[
            "2026-08-01T1000", "2026-08-01T1100", "2026-08-01T1200", "2026-08-01T1300", "2026-08-01T1400",
        ]);
        let mut scheduler = Scheduler::new();
        let layer = layer("temperature", &["t2m"]);
        let outcome = scheduler.reconcile(inputs("2026-08-01T1100", 4, 4, vec![layer]), &mut catalog);
        assert_eq!(outcome.admitted.len(), 4);
        assert_eq!(scheduler.queued_count(), 0);
    }

    #[test]
    fn a_second_reconcile_with_identical_inputs_is_a_no_op() {
        let mut catalog = catalog_with(&["2026-08-01T1100", "2026-08-01T1200"]);
        let mut scheduler = Scheduler::new();
        let layer = layer("temperature", &["t2m"]);
        let first = inputs("2026-08-01T1100", 4, 2, vec![layer.clone()]);
        scheduler.reconcile(first.clone(), &mut catalog);
        let outcome = scheduler.reconcile(first, &mut catalog);
        assert!(outcome.admitted.is_empty());
        assert!(outcome.cancelled.is_empty());
    }

    #[test]
    fn slow_tasks_are_capped_at_two_concurrent() {
        let mut catalog = catalog_with(&[
            "2026-08-01T1000", "2026-08-01T1100", "2026-08-01T1200", "2026-08-01T1300",
        ]);
        let mut scheduler = Scheduler::new();
        let layer = layer("temperature", &["t2m"]);
        let outcome = scheduler.reconcile(inputs("2026-08-01T1100", 4, 4, vec![layer]), &mut catalog);
        // No cache entries configured, so every task is slow.
        assert!(outcome.admitted.iter().filter(|a| !a.task.is_fast).count() <= 2);
    }

    #[test]
    fn window_shrink_cancels_stale_in_flight_tasks() {
        let mut catalog = catalog_with(&[
            "2026-08-01T1000", "2026-08-01T1100", "2026-08-01T1200", "2026-08-01T1300", "2026-08-01T1400",
            "2026-08-01T1500",
        ]);
        let mut scheduler = Scheduler::new();
        let layer = layer("temperature", &["t2m"]);
        scheduler.reconcile(inputs("2026-08-01T1100", 4, 2, vec![layer.clone()]), &mut catalog);
        let outcome = scheduler.reconcile(inputs("2026-08-01T1400", 4, 2, vec![layer]), &mut catalog);
        assert!(!outcome.cancelled.is_empty());
    }

    #[test]
    fn completing_every_slab_of_a_layer_marks_all_its_params_gpu_loaded() {
        let mut catalog = catalog_with(&["2026-08-01T1200"]);
        let mut scheduler = Scheduler::new();
        let layer = layer("wind", &["u", "v"]);
        let outcome = scheduler.reconcile(inputs("2026-08-01T1200", 4, 2, vec![layer.clone()]), &mut catalog);
        assert_eq!(outcome.admitted.len(), 2);

        let u_task = outcome.admitted.iter().find(|a| a.task.param.0 == "u").unwrap();
        let v_task = outcome.admitted.iter().find(|a| a.task.param.0 == "v").unwrap();

        let fully_after_u = scheduler.on_task_complete(&layer, &u_task.task, 2048, &mut catalog).unwrap();
        assert!(!fully_after_u);
        let fully_after_v = scheduler.on_task_complete(&layer, &v_task.task, 4096, &mut catalog).unwrap();
        assert!(fully_after_v);

        let ts = Timestep::parse("2026-08-01T1200").unwrap();
        assert!(catalog.is_gpu_loaded(&ParamId::new("u"), &ts));
        assert!(catalog.is_gpu_loaded(&ParamId::new("v"), &ts));
        assert_eq!(catalog.param_state(&ParamId::new("v")).unwrap().size_for(&ts), Some(4096));
    }

    #[test]
    fn eviction_clears_the_victims_gpu_bit_so_it_can_be_refetched() {
        let mut catalog = catalog_with(&["2026-08-01T1200", "2026-08-01T1300"]);
        let mut scheduler = Scheduler::new();
        let layer = layer("temperature", &["t2m"]);
        let param = ParamId::new("t2m");

        let first = scheduler.reconcile(inputs("2026-08-01T1200", 4, 1, vec![layer.clone()]), &mut catalog);
        let task = first.admitted[0].task.clone();
        scheduler.on_task_complete(&layer, &task, 1024, &mut catalog).unwrap();
        let ts1200 = Timestep::parse("2026-08-01T1200").unwrap();
        assert!(catalog.is_gpu_loaded(&param, &ts1200));

        // Capacity 1 forces the 1200 slot to be evicted to admit 1300.
        let second = scheduler.reconcile(inputs("2026-08-01T1300", 4, 1, vec![layer]), &mut catalog);
        assert_eq!(second.admitted.len(), 1);
        assert!(!catalog.is_gpu_loaded(&param, &ts1200));
    }

    #[test]
    fn a_network_failure_is_retried_once_then_dropped() {
        let mut catalog = catalog_with(&["2026-08-01T1200"]);
        let mut scheduler = Scheduler::new();
        let layer = layer("temperature", &["t2m"]);
        let outcome = scheduler.reconcile(inputs("2026-08-01T1200", 4, 2, vec![layer.clone()]), &mut catalog);
        let task = outcome.admitted[0].task.clone();

        assert!(scheduler.on_task_failed(&task));
        assert_eq!(scheduler.queued_count(), 1);

        let retried = scheduler.reconcile(inputs("2026-08-01T1200", 4, 2, vec![layer]), &mut catalog);
        assert_eq!(retried.admitted.len(), 1);
        assert_eq!(retried.admitted[0].task.id(), task.id());

        assert!(!scheduler.on_task_failed(&task));
        assert_eq!(scheduler.queued_count(), 0);
    }

    #[test]
    fn aborting_a_task_disposes_its_slot_without_touching_availability() {
        let mut catalog = catalog_with(&["2026-08-01T1200"]);
        let mut scheduler = Scheduler::new();
        let layer = layer("temperature", &["t2m"]);
        let outcome = scheduler.reconcile(inputs("2026-08-01T1200", 4, 2, vec![layer.clone()]), &mut catalog);
        let admitted = &outcome.admitted[0];
        let ts = admitted.task.timestep.clone();

        scheduler.on_task_aborted(&admitted.task.id());

        assert!(!catalog.is_cached(&admitted.task.param, &ts));
        assert!(!catalog.is_gpu_loaded(&admitted.task.param, &ts));
        let pool = scheduler.pool(&layer.id).unwrap();
        assert!(!pool.is_resident(&ts));
    }
}
