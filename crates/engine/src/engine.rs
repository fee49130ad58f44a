//! `Engine`: the composition root wiring catalog, scheduler, and worker
//! pool behind the (time, layers, poolSize, capacity) reactive surface a
//! host render loop drives every frame.
//!
//! Only the task that owns an `Engine` ever mutates `scheduler`/`catalog`
//! (the single logical task-runner the reactive queue's concurrency model
//! requires); decode workers run in parallel and report back over an `mpsc`
//! channel
//! that `tick` drains before the next reconcile, mirroring how
//! `worker-pool`'s own completion driver folds worker results back onto
//! its single `PoolState`.

use crate::config::{EngineConfig, ModelConfig};
use crate::decoder::OmHttpDecoder;
use net_fetch::{NullCache, PersistentCache};
use reqwest::Client;
use scheduler::{BandwidthTracker, Inputs, QueueStats, Scheduler, SortStrategy};
use slot_cache::SlotPool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tile_common::{EngineError, LayerId, LayerSpec, Task, TaskId, Timestep};
use timestep_catalog::{Catalog, HttpObjectStoreLister};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use worker_pool::{CancelToken, DecodeEvents, FetchJob, WorkerPool};

/// Initialize a `tracing` subscriber suitable for a host embedding the
/// engine outside a browser (e.g. a native test CLI). Browser hosts wire
/// their own subscriber and should not call this.
pub fn init_tracing() {
    let subscriber =
        tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// A [`PersistentCache`] that never receives a real endpoint; the default
/// for hosts that don't inject one.
pub fn default_cache() -> Arc<dyn PersistentCache> {
    Arc::new(NullCache)
}

struct Completion {
    task: Task,
    result: Result<Vec<f32>, EngineError>,
}

/// The embeddable engine: one model's timestep catalog, the reactive
/// scheduler driving per-layer slot pools, and the worker pool that
/// performs decodes.
pub struct Engine {
    config: EngineConfig,
    model: ModelConfig,
    layers: Vec<LayerSpec>,
    catalog: Catalog,
    scheduler: Scheduler,
    pool: WorkerPool<OmHttpDecoder>,
    bandwidth: Arc<Mutex<BandwidthTracker>>,
    cache: Arc<dyn PersistentCache>,
    /// Decoded slab buffers, keyed by (layer, slot_index, slab_index), the
    /// render layer's `pool.getSlotBuffer(slot, slab)`.
    buffers: HashMap<(LayerId, usize, usize), Vec<f32>>,
    started_at: Instant,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl Engine {
    /// Discover a model's timestep catalog and spin up its worker pool.
    /// `cache` is the host's persistent byte-range cache; pass
    /// [`default_cache`] if the host exposes none.
    #[instrument(skip(client, cache, config), fields(model = %model.id))]
    pub async fn bootstrap(
        client: Client,
        model: ModelConfig,
        config: EngineConfig,
        cache: Arc<dyn PersistentCache>,
    ) -> Result<Self, EngineError> {
        let lister = HttpObjectStoreLister::new(client.clone());
        let params = model.params();
        let url_source = model.clone();
        let catalog = Catalog::bootstrap(
            &client,
            &lister,
            cache.as_ref(),
            &model.manifest_url,
            &model.bucket_url,
            &params,
            |run, ts| url_source.url_for(run, ts),
            config.cache_quorum,
        )
        .await?;

        Self::from_catalog(model, config, catalog, client, cache)
    }

    /// Build an engine directly from an already-reconciled catalog,
    /// bypassing network discovery. Used by tests and by hosts that
    /// perform discovery out-of-band.
    pub fn from_catalog(
        model: ModelConfig,
        config: EngineConfig,
        catalog: Catalog,
        client: Client,
        cache: Arc<dyn PersistentCache>,
    ) -> Result<Self, EngineError> {
        let layers = model.layer_specs()?;
        let slice_count = config.slice_count;
        let pool = WorkerPool::new(config.worker_pool_size, move || OmHttpDecoder::new(client.clone(), slice_count));
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            model,
            layers,
            catalog,
            scheduler: Scheduler::new(),
            pool,
            bandwidth: Arc::new(Mutex::new(BandwidthTracker::new())),
            cache,
            buffers: HashMap::new(),
            started_at: Instant::now(),
            completions_tx,
            completions_rx,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn slot_pool(&self, layer: &LayerId) -> Option<&SlotPool> {
        self.scheduler.pool(layer)
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.bandwidth.lock().expect("bandwidth tracker lock poisoned").stats()
    }

    /// The slot a timestep occupies in a layer's pool, for the render
    /// layer's `pool.getTimeslot(ts)`.
    pub fn get_timeslot(&self, layer: &LayerId, ts: &Timestep) -> Option<usize> {
        self.slot_pool(layer)?.slot_for(ts)
    }

    /// A decoded slab's elements, for the render layer's
    /// `pool.getSlotBuffer(slot, slab)`.
    pub fn get_slot_buffer(&self, layer: &LayerId, slot: usize, slab: usize) -> Option<&[f32]> {
        self.buffers.get(&(layer.clone(), slot, slab)).map(|v| v.as_slice())
    }

    /// One reactive tick: drain completions from the previous tick,
    /// diff the `(time, layers, poolSize, capacity)` tuple against the
    /// previous call, cancel/drop stale work, and dispatch newly admitted
    /// tasks to the worker pool.
    #[instrument(skip(self), fields(time = %time))]
    pub async fn tick(
        &mut self,
        time: Timestep,
        pool_size: usize,
        capacity: usize,
        strategy: SortStrategy,
    ) -> Vec<EngineError> {
        let mut errors = self.drain_completions();

        let inputs = Inputs { time, pool_size, capacity, active_layers: self.layers.clone(), strategy };
        let outcome = self.scheduler.reconcile(inputs, &mut self.catalog);

        // `reconcile` already flipped the `CancelToken` of every stale
        // in-flight task; the worker observes it cooperatively on its own,
        // whether the job is mid-decode or still sitting in the pool's
        // FIFO queue.
        if !outcome.cancelled.is_empty() {
            info!(count = outcome.cancelled.len(), "cancelled stale tasks");
        }

        let queued_bytes: u64 = outcome.admitted.iter().map(|a| a.task.size_estimate).sum();
        self.bandwidth.lock().expect("bandwidth tracker lock poisoned").set_bytes_queued(queued_bytes);

        for admitted in outcome.admitted {
            self.spawn_dispatch(admitted.task, admitted.cancel);
        }

        errors.extend(self.drain_completions());
        errors
    }

    /// Apply every completion reported since the last drain, writing
    /// decoded buffers and folding results back into `scheduler`/`catalog`.
    /// A locally-recoverable failure (network error, worker crash) is
    /// re-queued by the scheduler once before being dropped and logged.
    /// Returns errors from tasks that failed for reasons other than
    /// cancellation (already-logged at the dispatch site).
    fn drain_completions(&mut self) -> Vec<EngineError> {
        let mut errors = Vec::new();
        while let Ok(completion) = self.completions_rx.try_recv() {
            match completion.result {
                Ok(decoded) => {
                    let bytes = (decoded.len() * std::mem::size_of::<f32>()) as u64;
                    {
                        let mut bandwidth = self.bandwidth.lock().expect("bandwidth tracker lock poisoned");
                        bandwidth.record_task_complete(bytes, completion.task.size_estimate);
                    }
                    match self.complete_task(&completion.task, decoded, bytes) {
                        Ok(_fully_populated) => {}
                        Err(err) => errors.push(err),
                    }
                }
                Err(EngineError::Aborted) => {
                    self.scheduler.on_task_aborted(&completion.task.id());
                }
                Err(err) if err.is_locally_recoverable() => {
                    if self.scheduler.on_task_failed(&completion.task) {
                        warn!(task = ?completion.task.id(), error = %err, "task failed, retrying");
                    } else {
                        warn!(task = ?completion.task.id(), error = %err, "task failed, retries exhausted");
                        errors.push(err);
                    }
                }
                Err(err) => {
                    warn!(task = ?completion.task.id(), error = %err, "task failed");
                    self.scheduler.on_task_aborted(&completion.task.id());
                    errors.push(err);
                }
            }
        }
        errors
    }

    fn spawn_dispatch(&self, task: Task, cancel: CancelToken) {
        let pool = self.pool.clone();
        let job = FetchJob::new(task.url.clone(), task.om_param.clone());
        let job_id = job.job_id;
        let bandwidth = self.bandwidth.clone();
        let started_at = self.started_at;
        let completions_tx = self.completions_tx.clone();

        let on_bytes = move |n: u64| {
            let mut tracker = bandwidth.lock().expect("bandwidth tracker lock poisoned");
            tracker.record_progress(started_at.elapsed(), n);
        };
        let events = DecodeEvents { on_slice: Arc::new(|_| {}), on_bytes: Arc::new(on_bytes) };

        let dispatched_task = task.clone();
        tokio::spawn(async move {
            let result = pool.fetch(job, events, cancel).await;
            if let Err(err) = &result {
                if !matches!(err, EngineError::Aborted) {
                    warn!(job_id = %job_id, error = %err, "decode failed");
                }
            }
            let _ = completions_tx.send(Completion { task: dispatched_task, result });
        });
    }

    /// Write a completed task's decoded elements into the engine's buffer
    /// store and fold the completion into `scheduler`/`catalog`.
    fn complete_task(&mut self, task: &Task, decoded: Vec<f32>, bytes: u64) -> Result<bool, EngineError> {
        let layer = self
            .layers
            .iter()
            .find(|l| l.id == task.layer)
            .ok_or_else(|| EngineError::Internal(format!("unregistered layer '{}'", task.layer)))?
            .clone();

        let fully_populated = self.scheduler.on_task_complete(&layer, task, bytes, &mut self.catalog)?;

        let slot_index = self
            .slot_pool(&task.layer)
            .and_then(|p| p.slot_for(&task.timestep))
            .ok_or_else(|| EngineError::Internal("completed task has no resident slot".into()))?;
        self.buffers.insert((task.layer.clone(), slot_index, task.slab_index), decoded);

        Ok(fully_populated)
    }

    pub fn abort_task(&mut self, task_id: &TaskId) {
        self.scheduler.on_task_aborted(task_id);
    }

    pub fn persistent_cache(&self) -> &Arc<dyn PersistentCache> {
        &self.cache
    }
}
