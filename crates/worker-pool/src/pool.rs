//! Pool bookkeeping: idle workers, active jobs, and the FIFO overflow
//! queue.

use crate::worker::{spawn_worker, CancelToken, DecodeEvents, Decoder, FetchJob, WorkerCommand, WorkerDone};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tile_common::EngineError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

struct ActiveJob {
    worker_id: usize,
    cancel: CancelToken,
}

struct QueuedJob {
    job: FetchJob,
    events: DecodeEvents,
    cancel: CancelToken,
    reply: oneshot::Sender<Result<Vec<f32>, EngineError>>,
}

struct PoolState {
    next_worker_id: usize,
    idle: Vec<usize>,
    workers: HashMap<usize, mpsc::UnboundedSender<WorkerCommand>>,
    active: HashMap<Uuid, ActiveJob>,
    queue: VecDeque<QueuedJob>,
    done_tx: mpsc::UnboundedSender<WorkerDone>,
}

/// A pool of `P` parallel decode workers.
pub struct WorkerPool<D: Decoder> {
    state: Arc<Mutex<PoolState>>,
    factory: Arc<dyn Fn() -> D + Send + Sync>,
}

impl<D: Decoder> Clone for WorkerPool<D> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone(), factory: self.factory.clone() }
    }
}

impl<D: Decoder> WorkerPool<D> {
    /// Spawn `pool_size` workers, each built from `factory`.
    pub fn new(pool_size: usize, factory: impl Fn() -> D + Send + Sync + 'static) -> Self {
        assert!((1..=16).contains(&pool_size), "pool size must be in [1, 16]");
        let factory = Arc::new(factory);

        let mut workers = HashMap::with_capacity(pool_size);
        let mut idle = Vec::with_capacity(pool_size);
        for id in 0..pool_size {
            workers.insert(id, spawn_worker(id, factory()));
            idle.push(id);
        }

        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(PoolState {
            next_worker_id: pool_size,
            idle,
            workers,
            active: HashMap::new(),
            queue: VecDeque::new(),
            done_tx,
        }));

        spawn_completion_driver(state.clone(), done_rx);

        Self { state, factory }
    }

    /// Dispatch `job` to an idle worker, or enqueue it. Resolves once the
    /// job completes, is cancelled, or its worker crashes.
    pub async fn fetch(
        &self,
        job: FetchJob,
        events: DecodeEvents,
        cancel: CancelToken,
    ) -> Result<Vec<f32>, EngineError> {
        let job_id = job.job_id;
        let (reply_tx, reply_rx) = oneshot::channel();

        {
            let mut state = self.state.lock().await;
            if let Some(worker_id) = state.idle.pop() {
                dispatch_to(&mut state, worker_id, job, events, cancel, reply_tx);
            } else {
                state.queue.push_back(QueuedJob { job, events, cancel, reply: reply_tx });
            }
        }

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => {
                warn!(%job_id, "worker channel closed before reply; treating as crash");
                self.handle_crash(job_id).await;
                Err(EngineError::WorkerCrashed)
            }
        }
    }

    /// Signal cancellation for `job_id`. If still queued, it is dropped
    /// and resolved with `Aborted` immediately; if active, the token is
    /// flipped and the worker acknowledges cooperatively.
    pub async fn cancel(&self, job_id: Uuid) {
        let mut state = self.state.lock().await;
        if let Some(active) = state.active.get(&job_id) {
            active.cancel.cancel();
            return;
        }
        if let Some(pos) = state.queue.iter().position(|q| q.job.job_id == job_id) {
            let queued = state.queue.remove(pos).unwrap();
            let _ = queued.reply.send(Err(EngineError::Aborted));
        }
    }

    pub async fn idle_count(&self) -> usize {
        self.state.lock().await.idle.len()
    }

    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active.len()
    }

    pub async fn queued_count(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    async fn handle_crash(&self, job_id: Uuid) {
        let mut state = self.state.lock().await;
        let Some(active) = state.active.remove(&job_id) else {
            return;
        };
        state.workers.remove(&active.worker_id);
        state.idle.retain(|&id| id != active.worker_id);

        let new_id = state.next_worker_id;
        state.next_worker_id += 1;
        info!(dead_worker = active.worker_id, replacement = new_id, "respawning crashed worker");
        state.workers.insert(new_id, spawn_worker(new_id, (self.factory)()));
        state.idle.push(new_id);

        drain_queue(&mut state);
    }
}

fn dispatch_to(
    state: &mut PoolState,
    worker_id: usize,
    job: FetchJob,
    events: DecodeEvents,
    cancel: CancelToken,
    reply: oneshot::Sender<Result<Vec<f32>, EngineError>>,
) {
    let job_id = job.job_id;
    state.active.insert(job_id, ActiveJob { worker_id, cancel: cancel.clone() });
    let Some(sender) = state.workers.get(&worker_id) else {
        state.active.remove(&job_id);
        let _ = reply.send(Err(EngineError::WorkerCrashed));
        return;
    };
    let cmd = WorkerCommand::Run { job, events, cancel, reply, done_tx: state.done_tx.clone() };
    if sender.send(cmd).is_err() {
        state.workers.remove(&worker_id);
        state.active.remove(&job_id);
        // The reply sender was moved into `cmd`; dropping `cmd` on a
        // failed send already drops it, which the caller observes as a
        // closed channel and handles as a crash.
    }
}

fn drain_queue(state: &mut PoolState) {
    while let Some(worker_id) = state.idle.pop() {
        let Some(queued) = state.queue.pop_front() else {
            state.idle.push(worker_id);
            break;
        };
        dispatch_to(state, worker_id, queued.job, queued.events, queued.cancel, queued.reply);
    }
}

fn spawn_completion_driver(state: Arc<Mutex<PoolState>>, mut done_rx: mpsc::UnboundedReceiver<WorkerDone>) {
    tokio::spawn(async move {
        while let Some(done) = done_rx.recv().await {
            let mut guard = state.lock().await;
            guard.active.remove(&done.job_id);
            if guard.workers.contains_key(&done.worker_id) {
                guard.idle.push(done.worker_id);
            }
            drain_queue(&mut guard);
        }
    });
}
