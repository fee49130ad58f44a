//! Per-job types and the worker task loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tile_common::EngineError;
use uuid::Uuid;

/// A unit of decode work: fetch `url` and decode it for `param_id`.
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub job_id: Uuid,
    pub url: String,
    pub param_id: String,
}

impl FetchJob {
    pub fn new(url: impl Into<String>, param_id: impl Into<String>) -> Self {
        Self { job_id: Uuid::new_v4(), url: url.into(), param_id: param_id.into() }
    }
}

/// Progress of the slice-wise data fetch within one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceEvent {
    pub slice_index: usize,
    pub total_slices: usize,
    pub done: bool,
}

/// Callbacks a worker invokes while decoding a job. `on_bytes` fires
/// independently of `on_slice` so the bandwidth tracker sees every byte
/// regardless of how the decoder chose to slice its reads.
#[derive(Clone)]
pub struct DecodeEvents {
    pub on_slice: Arc<dyn Fn(SliceEvent) + Send + Sync>,
    pub on_bytes: Arc<dyn Fn(u64) + Send + Sync>,
}

impl DecodeEvents {
    pub fn noop() -> Self {
        Self { on_slice: Arc::new(|_| {}), on_bytes: Arc::new(|_| {}) }
    }
}

/// Cooperative cancellation: the decoder checks this at iterator
/// boundaries and short-circuits with [`EngineError::Aborted`] once set.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One worker's decode capability. Implementations own whatever
/// per-file state (range source, chunk decoder, scratch buffers) a single
/// job needs; the pool constructs a fresh instance per worker slot via a
/// factory closure, matching "each worker holds its own instance of the
/// decoder".
#[async_trait::async_trait]
pub trait Decoder: Send + 'static {
    async fn decode(
        &mut self,
        job: &FetchJob,
        events: &DecodeEvents,
        cancel: &CancelToken,
    ) -> Result<Vec<f32>, EngineError>;
}

pub(crate) enum WorkerCommand {
    Run {
        job: FetchJob,
        events: DecodeEvents,
        cancel: CancelToken,
        reply: tokio::sync::oneshot::Sender<Result<Vec<f32>, EngineError>>,
        done_tx: tokio::sync::mpsc::UnboundedSender<WorkerDone>,
    },
}

pub(crate) struct WorkerDone {
    pub worker_id: usize,
    pub job_id: Uuid,
}

pub(crate) fn spawn_worker<D: Decoder>(
    worker_id: usize,
    mut decoder: D,
) -> tokio::sync::mpsc::UnboundedSender<WorkerCommand> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<WorkerCommand>();

    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                WorkerCommand::Run { job, events, cancel, reply, done_tx } => {
                    let job_id = job.job_id;
                    let result = decoder.decode(&job, &events, &cancel).await;
                    let _ = reply.send(result);
                    let _ = done_tx.send(WorkerDone { worker_id, job_id });
                }
            }
        }
    });

    tx
}
