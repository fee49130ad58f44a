//! Parallel decode worker pool.
//!
//! A pool of `P` workers, each running its own [`Decoder`] instance on a
//! dedicated tokio task. Jobs dispatch to an idle worker immediately or
//! join a FIFO queue; cancellation is cooperative via [`CancelToken`]; a
//! worker whose task dies mid-job rejects that job with
//! [`EngineError::WorkerCrashed`] and a replacement is spawned before the
//! queue is drained further. Per-job control flow inside a worker is
//! sequential; across workers it is fully parallel.

mod pool;
mod worker;

pub use pool::WorkerPool;
pub use worker::{CancelToken, DecodeEvents, Decoder, FetchJob, SliceEvent};
