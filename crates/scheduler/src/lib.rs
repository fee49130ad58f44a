//! Reactive task scheduling: turns the (time, poolSize, capacity,
//! activeLayers, strategy) input tuple into slot allocations and worker
//! dispatches, and tracks bandwidth/ETA for the host UI.

pub mod bandwidth;
pub mod inputs;
pub mod scheduler;
pub mod strategy;

pub use bandwidth::{BandwidthTracker, QueueStats, Status, SAMPLE_WINDOW};
pub use inputs::Inputs;
pub use scheduler::{AdmittedTask, ReconcileOutcome, Scheduler};
pub use strategy::{sort_queue, SortStrategy};
