//! The reactive input tuple the scheduler diffs on every tick.

use crate::strategy::SortStrategy;
use tile_common::{LayerSpec, Timestep};

/// One snapshot of the scheduler's reactive inputs. Equality is
/// byte-equality over every field; the caller is responsible for skipping
/// no-op ticks by comparing successive snapshots before calling
/// [`crate::Scheduler::reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Inputs {
    pub time: Timestep,
    pub pool_size: usize,
    pub capacity: usize,
    pub active_layers: Vec<LayerSpec>,
    pub strategy: SortStrategy,
}
