//! Queue ordering relative to the current time cursor.

use tile_common::{Task, Timestep};

/// How the queue is sorted before admission. Both strategies are defined
/// relative to `d(ts) = |toDate(ts) - time|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortStrategy {
    /// Closest first; future and past interleave naturally.
    Alternate,
    /// All future timesteps before all past ones, closest first within
    /// each half.
    FutureFirst,
}

fn distance_hours(ts: &Timestep, time: &Timestep) -> i64 {
    (ts.to_datetime() - time.to_datetime()).num_seconds().abs()
}

fn is_future(ts: &Timestep, time: &Timestep) -> bool {
    ts.to_datetime() >= time.to_datetime()
}

/// Sort `queue` in place per `strategy`, relative to `time`.
pub fn sort_queue(queue: &mut [Task], time: &Timestep, strategy: SortStrategy) {
    match strategy {
        SortStrategy::Alternate => {
            queue.sort_by_key(|t| distance_hours(&t.timestep, time));
        }
        SortStrategy::FutureFirst => {
            queue.sort_by_key(|t| (!is_future(&t.timestep, time), distance_hours(&t.timestep, time)));
        }
    }
}
