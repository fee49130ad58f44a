//! Pure reconciliation: manifest + object-store listings → a sorted
//! timestep index. No I/O; [`discovery`](crate::discovery) gathers the
//! inputs this consumes.

use crate::discovery::RawDiscovery;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tile_common::Timestep;

/// A timestep with its provenance: which run contributed it and the `.om`
/// URL constructed for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledEntry {
    pub timestep: Timestep,
    pub run: String,
    pub index: usize,
}

fn run_label(dt: DateTime<Utc>) -> String {
    format!("{}Z", dt.format("%H%M"))
}

/// Reconcile a manifest and a window of run listings into a sorted,
/// de-duplicated, indexed timestep sequence.
///
/// Steps: identify the newest/oldest observed run, treat a run newer than
/// `reference_time` as incomplete (its timesteps come from a direct file
/// listing, not a stride guess), walk `firstRun..=referenceTime` at a
/// 6-hour stride contributing either the manifest's full valid-time set
/// (at `reference_time` itself) or a 6-hour gap-fill (older runs), prepend
/// the incomplete run's timesteps as highest priority, then de-duplicate
/// (first occurrence wins) and sort.
pub fn reconcile(raw: &RawDiscovery) -> Vec<ReconciledEntry> {
    let mut contributions: Vec<(Timestep, String)> = Vec::new();

    if let Some(incomplete) = raw.incomplete_run() {
        let label = run_label(incomplete.run_datetime);
        for vt in &raw.incomplete_run_valid_times {
            contributions.push((Timestep::from_datetime(*vt), label.clone()));
        }
    }

    let first_run = raw.run_window.first().map(|r| r.run_datetime).unwrap_or(raw.reference_time);
    let mut cursor = first_run;
    let stride = Duration::hours(6);

    while cursor <= raw.reference_time {
        if cursor == raw.reference_time {
            let label = run_label(cursor);
            for vt in &raw.valid_times {
                contributions.push((Timestep::from_datetime(*vt), label.clone()));
            }
        } else {
            let label = run_label(cursor);
            for offset in 0..6 {
                let vt = cursor + Duration::hours(offset);
                contributions.push((Timestep::from_datetime(vt), label.clone()));
            }
        }
        cursor += stride;
    }

    let mut seen = HashSet::new();
    let mut deduped: Vec<(Timestep, String)> = Vec::new();
    for (ts, run) in contributions {
        if seen.insert(ts.as_str().to_string()) {
            deduped.push((ts, run));
        }
    }

    deduped.sort_by(|a, b| a.0.cmp(&b.0));
    deduped
        .into_iter()
        .enumerate()
        .map(|(index, (timestep, run))| ReconciledEntry { timestep, run, index })
        .collect()
}
