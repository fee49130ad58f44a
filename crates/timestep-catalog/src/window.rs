//! Viewport-relative timestep windowing: which catalog entries should the
//! slot pool hold resident around the current playhead time.

use crate::catalog::{Catalog, TimestepEntry};
use tile_common::{LayerSpec, Task, Timestep};

/// Binary-search the catalog for the entries immediately at-or-before and
/// at-or-after `time`. Either side is `None` if `time` falls outside the
/// catalog's range.
pub fn adjacent<'a>(
    entries: &'a [TimestepEntry],
    time: &Timestep,
) -> (Option<&'a TimestepEntry>, Option<&'a TimestepEntry>) {
    let pos = entries.partition_point(|e| &e.timestep <= time);
    let before = if pos > 0 { Some(&entries[pos - 1]) } else { None };
    let after = entries.get(pos);
    (before, after)
}

/// Pick up to `capacity` timesteps around `time`, expanding outward and
/// alternating which side wins ties so a pool that can't hold the whole
/// catalog still favors recency symmetrically rather than always biasing
/// toward the past or the future.
pub fn get_window<'a>(entries: &'a [TimestepEntry], time: &Timestep, capacity: usize) -> Vec<&'a TimestepEntry> {
    if entries.is_empty() || capacity == 0 {
        return Vec::new();
    }

    let pos = entries.partition_point(|e| &e.timestep < time);
    let mut before = pos as isize - 1;
    let mut after = pos as isize;
    let mut picked = Vec::with_capacity(capacity.min(entries.len()));
    let mut favor_future = true;

    while picked.len() < capacity && (before >= 0 || (after as usize) < entries.len()) {
        let take_future = if before < 0 {
            true
        } else if (after as usize) >= entries.len() {
            false
        } else {
            favor_future
        };

        if take_future {
            picked.push(&entries[after as usize]);
            after += 1;
        } else {
            picked.push(&entries[before as usize]);
            before -= 1;
        }
        favor_future = !favor_future;
    }

    picked.sort_by(|a, b| a.timestep.cmp(&b.timestep));
    picked
}

/// Compute the window around `time` and the decode [`Task`]s needed to
/// populate it for the given layers, skipping slabs already GPU-resident.
pub fn get_window_tasks<'a>(
    catalog: &'a Catalog,
    time: &Timestep,
    capacity: usize,
    layers: &[LayerSpec],
) -> (Vec<&'a TimestepEntry>, Vec<Task>) {
    let window = get_window(catalog.entries(), time, capacity);
    let mut tasks = Vec::new();

    for entry in &window {
        for layer in layers {
            for (slab_index, (param, slab)) in layer.om_params.iter().zip(layer.slabs.iter()).enumerate() {
                if catalog.is_gpu_loaded(param, &entry.timestep) {
                    continue;
                }
                let is_fast = catalog.is_cached(param, &entry.timestep);
                // Prefer the size learned from a prior completed download of
                // this exact (param, timestep) pair — relevant once an
                // evicted-then-refetched timestep re-enters the window —
                // over the layer's static default.
                let size_estimate = catalog
                    .param_state(param)
                    .and_then(|state| state.size_for(&entry.timestep))
                    .unwrap_or(slab.size_bytes as u64);
                tasks.push(Task {
                    layer: layer.id.clone(),
                    param: param.clone(),
                    timestep: entry.timestep.clone(),
                    om_param: slab.name.clone(),
                    slab_index,
                    url: entry.url.clone(),
                    size_estimate,
                    is_fast,
                });
            }
        }
    }

    (window, tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tile_common::{ParamId, SlabConfig};

    fn entries(timesteps: &[&str]) -> Vec<TimestepEntry> {
        timesteps
            .iter()
            .enumerate()
            .map(|(i, ts)| TimestepEntry {
                timestep: Timestep::parse(ts).unwrap(),
                index: i,
                run: "1200Z".into(),
                url: format!("https://example.com/{ts}.om"),
            })
            .collect()
    }

    #[test]
    fn adjacent_brackets_a_time_between_two_entries() {
        let e = entries(&["2026-08-01T1200", "2026-08-01T1300", "2026-08-01T1400"]);
        let mid = Timestep::parse("2026-08-01T1230").unwrap();
        let (before, after) = adjacent(&e, &mid);
        assert_eq!(before.unwrap().timestep.as_str(), "2026-08-01T1200");
        assert_eq!(after.unwrap().timestep.as_str(), "2026-08-01T1300");
    }

    #[test]
    fn adjacent_returns_none_past_the_catalogs_edges() {
        let e = entries(&["2026-08-01T1200", "2026-08-01T1300"]);
        let early = Timestep::parse("2026-08-01T0000").unwrap();
        let (before, after) = adjacent(&e, &early);
        assert!(before.is_none());
        assert_eq!(after.unwrap().timestep.as_str(), "2026-08-01T1200");

        let late = Timestep::parse("2026-08-02T0000").unwrap();
        let (before, after) = adjacent(&e, &late);
        assert_eq!(before.unwrap().timestep.as_str(), "2026-08-01T1300");
        assert!(after.is_none());
    }

    #[test]
    fn window_is_a_subset_of_the_catalog_and_respects_capacity() {
        let e = entries(&[
            "2026-08-01T1000",
            "2026-08-01T1100",
            "2026-08-01T1200",
            "2026-08-01T1300",
            "2026-08-01T1400",
        ]);
        let time = Timestep::parse("2026-08-01T1200").unwrap();
        let window = get_window(&e, &time, 3);
        assert_eq!(window.len(), 3);
        for w in &window {
            assert!(e.iter().any(|entry| entry.timestep == w.timestep));
        }
        assert!(window.windows(2).all(|w| w[0].timestep <= w[1].timestep));
    }

    #[test]
    fn window_tasks_skip_gpu_resident_slabs() {
        let e = entries(&["2026-08-01T1200"]);
        let mut catalog = Catalog::from_entries(e);
        let param = ParamId::new("t2m");
        let layer = LayerSpec::new(
            tile_common::LayerId::new("temperature"),
            vec![param.clone()],
            vec![SlabConfig::new("t2m", 1024)],
        );
        let ts = Timestep::parse("2026-08-01T1200").unwrap();
        catalog.param_state_mut(&param).set_gpu_loaded(&ts, true);

        let (_window, tasks) = get_window_tasks(&catalog, &ts, 4, &[layer]);
        assert!(tasks.is_empty());
    }

    #[test]
    fn window_tasks_mark_cached_slabs_as_fast() {
        let e = entries(&["2026-08-01T1200"]);
        let mut catalog = Catalog::from_entries(e);
        let param = ParamId::new("t2m");
        let layer = LayerSpec::new(
            tile_common::LayerId::new("temperature"),
            vec![param.clone()],
            vec![SlabConfig::new("t2m", 1024)],
        );
        let ts = Timestep::parse("2026-08-01T1200").unwrap();
        catalog.param_state_mut(&param).set_cached(&ts, 2048);

        let (_window, tasks) = get_window_tasks(&catalog, &ts, 4, &[layer]);
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].is_fast);
    }

    #[test]
    fn window_tasks_prefer_a_params_learned_size_over_the_slab_default() {
        let e = entries(&["2026-08-01T1200"]);
        let mut catalog = Catalog::from_entries(e);
        let param = ParamId::new("t2m");
        let layer = LayerSpec::new(
            tile_common::LayerId::new("temperature"),
            vec![param.clone()],
            vec![SlabConfig::new("t2m", 1024)],
        );
        let ts = Timestep::parse("2026-08-01T1200").unwrap();
        catalog.param_state_mut(&param).set_cached(&ts, 9999);

        let (_window, tasks) = get_window_tasks(&catalog, &ts, 4, &[layer]);
        assert_eq!(tasks[0].size_estimate, 9999);
    }
}
