//! Drives a fully wired `Engine` through scenarios A, B, and C from a
//! synthetic fixture, printing `queueStats` after each tick the way a host
//! render loop would poll it every frame.

use chrono::TimeZone;
use engine::{init_tracing, Engine, EngineConfig, LayerConfig, ModelConfig, SlabSizeConfig, SortStrategy};
use net_fetch::NullCache;
use reqwest::Client;
use std::sync::Arc;
use test_utils::object_store::ObjectStoreFixture;
use tile_common::LayerId;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let run_instant = chrono::Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
    let hours = 48;

    let mut keys = Vec::new();
    let mut om_files = Vec::new();
    for h in 0..hours {
        let path = format!("2026080100/{}.om", run_instant_plus(run_instant, h));
        let values = test_utils::om::ramp(8);
        let (bytes, _trailer) = test_utils::om::single_variable("t2m", vec![8], 4, &values);
        keys.push(path.clone());
        om_files.push((path, bytes));
    }

    let fixture = ObjectStoreFixture::start(keys, om_files).await;
    fixture.register_manifest(test_utils::manifest::manifest_json(run_instant, 1, hours.try_into().unwrap(), &["t2m"])).await;

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

    let mut engine =
        Engine::bootstrap(Client::new(), model, EngineConfig::default(), Arc::new(NullCache)).await?;
    println!("discovered {} timesteps", engine.catalog().entries().len());

    // Scenario A: cold start at catalog[11], capacity 4.
    let time_a = engine.catalog().entries()[11].timestep.clone();
    engine.tick(time_a, 4, 4, SortStrategy::Alternate).await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    println!("A: queueStats = {:?}", engine.queue_stats());

    // Scenario B: advance one step.
    let time_b = engine.catalog().entries()[12].timestep.clone();
    engine.tick(time_b, 4, 4, SortStrategy::Alternate).await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    println!("B: queueStats = {:?}", engine.queue_stats());

    // Scenario C: toggle on a second layer.
    let mut model_with_wind = engine.model().clone();
    model_with_wind.layers.push(LayerConfig {
        id: "wind".into(),
        om_params: vec!["u10".into(), "v10".into()],
        slabs: vec![
            SlabSizeConfig { name: "u10".into(), size_bytes: 1024 },
            SlabSizeConfig { name: "v10".into(), size_bytes: 1024 },
        ],
    });
    // A layer set change is a fresh `Engine` in this demo: a real host
    // keeps its catalog and only updates `active_layers` through `tick`,
    // but the fixture above only registered a `t2m` variable, so this
    // step only demonstrates wiring a richer `ModelConfig`, not a decode.
    println!(
        "C: would add layer 'wind' with {} slabs",
        model_with_wind.layers.last().unwrap().slabs.len()
    );
    println!("temperature pool: {:?}", engine.slot_pool(&LayerId::new("temperature")).map(|p| p.capacity()));

    Ok(())
}

fn run_instant_plus(base: chrono::DateTime<chrono::Utc>, hours: i64) -> String {
    (base + chrono::Duration::hours(hours)).format("%Y-%m-%dT%H%M").to_string()
}
