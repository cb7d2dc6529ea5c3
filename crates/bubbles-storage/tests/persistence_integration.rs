use bubbles_core::{BubblesConfig, HIGHSCORE_KEY, WorldState};
use bubbles_storage::Storage;
use std::{
    fs,
    time::{SystemTime, UNIX_EPOCH},
};

#[test]
fn world_checkpoints_land_in_storage() {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_micros();
    let path = std::env::temp_dir().join(format!(
        "bubbles_storage_test_{}_{}.duckdb",
        std::process::id(),
        timestamp
    ));
    let path_str = path.to_str().expect("utf8 path");

    let config = BubblesConfig {
        econ_count: 8,
        stats_interval: 5,
        rng_seed: Some(17),
        ..BubblesConfig::default()
    };

    {
        let storage = Storage::with_threshold(path_str, 2).expect("storage");
        let mut world = WorldState::with_persistence(config, Box::new(storage)).expect("world");
        for _ in 0..23 {
            world.tick();
        }
    }

    let mut storage = Storage::open(path_str).expect("reopen");
    let samples = storage.latest_samples(10).expect("samples");
    let ticks: Vec<i64> = samples.iter().map(|s| s.tick).collect();
    assert_eq!(ticks, vec![20, 15, 10, 5]);
    assert!(samples.iter().all(|s| s.deprecation_factor <= 1.0));

    let metrics = storage.latest_metrics(16).expect("metrics");
    assert!(!metrics.is_empty());
    assert!(metrics.iter().all(|m| m.tick == 20));

    storage.store_highscore(HIGHSCORE_KEY, 321.0).expect("store");
    drop(storage);

    let storage = Storage::open(path_str).expect("reopen");
    assert_eq!(storage.load_highscore(HIGHSCORE_KEY).expect("load"), Some(321.0));
    drop(storage);
    let _ = fs::remove_file(&path);
}
