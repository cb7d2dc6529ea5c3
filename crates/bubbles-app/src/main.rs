use anyhow::{Context, Result};
use bubbles_app::{SessionLimits, load_config, load_script, run_session};
use bubbles_core::{HIGHSCORE_KEY, WorldState};
use bubbles_storage::{SharedStorage, Storage};
use clap::Parser;
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "bubbles-app",
    version,
    about = "Run a headless Bubbles market session"
)]
struct Cli {
    /// JSON world configuration; missing fields take their defaults.
    #[arg(long, env = "BUBBLES_CONFIG")]
    config: Option<PathBuf>,

    /// RNG seed overriding the configuration.
    #[arg(long, env = "BUBBLES_SEED")]
    seed: Option<u64>,

    /// Stop after this many ticks instead of running until bankruptcy.
    #[arg(long, env = "BUBBLES_TICKS")]
    ticks: Option<u64>,

    /// Target ticks per second (0 runs as fast as possible).
    #[arg(long, env = "BUBBLES_TICK_RATE", default_value_t = 60.0)]
    tick_rate: f64,

    /// DuckDB file receiving market samples and the highscore.
    #[arg(long, env = "BUBBLES_DB", default_value = "bubbles.duckdb")]
    db: PathBuf,

    /// JSON list of `{tick, command}` entries applied during the session.
    #[arg(long)]
    script: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if cli.seed.is_some() {
        config.rng_seed = cli.seed;
    }
    let script = match cli.script.as_deref() {
        Some(path) => load_script(path)?,
        None => Vec::new(),
    };

    let db_path = cli.db.to_string_lossy().to_string();
    let storage = Arc::new(Mutex::new(
        Storage::open(&db_path).with_context(|| format!("failed to open {db_path}"))?,
    ));
    let highscore = storage
        .lock()
        .map_err(|_| anyhow::anyhow!("storage lock poisoned"))?
        .load_highscore(HIGHSCORE_KEY)?
        .unwrap_or(0.0);

    let persistence = SharedStorage::new(Arc::clone(&storage));
    let mut world = WorldState::with_persistence(config, Box::new(persistence))?;
    world.set_highscore(highscore);
    info!(
        agents = world.econs().len(),
        highscore,
        scripted = script.len(),
        "Starting Bubbles session"
    );

    let outcome = run_session(
        &mut world,
        &script,
        SessionLimits {
            max_ticks: cli.ticks,
            tick_rate: cli.tick_rate.max(0.0),
        },
    )?;
    drop(world);

    let mut storage = storage
        .lock()
        .map_err(|_| anyhow::anyhow!("storage lock poisoned"))?;
    storage.flush()?;
    if outcome.new_highscore {
        storage.store_highscore(HIGHSCORE_KEY, outcome.player_food)?;
        info!(score = outcome.player_food, "New highscore recorded");
    } else if !outcome.solvent {
        warn!(ticks = outcome.ticks, "Session ended in bankruptcy");
    }
    info!(
        ticks = outcome.ticks,
        player_food = outcome.player_food,
        "Session finished"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
