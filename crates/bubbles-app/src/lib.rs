//! Session plumbing for the headless Bubbles driver.

use std::{
    fs,
    path::Path,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use bubbles_core::{BubblesConfig, ControlCommand, WorldState, apply_control_command};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A scripted player action applied once the clock reads `tick`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptEntry {
    pub tick: u64,
    pub command: ControlCommand,
}

/// Read a configuration file, or fall back to defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<BubblesConfig> {
    let Some(path) = path else {
        return Ok(BubblesConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

/// Read a command script, sorted by tick so entries can be drained in order.
pub fn load_script(path: &Path) -> Result<Vec<ScriptEntry>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    let mut entries: Vec<ScriptEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid script {}", path.display()))?;
    entries.sort_by_key(|entry| entry.tick);
    Ok(entries)
}

/// How a session is paced and when it stops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionLimits {
    /// Stop after this many ticks; run until insolvency when `None`.
    pub max_ticks: Option<u64>,
    /// Target ticks per second; zero runs unthrottled.
    pub tick_rate: f64,
}

/// Final state of a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub ticks: u64,
    pub solvent: bool,
    pub player_food: f64,
    pub new_highscore: bool,
}

/// Drive `world` until the player goes broke or the tick limit is hit.
///
/// Script entries are applied before the tick that advances the clock past
/// their `tick`; refused commands are logged and skipped. Fails before the
/// first tick when the rate gives a frame time no `Duration` can hold.
pub fn run_session(
    world: &mut WorldState,
    script: &[ScriptEntry],
    limits: SessionLimits,
) -> Result<SessionOutcome> {
    let frame = if limits.tick_rate > 0.0 {
        let frame = Duration::try_from_secs_f64(1.0 / limits.tick_rate)
            .with_context(|| format!("tick rate {} is out of range", limits.tick_rate))?;
        Some(frame)
    } else {
        None
    };
    let report_every = world.config().stats_interval.saturating_mul(10).max(1);
    let mut pending = script.iter().peekable();
    let mut solvent = world.is_solvent();

    while solvent {
        if limits.max_ticks.is_some_and(|max| world.ticks().0 >= max) {
            break;
        }
        let started = Instant::now();
        while let Some(entry) = pending.next_if(|entry| entry.tick <= world.ticks().0) {
            if let Err(err) = apply_control_command(world, entry.command.clone()) {
                warn!(tick = entry.tick, %err, command = ?entry.command, "scripted command refused");
            }
        }

        solvent = world.tick();

        let tick = world.ticks().0;
        if tick.is_multiple_of(report_every) {
            info!(
                tick,
                alive = world.econs().len(),
                dead = world.dead_econs().len(),
                avg_value = world.avg_value(),
                deprecation = world.deprecation_factor(),
                player_food = world.player().food,
                "market report"
            );
        }
        if let Some(frame) = frame {
            let elapsed = started.elapsed();
            if elapsed < frame {
                thread::sleep(frame - elapsed);
            }
        }
    }

    if !solvent {
        warn!(tick = world.ticks().0, food = world.player().food, "player went bankrupt");
    }
    Ok(SessionOutcome {
        ticks: world.ticks().0,
        solvent,
        player_food: world.player().food,
        new_highscore: world.beats_highscore(),
    })
}
