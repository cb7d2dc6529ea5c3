use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

use crate::WorldStateError;

/// Static configuration for a Bubbles world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BubblesConfig {
    /// Radius of the disk agents are placed in and bounced back into.
    pub world_radius: f64,
    /// Number of agents placed at initialization.
    pub econ_count: usize,
    /// Contact distance for agent, influencer, and billboard collisions.
    pub econ_min_distance: f64,
    /// Food each agent starts with.
    pub econ_initial_food: f64,
    /// Flat food upkeep charged to every agent each tick.
    pub econ_food_consumption: f64,
    /// Per-tick probability an agent picks a fresh random velocity.
    pub econ_random_velocity_chance: f64,
    /// Per-tick probability a food pickup spawns.
    pub food_spawn_chance: f64,
    /// Maximum number of outstanding food pickups.
    pub food_max_count: usize,
    /// Food granted by one food pickup.
    pub food_value: f64,
    /// Distance within which an agent collects a food pickup.
    pub food_pickup_radius: f64,
    /// Distance within which an agent collects a bubble pickup.
    pub bubble_pickup_radius: f64,
    /// Radius around the drop point that a bubble batch scatters over.
    pub bubble_batch_spread: f64,
    /// Distance within which billboards and influencers raise valuations.
    pub billboard_influence_radius: f64,
    /// Raw valuation added per tick of marketing exposure.
    pub billboard_influence_strength: f64,
    /// Distance from the origin within which agents trade with the player.
    pub market_trade_radius: f64,
    /// Bubbles the player owns at start; also the supply used for deprecation.
    pub player_initial_bubbles: u32,
    /// Food the player owns at start.
    pub player_initial_food: f64,
    /// Initial price the player sells bubbles at.
    pub player_selling_price: f64,
    /// Initial price the player buys bubbles at.
    pub player_buying_price: f64,
    /// Payroll per stats interval, multiplied by the square of the staff count.
    pub marketing_person_salary: f64,
    /// Payroll per stats interval for each placed influencer.
    pub influencer_salary: f64,
    /// Marketing points spent to place one billboard.
    pub billboard_point_cost: f64,
    /// Marketing points spent to place one influencer.
    pub influencer_point_cost: f64,
    /// Ticks a cash popup remains visible.
    pub cash_popup_duration: u32,
    /// Ticks between history snapshots and payroll (60 ticks = one second).
    pub stats_interval: u64,
    /// Maximum number of entries retained per history.
    pub history_capacity: usize,
    /// Rejected samples tolerated while placing the initial population.
    pub placement_attempts: usize,
    /// Optional RNG seed for reproducible worlds.
    pub rng_seed: Option<u64>,
}

impl Default for BubblesConfig {
    fn default() -> Self {
        Self {
            world_radius: 512.0,
            econ_count: 32,
            econ_min_distance: 32.0,
            econ_initial_food: 10.0,
            econ_food_consumption: 0.005,
            econ_random_velocity_chance: 0.002,
            food_spawn_chance: 0.05,
            food_max_count: 24,
            food_value: 4.0,
            food_pickup_radius: 16.0,
            bubble_pickup_radius: 16.0,
            bubble_batch_spread: 24.0,
            billboard_influence_radius: 96.0,
            billboard_influence_strength: 0.002,
            market_trade_radius: 48.0,
            player_initial_bubbles: 2_048,
            player_initial_food: 100.0,
            player_selling_price: 2.0,
            player_buying_price: 1.0,
            marketing_person_salary: 0.5,
            influencer_salary: 2.0,
            billboard_point_cost: 20.0,
            influencer_point_cost: 50.0,
            cash_popup_duration: 60,
            stats_interval: 60,
            history_capacity: 1_024,
            placement_attempts: 100_000,
            rng_seed: None,
        }
    }
}

impl BubblesConfig {
    /// Rejects configurations the simulation cannot run with.
    pub fn validate(&self) -> Result<(), WorldStateError> {
        if !(self.world_radius > 0.0 && self.world_radius.is_finite()) {
            return Err(WorldStateError::InvalidConfig(
                "world_radius must be positive and finite",
            ));
        }
        if self.econ_min_distance < 0.0 {
            return Err(WorldStateError::InvalidConfig(
                "econ_min_distance must be non-negative",
            ));
        }
        if self.econ_initial_food <= 0.0 {
            return Err(WorldStateError::InvalidConfig(
                "econ_initial_food must be positive",
            ));
        }
        let chances = [
            self.econ_random_velocity_chance,
            self.food_spawn_chance,
        ];
        if chances.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(WorldStateError::InvalidConfig(
                "spawn and randomisation chances must lie in [0, 1]",
            ));
        }
        if self.econ_food_consumption < 0.0
            || self.food_value < 0.0
            || self.food_pickup_radius < 0.0
            || self.bubble_pickup_radius < 0.0
            || self.bubble_batch_spread < 0.0
            || self.billboard_influence_radius < 0.0
            || self.billboard_influence_strength < 0.0
            || self.market_trade_radius < 0.0
            || self.marketing_person_salary < 0.0
            || self.influencer_salary < 0.0
            || self.billboard_point_cost < 0.0
            || self.influencer_point_cost < 0.0
        {
            return Err(WorldStateError::InvalidConfig(
                "radii, rates, salaries, and point costs must be non-negative",
            ));
        }
        if self.player_selling_price < 0.0 || self.player_buying_price < 0.0 {
            return Err(WorldStateError::InvalidConfig(
                "player prices must be non-negative",
            ));
        }
        if self.stats_interval == 0 {
            return Err(WorldStateError::InvalidConfig(
                "stats_interval must be non-zero",
            ));
        }
        if self.history_capacity == 0 {
            return Err(WorldStateError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}
