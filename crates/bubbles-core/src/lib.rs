//! Core simulation for the Bubbles agent economy.
//!
//! Agents ("econs") drift around a disk, pick up food and bubbles, trade
//! bubbles with each other and with the player's shop at the origin, and die
//! when their food runs out. Billboards and influencers placed by the player
//! raise how much agents value bubbles; a global deprecation factor discounts
//! those valuations as supply is bought up or the population dies off.

use rand::{Rng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

mod config;
mod control;
mod influence;
mod lifecycle;
mod movement;
mod trade;
mod vector;

pub use config::BubblesConfig;
pub use control::{ControlCommand, ControlError, MarketingDevices, apply_control_command};
pub use lifecycle::{deprecation_factor, payroll};
pub use trade::{PlayerTrade, PlayerTradeSide, TradeRecord, trade_between, trade_with_player};
pub use vector::{Vec2, reflect, segment_distance};

/// Key under which the best final player food is persisted.
pub const HIGHSCORE_KEY: &str = "highscore";

/// High level simulation clock (ticks processed since boot).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// A simulated economic actor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Econ {
    pub pos: Vec2,
    pub velocity: Vec2,
    /// Sustenance and currency; the agent dies once this is non-positive after upkeep.
    pub food: f64,
    pub bubbles: u32,
    /// Marketing exposure accumulated over the agent's life.
    pub bubble_value_raw: f64,
    /// `bubble_value_raw` discounted by the current deprecation factor.
    pub bubble_value: f64,
}

impl Econ {
    /// Fresh agent holding no bubbles and no valuation.
    #[must_use]
    pub const fn new(pos: Vec2, velocity: Vec2, food: f64) -> Self {
        Self {
            pos,
            velocity,
            food,
            bubbles: 0,
            bubble_value_raw: 0.0,
            bubble_value: 0.0,
        }
    }

    /// Holding the agent aims for. A negative valuation wants nothing.
    fn target_holding(&self) -> f64 {
        self.bubble_value.max(0.0)
    }

    /// Holds more bubbles than it values.
    #[must_use]
    pub fn wants_to_sell(&self) -> bool {
        f64::from(self.bubbles) > self.target_holding()
    }

    /// Holds fewer bubbles than it values.
    #[must_use]
    pub fn wants_to_buy(&self) -> bool {
        f64::from(self.bubbles) < self.target_holding()
    }

    /// Bubbles still wanted to reach the valuation.
    #[must_use]
    pub fn wanted(&self) -> f64 {
        self.target_holding().ceil() - f64::from(self.bubbles)
    }

    /// Bubbles held beyond the valuation; never more than the holding.
    #[must_use]
    pub fn surplus(&self) -> f64 {
        f64::from(self.bubbles) - self.target_holding().ceil()
    }
}

/// The human-controlled shop at the origin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub bubbles: u32,
    /// Wealth and score; the session ends when this drops below zero.
    pub food: f64,
    pub selling_price: f64,
    pub buying_price: f64,
    pub marketing_points: f64,
    pub marketing_people: u32,
}

impl Player {
    fn from_config(config: &BubblesConfig) -> Self {
        Self {
            bubbles: config.player_initial_bubbles,
            food: config.player_initial_food,
            selling_price: config.player_selling_price,
            buying_price: config.player_buying_price,
            marketing_points: 0.0,
            marketing_people: 0,
        }
    }
}

/// Fixed marketing segment placed by the player.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Billboard {
    pub a: Vec2,
    pub b: Vec2,
}

impl Billboard {
    #[must_use]
    pub const fn new(a: Vec2, b: Vec2) -> Self {
        Self { a, b }
    }

    /// Capsule distance from `point` to the segment.
    #[must_use]
    pub fn distance_to(&self, point: Vec2) -> f64 {
        segment_distance(point, self.a, self.b)
    }

    /// Segment normal oriented toward the side `point` lies on.
    #[must_use]
    pub fn normal_toward(&self, point: Vec2) -> Vec2 {
        let normal = (self.b - self.a).perp();
        if normal.dot(point - self.a) < 0.0 {
            -normal
        } else {
            normal
        }
    }
}

/// Mobile marketing point that also collides like an agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Influencer {
    pub pos: Vec2,
    pub velocity: Vec2,
}

/// Transient "+cash" marker shown where the player earned money.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CashPopup {
    pub remaining_time: u32,
    pub pos: Vec2,
    pub value: f64,
}

/// Total and mean agent food at a stats checkpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CashSample {
    pub total: f64,
    pub average: f64,
}

/// Errors that can occur when constructing world state.
#[derive(Debug, Error)]
pub enum WorldStateError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The disk was too crowded to place every agent apart from the others.
    #[error("placed only {placed} of {requested} agents before exhausting placement attempts")]
    PlacementExhausted { placed: usize, requested: usize },
}

/// Market summary emitted at every stats checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    pub tick: Tick,
    pub econ_count: usize,
    pub dead_count: usize,
    pub avg_value: f64,
    pub deprecation_factor: f64,
    pub total_econ_cash: f64,
    pub avg_econ_cash: f64,
    pub player_food: f64,
    pub player_bubbles: u32,
    pub marketing_points: f64,
}

/// Scalar metric sampled during persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: Cow<'static, str>,
    pub value: f64,
}

impl MetricSample {
    /// Creates a new metric sample.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Aggregate payload forwarded to persistence sinks.
#[derive(Debug, Clone)]
pub struct PersistenceBatch {
    pub summary: TickSummary,
    pub metrics: Vec<MetricSample>,
    pub last_trade: Option<TradeRecord>,
}

/// Persistence sink invoked at every stats checkpoint.
pub trait WorldPersistence: Send {
    fn on_sample(&mut self, payload: &PersistenceBatch);
}

/// No-op persistence sink.
#[derive(Debug, Default)]
pub struct NullPersistence;

impl WorldPersistence for NullPersistence {
    fn on_sample(&mut self, _payload: &PersistenceBatch) {}
}

/// Aggregate world state owned by the driver between ticks.
pub struct WorldState {
    config: BubblesConfig,
    ticks: Tick,
    rng: SmallRng,
    player: Player,
    econs: Vec<Econ>,
    dead_econs: Vec<Econ>,
    billboards: Vec<Billboard>,
    influencers: Vec<Influencer>,
    food_pickups: Vec<Vec2>,
    bubble_pickups: Vec<Vec2>,
    cash_popups: Vec<CashPopup>,
    last_trade: Option<TradeRecord>,
    trade_history: VecDeque<f64>,
    price_history: VecDeque<f64>,
    player_food_history: VecDeque<f64>,
    global_cash_history: VecDeque<CashSample>,
    avg_value: f64,
    total_econ_cash: f64,
    avg_econ_cash: f64,
    deprecation_factor: f64,
    highscore: f64,
    player_food_cost_per_second: f64,
    persistence: Box<dyn WorldPersistence>,
}

impl fmt::Debug for WorldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldState")
            .field("config", &self.config)
            .field("ticks", &self.ticks)
            .field("econ_count", &self.econs.len())
            .field("dead_count", &self.dead_econs.len())
            .field("player", &self.player)
            .field("deprecation_factor", &self.deprecation_factor)
            .finish()
    }
}

fn random_velocity(rng: &mut SmallRng) -> Vec2 {
    Vec2::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0))
}

fn random_in_square(rng: &mut SmallRng, half_extent: f64) -> Vec2 {
    Vec2::new(
        rng.random_range(-half_extent..half_extent),
        rng.random_range(-half_extent..half_extent),
    )
}

fn random_in_disk(rng: &mut SmallRng, radius: f64) -> Vec2 {
    loop {
        let candidate = random_in_square(rng, radius);
        if candidate.length() < radius {
            return candidate;
        }
    }
}

fn push_bounded<T>(history: &mut VecDeque<T>, capacity: usize, value: T) {
    while history.len() >= capacity {
        history.pop_front();
    }
    history.push_back(value);
}

fn place_population(
    config: &BubblesConfig,
    rng: &mut SmallRng,
) -> Result<Vec<Econ>, WorldStateError> {
    let mut econs: Vec<Econ> = Vec::with_capacity(config.econ_count);
    let mut rejected = 0usize;
    while econs.len() < config.econ_count {
        let candidate = random_in_square(rng, config.world_radius);
        let inside = candidate.length() < config.world_radius;
        if inside
            && econs
                .iter()
                .all(|econ| econ.pos.distance(candidate) > config.econ_min_distance)
        {
            let velocity = random_velocity(rng);
            econs.push(Econ::new(candidate, velocity, config.econ_initial_food));
            continue;
        }
        rejected += 1;
        if rejected > config.placement_attempts {
            return Err(WorldStateError::PlacementExhausted {
                placed: econs.len(),
                requested: config.econ_count,
            });
        }
    }
    Ok(econs)
}

impl WorldState {
    /// Instantiate a new world using the supplied configuration.
    pub fn new(config: BubblesConfig) -> Result<Self, WorldStateError> {
        Self::with_persistence(config, Box::new(NullPersistence))
    }

    /// Instantiate a new world using the supplied configuration and persistence sink.
    pub fn with_persistence(
        config: BubblesConfig,
        persistence: Box<dyn WorldPersistence>,
    ) -> Result<Self, WorldStateError> {
        config.validate()?;
        let mut rng = config.seeded_rng();
        let econs = place_population(&config, &mut rng)?;
        let player = Player::from_config(&config);
        let history_capacity = config.history_capacity;
        Ok(Self {
            player,
            econs,
            config,
            ticks: Tick::zero(),
            rng,
            dead_econs: Vec::new(),
            billboards: Vec::new(),
            influencers: Vec::new(),
            food_pickups: Vec::new(),
            bubble_pickups: Vec::new(),
            cash_popups: Vec::new(),
            last_trade: None,
            trade_history: VecDeque::with_capacity(history_capacity),
            price_history: VecDeque::with_capacity(history_capacity),
            player_food_history: VecDeque::with_capacity(history_capacity),
            global_cash_history: VecDeque::with_capacity(history_capacity),
            avg_value: 0.0,
            total_econ_cash: 0.0,
            avg_econ_cash: 0.0,
            deprecation_factor: 1.0,
            highscore: 0.0,
            player_food_cost_per_second: 0.0,
            persistence,
        })
    }

    /// Advance the simulation by one step, returning whether the player is still solvent.
    pub fn tick(&mut self) -> bool {
        self.ticks = self.ticks.next();

        self.stage_agents();
        self.stage_influencers();
        self.stage_upkeep();
        self.stage_death_cleanup();
        self.stage_food_spawn();
        self.stage_cash_popups();
        self.stage_valuation();
        self.stage_averages();
        self.stage_checkpoint();
        self.stage_cost_projection();

        self.is_solvent()
    }

    /// Whether the player's business can still pay its bills.
    #[must_use]
    pub fn is_solvent(&self) -> bool {
        self.player.food >= 0.0
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub const fn config(&self) -> &BubblesConfig {
        &self.config
    }

    /// Ticks processed since initialization.
    #[must_use]
    pub const fn ticks(&self) -> Tick {
        self.ticks
    }

    #[must_use]
    pub const fn player(&self) -> &Player {
        &self.player
    }

    /// Mutable player access for the embedding layer; call only between ticks.
    pub fn player_mut(&mut self) -> &mut Player {
        &mut self.player
    }

    /// Live agents in iteration order.
    #[must_use]
    pub fn econs(&self) -> &[Econ] {
        &self.econs
    }

    /// Agents removed by the lifecycle checkpoint, in order of death.
    #[must_use]
    pub fn dead_econs(&self) -> &[Econ] {
        &self.dead_econs
    }

    #[must_use]
    pub fn billboards(&self) -> &[Billboard] {
        &self.billboards
    }

    #[must_use]
    pub fn influencers(&self) -> &[Influencer] {
        &self.influencers
    }

    #[must_use]
    pub fn food_pickups(&self) -> &[Vec2] {
        &self.food_pickups
    }

    /// Place a food pickup directly, bypassing the spawn chance and cap.
    pub fn spawn_food(&mut self, pos: Vec2) {
        self.food_pickups.push(pos);
    }

    #[must_use]
    pub fn bubble_pickups(&self) -> &[Vec2] {
        &self.bubble_pickups
    }

    #[must_use]
    pub fn cash_popups(&self) -> &[CashPopup] {
        &self.cash_popups
    }

    /// Most recent agent-to-agent trade.
    #[must_use]
    pub const fn last_trade(&self) -> Option<TradeRecord> {
        self.last_trade
    }

    /// Prices of recent agent-to-agent trades, oldest first.
    pub fn trade_history(&self) -> impl Iterator<Item = f64> + '_ {
        self.trade_history.iter().copied()
    }

    /// Average valuation sampled at each stats checkpoint.
    pub fn price_history(&self) -> impl Iterator<Item = f64> + '_ {
        self.price_history.iter().copied()
    }

    pub fn player_food_history(&self) -> impl Iterator<Item = f64> + '_ {
        self.player_food_history.iter().copied()
    }

    pub fn global_cash_history(&self) -> impl Iterator<Item = CashSample> + '_ {
        self.global_cash_history.iter().copied()
    }

    /// Mean `bubble_value` over live agents; 0 when nobody is alive.
    #[must_use]
    pub const fn avg_value(&self) -> f64 {
        self.avg_value
    }

    #[must_use]
    pub const fn total_econ_cash(&self) -> f64 {
        self.total_econ_cash
    }

    #[must_use]
    pub const fn avg_econ_cash(&self) -> f64 {
        self.avg_econ_cash
    }

    #[must_use]
    pub const fn deprecation_factor(&self) -> f64 {
        self.deprecation_factor
    }

    /// Seed the highscore read from persistent storage.
    pub fn set_highscore(&mut self, highscore: f64) {
        self.highscore = highscore;
    }

    /// Whether the player's current food beats the recorded highscore.
    #[must_use]
    pub fn beats_highscore(&self) -> bool {
        self.player.food > self.highscore
    }

    /// Payroll the player is charged per second at the current staffing.
    #[must_use]
    pub const fn player_food_cost_per_second(&self) -> f64 {
        self.player_food_cost_per_second
    }
}
