use rand::Rng;
use tracing::debug;

use crate::{
    BubblesConfig, CashSample, Econ, MetricSample, PersistenceBatch, TickSummary, WorldState,
    push_bounded, random_in_disk,
};

/// Global discount applied to raw valuations.
///
/// One minus the larger of the share of the player's initial supply now held
/// by agents (alive or dead) and the share of the initial population that has
/// died. Never above one; not floored, so it can go negative.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn deprecation_factor(econs: &[Econ], dead_econs: &[Econ], config: &BubblesConfig) -> f64 {
    let held: u64 = econs
        .iter()
        .chain(dead_econs)
        .map(|econ| u64::from(econ.bubbles))
        .sum();
    let supply = f64::from(config.player_initial_bubbles);
    let acquired = if supply > 0.0 {
        held as f64 / supply
    } else {
        0.0
    };
    let died = if config.econ_count > 0 {
        dead_econs.len() as f64 / config.econ_count as f64
    } else {
        0.0
    };
    1.0 - acquired.max(died)
}

/// Food charged to the player per stats interval for staff and influencers.
///
/// Staff cost grows with the square of the head count.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn payroll(config: &BubblesConfig, marketing_people: u32, influencers: usize) -> f64 {
    let people = f64::from(marketing_people);
    config.marketing_person_salary * people * people + config.influencer_salary * influencers as f64
}

impl WorldState {
    pub(crate) fn stage_upkeep(&mut self) {
        let consumption = self.config.econ_food_consumption;
        for econ in &mut self.econs {
            econ.food -= consumption;
        }
    }

    /// Move starved agents to the dead list, keeping survivors in order.
    pub(crate) fn stage_death_cleanup(&mut self) {
        let (alive, dead): (Vec<Econ>, Vec<Econ>) = std::mem::take(&mut self.econs)
            .into_iter()
            .partition(|econ| econ.food > 0.0);
        self.econs = alive;
        if dead.is_empty() {
            return;
        }
        debug!(
            tick = self.ticks.0,
            died = dead.len(),
            alive = self.econs.len(),
            "agents starved"
        );
        self.dead_econs.extend(dead);
    }

    pub(crate) fn stage_food_spawn(&mut self) {
        let chance = self.config.food_spawn_chance;
        if self.food_pickups.len() >= self.config.food_max_count || chance <= 0.0 {
            return;
        }
        if self.rng.random_bool(chance) {
            let pos = random_in_disk(&mut self.rng, self.config.world_radius);
            self.food_pickups.push(pos);
        }
    }

    pub(crate) fn stage_cash_popups(&mut self) {
        for popup in &mut self.cash_popups {
            popup.remaining_time = popup.remaining_time.saturating_sub(1);
        }
        self.cash_popups.retain(|popup| popup.remaining_time > 0);
    }

    /// Recompute the deprecation factor, then every agent's discounted valuation.
    pub(crate) fn stage_valuation(&mut self) {
        self.deprecation_factor = deprecation_factor(&self.econs, &self.dead_econs, &self.config);
        let factor = self.deprecation_factor;
        for econ in &mut self.econs {
            econ.bubble_value = factor * econ.bubble_value_raw;
        }
    }

    /// Population means; an empty population averages to zero.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn stage_averages(&mut self) {
        let count = self.econs.len();
        let total_value: f64 = self.econs.iter().map(|econ| econ.bubble_value).sum();
        self.total_econ_cash = self.econs.iter().map(|econ| econ.food).sum();
        if count > 0 {
            self.avg_value = total_value / count as f64;
            self.avg_econ_cash = self.total_econ_cash / count as f64;
        } else {
            self.avg_value = 0.0;
            self.avg_econ_cash = 0.0;
        }
    }

    /// Histories, payroll, and persistence on the stats cadence.
    pub(crate) fn stage_checkpoint(&mut self) {
        if !self.ticks.0.is_multiple_of(self.config.stats_interval) {
            return;
        }
        let capacity = self.config.history_capacity;
        push_bounded(&mut self.price_history, capacity, self.avg_value);
        push_bounded(&mut self.player_food_history, capacity, self.player.food);
        push_bounded(
            &mut self.global_cash_history,
            capacity,
            CashSample {
                total: self.total_econ_cash,
                average: self.avg_econ_cash,
            },
        );

        let wages = payroll(
            &self.config,
            self.player.marketing_people,
            self.influencers.len(),
        );
        self.player.food -= wages;
        self.player.marketing_points += f64::from(self.player.marketing_people);

        let summary = self.summary();
        let metrics = vec![
            MetricSample::new("avg_value", summary.avg_value),
            MetricSample::new("deprecation_factor", summary.deprecation_factor),
            MetricSample::new("total_econ_cash", summary.total_econ_cash),
            MetricSample::new("avg_econ_cash", summary.avg_econ_cash),
            MetricSample::new("player_food", summary.player_food),
            MetricSample::new("payroll", wages),
        ];
        let batch = PersistenceBatch {
            summary,
            metrics,
            last_trade: self.last_trade,
        };
        self.persistence.on_sample(&batch);
    }

    pub(crate) fn stage_cost_projection(&mut self) {
        self.player_food_cost_per_second = payroll(
            &self.config,
            self.player.marketing_people,
            self.influencers.len(),
        );
    }

    fn summary(&self) -> TickSummary {
        TickSummary {
            tick: self.ticks,
            econ_count: self.econs.len(),
            dead_count: self.dead_econs.len(),
            avg_value: self.avg_value,
            deprecation_factor: self.deprecation_factor,
            total_econ_cash: self.total_econ_cash,
            avg_econ_cash: self.avg_econ_cash,
            player_food: self.player.food,
            player_bubbles: self.player.bubbles,
            marketing_points: self.player.marketing_points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::quiet_config;
    use crate::{Influencer, Vec2, WorldPersistence};
    use std::sync::{Arc, Mutex};

    fn econ_with(bubbles: u32, food: f64) -> Econ {
        let mut econ = Econ::new(Vec2::ZERO, Vec2::ZERO, food);
        econ.bubbles = bubbles;
        econ
    }

    #[test]
    fn deprecation_tracks_larger_depletion_share() {
        let config = BubblesConfig {
            econ_count: 10,
            player_initial_bubbles: 100,
            ..BubblesConfig::default()
        };
        let alive = vec![econ_with(20, 1.0), econ_with(5, 1.0)];
        let dead = vec![econ_with(5, 0.0)];
        // 30 of 100 bubbles held vs 1 of 10 agents dead.
        assert!((deprecation_factor(&alive, &dead, &config) - 0.7).abs() < 1e-12);

        let dead: Vec<Econ> = (0..5).map(|_| econ_with(0, 0.0)).collect();
        assert!((deprecation_factor(&alive, &dead, &config) - 0.5).abs() < 1e-12);

        let hoard = vec![econ_with(150, 1.0)];
        assert!((deprecation_factor(&hoard, &[], &config) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn deprecation_ignores_empty_denominators() {
        let config = BubblesConfig {
            econ_count: 0,
            player_initial_bubbles: 0,
            ..BubblesConfig::default()
        };
        assert_eq!(deprecation_factor(&[econ_with(3, 1.0)], &[], &config), 1.0);
    }

    #[test]
    fn payroll_is_quadratic_in_staff() {
        let config = BubblesConfig {
            marketing_person_salary: 0.5,
            influencer_salary: 2.0,
            ..BubblesConfig::default()
        };
        assert_eq!(payroll(&config, 0, 0), 0.0);
        assert_eq!(payroll(&config, 4, 0), 8.0);
        assert_eq!(payroll(&config, 4, 3), 14.0);
    }

    #[test]
    fn starved_agent_dies_in_same_tick() {
        let config = BubblesConfig {
            econ_food_consumption: 0.5,
            ..quiet_config()
        };
        let mut world = WorldState::new(config).expect("world");
        let mut doomed = Econ::new(Vec2::new(300.0, 0.0), Vec2::ZERO, 0.5);
        doomed.bubble_value_raw = 100.0;
        doomed.bubble_value = 100.0;
        let mut survivor = Econ::new(Vec2::new(-300.0, 0.0), Vec2::ZERO, 2.0);
        survivor.bubble_value_raw = 2.0;
        survivor.bubble_value = 2.0;
        world.spawn_econ(doomed);
        world.spawn_econ(survivor);

        world.tick();

        assert_eq!(world.econs().len(), 1);
        assert_eq!(world.dead_econs().len(), 1);
        assert_eq!(world.dead_econs()[0].food, 0.0);
        assert_eq!(world.econs()[0].pos, Vec2::new(-300.0, 0.0));
        assert!((world.avg_value() - 2.0).abs() < 1e-12);
        assert!((world.total_econ_cash() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn extinct_population_averages_to_zero() {
        let config = BubblesConfig {
            econ_food_consumption: 1.0,
            ..quiet_config()
        };
        let mut world = WorldState::new(config).expect("world");
        world.spawn_econ(Econ::new(Vec2::new(100.0, 100.0), Vec2::ZERO, 0.5));
        world.tick();
        assert!(world.econs().is_empty());
        assert_eq!(world.avg_value(), 0.0);
        assert_eq!(world.avg_econ_cash(), 0.0);
        assert!(world.avg_value().is_finite());
    }

    #[test]
    fn food_spawn_respects_cap() {
        let config = BubblesConfig {
            food_spawn_chance: 1.0,
            food_max_count: 3,
            ..quiet_config()
        };
        let mut world = WorldState::new(config).expect("world");
        for _ in 0..10 {
            world.tick();
        }
        assert_eq!(world.food_pickups().len(), 3);
        let radius = world.config().world_radius;
        assert!(world.food_pickups().iter().all(|p| p.length() < radius));
    }

    #[test]
    fn cash_popups_expire() {
        let config = BubblesConfig {
            cash_popup_duration: 2,
            ..quiet_config()
        };
        let mut world = WorldState::new(config).expect("world");
        world.bubble_pickups.push(Vec2::new(200.0, 200.0));
        world.spawn_econ(Econ::new(Vec2::new(200.0, 201.0), Vec2::ZERO, 5.0));
        world.tick();
        assert_eq!(world.cash_popups().len(), 1);
        assert_eq!(world.cash_popups()[0].remaining_time, 1);
        world.tick();
        assert!(world.cash_popups().is_empty());
    }

    #[test]
    fn checkpoint_charges_payroll_and_records_history() {
        let config = BubblesConfig {
            stats_interval: 3,
            ..quiet_config()
        };
        let mut world = WorldState::new(config).expect("world");
        world.spawn_econ(Econ::new(Vec2::new(300.0, 0.0), Vec2::ZERO, 4.0));
        world.player_mut().marketing_people = 2;
        world.influencers.push(Influencer {
            pos: Vec2::new(-300.0, 0.0),
            velocity: Vec2::ZERO,
        });
        let start = world.player().food;

        world.tick();
        world.tick();
        assert_eq!(world.price_history().count(), 0);
        assert!((world.player_food_cost_per_second() - 4.0).abs() < 1e-12);

        world.tick();
        assert!((world.player().food - (start - 4.0)).abs() < 1e-12);
        assert_eq!(world.player().marketing_points, 2.0);
        assert_eq!(world.player_food_history().collect::<Vec<_>>(), vec![start]);
        let cash: Vec<CashSample> = world.global_cash_history().collect();
        assert_eq!(
            cash,
            vec![CashSample {
                total: 4.0,
                average: 4.0
            }]
        );
        assert_eq!(world.price_history().count(), 1);
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<TickSummary>>>);

    impl WorldPersistence for Recorder {
        fn on_sample(&mut self, payload: &PersistenceBatch) {
            if let Ok(mut samples) = self.0.lock() {
                samples.push(payload.summary.clone());
            }
        }
    }

    #[test]
    fn persistence_receives_checkpoint_batches() {
        let config = BubblesConfig {
            econ_count: 8,
            stats_interval: 5,
            ..quiet_config()
        };
        let recorder = Recorder::default();
        let mut world =
            WorldState::with_persistence(config, Box::new(recorder.clone())).expect("world");
        for _ in 0..12 {
            world.tick();
        }
        let samples = recorder.0.lock().expect("samples");
        let ticks: Vec<u64> = samples.iter().map(|s| s.tick.0).collect();
        assert_eq!(ticks, vec![5, 10]);
        assert!(samples.iter().all(|s| s.econ_count == 8));
    }

    #[test]
    fn valuation_follows_deprecation() {
        let config = BubblesConfig {
            player_initial_bubbles: 10,
            ..quiet_config()
        };
        let mut world = WorldState::new(config).expect("world");
        let mut holder = Econ::new(Vec2::new(250.0, 0.0), Vec2::ZERO, 5.0);
        holder.bubbles = 4;
        holder.bubble_value_raw = 3.0;
        world.spawn_econ(holder);
        world.tick();
        assert!((world.deprecation_factor() - 0.6).abs() < 1e-12);
        let econ = &world.econs()[0];
        assert!((econ.bubble_value - 1.8).abs() < 1e-12);
    }
}
