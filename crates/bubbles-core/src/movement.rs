use rand::Rng;
use tracing::trace;

use crate::{Econ, Influencer, WorldState, random_velocity, reflect, trade_between};

/// Disjoint mutable borrows of two slice entries, `i < j`.
fn pair_mut<T>(items: &mut [T], i: usize, j: usize) -> Option<(&mut T, &mut T)> {
    if i >= j {
        return None;
    }
    let (head, tail) = items.split_at_mut(j);
    Some((head.get_mut(i)?, tail.first_mut()?))
}

impl WorldState {
    /// Per-agent pass, in list order.
    pub(crate) fn stage_agents(&mut self) {
        for idx in 0..self.econs.len() {
            self.contain_econ(idx);
            self.apply_billboards(idx);
            self.apply_influencers(idx);
            self.resolve_contacts(idx);
            self.trade_at_market(idx);
            self.collect_food(idx);
            self.collect_bubbles(idx);
            self.integrate_econ(idx);
        }
    }

    /// Bounce agents that left the disk back toward the origin.
    fn contain_econ(&mut self, idx: usize) {
        let radius = self.config.world_radius;
        if let Some(econ) = self.econs.get_mut(idx)
            && econ.pos.length() > radius
        {
            econ.velocity = reflect(econ.velocity, -econ.pos);
        }
    }

    /// Swap velocities with every later agent in contact and let each pair trade.
    fn resolve_contacts(&mut self, idx: usize) {
        let min_distance = self.config.econ_min_distance;
        for other in idx + 1..self.econs.len() {
            let Some((econ, partner)) = pair_mut(&mut self.econs, idx, other) else {
                continue;
            };
            if econ.pos.distance(partner.pos) >= min_distance {
                continue;
            }
            std::mem::swap(&mut econ.velocity, &mut partner.velocity);
            if let Some(record) = trade_between(econ, partner) {
                trace!(
                    tick = self.ticks.0,
                    amount = record.amount,
                    price = record.price,
                    "agents traded bubbles"
                );
                self.record_trade(record);
            }
        }
    }

    /// Unit-step Euler integration plus the occasional erratic turn.
    fn integrate_econ(&mut self, idx: usize) {
        let chance = self.config.econ_random_velocity_chance;
        let Some(econ) = self.econs.get_mut(idx) else {
            return;
        };
        let velocity = econ.velocity;
        econ.pos += velocity;
        if chance > 0.0 && self.rng.random_bool(chance) {
            econ.velocity = random_velocity(&mut self.rng);
        }
    }

    /// Influencers bounce off the rim, exchange velocities on contact, then move.
    pub(crate) fn stage_influencers(&mut self) {
        let radius = self.config.world_radius;
        let min_distance = self.config.econ_min_distance;
        for idx in 0..self.influencers.len() {
            if let Some(influencer) = self.influencers.get_mut(idx)
                && influencer.pos.length() > radius
            {
                influencer.velocity = reflect(influencer.velocity, -influencer.pos);
            }
            for other in idx + 1..self.influencers.len() {
                if let Some((a, b)) = pair_mut(&mut self.influencers, idx, other)
                    && a.pos.distance(b.pos) < min_distance
                {
                    std::mem::swap(&mut a.velocity, &mut b.velocity);
                }
            }
            if let Some(Influencer { pos, velocity }) = self.influencers.get_mut(idx) {
                *pos += *velocity;
            }
        }
    }

    /// Insert an agent at the end of the iteration order.
    pub fn spawn_econ(&mut self, econ: Econ) {
        self.econs.push(econ);
    }
}
