use crate::{CashPopup, WorldState, reflect};

impl WorldState {
    /// Billboards raise the valuation of nearby agents and deflect those touching them.
    pub(crate) fn apply_billboards(&mut self, idx: usize) {
        let influence_radius = self.config.billboard_influence_radius;
        let strength = self.config.billboard_influence_strength;
        let min_distance = self.config.econ_min_distance;
        let Some(econ) = self.econs.get_mut(idx) else {
            return;
        };
        for billboard in &self.billboards {
            let distance = billboard.distance_to(econ.pos);
            if distance < influence_radius {
                econ.bubble_value_raw += strength;
            }
            if distance < min_distance {
                econ.velocity = reflect(econ.velocity, billboard.normal_toward(econ.pos));
            }
        }
    }

    /// Influencers act as mobile billboards; on contact they trade velocities with the agent.
    pub(crate) fn apply_influencers(&mut self, idx: usize) {
        let influence_radius = self.config.billboard_influence_radius;
        let strength = self.config.billboard_influence_strength;
        let min_distance = self.config.econ_min_distance;
        let Some(econ) = self.econs.get_mut(idx) else {
            return;
        };
        for influencer in &mut self.influencers {
            let distance = econ.pos.distance(influencer.pos);
            if distance < influence_radius {
                econ.bubble_value_raw += strength;
            }
            if distance < min_distance {
                std::mem::swap(&mut econ.velocity, &mut influencer.velocity);
            }
        }
    }

    /// First food pickup in reach is eaten.
    pub(crate) fn collect_food(&mut self, idx: usize) {
        let radius = self.config.food_pickup_radius;
        let value = self.config.food_value;
        let Some(econ) = self.econs.get_mut(idx) else {
            return;
        };
        if let Some(slot) = self
            .food_pickups
            .iter()
            .position(|pickup| pickup.distance(econ.pos) < radius)
        {
            self.food_pickups.remove(slot);
            econ.food += value;
        }
    }

    /// First bubble pickup in reach is bought at the agent's discounted valuation.
    ///
    /// Agents that cannot pay, or whose valuation is negative, leave every
    /// pickup in place for someone else.
    pub(crate) fn collect_bubbles(&mut self, idx: usize) {
        let radius = self.config.bubble_pickup_radius;
        let duration = self.config.cash_popup_duration;
        let Some(econ) = self.econs.get_mut(idx) else {
            return;
        };
        let price = econ.bubble_value;
        if price < 0.0 || econ.food < price {
            return;
        }
        let Some(slot) = self
            .bubble_pickups
            .iter()
            .position(|pickup| pickup.distance(econ.pos) < radius)
        else {
            return;
        };
        let pos = self.bubble_pickups.remove(slot);
        econ.food -= price;
        econ.bubbles += 1;
        self.player.food += price;
        self.cash_popups.push(CashPopup {
            remaining_time: duration,
            pos,
            value: price,
        });
    }
}
