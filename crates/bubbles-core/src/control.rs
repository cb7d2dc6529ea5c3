//! Player actions applied between ticks.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{Billboard, Influencer, Vec2, WorldState, random_in_disk, random_velocity};

/// A single player action, as issued by a script or a frontend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlCommand {
    PlaceBillboard { a: Vec2, b: Vec2 },
    PlaceInfluencer { pos: Vec2 },
    DropBubbles { center: Vec2, count: u32 },
    SetSellingPrice { price: f64 },
    SetBuyingPrice { price: f64 },
    SetMarketingPeople { count: u32 },
}

/// Reasons a player action is refused. A refused action leaves the world untouched.
#[derive(Debug, Error, PartialEq)]
pub enum ControlError {
    #[error("need {required} marketing points, have {available}")]
    InsufficientPoints { required: f64, available: f64 },
    #[error("need {required} bubbles, have {available}")]
    InsufficientBubbles { required: u32, available: u32 },
    #[error("price must be finite and non-negative, got {0}")]
    InvalidPrice(f64),
    #[error("billboard endpoints coincide")]
    DegenerateBillboard,
}

/// Which marketing devices the player can currently pay for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketingDevices {
    pub billboard: bool,
    pub influencer: bool,
}

fn validate_price(price: f64) -> Result<f64, ControlError> {
    if price.is_finite() && price >= 0.0 {
        Ok(price)
    } else {
        Err(ControlError::InvalidPrice(price))
    }
}

impl WorldState {
    fn spend_points(&mut self, cost: f64) -> Result<(), ControlError> {
        let available = self.player.marketing_points;
        if available < cost {
            return Err(ControlError::InsufficientPoints {
                required: cost,
                available,
            });
        }
        self.player.marketing_points -= cost;
        Ok(())
    }

    /// Build a billboard along the segment `a`..`b`.
    pub fn place_billboard(&mut self, a: Vec2, b: Vec2) -> Result<(), ControlError> {
        if a == b {
            return Err(ControlError::DegenerateBillboard);
        }
        self.spend_points(self.config.billboard_point_cost)?;
        self.billboards.push(Billboard::new(a, b));
        info!(tick = self.ticks.0, ?a, ?b, "billboard placed");
        Ok(())
    }

    /// Hire an influencer starting at `pos` with a random heading.
    pub fn place_influencer(&mut self, pos: Vec2) -> Result<(), ControlError> {
        self.spend_points(self.config.influencer_point_cost)?;
        let velocity = random_velocity(&mut self.rng);
        self.influencers.push(Influencer { pos, velocity });
        info!(tick = self.ticks.0, ?pos, "influencer hired");
        Ok(())
    }

    /// Scatter `count` bubbles from the player's inventory around `center`.
    pub fn drop_bubbles(&mut self, center: Vec2, count: u32) -> Result<(), ControlError> {
        let available = self.player.bubbles;
        if count > available {
            return Err(ControlError::InsufficientBubbles {
                required: count,
                available,
            });
        }
        self.player.bubbles -= count;
        let spread = self.config.bubble_batch_spread;
        for _ in 0..count {
            let offset = if spread > 0.0 {
                random_in_disk(&mut self.rng, spread)
            } else {
                Vec2::ZERO
            };
            self.bubble_pickups.push(center + offset);
        }
        Ok(())
    }

    pub fn set_selling_price(&mut self, price: f64) -> Result<(), ControlError> {
        self.player.selling_price = validate_price(price)?;
        Ok(())
    }

    pub fn set_buying_price(&mut self, price: f64) -> Result<(), ControlError> {
        self.player.buying_price = validate_price(price)?;
        Ok(())
    }

    /// Staff change takes effect on the next payroll and the cost projection.
    pub fn set_marketing_people(&mut self, count: u32) {
        self.player.marketing_people = count;
        self.stage_cost_projection();
    }

    #[must_use]
    pub fn available_marketing_devices(&self) -> MarketingDevices {
        let points = self.player.marketing_points;
        MarketingDevices {
            billboard: points >= self.config.billboard_point_cost,
            influencer: points >= self.config.influencer_point_cost,
        }
    }
}

/// Apply a command to the world.
pub fn apply_control_command(
    world: &mut WorldState,
    command: ControlCommand,
) -> Result<(), ControlError> {
    match command {
        ControlCommand::PlaceBillboard { a, b } => world.place_billboard(a, b),
        ControlCommand::PlaceInfluencer { pos } => world.place_influencer(pos),
        ControlCommand::DropBubbles { center, count } => world.drop_bubbles(center, count),
        ControlCommand::SetSellingPrice { price } => world.set_selling_price(price),
        ControlCommand::SetBuyingPrice { price } => world.set_buying_price(price),
        ControlCommand::SetMarketingPeople { count } => {
            world.set_marketing_people(count);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::quiet_config;

    fn world() -> WorldState {
        WorldState::new(quiet_config()).expect("world")
    }

    #[test]
    fn billboard_costs_marketing_points() {
        let mut world = world();
        let err = world
            .place_billboard(Vec2::ZERO, Vec2::new(10.0, 0.0))
            .expect_err("no points");
        assert_eq!(
            err,
            ControlError::InsufficientPoints {
                required: 20.0,
                available: 0.0
            }
        );
        assert!(world.billboards().is_empty());

        world.player_mut().marketing_points = 25.0;
        world
            .place_billboard(Vec2::ZERO, Vec2::new(10.0, 0.0))
            .expect("billboard");
        assert_eq!(world.billboards().len(), 1);
        assert_eq!(world.player().marketing_points, 5.0);
    }

    #[test]
    fn degenerate_billboard_is_refused_without_charge() {
        let mut world = world();
        world.player_mut().marketing_points = 100.0;
        let point = Vec2::new(3.0, 4.0);
        assert_eq!(
            world.place_billboard(point, point),
            Err(ControlError::DegenerateBillboard)
        );
        assert_eq!(world.player().marketing_points, 100.0);
    }

    #[test]
    fn influencer_gets_bounded_random_heading() {
        let mut world = world();
        world.player_mut().marketing_points = 50.0;
        world.place_influencer(Vec2::new(40.0, 40.0)).expect("influencer");
        let influencer = world.influencers()[0];
        assert_eq!(influencer.pos, Vec2::new(40.0, 40.0));
        assert!(influencer.velocity.x.abs() <= 1.0 && influencer.velocity.y.abs() <= 1.0);
        assert_eq!(world.player().marketing_points, 0.0);
        assert!(world.place_influencer(Vec2::ZERO).is_err());
    }

    #[test]
    fn dropped_bubbles_leave_player_inventory() {
        let mut world = world();
        let before = world.player().bubbles;
        let center = Vec2::new(-100.0, 50.0);
        world.drop_bubbles(center, 12).expect("drop");
        assert_eq!(world.player().bubbles, before - 12);
        assert_eq!(world.bubble_pickups().len(), 12);
        let spread = world.config().bubble_batch_spread;
        assert!(
            world
                .bubble_pickups()
                .iter()
                .all(|p| p.distance(center) < spread)
        );
    }

    #[test]
    fn dropping_more_than_inventory_fails() {
        let mut world = world();
        world.player_mut().bubbles = 3;
        let err = world.drop_bubbles(Vec2::ZERO, 4).expect_err("too many");
        assert_eq!(
            err,
            ControlError::InsufficientBubbles {
                required: 4,
                available: 3
            }
        );
        assert!(world.bubble_pickups().is_empty());
        assert_eq!(world.player().bubbles, 3);
    }

    #[test]
    fn prices_must_be_non_negative() {
        let mut world = world();
        world.set_selling_price(3.5).expect("price");
        assert_eq!(world.player().selling_price, 3.5);
        assert!(world.set_buying_price(-1.0).is_err());
        assert!(world.set_buying_price(f64::NAN).is_err());
        assert_eq!(
            world.player().buying_price,
            world.config().player_buying_price
        );
    }

    #[test]
    fn staffing_updates_cost_projection() {
        let mut world = world();
        world.set_marketing_people(3);
        assert!((world.player_food_cost_per_second() - 4.5).abs() < 1e-12);
    }

    #[test]
    fn device_availability_tracks_points() {
        let mut world = world();
        assert_eq!(world.available_marketing_devices(), MarketingDevices::default());
        world.player_mut().marketing_points = 20.0;
        assert_eq!(
            world.available_marketing_devices(),
            MarketingDevices {
                billboard: true,
                influencer: false
            }
        );
        world.player_mut().marketing_points = 50.0;
        assert!(world.available_marketing_devices().influencer);
    }

    #[test]
    fn commands_parse_from_tagged_json() {
        let command: ControlCommand =
            serde_json::from_str(r#"{"kind":"drop_bubbles","center":{"x":1.0,"y":2.0},"count":5}"#)
                .expect("command");
        assert_eq!(
            command,
            ControlCommand::DropBubbles {
                center: Vec2::new(1.0, 2.0),
                count: 5
            }
        );
        let mut world = world();
        apply_control_command(&mut world, command).expect("apply");
        assert_eq!(world.bubble_pickups().len(), 5);
    }
}
