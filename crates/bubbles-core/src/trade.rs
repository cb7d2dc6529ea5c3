//! Bilateral and shop trading rules.
//!
//! Trades are whole bubbles exchanged for food at a single price. Both rules
//! are heuristics rather than an order book: an agent sells when it holds more
//! bubbles than it values, buys when it holds fewer, and never pays more than
//! its own valuation.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{Econ, Player, WorldState, push_bounded};

/// Amount and unit price of an agent-to-agent trade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TradeRecord {
    pub amount: u32,
    pub price: f64,
}

/// Direction of a trade with the player's shop, from the agent's side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlayerTradeSide {
    AgentBought,
    AgentSold,
}

/// Outcome of a trade with the player's shop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlayerTrade {
    pub side: PlayerTradeSide,
    pub amount: u32,
    pub price: f64,
}

/// Whole units of `price` payable from `food`; unbounded for free goods.
fn affordable(food: f64, price: f64) -> f64 {
    if price > 0.0 {
        (food / price).floor()
    } else {
        f64::INFINITY
    }
}

/// Positive whole amount, or `None` when the trade should not happen.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_amount(amount: f64) -> Option<u32> {
    if amount >= 1.0 {
        Some(amount.min(f64::from(u32::MAX)) as u32)
    } else {
        None
    }
}

/// Let two agents in contact trade bubbles at the seller's valuation.
///
/// Returns the executed trade, or `None` when no seller/buyer pairing exists,
/// the buyer is broke, the asking price is negative or above the buyer's
/// valuation, or the computed amount is not positive. Food and bubbles move
/// atomically.
pub fn trade_between(a: &mut Econ, b: &mut Econ) -> Option<TradeRecord> {
    let (seller, buyer) = if a.wants_to_sell() && b.wants_to_buy() {
        (a, b)
    } else if b.wants_to_sell() && a.wants_to_buy() {
        (b, a)
    } else {
        return None;
    };
    if buyer.food <= 0.0 {
        return None;
    }
    let price = seller.bubble_value;
    if price < 0.0 || price > buyer.bubble_value {
        return None;
    }
    let amount = whole_amount(
        buyer
            .wanted()
            .min(affordable(buyer.food, price))
            .min(seller.surplus())
            .min(f64::from(seller.bubbles)),
    )?;
    let cost = f64::from(amount) * price;
    seller.bubbles -= amount;
    buyer.bubbles += amount;
    buyer.food -= cost;
    seller.food += cost;
    Some(TradeRecord { amount, price })
}

/// Let an agent standing at the shop buy from or sell to the player.
///
/// Buyers pay the player's selling price if they value bubbles at least that
/// much; sellers ask their own valuation and only if it does not exceed the
/// player's buying price. Amounts are capped by the player's bubble inventory.
pub fn trade_with_player(econ: &mut Econ, player: &mut Player) -> Option<PlayerTrade> {
    if econ.wants_to_buy() {
        let price = player.selling_price;
        if econ.bubble_value < price {
            return None;
        }
        let amount = whole_amount(
            econ.wanted()
                .min(affordable(econ.food, price))
                .min(f64::from(player.bubbles)),
        )?;
        let cost = f64::from(amount) * price;
        player.bubbles -= amount;
        econ.bubbles += amount;
        econ.food -= cost;
        player.food += cost;
        Some(PlayerTrade {
            side: PlayerTradeSide::AgentBought,
            amount,
            price,
        })
    } else if econ.wants_to_sell() {
        let price = econ.bubble_value;
        if price < 0.0 || price > player.buying_price {
            return None;
        }
        let amount = whole_amount(
            econ.surplus()
                .min(f64::from(econ.bubbles))
                .min(f64::from(player.bubbles)),
        )?;
        let cost = f64::from(amount) * price;
        econ.bubbles -= amount;
        player.bubbles += amount;
        player.food -= cost;
        econ.food += cost;
        Some(PlayerTrade {
            side: PlayerTradeSide::AgentSold,
            amount,
            price,
        })
    } else {
        None
    }
}

impl WorldState {
    /// Agents close to the origin deal with the player's shop.
    pub(crate) fn trade_at_market(&mut self, idx: usize) {
        let radius = self.config.market_trade_radius;
        let Some(econ) = self.econs.get_mut(idx) else {
            return;
        };
        if econ.pos.length() >= radius {
            return;
        }
        if let Some(trade) = trade_with_player(econ, &mut self.player) {
            trace!(
                tick = self.ticks.0,
                side = ?trade.side,
                amount = trade.amount,
                price = trade.price,
                "agent traded with player"
            );
        }
    }

    pub(crate) fn record_trade(&mut self, record: TradeRecord) {
        self.last_trade = Some(record);
        push_bounded(
            &mut self.trade_history,
            self.config.history_capacity,
            record.price,
        );
    }
}
