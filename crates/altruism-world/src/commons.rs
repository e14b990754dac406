//! Shared-stock resource commons.
//!
//! Each round every consumer crew draws a scalar amount from a common stock.
//! The stock and the consumer population then evolve under predator-prey
//! style dynamics:
//!
//! ```text
//! Δstock     = growth_rate * stock - catch_rate * stock * consumers - Σ draws
//! Δconsumers = recruitment_rate * stock * consumers - quitting_rate * consumers
//! ```
//!
//! The logistic variant replaces the growth term with
//! `growth_rate * stock * (1 - stock / K)` scaled by bounded multiplicative
//! noise, and subtracts a collapse penalty proportional to how far the total
//! draw overshoots `yield_threshold`. Both quantities are floored at zero.

use std::collections::BTreeMap;

use altruism_types::AgentId;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{WorldError, non_negative};
use crate::scorer::Counterfactual;

/// Ecological constants of a commons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommonsParams {
    /// Natural stock growth rate.
    #[serde(default = "default_growth_rate")]
    pub growth_rate: f64,
    /// Background catch rate per consumer.
    #[serde(default = "default_catch_rate")]
    pub catch_rate: f64,
    /// Consumers recruited per unit of stock.
    #[serde(default = "default_recruitment_rate")]
    pub recruitment_rate: f64,
    /// Consumers quitting per round.
    #[serde(default = "default_quitting_rate")]
    pub quitting_rate: f64,
    /// Largest draw a single crew may take in one round.
    pub max_draw: f64,
    /// Which population model to run.
    #[serde(default)]
    pub dynamics: Dynamics,
}

const fn default_growth_rate() -> f64 {
    0.1
}

const fn default_catch_rate() -> f64 {
    0.02
}

const fn default_recruitment_rate() -> f64 {
    0.005
}

const fn default_quitting_rate() -> f64 {
    0.1
}

impl CommonsParams {
    /// Check that every constant is finite and non-negative.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidParameter`] naming the first bad constant.
    pub fn validated(self) -> Result<Self, WorldError> {
        non_negative("growth_rate", self.growth_rate)?;
        non_negative("catch_rate", self.catch_rate)?;
        non_negative("recruitment_rate", self.recruitment_rate)?;
        non_negative("quitting_rate", self.quitting_rate)?;
        non_negative("max_draw", self.max_draw)?;
        if let Dynamics::Logistic {
            carrying_capacity,
            yield_threshold,
            collapse_rate,
            noise,
        } = self.dynamics
        {
            non_negative("carrying_capacity", carrying_capacity)?;
            non_negative("yield_threshold", yield_threshold)?;
            non_negative("collapse_rate", collapse_rate)?;
            non_negative("noise", noise)?;
            if carrying_capacity <= 0.0 {
                return Err(WorldError::InvalidParameter {
                    name: "carrying_capacity",
                    value: carrying_capacity,
                });
            }
            if noise >= 1.0 {
                return Err(WorldError::InvalidParameter {
                    name: "noise",
                    value: noise,
                });
            }
        }
        Ok(self)
    }

    /// Clamp a proposed draw into `[0, max_draw]`.
    pub fn clamp_draw(&self, draw: f64) -> f64 {
        draw.clamp(0.0, self.max_draw)
    }
}

/// Population model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum Dynamics {
    /// Plain predator-prey update.
    #[default]
    Simple,
    /// Carrying-capacity growth with overstrain collapse and noise.
    Logistic {
        /// Stock level at which growth stops.
        carrying_capacity: f64,
        /// Total draw above which the collapse penalty applies.
        yield_threshold: f64,
        /// Stock lost per unit of draw above the threshold.
        collapse_rate: f64,
        /// Half-width of the multiplicative growth noise, in `[0, 1)`.
        #[serde(default)]
        noise: f64,
    },
}

/// Stock and consumer population between rounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommonsState {
    /// Resource units in the commons.
    pub stock: f64,
    /// Number of consumers drawing on it.
    pub consumers: f64,
}

impl CommonsState {
    /// Whether the commons has been exhausted.
    pub fn is_depleted(&self) -> bool {
        self.stock <= 0.0
    }

    /// Advance one round after `total_draw` units were taken.
    ///
    /// The RNG is only consulted by the logistic variant with non-zero noise.
    pub fn step<R: Rng>(self, params: &CommonsParams, total_draw: f64, rng: &mut R) -> Self {
        let predation = params.catch_rate * self.stock * self.consumers;
        let growth = match params.dynamics {
            Dynamics::Simple => params.growth_rate * self.stock,
            Dynamics::Logistic {
                carrying_capacity,
                noise,
                ..
            } => {
                let factor = if noise > 0.0 {
                    1.0 + rng.random_range(-noise..=noise)
                } else {
                    1.0
                };
                params.growth_rate * self.stock * (1.0 - self.stock / carrying_capacity) * factor
            }
        };
        let collapse = match params.dynamics {
            Dynamics::Simple => 0.0,
            Dynamics::Logistic {
                yield_threshold,
                collapse_rate,
                ..
            } => collapse_rate * (total_draw - yield_threshold).max(0.0),
        };

        let delta_stock = growth - predation - total_draw - collapse;
        let delta_consumers = params.recruitment_rate * self.stock * self.consumers
            - params.quitting_rate * self.consumers;

        Self {
            stock: (self.stock + delta_stock).max(0.0),
            consumers: (self.consumers + delta_consumers).max(0.0),
        }
    }
}

/// One round of draws from a commons, viewed as a counterfactual world.
///
/// A crew's utility is its own draw. Draws do not feed back into anybody's
/// payoff within the round, so friend deltas are always zero.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonsWorld {
    params: CommonsParams,
    state: CommonsState,
    draws: BTreeMap<AgentId, f64>,
}

impl CommonsWorld {
    /// A round starting from `state` with no draws yet.
    pub const fn new(params: CommonsParams, state: CommonsState) -> Self {
        Self {
            params,
            state,
            draws: BTreeMap::new(),
        }
    }

    /// Record `agent`'s draw, clamped into `[0, max_draw]`.
    #[must_use]
    pub fn with_draw(&self, agent: &AgentId, draw: f64) -> Self {
        let mut next = self.clone();
        next.draws.insert(agent.clone(), self.params.clamp_draw(draw));
        next
    }

    /// The same round with `agent`'s draw removed.
    #[must_use]
    pub fn without(&self, agent: &AgentId) -> Self {
        let mut next = self.clone();
        next.draws.remove(agent);
        next
    }

    /// State at the start of the round.
    pub const fn state(&self) -> CommonsState {
        self.state
    }

    /// The recorded draws.
    pub const fn draws(&self) -> &BTreeMap<AgentId, f64> {
        &self.draws
    }

    /// Sum of all draws.
    pub fn total_draw(&self) -> f64 {
        self.draws.values().sum()
    }

    /// Observational metrics for `agent` in this round.
    ///
    /// `relative_harvest` and `marginal_impact` compare the agent's draw to
    /// the largest draw of the round; `deviation_from_selfish` compares it to
    /// the even per-consumer share of the stock.
    pub fn metrics(&self, agent: &AgentId, next: CommonsState) -> BTreeMap<String, f64> {
        let draw = self.draws.get(agent).copied().unwrap_or(0.0);
        let x_max = self.draws.values().copied().fold(0.0, f64::max);
        let stock = self.state.stock;

        let relative_harvest = if x_max > 0.0 { 1.0 - draw / x_max } else { 0.0 };
        let marginal_impact = if stock > 0.0 && x_max > 0.0 {
            1.0 - (draw / stock) / (x_max / stock)
        } else {
            0.0
        };
        let fair_share = if self.state.consumers > 0.0 {
            stock / self.state.consumers
        } else {
            stock
        };

        BTreeMap::from([
            ("draw".to_owned(), draw),
            ("relative_harvest".to_owned(), relative_harvest),
            ("marginal_impact".to_owned(), marginal_impact),
            ("deviation_from_selfish".to_owned(), fair_share - draw),
            ("stock_before".to_owned(), stock),
            ("stock_after".to_owned(), next.stock),
            ("consumers_after".to_owned(), next.consumers),
        ])
    }
}

impl Counterfactual for CommonsWorld {
    type Action = f64;

    fn feasible_actions(&self, _agent: &AgentId) -> Vec<f64> {
        vec![0.0, self.params.max_draw]
    }

    fn with_action(&self, agent: &AgentId, action: &f64) -> Result<Self, WorldError> {
        Ok(self.with_draw(agent, *action))
    }

    fn utility(&self, agent: &AgentId) -> f64 {
        self.draws.get(agent).copied().unwrap_or(0.0)
    }

    fn friends_of(&self, _agent: &AgentId) -> Vec<AgentId> {
        Vec::new()
    }
}
