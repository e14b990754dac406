//! Effort allocation between two coalitions.
//!
//! A focal agent splits 100 units of effort between coalition C1 (where its
//! own payoff lies) and C2 (where its friends work). With `a` the C1 share in
//! `[0, 1]`:
//!
//! ```text
//! own utility    = own_gain_c1 * a + own_gain_c2 * (1 - a)
//! friend utility = friends_gain_c1 * a + friends_gain_c2 * (1 - a)
//! ```
//!
//! Three reference preference models predict an allocation by weighting
//! (own, friends) gains: self-focused `SF = (M, 1)`, equal `EQ = (1, 1)`
//! and altruistic `AL = (1, M)`. The coalition with the highest weighted gain
//! receives all 100 units; tied coalitions split them evenly.

use std::collections::BTreeMap;

use altruism_types::AgentId;
use serde::{Deserialize, Serialize};

use crate::error::{WorldError, non_negative};
use crate::scorer::Counterfactual;

/// Total effort units a focal agent allocates.
pub const TOTAL_EFFORT: f64 = 100.0;

/// Step between enumerated counterfactual allocations.
const ALLOCATION_STEP: usize = 10;

/// Gains that shape one coalition scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoalitionParams {
    /// Focal agent payoff per unit share of effort in C1.
    pub own_gain_c1: f64,
    /// Focal agent payoff per unit share of effort in C2.
    pub own_gain_c2: f64,
    /// Each friend's payoff per unit share of effort in C1.
    pub friends_gain_c1: f64,
    /// Each friend's payoff per unit share of effort in C2.
    pub friends_gain_c2: f64,
    /// Weight the preference models put on the favored side.
    #[serde(rename = "m")]
    pub model_weight: f64,
    /// Friends of the focal agent.
    #[serde(default)]
    pub friends: Vec<AgentId>,
}

impl CoalitionParams {
    /// Check that every gain is finite and the model weight non-negative.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidParameter`] naming the first bad value.
    pub fn validate(&self) -> Result<(), WorldError> {
        for (name, value) in [
            ("own_gain_c1", self.own_gain_c1),
            ("own_gain_c2", self.own_gain_c2),
            ("friends_gain_c1", self.friends_gain_c1),
            ("friends_gain_c2", self.friends_gain_c2),
        ] {
            if !value.is_finite() {
                return Err(WorldError::InvalidParameter { name, value });
            }
        }
        non_negative("m", self.model_weight)?;
        Ok(())
    }

    /// Predicted `(C1, C2)` allocation under the given preference model.
    pub fn predict(&self, model: PreferenceModel) -> (f64, f64) {
        let (w_own, w_friends) = model.weights(self.model_weight);
        let c1 = w_own.mul_add(self.own_gain_c1, w_friends * self.friends_gain_c1);
        let c2 = w_own.mul_add(self.own_gain_c2, w_friends * self.friends_gain_c2);
        if (c1 - c2).abs() < 1e-12 {
            (TOTAL_EFFORT / 2.0, TOTAL_EFFORT / 2.0)
        } else if c1 > c2 {
            (TOTAL_EFFORT, 0.0)
        } else {
            (0.0, TOTAL_EFFORT)
        }
    }

    /// Euclidean distance from a C1 allocation (percent) to each model's prediction.
    pub fn distances(&self, c1_percent: f64) -> BTreeMap<PreferenceModel, f64> {
        let c1 = c1_percent.clamp(0.0, TOTAL_EFFORT);
        let c2 = TOTAL_EFFORT - c1;
        PreferenceModel::ALL
            .into_iter()
            .map(|model| {
                let (p1, p2) = self.predict(model);
                (model, (c1 - p1).hypot(c2 - p2))
            })
            .collect()
    }
}

/// Reference preference models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PreferenceModel {
    /// Self-focused: own gains weighted by `M`.
    #[serde(rename = "SF")]
    SelfFocused,
    /// Equal weighting.
    #[serde(rename = "EQ")]
    Equal,
    /// Altruistic: friends' gains weighted by `M`.
    #[serde(rename = "AL")]
    Altruistic,
}

impl PreferenceModel {
    /// Every model, in report order.
    pub const ALL: [Self; 3] = [Self::SelfFocused, Self::Equal, Self::Altruistic];

    /// `(own, friends)` weights for model weight `m`.
    pub const fn weights(self, m: f64) -> (f64, f64) {
        match self {
            Self::SelfFocused => (m, 1.0),
            Self::Equal => (1.0, 1.0),
            Self::Altruistic => (1.0, m),
        }
    }

    /// Metric key for the distance to this model's prediction.
    pub const fn distance_key(self) -> &'static str {
        match self {
            Self::SelfFocused => "sf_distance",
            Self::Equal => "eq_distance",
            Self::Altruistic => "al_distance",
        }
    }
}

/// A focal agent's allocation, viewed as a counterfactual world.
///
/// The base world has no allocation, so every utility is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct CoalitionWorld {
    focal: AgentId,
    params: CoalitionParams,
    c1_percent: Option<f64>,
}

impl CoalitionWorld {
    /// A world where `focal` has not yet allocated any effort.
    pub const fn new(focal: AgentId, params: CoalitionParams) -> Self {
        Self {
            focal,
            params,
            c1_percent: None,
        }
    }

    /// The same world with `agent` allocating `c1_percent` to C1 (clamped to
    /// `[0, 100]`). Only the focal agent can allocate; anyone else leaves the
    /// world unchanged.
    #[must_use]
    pub fn with_allocation(&self, agent: &AgentId, c1_percent: f64) -> Self {
        let mut next = self.clone();
        if *agent == self.focal {
            next.c1_percent = Some(c1_percent.clamp(0.0, TOTAL_EFFORT));
        }
        next
    }

    /// Current C1 allocation in percent, if one was made.
    pub const fn allocation(&self) -> Option<f64> {
        self.c1_percent
    }

    /// The scenario parameters.
    pub const fn params(&self) -> &CoalitionParams {
        &self.params
    }

    /// Observational metrics: allocations and distances to each model.
    pub fn metrics(&self) -> BTreeMap<String, f64> {
        let c1 = self.c1_percent.unwrap_or(0.0);
        let mut metrics = BTreeMap::from([
            ("allocation_c1".to_owned(), c1),
            ("allocation_c2".to_owned(), TOTAL_EFFORT - c1),
        ]);
        for (model, distance) in self.params.distances(c1) {
            metrics.insert(model.distance_key().to_owned(), distance);
        }
        metrics
    }
}

impl Counterfactual for CoalitionWorld {
    type Action = f64;

    fn feasible_actions(&self, _agent: &AgentId) -> Vec<f64> {
        (0..=100_u32)
            .step_by(ALLOCATION_STEP)
            .map(f64::from)
            .collect()
    }

    fn with_action(&self, agent: &AgentId, action: &f64) -> Result<Self, WorldError> {
        Ok(self.with_allocation(agent, *action))
    }

    fn utility(&self, agent: &AgentId) -> f64 {
        let Some(pct) = self.c1_percent else {
            return 0.0;
        };
        let a = pct / TOTAL_EFFORT;
        if *agent == self.focal {
            self.params
                .own_gain_c1
                .mul_add(a, self.params.own_gain_c2 * (1.0 - a))
        } else if self.params.friends.contains(agent) {
            self.params
                .friends_gain_c1
                .mul_add(a, self.params.friends_gain_c2 * (1.0 - a))
        } else {
            0.0
        }
    }

    fn friends_of(&self, agent: &AgentId) -> Vec<AgentId> {
        if *agent == self.focal {
            self.params.friends.clone()
        } else {
            Vec::new()
        }
    }
}
