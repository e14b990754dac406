//! Per-agent, per-round scoring records.
//!
//! A [`ScoringRecord`] is produced once for every agent in every round and is
//! immutable after the session hands it to a result sink. It carries the
//! counterfactual comparison (chosen vs. best selfish action), the effect on
//! the agent's friends, the bounded altruism score, family-specific
//! observational metrics, and the provenance of the move that was scored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::enums::GameKind;
use crate::ids::AgentId;

/// How the scored move came to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// The decision source answered with a legal move.
    Decided {
        /// Attempts used, including the successful one.
        attempts: u32,
    },
    /// The decision source answered, but with a move outside the legal set.
    InvalidAction {
        /// Attempts used.
        attempts: u32,
        /// What the source submitted.
        submitted: String,
    },
    /// Every attempt failed or timed out.
    Defaulted {
        /// Attempts used.
        attempts: u32,
        /// The last error observed.
        error: String,
    },
}

impl Provenance {
    /// Whether the scored move is a substituted default.
    pub const fn is_default(&self) -> bool {
        !matches!(self, Self::Decided { .. })
    }

    /// Number of decision attempts spent on this move.
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Decided { attempts }
            | Self::InvalidAction { attempts, .. }
            | Self::Defaulted { attempts, .. } => *attempts,
        }
    }
}

/// The agent's own utility under one feasible action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionUtility {
    /// The action label.
    pub action: String,
    /// The agent's utility in the world that action produces.
    pub utility: f64,
}

/// The outcome of scoring one agent's move in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRecord {
    /// Game family the record belongs to.
    pub game: GameKind,
    /// Label of the action that was actually resolved.
    pub chosen_action: String,
    /// Label of the best unilateral self-interested alternative.
    pub selfish_action: String,
    /// Agent utility in the chosen world.
    pub utility_chosen: f64,
    /// Agent utility in the best selfish world.
    pub utility_selfish: f64,
    /// Utility sacrificed: `max(0, utility_selfish - utility_chosen)`.
    pub numerator: f64,
    /// Per-friend utility change from the base world to the chosen world.
    pub friends_delta: BTreeMap<AgentId, f64>,
    /// Sum of positive friend deltas.
    pub friends_benefit_sum: f64,
    /// Sum of the magnitudes of negative friend deltas.
    pub friends_harm_sum: f64,
    /// `max(1, friends_benefit_sum)`.
    pub denominator: f64,
    /// Bounded altruism index, never negative.
    pub altruism_score: f64,
    /// Agent utility under every feasible action, in enumeration order.
    pub utilities_by_action: Vec<ActionUtility>,
    /// Family-specific observational metrics (points, stock, distances).
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// How the move was obtained.
    pub provenance: Provenance,
    /// Free text supplied with the move, annotated when a default was used.
    pub rationale: String,
}

impl ScoringRecord {
    /// Look up an observational metric by name.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}
