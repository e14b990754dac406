//! Two-coalition effort allocation.
//!
//! Every seat is a focal agent facing the same gains: it splits 100 units of
//! effort between C1 and C2, and is scored against an empty allocation.

use std::collections::BTreeMap;

use altruism_types::{AgentId, GameKind, LegalActions, MoveValue};
use altruism_world::coalition::TOTAL_EFFORT;
use altruism_world::{CoalitionParams, CoalitionWorld, ScoringPolicy, WorldError, score_choice};
use rand::Rng;
use serde_json::json;

use super::{GameRules, RoundScore, move_of, numeric};
use crate::config::CoalitionConfig;

/// Coalition allocation game.
#[derive(Debug, Clone)]
pub struct CoalitionGame {
    agents: Vec<AgentId>,
    params: CoalitionParams,
    default_allocation: f64,
}

impl CoalitionGame {
    /// Seat `agents` in front of the configured gains.
    pub fn new(config: &CoalitionConfig, agents: Vec<AgentId>) -> Self {
        Self {
            agents,
            params: config.gains.clone(),
            default_allocation: config.default_allocation,
        }
    }
}

impl GameRules for CoalitionGame {
    type Move = f64;

    fn kind(&self) -> GameKind {
        GameKind::Coalition
    }

    fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    fn context(&self, agent: &AgentId, round: u32) -> serde_json::Value {
        json!({
            "round": round,
            "agent": agent,
            "total_effort": TOTAL_EFFORT,
            "own_gain_c1": self.params.own_gain_c1,
            "own_gain_c2": self.params.own_gain_c2,
            "friends_gain_c1": self.params.friends_gain_c1,
            "friends_gain_c2": self.params.friends_gain_c2,
            "friends": self.params.friends,
        })
    }

    fn legal_actions(&self, _agent: &AgentId) -> LegalActions {
        LegalActions::Range {
            min: 0.0,
            max: TOTAL_EFFORT,
        }
    }

    fn validate(&self, _agent: &AgentId, value: &MoveValue) -> Result<f64, String> {
        numeric(value).map(|pct| pct.clamp(0.0, TOTAL_EFFORT))
    }

    fn default_move(&self, _agent: &AgentId) -> f64 {
        self.default_allocation
    }

    fn play_round<R: Rng>(
        &mut self,
        _round: u32,
        moves: &BTreeMap<AgentId, f64>,
        policy: ScoringPolicy,
        rng: &mut R,
    ) -> Result<BTreeMap<AgentId, RoundScore>, WorldError> {
        let mut scores = BTreeMap::new();
        for agent in &self.agents {
            let allocation = move_of(moves, agent)?;
            let base = CoalitionWorld::new(agent.clone(), self.params.clone());
            let score = score_choice(&base, agent, allocation, policy, rng)?;
            let metrics = base.with_allocation(agent, *allocation).metrics();
            scores.insert(agent.clone(), RoundScore { score, metrics });
        }
        Ok(scores)
    }
}
