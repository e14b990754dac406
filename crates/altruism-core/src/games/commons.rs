//! Shared-stock commons across rounds.
//!
//! All crews draw from the same stock simultaneously. The stock then advances
//! once under the configured dynamics, and the game is over as soon as the
//! stock is exhausted.

use std::collections::BTreeMap;

use altruism_types::{AgentId, GameKind, LegalActions, MoveValue};
use altruism_world::{
    CommonsParams, CommonsState, CommonsWorld, ScoringPolicy, WorldError, score_choice,
};
use rand::Rng;
use serde_json::json;
use tracing::info;

use super::{GameRules, RoundScore, move_of, numeric};
use crate::config::CommonsConfig;

/// Commons state across rounds.
#[derive(Debug, Clone)]
pub struct CommonsGame {
    agents: Vec<AgentId>,
    params: CommonsParams,
    state: CommonsState,
    default_draw: f64,
}

impl CommonsGame {
    /// Seat `agents` at the configured commons.
    pub const fn new(config: &CommonsConfig, agents: Vec<AgentId>) -> Self {
        Self {
            agents,
            params: config.ecology,
            state: CommonsState {
                stock: config.initial_stock,
                consumers: config.initial_consumers,
            },
            default_draw: config.default_draw,
        }
    }

    /// Stock and population at the start of the next round.
    pub const fn state(&self) -> CommonsState {
        self.state
    }
}

impl GameRules for CommonsGame {
    type Move = f64;

    fn kind(&self) -> GameKind {
        GameKind::Commons
    }

    fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    fn context(&self, agent: &AgentId, round: u32) -> serde_json::Value {
        json!({
            "round": round,
            "agent": agent,
            "stock": self.state.stock,
            "consumers": self.state.consumers,
            "crews": self.agents.len(),
            "max_draw": self.params.max_draw,
        })
    }

    fn legal_actions(&self, _agent: &AgentId) -> LegalActions {
        LegalActions::Range {
            min: 0.0,
            max: self.params.max_draw,
        }
    }

    fn validate(&self, _agent: &AgentId, value: &MoveValue) -> Result<f64, String> {
        numeric(value).map(|draw| self.params.clamp_draw(draw))
    }

    fn default_move(&self, _agent: &AgentId) -> f64 {
        self.params.clamp_draw(self.default_draw)
    }

    fn play_round<R: Rng>(
        &mut self,
        round: u32,
        moves: &BTreeMap<AgentId, f64>,
        policy: ScoringPolicy,
        rng: &mut R,
    ) -> Result<BTreeMap<AgentId, RoundScore>, WorldError> {
        let mut world = CommonsWorld::new(self.params, self.state);
        for agent in &self.agents {
            world = world.with_draw(agent, *move_of(moves, agent)?);
        }
        let next = self.state.step(&self.params, world.total_draw(), rng);

        let mut scores = BTreeMap::new();
        for agent in &self.agents {
            let draw = move_of(moves, agent)?;
            let base = world.without(agent);
            let score = score_choice(&base, agent, draw, policy, rng)?;
            let metrics = world.metrics(agent, next);
            scores.insert(agent.clone(), RoundScore { score, metrics });
        }

        info!(
            round,
            total_draw = world.total_draw(),
            stock_before = self.state.stock,
            stock_after = next.stock,
            consumers_after = next.consumers,
            "Commons advanced"
        );
        self.state = next;
        Ok(scores)
    }

    fn is_over(&self) -> bool {
        self.state.is_depleted()
    }
}
