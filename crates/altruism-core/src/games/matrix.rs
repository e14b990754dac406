//! Two-seat strategy matrix across rounds.
//!
//! Both seats choose at once and the round is read off the payoff matrix.
//! Each seat is scored against the same round with its own choice replaced
//! by the default strategy (Route 2 in the route-choice game). Payoffs
//! accumulate per seat across rounds.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use altruism_types::{AgentId, GameKind, LegalActions, MoveValue};
use altruism_world::{
    Counterfactual, MatrixSeat, MatrixWorld, PayoffMatrix, ScoringPolicy, Strategy, WorldError,
    score_choice,
};
use rand::Rng;
use serde_json::json;
use tracing::debug;

use super::{GameRules, RoundScore, move_of};
use crate::config::MatrixConfig;

/// Matrix game state across rounds.
#[derive(Debug, Clone)]
pub struct MatrixGame {
    agents: Vec<AgentId>,
    matrix: Arc<PayoffMatrix>,
    friends: Arc<BTreeMap<AgentId, BTreeSet<AgentId>>>,
    default_strategy: Strategy,
    banked: BTreeMap<AgentId, f64>,
    last_moves: BTreeMap<AgentId, Strategy>,
}

impl MatrixGame {
    /// Seat `agents` (row seat first) on the configured matrix.
    pub fn new(config: &MatrixConfig, agents: Vec<AgentId>) -> Self {
        Self {
            agents,
            matrix: Arc::new(config.matrix.clone()),
            friends: Arc::new(config.friends.clone()),
            default_strategy: config.default_strategy().unwrap_or(Strategy(0)),
            banked: BTreeMap::new(),
            last_moves: BTreeMap::new(),
        }
    }

    /// Payoff `agent` has accumulated so far.
    pub fn banked(&self, agent: &AgentId) -> f64 {
        self.banked.get(agent).copied().unwrap_or(0.0)
    }

    /// Accumulated raw outcome (total travel time, total points).
    pub fn cumulative_outcome(&self, agent: &AgentId) -> f64 {
        self.matrix.sense.convert(self.banked(agent))
    }

    fn opponent_of(&self, agent: &AgentId) -> Option<&AgentId> {
        self.agents.iter().find(|a| *a != agent)
    }

    fn is_row(&self, agent: &AgentId) -> bool {
        self.agents.first() == Some(agent)
    }

    fn last_label(&self, agent: Option<&AgentId>) -> Option<&str> {
        let strategy = self.last_moves.get(agent?)?;
        self.matrix.label(*strategy)
    }

    /// Every cell as seen by `agent`: its strategy, the other seat's
    /// strategy, and both outcomes.
    fn outcomes_for(&self, agent: &AgentId) -> Vec<serde_json::Value> {
        let n = self.matrix.strategies.len();
        let row_seat = self.is_row(agent);
        let mut cells = Vec::new();
        for mine in (0..n).map(Strategy) {
            for theirs in (0..n).map(Strategy) {
                let cell = if row_seat {
                    self.matrix.outcome(mine, theirs)
                } else {
                    self.matrix.outcome(theirs, mine).map(|(r, c)| (c, r))
                };
                if let Some((mine_outcome, their_outcome)) = cell {
                    cells.push(json!({
                        "mine": mine.number(),
                        "theirs": theirs.number(),
                        "my_outcome": mine_outcome,
                        "their_outcome": their_outcome,
                    }));
                }
            }
        }
        cells
    }
}

impl GameRules for MatrixGame {
    type Move = Strategy;

    fn kind(&self) -> GameKind {
        GameKind::Matrix
    }

    fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    fn context(&self, agent: &AgentId, round: u32) -> serde_json::Value {
        let strategies: Vec<serde_json::Value> = self
            .matrix
            .strategies
            .iter()
            .enumerate()
            .map(|(i, label)| json!({ "number": Strategy(i).number(), "label": label }))
            .collect();
        json!({
            "round": round,
            "agent": agent,
            "sense": self.matrix.sense,
            "strategies": strategies,
            "outcomes": self.outcomes_for(agent),
            "cumulative_outcome": self.cumulative_outcome(agent),
            "last_self": self.last_label(Some(agent)),
            "last_other": self.last_label(self.opponent_of(agent)),
        })
    }

    fn legal_actions(&self, _agent: &AgentId) -> LegalActions {
        LegalActions::Integer {
            min: 1,
            max: i64::try_from(self.matrix.strategies.len()).unwrap_or(i64::MAX),
        }
    }

    fn validate(&self, _agent: &AgentId, value: &MoveValue) -> Result<Strategy, String> {
        let strategies = self.matrix.strategies.len();
        let strategy = match value.as_integer() {
            Some(n) => usize::try_from(n).ok().and_then(Strategy::from_number),
            None => match value {
                MoveValue::Text(label) => self.matrix.strategy_named(label),
                MoveValue::Number(_) => None,
            },
        };
        strategy
            .filter(|s| s.0 < strategies)
            .ok_or_else(|| format!("{value} is not a strategy in 1..={strategies}"))
    }

    fn default_move(&self, _agent: &AgentId) -> Strategy {
        self.default_strategy
    }

    fn play_round<R: Rng>(
        &mut self,
        round: u32,
        moves: &BTreeMap<AgentId, Strategy>,
        policy: ScoringPolicy,
        rng: &mut R,
    ) -> Result<BTreeMap<AgentId, RoundScore>, WorldError> {
        let (Some(row), Some(column)) = (self.agents.first(), self.agents.get(1)) else {
            return Err(WorldError::InvalidMatrix(
                "a matrix game seats exactly two agents".to_owned(),
            ));
        };
        let seats = [row.clone(), column.clone()];
        let [row, column] = &seats;

        let world = MatrixWorld::new(
            Arc::clone(&self.matrix),
            Arc::clone(&self.friends),
            MatrixSeat {
                agent: row.clone(),
                banked: self.banked(row),
                strategy: *move_of(moves, row)?,
            },
            MatrixSeat {
                agent: column.clone(),
                banked: self.banked(column),
                strategy: *move_of(moves, column)?,
            },
        )?;
        debug!(
            round,
            row = %row,
            column = %column,
            row_outcome = world.round_outcome(row),
            column_outcome = world.round_outcome(column),
            "Matrix round resolved"
        );

        let mut scores = BTreeMap::new();
        for agent in &seats {
            let chosen = move_of(moves, agent)?;
            let base = world.with_action(agent, &self.default_strategy)?;
            let score = score_choice(&base, agent, chosen, policy, rng)?;
            scores.insert(
                agent.clone(),
                RoundScore {
                    score,
                    metrics: world.metrics(agent),
                },
            );
        }

        for agent in &seats {
            let total = self.banked(agent) + world.round_payoff(agent).unwrap_or(0.0);
            self.banked.insert(agent.clone(), total);
            if let Some(strategy) = world.strategy_of(agent) {
                self.last_moves.insert(agent.clone(), strategy);
            }
        }
        Ok(scores)
    }
}
