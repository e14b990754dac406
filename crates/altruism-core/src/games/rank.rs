//! Rank-slot congestion across rounds.
//!
//! Each round every seat proposes a rank, the board is resolved once with a
//! seed drawn from the session random source, and each agent is scored
//! against the same board with its own proposal withdrawn. Points accumulate
//! per agent across rounds.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use altruism_types::{AgentId, GameKind, LegalActions, MoveValue};
use altruism_world::{RankOutcome, RankWorld, ScoringPolicy, WorldError, score_choice};
use rand::Rng;
use serde_json::json;
use tracing::debug;

use super::{GameRules, RoundScore, move_of};
use crate::config::RankConfig;

/// Rank congestion state across rounds.
#[derive(Debug, Clone)]
pub struct RankGame {
    agents: Vec<AgentId>,
    ranks: u32,
    default_rank: u32,
    friends: Arc<BTreeMap<AgentId, BTreeSet<AgentId>>>,
    cumulative: BTreeMap<AgentId, u32>,
    last_outcome: Option<RankOutcome>,
}

impl RankGame {
    /// Seat `agents` on the configured board.
    pub fn new(config: &RankConfig, agents: Vec<AgentId>) -> Self {
        Self {
            agents,
            ranks: config.ranks,
            default_rank: config.default_rank(),
            friends: Arc::new(config.friends.clone()),
            cumulative: BTreeMap::new(),
            last_outcome: None,
        }
    }

    /// Points `agent` has accumulated so far.
    pub fn cumulative_points(&self, agent: &AgentId) -> u32 {
        self.cumulative.get(agent).copied().unwrap_or(0)
    }

    /// The board from the most recent round.
    pub const fn last_outcome(&self) -> Option<&RankOutcome> {
        self.last_outcome.as_ref()
    }
}

impl GameRules for RankGame {
    type Move = u32;

    fn kind(&self) -> GameKind {
        GameKind::Rank
    }

    fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    fn context(&self, agent: &AgentId, round: u32) -> serde_json::Value {
        let last_board = self.last_outcome.as_ref().map(RankOutcome::placements);
        let last_rank = self
            .last_outcome
            .as_ref()
            .and_then(|o| o.final_rank_of(agent));
        json!({
            "round": round,
            "agent": agent,
            "ranks": self.ranks,
            "players": self.agents.len(),
            "cumulative_points": self.cumulative_points(agent),
            "last_rank": last_rank,
            "last_board": last_board,
        })
    }

    fn legal_actions(&self, _agent: &AgentId) -> LegalActions {
        LegalActions::Integer {
            min: 1,
            max: i64::from(self.ranks),
        }
    }

    fn validate(&self, _agent: &AgentId, value: &MoveValue) -> Result<u32, String> {
        let n = value
            .as_integer()
            .ok_or_else(|| format!("expected a whole rank, got {value}"))?;
        u32::try_from(n)
            .ok()
            .filter(|r| (1..=self.ranks).contains(r))
            .ok_or_else(|| format!("rank {n} is outside 1..={}", self.ranks))
    }

    fn default_move(&self, _agent: &AgentId) -> u32 {
        self.default_rank
    }

    fn play_round<R: Rng>(
        &mut self,
        round: u32,
        moves: &BTreeMap<AgentId, u32>,
        policy: ScoringPolicy,
        rng: &mut R,
    ) -> Result<BTreeMap<AgentId, RoundScore>, WorldError> {
        let proposals = self
            .agents
            .iter()
            .map(|agent| move_of(moves, agent).map(|rank| (agent.clone(), *rank)))
            .collect::<Result<Vec<_>, _>>()?;
        let seed = rng.random::<u64>();
        let world = RankWorld::resolve(self.ranks, proposals, seed, Arc::clone(&self.friends))?;
        debug!(round, seed, unranked = world.outcome().unranked().len(), "Rank board resolved");

        let mut scores = BTreeMap::new();
        for agent in &self.agents {
            let proposed = move_of(moves, agent)?;
            let base = world.without(agent)?;
            let score = score_choice(&base, agent, proposed, policy, rng)?;

            let points = world.outcome().points(agent);
            let total = self
                .cumulative
                .get(agent)
                .copied()
                .unwrap_or(0)
                .checked_add(points)
                .ok_or(WorldError::ArithmeticOverflow)?;
            self.cumulative.insert(agent.clone(), total);

            let metrics = BTreeMap::from([
                (
                    "final_rank".to_owned(),
                    f64::from(world.outcome().final_rank_of(agent).unwrap_or(0)),
                ),
                ("points".to_owned(), f64::from(points)),
                ("cumulative_points".to_owned(), f64::from(total)),
                ("proposed_rank".to_owned(), f64::from(*proposed)),
            ]);
            scores.insert(agent.clone(), RoundScore { score, metrics });
        }

        self.last_outcome = Some(world.outcome().clone());
        Ok(scores)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn id(name: &str) -> AgentId {
        AgentId::from(name)
    }

    fn config(ranks: u32) -> RankConfig {
        RankConfig {
            ranks,
            friends: BTreeMap::from([(id("a"), BTreeSet::from([id("b")]))]),
            default_rank: None,
        }
    }

    #[test]
    fn validate_accepts_whole_ranks_on_the_board() {
        let g = RankGame::new(&config(4), vec![id("a")]);
        assert_eq!(g.validate(&id("a"), &MoveValue::Number(2.0)), Ok(2));
        assert_eq!(g.validate(&id("a"), &MoveValue::from(" 4 ")), Ok(4));
        assert!(g.validate(&id("a"), &MoveValue::Number(0.0)).is_err());
        assert!(g.validate(&id("a"), &MoveValue::Number(5.0)).is_err());
        assert!(g.validate(&id("a"), &MoveValue::Number(2.5)).is_err());
        assert!(g.validate(&id("a"), &MoveValue::from("first")).is_err());
        assert_eq!(g.default_move(&id("a")), 4);
    }

    #[test]
    fn uncontested_proposals_earn_points_and_accumulate() {
        let mut g = RankGame::new(&config(3), vec![id("a"), id("b")]);
        let moves = BTreeMap::from([(id("a"), 1), (id("b"), 2)]);
        let mut rng = SmallRng::seed_from_u64(5);
        for _ in 0..2 {
            g.play_round(1, &moves, ScoringPolicy::default(), &mut rng)
                .unwrap();
        }
        assert_eq!(g.cumulative_points(&id("a")), 6);
        assert_eq!(g.cumulative_points(&id("b")), 4);
        assert_eq!(
            g.last_outcome().and_then(|o| o.final_rank_of(&id("b"))),
            Some(2)
        );
    }

    #[test]
    fn proposal_behind_a_friend_shifts_into_the_gap() {
        // b takes rank 1 whether or not a plays. a's proposal of 3 shifts up
        // into the gap at rank 2.
        let mut g = RankGame::new(&config(3), vec![id("a"), id("b")]);
        let moves = BTreeMap::from([(id("a"), 3), (id("b"), 1)]);
        let mut rng = SmallRng::seed_from_u64(11);
        let scores = g
            .play_round(1, &moves, ScoringPolicy::default(), &mut rng)
            .unwrap();

        let a = scores.get(&id("a")).unwrap();
        assert_eq!(a.metrics.get("final_rank").copied(), Some(2.0));
        assert_eq!(a.metrics.get("proposed_rank").copied(), Some(3.0));
        assert_eq!(a.score.utility_chosen, 2.0);
        assert_eq!(a.score.friends_delta.get(&id("b")).copied(), Some(0.0));
        assert!(a.score.altruism_score >= 0.0);
    }

    #[test]
    fn every_agent_is_placed_once_under_congestion() {
        let agents: Vec<AgentId> = (0..8).map(|i| AgentId::new(format!("agent-{i}"))).collect();
        let proposed = [3, 5, 3, 3, 4, 4, 4, 4];
        let moves: BTreeMap<AgentId, u32> = agents.iter().cloned().zip(proposed).collect();
        let mut g = RankGame::new(&config(8), agents.clone());
        let mut rng = SmallRng::seed_from_u64(3);
        let scores = g
            .play_round(1, &moves, ScoringPolicy::default(), &mut rng)
            .unwrap();

        let mut ranks: Vec<f64> = agents
            .iter()
            .filter_map(|a| scores.get(a)?.metrics.get("final_rank").copied())
            .collect();
        ranks.sort_by(f64::total_cmp);
        assert_eq!(ranks, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn context_reports_the_previous_board() {
        let mut g = RankGame::new(&config(2), vec![id("a")]);
        assert_eq!(g.context(&id("a"), 1)["last_rank"], serde_json::Value::Null);
        let moves = BTreeMap::from([(id("a"), 2)]);
        g.play_round(1, &moves, ScoringPolicy::default(), &mut SmallRng::seed_from_u64(1))
            .unwrap();
        let ctx = g.context(&id("a"), 2);
        assert_eq!(ctx["last_rank"], json!(1));
        assert_eq!(ctx["cumulative_points"], json!(2));
    }
}
