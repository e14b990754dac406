//! Two-seat strategy matrix games.
//!
//! Both seats pick a strategy at the same time; the cell at
//! `(row strategy, column strategy)` holds the outcome for the row seat and
//! for the column seat. Outcomes are either costs (travel time, lower is
//! better) or payoffs (points, higher is better). Utility always reads
//! "higher is better": it is the cumulative payoff including this round, with
//! costs negated.
//!
//! The route-choice congestion game is the canonical instance (travel time
//! in minutes):
//!
//! ```text
//!             Route 1   Route 2
//! Route 1      6, 6      2, 4
//! Route 2      4, 2      4, 4
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use altruism_types::AgentId;
use serde::{Deserialize, Serialize};

use crate::error::WorldError;
use crate::scorer::Counterfactual;

/// Weight on the group total in the social-welfare utility.
const SOCIAL_WELFARE_ALPHA: f64 = 0.5;

/// Fehr-Schmidt aversion to being behind the other seat.
const INEQUITY_ALPHA: f64 = 0.3;

/// Fehr-Schmidt aversion to being ahead of the other seat.
const INEQUITY_BETA: f64 = 0.2;

/// How matrix entries are read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeSense {
    /// Entries are costs; lower is better.
    #[default]
    Cost,
    /// Entries are payoffs; higher is better.
    Payoff,
}

impl OutcomeSense {
    /// Convert between a raw entry and a payoff. The conversion is its own
    /// inverse.
    pub const fn convert(self, value: f64) -> f64 {
        match self {
            Self::Cost => -value,
            Self::Payoff => value,
        }
    }
}

/// A strategy, by zero-based position in the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Strategy(pub usize);

impl Strategy {
    /// The one-based number shown to players.
    pub const fn number(self) -> usize {
        self.0.saturating_add(1)
    }

    /// The strategy a one-based number refers to.
    pub const fn from_number(number: usize) -> Option<Self> {
        match number.checked_sub(1) {
            Some(index) => Some(Self(index)),
            None => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Strategy labels and the outcome grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoffMatrix {
    /// Strategy labels, in matrix order.
    pub strategies: Vec<String>,
    /// `outcomes[row][column]` is `(row seat, column seat)`.
    pub outcomes: Vec<Vec<(f64, f64)>>,
    /// Whether entries are costs or payoffs.
    #[serde(default)]
    pub sense: OutcomeSense,
}

impl PayoffMatrix {
    /// Check the grid is square over the strategies and every entry finite.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidMatrix`] for a malformed grid, or
    /// [`WorldError::InvalidParameter`] for a non-finite entry.
    pub fn validate(&self) -> Result<(), WorldError> {
        let n = self.strategies.len();
        if n == 0 {
            return Err(WorldError::InvalidMatrix(
                "at least one strategy is required".to_owned(),
            ));
        }
        if self.outcomes.len() != n || self.outcomes.iter().any(|row| row.len() != n) {
            return Err(WorldError::InvalidMatrix(format!(
                "outcomes must be a {n} x {n} grid"
            )));
        }
        for &(row, column) in self.outcomes.iter().flatten() {
            for value in [row, column] {
                if !value.is_finite() {
                    return Err(WorldError::InvalidParameter {
                        name: "outcomes",
                        value,
                    });
                }
            }
        }
        Ok(())
    }

    /// The strategy whose label matches `label`, ignoring ASCII case.
    pub fn strategy_named(&self, label: &str) -> Option<Strategy> {
        let label = label.trim();
        self.strategies
            .iter()
            .position(|s| s.eq_ignore_ascii_case(label))
            .map(Strategy)
    }

    /// Label of `strategy`.
    pub fn label(&self, strategy: Strategy) -> Option<&str> {
        self.strategies.get(strategy.0).map(String::as_str)
    }

    /// Raw `(row, column)` entries for one cell.
    pub fn outcome(&self, row: Strategy, column: Strategy) -> Option<(f64, f64)> {
        self.outcomes.get(row.0)?.get(column.0).copied()
    }
}

/// A seat entering the round: who sits there, what it banked in earlier
/// rounds (as payoff) and the strategy it plays now.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixSeat {
    /// The seated agent.
    pub agent: AgentId,
    /// Cumulative payoff from earlier rounds.
    pub banked: f64,
    /// Strategy this round.
    pub strategy: Strategy,
}

/// One round of a matrix game, viewed as a counterfactual world.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixWorld {
    matrix: Arc<PayoffMatrix>,
    friends: Arc<BTreeMap<AgentId, BTreeSet<AgentId>>>,
    row: MatrixSeat,
    column: MatrixSeat,
}

impl MatrixWorld {
    /// Seat two agents on a validated matrix.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateProposal`] if both seats hold the same
    /// agent, or [`WorldError::StrategyOutOfRange`] for a strategy outside the
    /// matrix.
    pub fn new(
        matrix: Arc<PayoffMatrix>,
        friends: Arc<BTreeMap<AgentId, BTreeSet<AgentId>>>,
        row: MatrixSeat,
        column: MatrixSeat,
    ) -> Result<Self, WorldError> {
        if row.agent == column.agent {
            return Err(WorldError::DuplicateProposal(row.agent));
        }
        let strategies = matrix.strategies.len();
        for seat in [&row, &column] {
            if seat.strategy.0 >= strategies {
                return Err(WorldError::StrategyOutOfRange {
                    agent: seat.agent.clone(),
                    strategy: seat.strategy.0,
                    strategies,
                });
            }
        }
        Ok(Self {
            matrix,
            friends,
            row,
            column,
        })
    }

    fn seat(&self, agent: &AgentId) -> Option<&MatrixSeat> {
        [&self.row, &self.column]
            .into_iter()
            .find(|s| s.agent == *agent)
    }

    /// `(mine, theirs)` raw entries for `agent` this round.
    fn cell_for(&self, agent: &AgentId) -> Option<(f64, f64)> {
        let (row, column) = self
            .matrix
            .outcome(self.row.strategy, self.column.strategy)?;
        if *agent == self.row.agent {
            Some((row, column))
        } else if *agent == self.column.agent {
            Some((column, row))
        } else {
            None
        }
    }

    /// Raw entry (travel time or points) `agent` receives this round.
    pub fn round_outcome(&self, agent: &AgentId) -> Option<f64> {
        self.cell_for(agent).map(|(mine, _)| mine)
    }

    /// Payoff `agent` receives this round.
    pub fn round_payoff(&self, agent: &AgentId) -> Option<f64> {
        self.round_outcome(agent)
            .map(|raw| self.matrix.sense.convert(raw))
    }

    /// Strategy `agent` plays this round.
    pub fn strategy_of(&self, agent: &AgentId) -> Option<Strategy> {
        self.seat(agent).map(|s| s.strategy)
    }

    /// The seat facing `agent`.
    pub fn opponent_of(&self, agent: &AgentId) -> Option<&AgentId> {
        if *agent == self.row.agent {
            Some(&self.column.agent)
        } else if *agent == self.column.agent {
            Some(&self.row.agent)
        } else {
            None
        }
    }

    /// Observational metrics for `agent` this round.
    ///
    /// Besides the raw outcome and the cumulative outcome, three
    /// other-regarding utilities are derived from the two payoffs `p` (own)
    /// and `q` (other):
    ///
    /// - `social_welfare = (1 - a) p + a (p + q)` with `a = 0.5`
    /// - `inequity_aversion = p - 0.3 max(q - p, 0) - 0.2 max(p - q, 0)`
    /// - `svo_angle = atan2(q, p)` in radians
    pub fn metrics(&self, agent: &AgentId) -> BTreeMap<String, f64> {
        let (Some(seat), Some((mine, theirs))) = (self.seat(agent), self.cell_for(agent)) else {
            return BTreeMap::new();
        };
        let sense = self.matrix.sense;
        let p = sense.convert(mine);
        let q = sense.convert(theirs);

        let social_welfare = (1.0 - SOCIAL_WELFARE_ALPHA).mul_add(p, SOCIAL_WELFARE_ALPHA * (p + q));
        let inequity_aversion =
            INEQUITY_BETA.mul_add(-(p - q).max(0.0), INEQUITY_ALPHA.mul_add(-(q - p).max(0.0), p));

        BTreeMap::from([
            ("outcome".to_owned(), mine),
            ("cumulative_outcome".to_owned(), sense.convert(seat.banked + p)),
            ("strategy".to_owned(), usize_metric(seat.strategy.number())),
            ("social_welfare".to_owned(), social_welfare),
            ("inequity_aversion".to_owned(), inequity_aversion),
            ("svo_angle".to_owned(), q.atan2(p)),
        ])
    }
}

#[allow(clippy::cast_precision_loss)]
const fn usize_metric(n: usize) -> f64 {
    n as f64
}

impl Counterfactual for MatrixWorld {
    type Action = Strategy;

    fn feasible_actions(&self, agent: &AgentId) -> Vec<Strategy> {
        if self.seat(agent).is_none() {
            return Vec::new();
        }
        (0..self.matrix.strategies.len()).map(Strategy).collect()
    }

    fn with_action(&self, agent: &AgentId, action: &Strategy) -> Result<Self, WorldError> {
        let strategies = self.matrix.strategies.len();
        if action.0 >= strategies {
            return Err(WorldError::StrategyOutOfRange {
                agent: agent.clone(),
                strategy: action.0,
                strategies,
            });
        }
        let mut next = self.clone();
        if next.row.agent == *agent {
            next.row.strategy = *action;
        } else if next.column.agent == *agent {
            next.column.strategy = *action;
        } else {
            return Err(WorldError::AgentNotFound(agent.clone()));
        }
        Ok(next)
    }

    fn utility(&self, agent: &AgentId) -> f64 {
        match (self.seat(agent), self.round_payoff(agent)) {
            (Some(seat), Some(payoff)) => seat.banked + payoff,
            _ => 0.0,
        }
    }

    fn friends_of(&self, agent: &AgentId) -> Vec<AgentId> {
        let Some(opponent) = self.opponent_of(agent) else {
            return Vec::new();
        };
        self.friends
            .get(agent)
            .filter(|friends| friends.contains(opponent))
            .map(|_| vec![opponent.clone()])
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::scorer::{ScoringPolicy, score_choice};

    fn id(name: &str) -> AgentId {
        AgentId::from(name)
    }

    fn route_choice() -> PayoffMatrix {
        PayoffMatrix {
            strategies: vec!["Route 1".to_owned(), "Route 2".to_owned()],
            outcomes: vec![
                vec![(6.0, 6.0), (2.0, 4.0)],
                vec![(4.0, 2.0), (4.0, 4.0)],
            ],
            sense: OutcomeSense::Cost,
        }
    }

    fn mutual_friends() -> Arc<BTreeMap<AgentId, BTreeSet<AgentId>>> {
        Arc::new(BTreeMap::from([
            (id("a"), BTreeSet::from([id("b")])),
            (id("b"), BTreeSet::from([id("a")])),
        ]))
    }

    fn world(a: usize, b: usize) -> MatrixWorld {
        MatrixWorld::new(
            Arc::new(route_choice()),
            mutual_friends(),
            MatrixSeat {
                agent: id("a"),
                banked: 0.0,
                strategy: Strategy(a),
            },
            MatrixSeat {
                agent: id("b"),
                banked: -10.0,
                strategy: Strategy(b),
            },
        )
        .unwrap()
    }

    #[test]
    fn rejects_ragged_grid() {
        let mut m = route_choice();
        m.outcomes.pop();
        assert!(matches!(m.validate(), Err(WorldError::InvalidMatrix(_))));
        let mut m = route_choice();
        m.outcomes = vec![vec![(1.0, 1.0)], vec![(1.0, 1.0), (2.0, 2.0)]];
        assert!(m.validate().is_err());
        assert!(route_choice().validate().is_ok());
    }

    #[test]
    fn labels_and_numbers() {
        let m = route_choice();
        assert_eq!(m.strategy_named(" route 2 "), Some(Strategy(1)));
        assert_eq!(m.strategy_named("Route 3"), None);
        assert_eq!(Strategy::from_number(1), Some(Strategy(0)));
        assert_eq!(Strategy::from_number(0), None);
        assert_eq!(Strategy(1).to_string(), "2");
    }

    #[test]
    fn utility_is_negated_cumulative_time() {
        let w = world(0, 1);
        assert_eq!(w.round_outcome(&id("a")), Some(2.0));
        assert_eq!(w.round_outcome(&id("b")), Some(4.0));
        assert_eq!(w.utility(&id("a")), -2.0);
        assert_eq!(w.utility(&id("b")), -14.0);
        assert_eq!(w.utility(&id("nobody")), 0.0);
    }

    #[test]
    fn with_action_moves_only_that_seat() {
        let w = world(1, 1).with_action(&id("a"), &Strategy(0)).unwrap();
        assert_eq!(w.strategy_of(&id("a")), Some(Strategy(0)));
        assert_eq!(w.strategy_of(&id("b")), Some(Strategy(1)));
        assert!(matches!(
            w.with_action(&id("a"), &Strategy(2)),
            Err(WorldError::StrategyOutOfRange { .. })
        ));
        assert!(matches!(
            w.with_action(&id("c"), &Strategy(0)),
            Err(WorldError::AgentNotFound(_))
        ));
    }

    #[test]
    fn yielding_to_a_friend_on_route_two_scores_the_sacrifice() {
        // b is on Route 2. a could take Route 1 for 2 minutes but stays on
        // Route 2 for 4, leaving b's time unchanged.
        let base = world(1, 1);
        let score = score_choice(
            &base,
            &id("a"),
            &Strategy(1),
            ScoringPolicy::default(),
            &mut SmallRng::seed_from_u64(1),
        )
        .unwrap();
        assert_eq!(score.selfish_action, "1");
        assert_eq!(score.numerator, 2.0);
        assert_eq!(score.friends_delta.get(&id("b")).copied(), Some(0.0));
        assert_eq!(score.altruism_score, 2.0);
    }

    #[test]
    fn congesting_a_friend_is_not_altruistic() {
        // b is on Route 1. Joining it costs a two extra minutes and b four.
        let base = world(1, 0);
        let score = score_choice(
            &base,
            &id("a"),
            &Strategy(0),
            ScoringPolicy::default(),
            &mut SmallRng::seed_from_u64(1),
        )
        .unwrap();
        assert_eq!(score.numerator, 2.0);
        assert_eq!(score.friends_harm_sum, 4.0);
        assert_eq!(score.altruism_score, 0.0);
    }

    #[test]
    fn strangers_are_not_friends() {
        let w = MatrixWorld::new(
            Arc::new(route_choice()),
            Arc::new(BTreeMap::new()),
            MatrixSeat {
                agent: id("a"),
                banked: 0.0,
                strategy: Strategy(0),
            },
            MatrixSeat {
                agent: id("b"),
                banked: 0.0,
                strategy: Strategy(0),
            },
        )
        .unwrap();
        assert!(w.friends_of(&id("a")).is_empty());
        assert_eq!(world(0, 0).friends_of(&id("a")), vec![id("b")]);
    }

    #[test]
    fn metrics_follow_the_round_outcome() {
        let m = world(0, 1).metrics(&id("a"));
        assert_eq!(m.get("outcome").copied(), Some(2.0));
        assert_eq!(m.get("cumulative_outcome").copied(), Some(2.0));
        assert_eq!(m.get("strategy").copied(), Some(1.0));
        // p = -2, q = -4.
        assert!((m.get("social_welfare").copied().unwrap() + 4.0).abs() < 1e-9);
        assert!((m.get("inequity_aversion").copied().unwrap() + 2.4).abs() < 1e-9);
        let svo = m.get("svo_angle").copied().unwrap();
        assert!((svo - (-4.0_f64).atan2(-2.0)).abs() < 1e-9);

        let b = world(0, 1).metrics(&id("b"));
        assert_eq!(b.get("cumulative_outcome").copied(), Some(14.0));
    }

    #[test]
    fn payoff_matrices_are_not_negated() {
        let pd = PayoffMatrix {
            strategies: vec!["C".to_owned(), "D".to_owned()],
            outcomes: vec![
                vec![(3.0, 3.0), (0.0, 5.0)],
                vec![(5.0, 0.0), (1.0, 1.0)],
            ],
            sense: OutcomeSense::Payoff,
        };
        let w = MatrixWorld::new(
            Arc::new(pd),
            Arc::new(BTreeMap::new()),
            MatrixSeat {
                agent: id("a"),
                banked: 3.0,
                strategy: Strategy(1),
            },
            MatrixSeat {
                agent: id("b"),
                banked: 0.0,
                strategy: Strategy(0),
            },
        )
        .unwrap();
        assert_eq!(w.utility(&id("a")), 8.0);
        assert_eq!(w.utility(&id("b")), 0.0);
    }

    #[test]
    fn same_agent_cannot_fill_both_seats() {
        let seat = MatrixSeat {
            agent: id("a"),
            banked: 0.0,
            strategy: Strategy(0),
        };
        assert!(matches!(
            MatrixWorld::new(
                Arc::new(route_choice()),
                mutual_friends(),
                seat.clone(),
                seat
            ),
            Err(WorldError::DuplicateProposal(_))
        ));
    }
}
