//! Counterfactual altruism scoring.
//!
//! Given a base world (before the agent acted) and the action the agent
//! actually took, the scorer:
//!
//! 1. Evaluates the agent's own utility under every feasible unilateral
//!    action and picks the best one (the selfish baseline).
//! 2. Measures the utility the agent gave up:
//!    `numerator = max(0, u_selfish - u_chosen)`.
//! 3. Measures each friend's utility change from the base world to the
//!    chosen world, split into total benefit and total harm.
//! 4. Normalizes by `denominator = max(1, benefit)` and deducts harm
//!    according to the configured [`HarmDeduction`].
//! 5. Clamps the result at zero.
//!
//! The scorer is generic over [`Counterfactual`], which every game world
//! implements.

use std::collections::BTreeMap;
use std::fmt;

use altruism_types::{ActionUtility, AgentId, GameKind, Provenance, ScoringRecord};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::WorldError;

/// Utilities closer than this are treated as tied.
const TIE_TOLERANCE: f64 = 1e-9;

/// A world snapshot that can be re-evaluated under alternative actions.
pub trait Counterfactual: Sized {
    /// One unilateral move an agent can make in this world.
    type Action: Clone + fmt::Display;

    /// Every action `agent` may take, in a stable enumeration order.
    fn feasible_actions(&self, agent: &AgentId) -> Vec<Self::Action>;

    /// The world that results from `agent` taking `action`, all else equal.
    fn with_action(&self, agent: &AgentId, action: &Self::Action) -> Result<Self, WorldError>;

    /// Payoff of `agent` in this world.
    fn utility(&self, agent: &AgentId) -> f64;

    /// Agents whose welfare counts toward `agent`'s altruism.
    fn friends_of(&self, agent: &AgentId) -> Vec<AgentId>;
}

/// Where friend harm is deducted relative to normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarmDeduction {
    /// `(numerator - harm) / denominator`.
    #[default]
    NetThenNormalize,
    /// `numerator / denominator - harm`.
    NormalizeThenNet,
}

impl HarmDeduction {
    /// Apply the deduction and clamp at zero.
    pub fn score(self, numerator: f64, harm: f64, denominator: f64) -> f64 {
        let raw = match self {
            Self::NetThenNormalize => (numerator - harm) / denominator,
            Self::NormalizeThenNet => numerator / denominator - harm,
        };
        raw.max(0.0)
    }
}

/// How ties in the selfish-baseline search are broken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfishTieBreak {
    /// The first maximizing action in enumeration order wins.
    #[default]
    FirstSeen,
    /// A maximizing action is drawn uniformly from the session random source.
    Uniform,
}

/// Scoring knobs that are fixed for a whole session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Harm deduction form.
    #[serde(default)]
    pub harm_deduction: HarmDeduction,
    /// Selfish-baseline tie-break.
    #[serde(default)]
    pub tie_break: SelfishTieBreak,
}

/// Result of scoring one agent's choice against its selfish baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterfactualScore {
    /// Label of the chosen action.
    pub chosen_action: String,
    /// Label of the selfish baseline action.
    pub selfish_action: String,
    /// Agent utility in the chosen world.
    pub utility_chosen: f64,
    /// Agent utility in the selfish world.
    pub utility_selfish: f64,
    /// Utility sacrificed.
    pub numerator: f64,
    /// Friend utility change, base world to chosen world.
    pub friends_delta: BTreeMap<AgentId, f64>,
    /// Sum of positive friend deltas.
    pub friends_benefit_sum: f64,
    /// Sum of negative friend delta magnitudes.
    pub friends_harm_sum: f64,
    /// `max(1, friends_benefit_sum)`.
    pub denominator: f64,
    /// Final clamped score.
    pub altruism_score: f64,
    /// Agent utility under each feasible action.
    pub utilities_by_action: Vec<ActionUtility>,
}

impl CounterfactualScore {
    /// Attach game-level context and turn the score into a [`ScoringRecord`].
    pub fn into_record(
        self,
        game: GameKind,
        metrics: BTreeMap<String, f64>,
        provenance: Provenance,
        rationale: String,
    ) -> ScoringRecord {
        ScoringRecord {
            game,
            chosen_action: self.chosen_action,
            selfish_action: self.selfish_action,
            utility_chosen: self.utility_chosen,
            utility_selfish: self.utility_selfish,
            numerator: self.numerator,
            friends_delta: self.friends_delta,
            friends_benefit_sum: self.friends_benefit_sum,
            friends_harm_sum: self.friends_harm_sum,
            denominator: self.denominator,
            altruism_score: self.altruism_score,
            utilities_by_action: self.utilities_by_action,
            metrics,
            provenance,
            rationale,
        }
    }
}

/// Score `agent`'s `chosen` action taken from `base`.
///
/// The chosen world is `base.with_action(agent, chosen)`. If the agent has no
/// feasible actions the selfish baseline collapses onto the chosen action and
/// the score is zero.
///
/// # Errors
///
/// Propagates any [`WorldError`] raised while building the chosen world or an
/// alternative world.
pub fn score_choice<W, R>(
    base: &W,
    agent: &AgentId,
    chosen: &W::Action,
    policy: ScoringPolicy,
    rng: &mut R,
) -> Result<CounterfactualScore, WorldError>
where
    W: Counterfactual,
    R: Rng,
{
    let chosen_world = base.with_action(agent, chosen)?;
    let utility_chosen = chosen_world.utility(agent);

    let mut utilities_by_action = Vec::new();
    for action in base.feasible_actions(agent) {
        let world = base.with_action(agent, &action)?;
        utilities_by_action.push(ActionUtility {
            action: action.to_string(),
            utility: world.utility(agent),
        });
    }

    let (selfish_action, utility_selfish) =
        match pick_selfish(&utilities_by_action, policy.tie_break, rng) {
            Some(best) => (best.action.clone(), best.utility),
            None => (chosen.to_string(), utility_chosen),
        };

    let numerator = (utility_selfish - utility_chosen).max(0.0);

    let mut friends_delta = BTreeMap::new();
    let mut friends_benefit_sum = 0.0;
    let mut friends_harm_sum = 0.0;
    for friend in base.friends_of(agent) {
        let delta = chosen_world.utility(&friend) - base.utility(&friend);
        friends_benefit_sum += delta.max(0.0);
        friends_harm_sum += (-delta).max(0.0);
        friends_delta.insert(friend, delta);
    }

    let denominator = friends_benefit_sum.max(1.0);
    let altruism_score = if numerator > 0.0 {
        policy
            .harm_deduction
            .score(numerator, friends_harm_sum, denominator)
    } else {
        0.0
    };

    Ok(CounterfactualScore {
        chosen_action: chosen.to_string(),
        selfish_action,
        utility_chosen,
        utility_selfish,
        numerator,
        friends_delta,
        friends_benefit_sum,
        friends_harm_sum,
        denominator,
        altruism_score,
        utilities_by_action,
    })
}

/// Choose the utility-maximizing action under the given tie-break.
fn pick_selfish<'a, R: Rng>(
    utilities: &'a [ActionUtility],
    tie_break: SelfishTieBreak,
    rng: &mut R,
) -> Option<&'a ActionUtility> {
    let best = utilities
        .iter()
        .map(|u| u.utility)
        .fold(f64::NEG_INFINITY, f64::max);
    let mut tied = utilities
        .iter()
        .filter(|u| (best - u.utility).abs() <= TIE_TOLERANCE);

    match tie_break {
        SelfishTieBreak::FirstSeen => tied.next(),
        SelfishTieBreak::Uniform => {
            let tied: Vec<&ActionUtility> = tied.collect();
            if tied.is_empty() {
                return None;
            }
            tied.get(rng.random_range(0..tied.len())).copied()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::collections::BTreeSet;

    use altruism_types::{GroupId, HedonicAction};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::hedonic::{Relationships, Weights, WorldModel};

    fn id(name: &str) -> AgentId {
        AgentId::from(name)
    }

    fn set(names: &[&str]) -> BTreeSet<AgentId> {
        names.iter().map(|n| id(n)).collect()
    }

    fn world(relationships: Relationships) -> WorldModel {
        let mut groups = BTreeMap::new();
        groups.insert(GroupId::from("Group A"), vec![id("You"), id("Alice"), id("Clara")]);
        groups.insert(GroupId::from("Group B"), vec![id("Bob")]);
        WorldModel::new(groups, relationships, Weights::default()).unwrap()
    }

    fn mutual_friends() -> Relationships {
        let mut r = Relationships::default();
        r.friends.insert(id("You"), set(&["Alice", "Clara"]));
        r.friends.insert(id("Alice"), set(&["You", "Clara"]));
        r.friends.insert(id("Clara"), set(&["You", "Alice"]));
        r
    }

    #[test]
    fn stay_is_the_selfish_baseline_among_friends() {
        let base = world(mutual_friends());
        let mut rng = SmallRng::seed_from_u64(7);
        let score = score_choice(
            &base,
            &id("You"),
            &HedonicAction::Stay,
            ScoringPolicy::default(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(score.selfish_action, "STAY");
        assert_eq!(score.numerator, 0.0);
        assert_eq!(score.altruism_score, 0.0);
        assert_eq!(score.utilities_by_action.len(), 3);
    }

    #[test]
    fn leaving_mutual_friends_scores_zero_under_both_deductions() {
        let base = world(mutual_friends());
        for harm_deduction in [HarmDeduction::NetThenNormalize, HarmDeduction::NormalizeThenNet] {
            let policy = ScoringPolicy {
                harm_deduction,
                tie_break: SelfishTieBreak::FirstSeen,
            };
            let mut rng = SmallRng::seed_from_u64(7);
            let score =
                score_choice(&base, &id("You"), &HedonicAction::Leave, policy, &mut rng).unwrap();
            assert_eq!(score.numerator, 2.0);
            assert_eq!(score.friends_harm_sum, 2.0);
            assert_eq!(score.friends_benefit_sum, 0.0);
            assert_eq!(score.altruism_score, 0.0);
        }
    }

    #[test]
    fn leaving_that_relieves_a_friend_scores_positive() {
        // Alice resents You; Clara is indifferent. Leaving costs You two
        // friends but lifts Alice's utility by one.
        let mut r = Relationships::default();
        r.friends.insert(id("You"), set(&["Alice", "Clara"]));
        r.friends.insert(id("Alice"), set(&["Clara"]));
        r.enemies.insert(id("Alice"), set(&["You"]));
        r.friends.insert(id("Clara"), set(&["Alice"]));
        let base = world(r);

        let mut rng = SmallRng::seed_from_u64(7);
        let score = score_choice(
            &base,
            &id("You"),
            &HedonicAction::Leave,
            ScoringPolicy::default(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(score.selfish_action, "STAY");
        assert_eq!(score.friends_delta.get(&id("Alice")).copied(), Some(1.0));
        assert_eq!(score.friends_delta.get(&id("Clara")).copied(), Some(0.0));
        assert_eq!(score.denominator, 1.0);
        assert_eq!(score.altruism_score, 2.0);
    }

    #[test]
    fn harm_deduction_forms_differ_when_benefit_exceeds_one() {
        assert_eq!(HarmDeduction::NetThenNormalize.score(4.0, 1.0, 2.0), 1.5);
        assert_eq!(HarmDeduction::NormalizeThenNet.score(4.0, 1.0, 2.0), 1.0);
        assert_eq!(HarmDeduction::NormalizeThenNet.score(1.0, 5.0, 1.0), 0.0);
    }

    #[test]
    fn uniform_tie_break_is_reproducible_with_a_seed() {
        let utilities = vec![
            ActionUtility {
                action: "a".to_owned(),
                utility: 1.0,
            },
            ActionUtility {
                action: "b".to_owned(),
                utility: 1.0,
            },
            ActionUtility {
                action: "c".to_owned(),
                utility: 0.0,
            },
        ];
        let first = pick_selfish(&utilities, SelfishTieBreak::FirstSeen, &mut SmallRng::seed_from_u64(1));
        assert_eq!(first.map(|u| u.action.as_str()), Some("a"));

        let x = pick_selfish(&utilities, SelfishTieBreak::Uniform, &mut SmallRng::seed_from_u64(3));
        let y = pick_selfish(&utilities, SelfishTieBreak::Uniform, &mut SmallRng::seed_from_u64(3));
        assert_eq!(x, y);
        assert_ne!(x.map(|u| u.action.as_str()), Some("c"));
    }

    #[test]
    fn no_feasible_actions_scores_zero() {
        assert!(pick_selfish(&[], SelfishTieBreak::Uniform, &mut SmallRng::seed_from_u64(1)).is_none());
    }
}
