//! Hedonic group formation.
//!
//! Every seat plays the distinguished focal agent against its own copy of
//! the configured world, so seats never observe each other's moves. With
//! `persist_moves` a seat's resolved world becomes its next round's base;
//! otherwise each round restarts from the configured snapshot.

use std::collections::BTreeMap;

use altruism_types::{AgentId, GameKind, HedonicAction, LegalActions, MoveValue};
use altruism_world::{ScoringPolicy, WorldError, WorldModel, score_choice};
use rand::Rng;
use serde_json::json;

use super::{GameRules, RoundScore, move_of};
use crate::config::HedonicConfig;

/// Hedonic game state across rounds.
#[derive(Debug, Clone)]
pub struct HedonicGame {
    agents: Vec<AgentId>,
    initial: WorldModel,
    worlds: BTreeMap<AgentId, WorldModel>,
    persist_moves: bool,
    default_action: HedonicAction,
}

impl HedonicGame {
    /// Seat `agents` in the configured world.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError`] if the configured membership is not a partition.
    pub fn new(config: &HedonicConfig, agents: Vec<AgentId>) -> Result<Self, WorldError> {
        let initial = config.world()?;
        let worlds = agents
            .iter()
            .map(|a| (a.clone(), initial.clone()))
            .collect();
        Ok(Self {
            agents,
            initial,
            worlds,
            persist_moves: config.persist_moves,
            default_action: config.default_action.clone(),
        })
    }

    /// The world `agent` will act in next round.
    pub fn world_of(&self, agent: &AgentId) -> &WorldModel {
        self.worlds.get(agent).unwrap_or(&self.initial)
    }
}

impl GameRules for HedonicGame {
    type Move = HedonicAction;

    fn kind(&self) -> GameKind {
        GameKind::Hedonic
    }

    fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    fn context(&self, agent: &AgentId, round: u32) -> serde_json::Value {
        let world = self.world_of(agent);
        let relationships = world.relationships();
        let friends: Vec<&AgentId> = relationships.friends_of(agent).collect();
        let enemies: Vec<&AgentId> = relationships.enemies_of(agent).collect();
        json!({
            "round": round,
            "agent": agent,
            "current_group": world.current_group_of(agent),
            "groups": world.groups(),
            "friends": friends,
            "enemies": enemies,
            "utility": world.utility(agent),
        })
    }

    fn legal_actions(&self, agent: &AgentId) -> LegalActions {
        LegalActions::Choice {
            options: self
                .world_of(agent)
                .feasible_actions(agent)
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    fn validate(&self, agent: &AgentId, value: &MoveValue) -> Result<HedonicAction, String> {
        let MoveValue::Text(text) = value else {
            return Err(format!("expected STAY, LEAVE or JOIN <group>, got {value}"));
        };
        let action = HedonicAction::parse_decision(text)
            .ok_or_else(|| format!("unrecognised decision {text:?}"))?;
        if let HedonicAction::Join(group) = &action {
            if self.world_of(agent).members(group).is_none() {
                return Err(format!("group {group} does not exist"));
            }
        }
        Ok(action)
    }

    fn default_move(&self, agent: &AgentId) -> HedonicAction {
        match &self.default_action {
            HedonicAction::Join(group) if self.world_of(agent).members(group).is_none() => {
                HedonicAction::Stay
            }
            action => action.clone(),
        }
    }

    fn play_round<R: Rng>(
        &mut self,
        _round: u32,
        moves: &BTreeMap<AgentId, HedonicAction>,
        policy: ScoringPolicy,
        rng: &mut R,
    ) -> Result<BTreeMap<AgentId, RoundScore>, WorldError> {
        let mut scores = BTreeMap::new();
        for agent in &self.agents {
            let action = move_of(moves, agent)?;
            let base = self.world_of(agent);
            let score = score_choice(base, agent, action, policy, rng)?;
            let chosen = base.apply(agent, action)?;

            let group_size = chosen
                .current_group_of(agent)
                .and_then(|g| chosen.members(g))
                .map_or(0, <[AgentId]>::len);
            let metrics = BTreeMap::from([
                ("utility_before".to_owned(), base.utility(agent)),
                (
                    "group_size".to_owned(),
                    u32::try_from(group_size).map_or(f64::from(u32::MAX), f64::from),
                ),
            ]);
            scores.insert(agent.clone(), RoundScore { score, metrics });

            if self.persist_moves {
                self.worlds.insert(agent.clone(), chosen);
            }
        }
        Ok(scores)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::collections::BTreeSet;

    use altruism_types::GroupId;
    use altruism_world::{Relationships, Weights};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn id(name: &str) -> AgentId {
        AgentId::from(name)
    }

    fn config(persist_moves: bool) -> HedonicConfig {
        let mut relationships = Relationships::default();
        relationships.friends.insert(
            id("You"),
            [id("Alice"), id("Clara")].into_iter().collect::<BTreeSet<_>>(),
        );
        relationships
            .friends
            .insert(id("Bob"), [id("Alice")].into_iter().collect::<BTreeSet<_>>());
        HedonicConfig {
            groups: BTreeMap::from([
                (GroupId::from("Group A"), vec![id("You"), id("Alice"), id("Clara")]),
                (GroupId::from("Group B"), vec![id("Bob")]),
            ]),
            relationships,
            weights: Weights::default(),
            persist_moves,
            default_action: HedonicAction::Stay,
        }
    }

    fn game(persist_moves: bool) -> HedonicGame {
        HedonicGame::new(&config(persist_moves), vec![id("You"), id("Bob")]).unwrap()
    }

    #[test]
    fn legal_actions_list_every_feasible_move() {
        let g = game(false);
        assert_eq!(
            g.legal_actions(&id("You")),
            LegalActions::Choice {
                options: vec!["STAY".to_owned(), "LEAVE".to_owned(), "JOIN Group B".to_owned()]
            }
        );
    }

    #[test]
    fn validate_parses_text_and_rejects_unknown_groups() {
        let g = game(false);
        assert_eq!(
            g.validate(&id("You"), &MoveValue::from("join Group B")),
            Ok(HedonicAction::Join(GroupId::from("Group B")))
        );
        assert!(g.validate(&id("You"), &MoveValue::from("JOIN Group Z")).is_err());
        assert!(g.validate(&id("You"), &MoveValue::from("dance")).is_err());
        assert!(g.validate(&id("You"), &MoveValue::Number(1.0)).is_err());
    }

    #[test]
    fn context_shows_own_relationships() {
        let g = game(false);
        let ctx = g.context(&id("You"), 1);
        assert_eq!(ctx["current_group"], "Group A");
        assert_eq!(ctx["friends"], json!(["Alice", "Clara"]));
        assert_eq!(ctx["utility"], json!(2.0));
    }

    #[test]
    fn seats_do_not_see_each_other_and_reset_without_persistence() {
        let mut g = game(false);
        let moves = BTreeMap::from([
            (id("You"), HedonicAction::Leave),
            (id("Bob"), HedonicAction::Join(GroupId::from("Group A"))),
        ]);
        let mut rng = SmallRng::seed_from_u64(1);
        let scores = g
            .play_round(1, &moves, ScoringPolicy::default(), &mut rng)
            .unwrap();

        let you = scores.get(&id("You")).unwrap();
        assert_eq!(you.score.chosen_action, "LEAVE");
        assert_eq!(you.score.numerator, 2.0);
        // Bob joined You's group in his own world only: You still counts the
        // configured membership.
        assert_eq!(you.metrics.get("utility_before").copied(), Some(2.0));

        let bob = scores.get(&id("Bob")).unwrap();
        assert_eq!(bob.score.utility_chosen, 1.0);
        assert_eq!(bob.metrics.get("group_size").copied(), Some(4.0));

        assert_eq!(
            g.world_of(&id("You")).current_group_of(&id("You")),
            Some(&GroupId::from("Group A"))
        );
    }

    #[test]
    fn persisted_moves_carry_into_the_next_round() {
        let mut g = game(true);
        let moves = BTreeMap::from([
            (id("You"), HedonicAction::Leave),
            (id("Bob"), HedonicAction::Stay),
        ]);
        let mut rng = SmallRng::seed_from_u64(1);
        g.play_round(1, &moves, ScoringPolicy::default(), &mut rng)
            .unwrap();
        assert_eq!(
            g.world_of(&id("You")).current_group_of(&id("You")),
            Some(&GroupId::from("Solo-You"))
        );
    }

    #[test]
    fn join_default_falls_back_to_stay_when_group_is_gone() {
        let mut cfg = config(true);
        cfg.default_action = HedonicAction::Join(GroupId::from("Group B"));
        let mut g = HedonicGame::new(&cfg, vec![id("Bob")]).unwrap();
        assert_eq!(
            g.default_move(&id("Bob")),
            HedonicAction::Join(GroupId::from("Group B"))
        );

        let moves = BTreeMap::from([(id("Bob"), HedonicAction::Join(GroupId::from("Group A")))]);
        let mut rng = SmallRng::seed_from_u64(1);
        g.play_round(1, &moves, ScoringPolicy::default(), &mut rng)
            .unwrap();
        assert_eq!(g.default_move(&id("Bob")), HedonicAction::Stay);
    }

    #[test]
    fn missing_move_is_a_world_error() {
        let mut g = game(false);
        let moves = BTreeMap::from([(id("You"), HedonicAction::Stay)]);
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(
            g.play_round(1, &moves, ScoringPolicy::default(), &mut rng),
            Err(WorldError::AgentNotFound(id("Bob")))
        );
    }
}
