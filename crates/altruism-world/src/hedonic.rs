//! Hedonic group-formation world.
//!
//! A [`WorldModel`] is a snapshot of which agents sit in which group, plus
//! the (session-constant) friend/enemy graph and the global utility weights.
//! Every transition returns a new snapshot; the receiver is never mutated, so
//! "world under STAY" and "world under JOIN g" can be held side by side.
//!
//! Utility of an agent in group `G`:
//!
//! ```text
//! w_friend * |friends(agent) ∩ G| - w_enemy * |enemies(agent) ∩ G|
//! ```
//!
//! An agent with no group is implicitly solo and has utility 0.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use altruism_types::{AgentId, GroupId, HedonicAction};
use serde::{Deserialize, Serialize};

use crate::error::{WorldError, non_negative};
use crate::scorer::Counterfactual;

/// Prefix for groups minted when an agent leaves.
const SOLO_PREFIX: &str = "Solo-";

/// Global multipliers applied to every agent's hedonic utility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    /// Weight of each friend sharing the agent's group.
    #[serde(default = "default_weight")]
    pub w_friend: f64,
    /// Weight of each enemy sharing the agent's group.
    #[serde(default = "default_weight")]
    pub w_enemy: f64,
}

const fn default_weight() -> f64 {
    1.0
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            w_friend: default_weight(),
            w_enemy: default_weight(),
        }
    }
}

impl Weights {
    /// Validate that both weights are finite and non-negative.
    pub fn validated(self) -> Result<Self, WorldError> {
        non_negative("w_friend", self.w_friend)?;
        non_negative("w_enemy", self.w_enemy)?;
        Ok(self)
    }
}

/// Friend and enemy sets per agent. Immutable for the lifetime of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationships {
    /// Agents each agent counts as a friend.
    #[serde(default)]
    pub friends: BTreeMap<AgentId, BTreeSet<AgentId>>,
    /// Agents each agent counts as an enemy.
    #[serde(default)]
    pub enemies: BTreeMap<AgentId, BTreeSet<AgentId>>,
}

impl Relationships {
    /// Friends of `agent` (empty if none are declared).
    pub fn friends_of(&self, agent: &AgentId) -> impl Iterator<Item = &AgentId> {
        self.friends.get(agent).into_iter().flatten()
    }

    /// Enemies of `agent` (empty if none are declared).
    pub fn enemies_of(&self, agent: &AgentId) -> impl Iterator<Item = &AgentId> {
        self.enemies.get(agent).into_iter().flatten()
    }

    /// Whether the graph mentions `agent` on either side of any relation.
    pub fn mentions(&self, agent: &AgentId) -> bool {
        [&self.friends, &self.enemies].iter().any(|graph| {
            graph.contains_key(agent) || graph.values().any(|set| set.contains(agent))
        })
    }
}

/// Immutable snapshot of group membership, relationships and weights.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldModel {
    groups: BTreeMap<GroupId, Vec<AgentId>>,
    relationships: Arc<Relationships>,
    weights: Weights,
}

impl WorldModel {
    /// Build a snapshot, checking that membership is a partition.
    ///
    /// Empty groups are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateMembership`] if an agent is listed in
    /// two groups (or twice in one), and [`WorldError::InvalidParameter`] for
    /// negative or non-finite weights.
    pub fn new(
        groups: BTreeMap<GroupId, Vec<AgentId>>,
        relationships: Relationships,
        weights: Weights,
    ) -> Result<Self, WorldError> {
        let weights = weights.validated()?;
        let mut seen: BTreeMap<&AgentId, &GroupId> = BTreeMap::new();
        for (group, members) in &groups {
            for agent in members {
                if let Some(first) = seen.insert(agent, group) {
                    return Err(WorldError::DuplicateMembership {
                        agent: agent.clone(),
                        first: first.clone(),
                        second: group.clone(),
                    });
                }
            }
        }

        let groups = groups
            .into_iter()
            .filter(|(_, members)| !members.is_empty())
            .collect();

        Ok(Self {
            groups,
            relationships: Arc::new(relationships),
            weights,
        })
    }

    /// All groups in name order.
    pub const fn groups(&self) -> &BTreeMap<GroupId, Vec<AgentId>> {
        &self.groups
    }

    /// Members of `group`, in join order.
    pub fn members(&self, group: &GroupId) -> Option<&[AgentId]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    /// The relationship graph shared by every snapshot of this session.
    pub fn relationships(&self) -> &Relationships {
        &self.relationships
    }

    /// The utility weights.
    pub const fn weights(&self) -> Weights {
        self.weights
    }

    /// The group `agent` currently belongs to, if any.
    pub fn current_group_of(&self, agent: &AgentId) -> Option<&GroupId> {
        self.groups
            .iter()
            .find(|(_, members)| members.contains(agent))
            .map(|(group, _)| group)
    }

    /// Hedonic utility of `agent` in this snapshot.
    pub fn utility(&self, agent: &AgentId) -> f64 {
        let Some(members) = self.current_group_of(agent).and_then(|g| self.groups.get(g)) else {
            return 0.0;
        };
        let friends = count_in(self.relationships.friends_of(agent), members);
        let enemies = count_in(self.relationships.enemies_of(agent), members);
        self.weights
            .w_friend
            .mul_add(friends, -(self.weights.w_enemy * enemies))
    }

    /// Return a new snapshot with `agent` moved into `target`.
    ///
    /// `None` means "leave": the agent is placed in a freshly minted
    /// singleton group named `Solo-<agent>` (with `-2`, `-3`, ... appended
    /// until the name is unused). Moving an agent to the group it is already
    /// in returns an identical snapshot. A group emptied by the move is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownGroup`] if `target` names a group that
    /// does not exist in this snapshot.
    pub fn move_agent(&self, agent: &AgentId, target: Option<&GroupId>) -> Result<Self, WorldError> {
        if let Some(group) = target {
            if !self.groups.contains_key(group) {
                return Err(WorldError::UnknownGroup(group.clone()));
            }
            if self.current_group_of(agent) == Some(group) {
                return Ok(self.clone());
            }
        }

        let mut groups = self.groups.clone();
        if let Some(current) = self.current_group_of(agent) {
            if let Some(members) = groups.get_mut(current) {
                members.retain(|m| m != agent);
            }
        }
        groups.retain(|_, members| !members.is_empty());

        let destination = match target {
            Some(group) => group.clone(),
            None => solo_group_name(&groups, agent),
        };
        groups.entry(destination).or_default().push(agent.clone());

        Ok(Self {
            groups,
            relationships: Arc::clone(&self.relationships),
            weights: self.weights,
        })
    }

    /// Apply one hedonic action for `agent`.
    ///
    /// # Errors
    ///
    /// Propagates [`WorldError::UnknownGroup`] from [`Self::move_agent`].
    pub fn apply(&self, agent: &AgentId, action: &HedonicAction) -> Result<Self, WorldError> {
        match action {
            HedonicAction::Stay => Ok(self.clone()),
            HedonicAction::Leave => self.move_agent(agent, None),
            HedonicAction::Join(group) => self.move_agent(agent, Some(group)),
        }
    }

    /// Every action `agent` may take here: `STAY`, `LEAVE`, then `JOIN g`
    /// for each other group in name order.
    pub fn feasible_actions(&self, agent: &AgentId) -> Vec<HedonicAction> {
        let current = self.current_group_of(agent);
        let mut actions = vec![HedonicAction::Stay, HedonicAction::Leave];
        actions.extend(
            self.groups
                .keys()
                .filter(|group| Some(*group) != current)
                .cloned()
                .map(HedonicAction::Join),
        );
        actions
    }
}

impl Counterfactual for WorldModel {
    type Action = HedonicAction;

    fn feasible_actions(&self, agent: &AgentId) -> Vec<HedonicAction> {
        Self::feasible_actions(self, agent)
    }

    fn with_action(&self, agent: &AgentId, action: &HedonicAction) -> Result<Self, WorldError> {
        self.apply(agent, action)
    }

    fn utility(&self, agent: &AgentId) -> f64 {
        Self::utility(self, agent)
    }

    fn friends_of(&self, agent: &AgentId) -> Vec<AgentId> {
        self.relationships.friends_of(agent).cloned().collect()
    }
}

/// Pick an unused `Solo-<agent>` name.
fn solo_group_name(groups: &BTreeMap<GroupId, Vec<AgentId>>, agent: &AgentId) -> GroupId {
    let base = format!("{SOLO_PREFIX}{agent}");
    let mut candidate = GroupId::new(base.clone());
    let mut suffix: u32 = 2;
    while groups.contains_key(&candidate) {
        candidate = GroupId::new(format!("{base}-{suffix}"));
        suffix = suffix.saturating_add(1);
    }
    candidate
}

/// Count how many of `related` appear in `members`.
fn count_in<'a>(related: impl Iterator<Item = &'a AgentId>, members: &[AgentId]) -> f64 {
    let n = related.filter(|a| members.contains(a)).count();
    u32::try_from(n).map_or(f64::from(u32::MAX), f64::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn id(name: &str) -> AgentId {
        AgentId::from(name)
    }

    fn set(names: &[&str]) -> BTreeSet<AgentId> {
        names.iter().map(|n| id(n)).collect()
    }

    /// "You" with friends Alice and Clara, all three in Group A; Bob alone in Group B.
    fn sample_world() -> WorldModel {
        let mut relationships = Relationships::default();
        relationships.friends.insert(id("You"), set(&["Alice", "Clara"]));
        relationships.friends.insert(id("Alice"), set(&["You", "Clara"]));
        relationships.friends.insert(id("Clara"), set(&["You", "Alice"]));
        relationships.enemies.insert(id("Bob"), set(&["You"]));

        let mut groups = BTreeMap::new();
        groups.insert(GroupId::from("Group A"), vec![id("You"), id("Alice"), id("Clara")]);
        groups.insert(GroupId::from("Group B"), vec![id("Bob")]);
        WorldModel::new(groups, relationships, Weights::default()).unwrap()
    }

    #[test]
    fn utility_counts_friends_and_enemies() {
        let world = sample_world();
        assert_eq!(world.utility(&id("You")), 2.0);
        assert_eq!(world.utility(&id("Bob")), 0.0);

        let joined = world.move_agent(&id("You"), Some(&GroupId::from("Group B"))).unwrap();
        assert_eq!(joined.utility(&id("Bob")), -1.0);
        assert_eq!(joined.utility(&id("You")), 0.0);
    }

    #[test]
    fn agent_without_group_has_zero_utility() {
        let world = sample_world();
        assert_eq!(world.utility(&id("Nobody")), 0.0);
        assert!(world.current_group_of(&id("Nobody")).is_none());
    }

    #[test]
    fn stay_is_a_true_no_op() {
        let world = sample_world();
        let current = world.current_group_of(&id("You")).cloned();
        let moved = world.move_agent(&id("You"), current.as_ref()).unwrap();
        assert_eq!(moved, world);
        assert_eq!(moved.utility(&id("You")), world.utility(&id("You")));
    }

    #[test]
    fn leave_mints_solo_group_and_keeps_receiver() {
        let world = sample_world();
        let left = world.move_agent(&id("You"), None).unwrap();
        assert_eq!(
            left.current_group_of(&id("You")),
            Some(&GroupId::from("Solo-You"))
        );
        assert_eq!(world.current_group_of(&id("You")), Some(&GroupId::from("Group A")));
        assert_eq!(left.members(&GroupId::from("Group A")).map(<[AgentId]>::len), Some(2));
    }

    #[test]
    fn solo_name_collisions_get_numeric_suffix() {
        let mut groups = BTreeMap::new();
        groups.insert(GroupId::from("Solo-You"), vec![id("Alice")]);
        groups.insert(GroupId::from("Solo-You-2"), vec![id("Clara")]);
        groups.insert(GroupId::from("Group A"), vec![id("You")]);
        let world = WorldModel::new(groups, Relationships::default(), Weights::default()).unwrap();

        let left = world.move_agent(&id("You"), None).unwrap();
        assert_eq!(
            left.current_group_of(&id("You")),
            Some(&GroupId::from("Solo-You-3"))
        );
    }

    #[test]
    fn emptied_groups_are_dropped() {
        let world = sample_world();
        let moved = world.move_agent(&id("Bob"), Some(&GroupId::from("Group A"))).unwrap();
        assert!(moved.members(&GroupId::from("Group B")).is_none());
        assert_eq!(moved.groups().len(), 1);
    }

    #[test]
    fn join_unknown_group_is_an_error() {
        let world = sample_world();
        let err = world.move_agent(&id("You"), Some(&GroupId::from("Group Z")));
        assert_eq!(err, Err(WorldError::UnknownGroup(GroupId::from("Group Z"))));
    }

    #[test]
    fn duplicate_membership_is_rejected() {
        let mut groups = BTreeMap::new();
        groups.insert(GroupId::from("Group A"), vec![id("You")]);
        groups.insert(GroupId::from("Group B"), vec![id("You")]);
        let result = WorldModel::new(groups, Relationships::default(), Weights::default());
        assert!(matches!(result, Err(WorldError::DuplicateMembership { .. })));
    }

    #[test]
    fn feasible_actions_are_stay_leave_then_joins() {
        let world = sample_world();
        let actions = world.feasible_actions(&id("You"));
        assert_eq!(
            actions,
            vec![
                HedonicAction::Stay,
                HedonicAction::Leave,
                HedonicAction::Join(GroupId::from("Group B")),
            ]
        );
    }

    #[test]
    fn negative_weights_are_rejected() {
        let weights = Weights {
            w_friend: -1.0,
            w_enemy: 1.0,
        };
        assert!(WorldModel::new(BTreeMap::new(), Relationships::default(), weights).is_err());
    }

    #[test]
    fn relationships_report_mentions() {
        let world = sample_world();
        assert!(world.relationships().mentions(&id("Bob")));
        assert!(world.relationships().mentions(&id("You")));
        assert!(!world.relationships().mentions(&id("Nobody")));
    }
}
