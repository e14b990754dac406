//! Rank-slot congestion with cascading reassignment.
//!
//! Every agent proposes one rank in `[1, N]` (1 is best). The resolver sweeps
//! ranks strictly in ascending order:
//!
//! 1. An empty slot with candidates further down closes the gap by shifting
//!    every later slot one position up, then the same rank is retried.
//! 2. A slot with one candidate assigns it.
//! 3. A congested slot picks a winner uniformly at random; the losers move
//!    together into the next empty slot, or end up unranked if none is left.
//!
//! The sweep is sequential because slot `r + 1` depends on the cascade out of
//! slot `r`. Points for a round are `N - r + 1` for rank `r`, 0 if unranked.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use altruism_types::AgentId;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::error::WorldError;
use crate::scorer::Counterfactual;

/// Final placement of one round of rank proposals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankOutcome {
    /// Occupant of each rank; index 0 is rank 1.
    placements: Vec<Option<AgentId>>,
    /// Agents that found no free rank.
    unranked: Vec<AgentId>,
}

impl RankOutcome {
    /// Number of ranks on the board.
    pub fn ranks(&self) -> usize {
        self.placements.len()
    }

    /// Occupant of each rank, best first.
    pub fn placements(&self) -> &[Option<AgentId>] {
        &self.placements
    }

    /// Agents left without a rank this round.
    pub fn unranked(&self) -> &[AgentId] {
        &self.unranked
    }

    /// The 1-based rank `agent` ended up in, if any.
    pub fn final_rank_of(&self, agent: &AgentId) -> Option<u32> {
        let index = self
            .placements
            .iter()
            .position(|slot| slot.as_ref() == Some(agent))?;
        u32::try_from(index).ok()?.checked_add(1)
    }

    /// Points `agent` earns this round: `N - r + 1`, or 0 if unranked.
    pub fn points(&self, agent: &AgentId) -> u32 {
        let Ok(ranks) = u32::try_from(self.ranks()) else {
            return 0;
        };
        self.final_rank_of(agent)
            .and_then(|rank| rank_points(rank, ranks))
            .unwrap_or(0)
    }
}

/// Points for finishing at `rank` out of `ranks`.
pub const fn rank_points(rank: u32, ranks: u32) -> Option<u32> {
    match ranks.checked_sub(rank) {
        Some(gap) => gap.checked_add(1),
        None => None,
    }
}

/// Group proposals into rank slots (slot 0 is rank 1), preserving the order
/// in which agents appear in `proposals`.
///
/// # Errors
///
/// Returns [`WorldError::RankOutOfRange`] for a rank outside `[1, ranks]`
/// and [`WorldError::DuplicateProposal`] if an agent appears twice.
pub fn slots_from_proposals(
    ranks: u32,
    proposals: &[(AgentId, u32)],
) -> Result<Vec<Vec<AgentId>>, WorldError> {
    let len = usize::try_from(ranks)
        .ok()
        .ok_or(WorldError::ArithmeticOverflow)?;
    let mut slots: Vec<Vec<AgentId>> = vec![Vec::new(); len];
    let mut seen = BTreeSet::new();

    for (agent, rank) in proposals {
        if !seen.insert(agent) {
            return Err(WorldError::DuplicateProposal(agent.clone()));
        }
        let slot = rank
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| slots.get_mut(i))
            .ok_or_else(|| WorldError::RankOutOfRange {
                agent: agent.clone(),
                rank: *rank,
                ranks,
            })?;
        slot.push(agent.clone());
    }

    Ok(slots)
}

/// Resolve congested rank slots into a final placement.
///
/// `slots[i]` holds the candidates for rank `i + 1`. The randomness is only
/// used to pick the winner of a congested slot.
pub fn resolve_congestion<R: Rng>(mut slots: Vec<Vec<AgentId>>, rng: &mut R) -> RankOutcome {
    let ranks = slots.len();
    let mut placements: Vec<Option<AgentId>> = vec![None; ranks];
    let mut unranked = Vec::new();

    for r in 0..ranks {
        close_gap(&mut slots, r);

        let Some(candidates) = slots.get_mut(r).map(std::mem::take) else {
            break;
        };
        let mut candidates = candidates.into_iter();
        let winner = match candidates.len() {
            0 => continue,
            1 => candidates.next(),
            n => {
                let pick = rng.random_range(0..n);
                let mut leftovers: Vec<AgentId> = Vec::with_capacity(n.saturating_sub(1));
                let mut winner = None;
                for (i, agent) in candidates.enumerate() {
                    if i == pick {
                        winner = Some(agent);
                    } else {
                        leftovers.push(agent);
                    }
                }
                cascade(&mut slots, r, leftovers, &mut unranked);
                winner
            }
        };
        trace!(rank = r.saturating_add(1), agent = ?winner, "rank assigned");
        if let Some(place) = placements.get_mut(r) {
            *place = winner;
        }
    }

    RankOutcome {
        placements,
        unranked,
    }
}

/// Left-shift later slots over an empty slot at `r` while candidates remain
/// further down the board.
fn close_gap(slots: &mut Vec<Vec<AgentId>>, r: usize) {
    while slots.get(r).is_some_and(Vec::is_empty)
        && slots.iter().skip(r.saturating_add(1)).any(|s| !s.is_empty())
    {
        slots.remove(r);
        slots.push(Vec::new());
    }
}

/// Move congestion losers into the next empty slot after `r`.
fn cascade(
    slots: &mut [Vec<AgentId>],
    r: usize,
    leftovers: Vec<AgentId>,
    unranked: &mut Vec<AgentId>,
) {
    let next_empty = slots
        .iter_mut()
        .skip(r.saturating_add(1))
        .find(|s| s.is_empty());
    match next_empty {
        Some(slot) => *slot = leftovers,
        None => unranked.extend(leftovers),
    }
}

/// One round of rank proposals, resolved under a fixed seed.
///
/// Re-resolving with a different proposal for one agent replays the same
/// seed, which makes "the board had I proposed rank k" well defined. Each
/// agent keeps its seat in the proposal order even when its proposal is
/// withdrawn, so a counterfactual differs from the real round only in that
/// agent's rank.
#[derive(Debug, Clone, PartialEq)]
pub struct RankWorld {
    ranks: u32,
    proposals: Vec<(AgentId, Option<u32>)>,
    seed: u64,
    outcome: RankOutcome,
    friends: Arc<BTreeMap<AgentId, BTreeSet<AgentId>>>,
}

impl RankWorld {
    /// Resolve `proposals` on a board of `ranks` ranks.
    ///
    /// # Errors
    ///
    /// Propagates validation errors from [`slots_from_proposals`].
    pub fn resolve(
        ranks: u32,
        proposals: Vec<(AgentId, u32)>,
        seed: u64,
        friends: Arc<BTreeMap<AgentId, BTreeSet<AgentId>>>,
    ) -> Result<Self, WorldError> {
        let proposals = proposals
            .into_iter()
            .map(|(agent, rank)| (agent, Some(rank)))
            .collect();
        Self::resolve_seats(ranks, proposals, seed, friends)
    }

    fn resolve_seats(
        ranks: u32,
        proposals: Vec<(AgentId, Option<u32>)>,
        seed: u64,
        friends: Arc<BTreeMap<AgentId, BTreeSet<AgentId>>>,
    ) -> Result<Self, WorldError> {
        let active: Vec<(AgentId, u32)> = proposals
            .iter()
            .filter_map(|(agent, rank)| rank.map(|r| (agent.clone(), r)))
            .collect();
        let slots = slots_from_proposals(ranks, &active)?;
        let mut rng = SmallRng::seed_from_u64(seed);
        let outcome = resolve_congestion(slots, &mut rng);
        Ok(Self {
            ranks,
            proposals,
            seed,
            outcome,
            friends,
        })
    }

    /// The same round with `agent` proposing `rank` (or nothing, for `None`).
    fn with_proposal(&self, agent: &AgentId, rank: Option<u32>) -> Result<Self, WorldError> {
        let mut proposals = self.proposals.clone();
        match proposals.iter_mut().find(|(a, _)| a == agent) {
            Some(seat) => seat.1 = rank,
            None => proposals.push((agent.clone(), rank)),
        }
        Self::resolve_seats(self.ranks, proposals, self.seed, Arc::clone(&self.friends))
    }

    /// The same round with `agent`'s proposal withdrawn.
    ///
    /// # Errors
    ///
    /// Propagates validation errors from [`slots_from_proposals`].
    pub fn without(&self, agent: &AgentId) -> Result<Self, WorldError> {
        self.with_proposal(agent, None)
    }

    /// The resolved placement.
    pub const fn outcome(&self) -> &RankOutcome {
        &self.outcome
    }

    /// Number of ranks on the board.
    pub const fn ranks(&self) -> u32 {
        self.ranks
    }

    /// The rank `agent` proposed, if it proposed one.
    pub fn proposed_rank_of(&self, agent: &AgentId) -> Option<u32> {
        self.proposals
            .iter()
            .find(|(a, _)| a == agent)
            .and_then(|(_, rank)| *rank)
    }
}

impl Counterfactual for RankWorld {
    type Action = u32;

    fn feasible_actions(&self, _agent: &AgentId) -> Vec<u32> {
        (1..=self.ranks).collect()
    }

    fn with_action(&self, agent: &AgentId, action: &u32) -> Result<Self, WorldError> {
        self.with_proposal(agent, Some(*action))
    }

    fn utility(&self, agent: &AgentId) -> f64 {
        f64::from(self.outcome.points(agent))
    }

    fn friends_of(&self, agent: &AgentId) -> Vec<AgentId> {
        self.friends
            .get(agent)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn agent(i: usize) -> AgentId {
        AgentId::new(format!("agent-{i}"))
    }

    fn slots(layout: &[&[usize]]) -> Vec<Vec<AgentId>> {
        layout
            .iter()
            .map(|slot| slot.iter().map(|&i| agent(i)).collect())
            .collect()
    }

    fn placed(outcome: &RankOutcome) -> Vec<AgentId> {
        outcome.placements().iter().flatten().cloned().collect()
    }

    #[test]
    fn cascade_example_places_every_agent_once() {
        let layout: &[&[usize]] = &[&[], &[], &[0, 2, 3], &[4, 5, 6, 7], &[1], &[], &[], &[]];
        for seed in 0..20 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let outcome = resolve_congestion(slots(layout), &mut rng);

            let mut everyone = placed(&outcome);
            everyone.extend(outcome.unranked().iter().cloned());
            everyone.sort();
            let mut expected: Vec<AgentId> = (0..8).map(agent).collect();
            expected.sort();
            assert_eq!(everyone, expected);

            assert!(outcome.unranked().is_empty());
            assert!(outcome.placements().iter().all(Option::is_some));
            let first = outcome.placements()[0].clone().unwrap();
            assert!([agent(0), agent(2), agent(3)].contains(&first));
        }
    }

    #[test]
    fn same_seed_same_outcome() {
        let layout: &[&[usize]] = &[&[], &[], &[0, 2, 3], &[4, 5, 6, 7], &[1], &[], &[], &[]];
        let a = resolve_congestion(slots(layout), &mut SmallRng::seed_from_u64(42));
        let b = resolve_congestion(slots(layout), &mut SmallRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn everyone_on_one_rank_cascades_down_the_board() {
        let layout: &[&[usize]] = &[&[0, 1, 2, 3], &[], &[], &[]];
        let outcome = resolve_congestion(slots(layout), &mut SmallRng::seed_from_u64(1));
        assert_eq!(placed(&outcome).len(), 4);
        assert!(outcome.unranked().is_empty());
    }

    #[test]
    fn congestion_with_no_free_slot_leaves_agents_unranked() {
        let layout: &[&[usize]] = &[&[0], &[1, 2, 3]];
        let outcome = resolve_congestion(slots(layout), &mut SmallRng::seed_from_u64(5));
        assert_eq!(outcome.placements()[0], Some(agent(0)));
        assert!(outcome.placements()[1].is_some());
        assert_eq!(outcome.unranked().len(), 2);
        for loser in outcome.unranked() {
            assert_eq!(outcome.points(loser), 0);
        }
    }

    #[test]
    fn nobody_on_rank_one_shifts_up() {
        let layout: &[&[usize]] = &[&[], &[], &[0], &[1]];
        let outcome = resolve_congestion(slots(layout), &mut SmallRng::seed_from_u64(1));
        assert_eq!(outcome.final_rank_of(&agent(0)), Some(1));
        assert_eq!(outcome.final_rank_of(&agent(1)), Some(2));
        assert_eq!(outcome.placements()[2], None);
    }

    #[test]
    fn fewer_agents_than_ranks_leaves_trailing_ranks_empty() {
        let layout: &[&[usize]] = &[&[0], &[], &[], &[], &[]];
        let outcome = resolve_congestion(slots(layout), &mut SmallRng::seed_from_u64(1));
        assert_eq!(outcome.ranks(), 5);
        assert_eq!(placed(&outcome), vec![agent(0)]);
    }

    #[test]
    fn points_follow_rank() {
        let layout: &[&[usize]] = &[&[0], &[1], &[2]];
        let outcome = resolve_congestion(slots(layout), &mut SmallRng::seed_from_u64(1));
        assert_eq!(outcome.points(&agent(0)), 3);
        assert_eq!(outcome.points(&agent(2)), 1);
        assert_eq!(outcome.points(&agent(9)), 0);
    }

    #[test]
    fn proposals_outside_board_are_rejected() {
        let err = slots_from_proposals(3, &[(agent(0), 4)]);
        assert!(matches!(err, Err(WorldError::RankOutOfRange { rank: 4, .. })));
        let err = slots_from_proposals(3, &[(agent(0), 0)]);
        assert!(matches!(err, Err(WorldError::RankOutOfRange { rank: 0, .. })));
    }

    #[test]
    fn duplicate_proposals_are_rejected() {
        let err = slots_from_proposals(3, &[(agent(0), 1), (agent(0), 2)]);
        assert_eq!(err, Err(WorldError::DuplicateProposal(agent(0))));
    }

    #[test]
    fn rank_world_counterfactuals_replay_the_seed() {
        let proposals = vec![(agent(0), 1), (agent(1), 1), (agent(2), 2)];
        let world = RankWorld::resolve(3, proposals, 9, Arc::default()).unwrap();
        let replay = world.with_action(&agent(0), &1).unwrap();
        assert_eq!(replay.outcome(), world.outcome());

        let base = world.without(&agent(0)).unwrap();
        assert_eq!(base.outcome().final_rank_of(&agent(0)), None);
        assert_eq!(base.proposed_rank_of(&agent(0)), None);
        assert_eq!(world.feasible_actions(&agent(0)), vec![1, 2, 3]);
    }
}
