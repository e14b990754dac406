//! Per-family game rules.
//!
//! A [`GameRules`] implementation is the session's view of one game family:
//! it describes what each seat may see and submit, turns raw
//! [`MoveValue`]s into typed moves, supplies the default move substituted
//! after a failure, and resolves and scores one round of simultaneous moves.
//!
//! Worlds live in `altruism-world`; this layer only owns the round-to-round
//! state (cumulative points, the commons stock, persisted hedonic worlds).

use std::collections::BTreeMap;
use std::fmt;

use altruism_types::{AgentId, GameKind, LegalActions, MoveValue};
use altruism_world::{CounterfactualScore, ScoringPolicy, WorldError};
use rand::Rng;

pub mod coalition;
pub mod commons;
pub mod hedonic;
pub mod matrix;
pub mod rank;

pub use coalition::CoalitionGame;
pub use commons::CommonsGame;
pub use hedonic::HedonicGame;
pub use matrix::MatrixGame;
pub use rank::RankGame;

/// Score and observational metrics for one agent in one round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundScore {
    /// The counterfactual comparison.
    pub score: CounterfactualScore,
    /// Family-specific metrics.
    pub metrics: BTreeMap<String, f64>,
}

/// Rules of one game family, as seen by a [`GameSession`].
///
/// [`GameSession`]: crate::session::GameSession
pub trait GameRules: Send {
    /// A validated move.
    type Move: Clone + fmt::Display + Send;

    /// The game family.
    fn kind(&self) -> GameKind;

    /// Seated agents, in seat order.
    fn agents(&self) -> &[AgentId];

    /// What `agent` may see at the start of `round`.
    fn context(&self, agent: &AgentId, round: u32) -> serde_json::Value;

    /// The moves `agent` may submit this round.
    fn legal_actions(&self, agent: &AgentId) -> LegalActions;

    /// Turn a raw proposal into a typed move.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the value is outside the legal
    /// set. The session substitutes [`Self::default_move`].
    fn validate(&self, agent: &AgentId, value: &MoveValue) -> Result<Self::Move, String>;

    /// The move substituted for a failed or invalid answer.
    fn default_move(&self, agent: &AgentId) -> Self::Move;

    /// Resolve one round of simultaneous moves and score every mover.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError`] when a move violates a world precondition that
    /// validation should already have ruled out.
    fn play_round<R: Rng>(
        &mut self,
        round: u32,
        moves: &BTreeMap<AgentId, Self::Move>,
        policy: ScoringPolicy,
        rng: &mut R,
    ) -> Result<BTreeMap<AgentId, RoundScore>, WorldError>;

    /// Whether the game cannot continue. Checked before each round; a true
    /// result ends the session early.
    fn is_over(&self) -> bool {
        false
    }
}

/// Look up `agent`'s move, or fail with [`WorldError::AgentNotFound`].
fn move_of<'a, M>(moves: &'a BTreeMap<AgentId, M>, agent: &AgentId) -> Result<&'a M, WorldError> {
    moves
        .get(agent)
        .ok_or_else(|| WorldError::AgentNotFound(agent.clone()))
}

/// Read a numeric proposal, rejecting text that is not a number.
fn numeric(value: &MoveValue) -> Result<f64, String> {
    value
        .as_number()
        .ok_or_else(|| format!("expected a number, got {value:?}"))
}
