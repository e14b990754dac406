//! Decision source trait and scripted implementation.
//!
//! Each round the session presents every seated agent with a
//! [`DecisionRequest`] and awaits a [`Proposal`] in response. The
//! [`DecisionSource`] trait abstracts where the move comes from -- a
//! language model, a human at a console, a fixed script, or a test stub.
//!
//! A source only ever sees its own request: requests for one round are all
//! built before any of them is dispatched, so no source can observe another
//! agent's move for the same round.

use std::future::Future;

use altruism_types::{AgentId, GameKind, LegalActions, MoveValue, SessionId};
use serde::{Deserialize, Serialize};

/// Errors a decision source can report for a single request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecisionError {
    /// The source did not respond within the deadline.
    #[error("agent {agent} timed out (deadline: {deadline_ms}ms)")]
    Timeout {
        /// The agent whose source timed out.
        agent: AgentId,
        /// The deadline in milliseconds.
        deadline_ms: u64,
    },

    /// The source failed to produce an answer.
    #[error("decision source error: {message}")]
    Internal {
        /// Description of the error.
        message: String,
    },
}

impl DecisionError {
    /// Shorthand for [`DecisionError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// What an agent is told when asked for a move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Session the request belongs to.
    pub session: SessionId,
    /// 1-based round number.
    pub round: u32,
    /// The agent being asked.
    pub agent: AgentId,
    /// Game family being played.
    pub game: GameKind,
    /// What the agent may see of the current world.
    pub context: serde_json::Value,
    /// The moves the agent may legally submit.
    pub legal: LegalActions,
}

/// A move proposed by a decision source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// The proposed move, validated by the game afterwards.
    pub value: MoveValue,
    /// Free text stored for audit, never interpreted by the engine.
    #[serde(default)]
    pub rationale: String,
}

impl Proposal {
    /// Build a proposal.
    pub fn new(value: impl Into<MoveValue>, rationale: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            rationale: rationale.into(),
        }
    }
}

/// A source of moves for one seat.
pub trait DecisionSource: Send {
    /// Short name used in logs and reports (model name, `script`, `console`).
    fn name(&self) -> &str;

    /// Wait until the source can be asked.
    ///
    /// Awaited before every attempt and outside the attempt's timeout. A
    /// source that takes turns on a shared resource (a console) acquires it
    /// here.
    fn ready(&mut self) -> impl Future<Output = ()> + Send {
        std::future::ready(())
    }

    /// Ask for a move.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionError`] if no answer could be produced. The session
    /// retries and eventually substitutes a default; it never aborts.
    fn propose(
        &mut self,
        request: &DecisionRequest,
    ) -> impl Future<Output = Result<Proposal, DecisionError>> + Send;

    /// Forget any per-session state (for example chat history).
    fn reset(&mut self) {}
}

/// Replays a fixed list of moves, cycling when it runs out.
#[derive(Debug, Clone)]
pub struct ScriptedDecisionSource {
    moves: Vec<MoveValue>,
    next: usize,
}

impl ScriptedDecisionSource {
    /// Create a source that replays `moves` in order.
    pub const fn new(moves: Vec<MoveValue>) -> Self {
        Self { moves, next: 0 }
    }
}

impl DecisionSource for ScriptedDecisionSource {
    fn name(&self) -> &str {
        "script"
    }

    async fn propose(&mut self, request: &DecisionRequest) -> Result<Proposal, DecisionError> {
        let index = self.next.checked_rem(self.moves.len()).ok_or_else(|| {
            DecisionError::internal(format!("script for {} has no moves", request.agent))
        })?;
        let value = self
            .moves
            .get(index)
            .cloned()
            .ok_or_else(|| DecisionError::internal("script index out of range"))?;
        self.next = self.next.wrapping_add(1);
        Ok(Proposal::new(value, "scripted move"))
    }

    fn reset(&mut self) {
        self.next = 0;
    }
}
