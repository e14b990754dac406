//! Error types for the `altruism-world` crate.
//!
//! All fallible operations in this crate return [`WorldError`]. These are
//! precondition violations raised by the calling layer (a rank outside the
//! board, a group that does not exist), never the result of bad input from a
//! decision source, which is normalized before it reaches a world.

use altruism_types::{AgentId, GroupId};

/// Errors that can occur while building or transforming a game world.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorldError {
    /// A group was referenced that does not exist in the snapshot.
    #[error("group not found: {0}")]
    UnknownGroup(GroupId),

    /// An agent was referenced that the world does not know about.
    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    /// An agent was listed as a member of more than one group.
    #[error("agent {agent} is a member of both {first} and {second}")]
    DuplicateMembership {
        /// The agent listed twice.
        agent: AgentId,
        /// The first group the agent was found in.
        first: GroupId,
        /// The second group the agent was found in.
        second: GroupId,
    },

    /// An agent submitted more than one proposal in the same round.
    #[error("agent {0} proposed more than once")]
    DuplicateProposal(AgentId),

    /// A rank proposal fell outside `[1, ranks]`.
    #[error("agent {agent} proposed rank {rank}, board has {ranks} ranks")]
    RankOutOfRange {
        /// The proposing agent.
        agent: AgentId,
        /// The proposed rank.
        rank: u32,
        /// Number of ranks on the board.
        ranks: u32,
    },

    /// A strategy index fell outside the payoff matrix.
    #[error("agent {agent} chose strategy {strategy}, matrix has {strategies}")]
    StrategyOutOfRange {
        /// The choosing agent.
        agent: AgentId,
        /// The zero-based strategy index.
        strategy: usize,
        /// Number of strategies in the matrix.
        strategies: usize,
    },

    /// A payoff matrix does not have one cell per strategy pair.
    #[error("invalid payoff matrix: {0}")]
    InvalidMatrix(String),

    /// A numeric parameter was negative, NaN or infinite where that is not allowed.
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The offending value.
        value: f64,
    },

    /// Arithmetic overflow during a checked operation.
    #[error("arithmetic overflow in world calculation")]
    ArithmeticOverflow,
}

/// Reject a parameter that is not a finite, non-negative number.
pub(crate) fn non_negative(name: &'static str, value: f64) -> Result<f64, WorldError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(WorldError::InvalidParameter { name, value })
    }
}
