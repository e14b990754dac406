//! Enumeration types shared across the workspace.

use core::fmt;

use serde::{Deserialize, Serialize};

/// The game families the engine knows how to resolve and score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    /// Hedonic group formation (stay / leave / join).
    Hedonic,
    /// Rank-slot congestion with cascading reassignment.
    Rank,
    /// Shared-stock resource consumption.
    Commons,
    /// Effort allocation between two coalitions.
    Coalition,
    /// Two-seat strategy matrix (route choice, prisoner's dilemma).
    Matrix,
}

impl GameKind {
    /// Stable lowercase name, used for template lookup and log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hedonic => "hedonic",
            Self::Rank => "rank",
            Self::Commons => "commons",
            Self::Coalition => "coalition",
            Self::Matrix => "matrix",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
