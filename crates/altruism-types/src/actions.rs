//! Moves exchanged between the engine and decision sources.
//!
//! A decision source answers with a loosely typed [`MoveValue`] (whatever the
//! model, script or human produced). Each game family validates that value
//! against its [`LegalActions`] and turns it into a typed action; the hedonic
//! family's typed action lives here because both the engine and the runner's
//! parser need it.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::GroupId;

/// The raw value a decision source proposed for its move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MoveValue {
    /// A numeric answer (rank index, draw size, allocation percentage).
    Number(f64),
    /// A textual answer (`STAY`, `JOIN Group A`, or a number spelled as text).
    Text(String),
}

impl MoveValue {
    /// Interpret the value as a finite number.
    ///
    /// Text is trimmed and parsed; non-finite numbers are rejected.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        n.is_finite().then_some(n)
    }

    /// Interpret the value as an integer.
    ///
    /// Fractional numbers are rejected rather than rounded.
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_integer(&self) -> Option<i64> {
        let n = self.as_number()?;
        let in_range = (-9.0e15..=9.0e15).contains(&n);
        (n.fract().abs() < f64::EPSILON && in_range).then_some(n as i64)
    }
}

impl fmt::Display for MoveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for MoveValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for MoveValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

/// Description of the moves a decision source may legally submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LegalActions {
    /// One of a fixed list of labels.
    Choice {
        /// The accepted labels, in presentation order.
        options: Vec<String>,
    },
    /// An integer in an inclusive range.
    Integer {
        /// Smallest accepted value.
        min: i64,
        /// Largest accepted value.
        max: i64,
    },
    /// A real number in an inclusive range (out-of-range values are clamped).
    Range {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
}

impl fmt::Display for LegalActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Choice { options } => write!(f, "one of: {}", options.join(", ")),
            Self::Integer { min, max } => write!(f, "an integer from {min} to {max}"),
            Self::Range { min, max } => write!(f, "a number from {min} to {max}"),
        }
    }
}

/// A move in the hedonic (stay/leave/join) game.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "action", content = "group", rename_all = "snake_case")]
pub enum HedonicAction {
    /// Remain in the current group.
    Stay,
    /// Leave the current group and go solo.
    Leave,
    /// Move into the named existing group.
    Join(GroupId),
}

impl HedonicAction {
    /// Parse a decision from free text.
    ///
    /// Only the first non-empty line is considered. It must read `STAY`,
    /// `LEAVE` or `JOIN <GroupName>` (case-insensitive keyword). Returns
    /// `None` for anything else, including a bare `JOIN`.
    pub fn parse_decision(text: &str) -> Option<Self> {
        let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
        let mut parts = line.splitn(2, char::is_whitespace);
        let keyword = parts.next()?.to_ascii_uppercase();
        let rest = parts.next().map(str::trim).unwrap_or_default();

        match keyword.as_str() {
            "STAY" if rest.is_empty() => Some(Self::Stay),
            "LEAVE" if rest.is_empty() => Some(Self::Leave),
            "JOIN" if !rest.is_empty() => Some(Self::Join(GroupId::from(rest))),
            _ => None,
        }
    }
}

impl fmt::Display for HedonicAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stay => f.write_str("STAY"),
            Self::Leave => f.write_str("LEAVE"),
            Self::Join(group) => write!(f, "JOIN {group}"),
        }
    }
}
