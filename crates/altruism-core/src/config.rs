//! Scenario configuration.
//!
//! A scenario is a YAML document naming the players, how each one decides,
//! the session knobs (rounds, seed, scoring policy, retry budget) and one
//! game block tagged by `kind`. Example:
//!
//! ```yaml
//! name: friends-in-group-a
//! session:
//!   rounds: 3
//!   seed: 7
//! players:
//!   - id: You
//!     source: { type: scripted, moves: [STAY, LEAVE] }
//! game:
//!   kind: hedonic
//!   groups:
//!     Group A: [You, Alice, Clara]
//!   relationships:
//!     friends:
//!       You: [Alice, Clara]
//! ```
//!
//! [`ScenarioConfig::validate`] must pass before a session is built; a world
//! is never constructed from an incomplete scenario.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use altruism_types::{AgentId, GameKind, GroupId, HedonicAction, MoveValue};
use altruism_world::{
    CoalitionParams, CommonsParams, HarmDeduction, PayoffMatrix, Relationships, ScoringPolicy,
    SelfishTieBreak, Strategy, Weights, WorldError, WorldModel,
};
use serde::Deserialize;

/// Errors that can occur when loading or validating a scenario.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the scenario file from disk.
    #[error("failed to read scenario file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse scenario YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The scenario parsed but describes an impossible game.
    #[error("invalid scenario: {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The world rejected the configured parameters.
    #[error("invalid world: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        reason: reason.into(),
    }
}

/// A complete scenario.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScenarioConfig {
    /// Human-readable scenario name, carried into result rows.
    #[serde(default = "default_scenario_name")]
    pub name: String,

    /// Session-level knobs.
    #[serde(default)]
    pub session: SessionConfig,

    /// Seated players, in seat order.
    pub players: Vec<PlayerConfig>,

    /// The game being played.
    pub game: GameConfig,
}

impl ScenarioConfig {
    /// Load and validate a scenario from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or a validation error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate a scenario from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or a
    /// validation error.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Player ids in seat order.
    pub fn player_ids(&self) -> Vec<AgentId> {
        self.players.iter().map(|p| p.id.clone()).collect()
    }

    /// Check the scenario describes a playable game.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] or [`ConfigError::World`] describing
    /// the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.rounds == 0 {
            return Err(invalid("session.rounds", "must be at least 1"));
        }
        if self.session.retry.max_attempts == 0 {
            return Err(invalid("session.retry.max_attempts", "must be at least 1"));
        }
        if self.players.is_empty() {
            return Err(invalid("players", "at least one player is required"));
        }

        let mut seen = BTreeSet::new();
        for player in &self.players {
            if !seen.insert(&player.id) {
                return Err(invalid("players", format!("duplicate player id {}", player.id)));
            }
            if let SourceConfig::Scripted { moves } = &player.source {
                if moves.is_empty() {
                    return Err(invalid(
                        format!("players.{}.source.moves", player.id),
                        "a scripted player needs at least one move",
                    ));
                }
            }
        }

        match &self.game {
            GameConfig::Hedonic(game) => game.validate(&self.players),
            GameConfig::Rank(game) => game.validate(),
            GameConfig::Commons(game) => game.validate(),
            GameConfig::Coalition(game) => game.validate(),
            GameConfig::Matrix(game) => game.validate(&self.players),
        }
    }
}

fn default_scenario_name() -> String {
    "unnamed".to_owned()
}

/// Session-level knobs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Round budget.
    #[serde(default = "default_rounds")]
    pub rounds: u32,

    /// Seed for every random choice the engine makes.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Where friend harm is deducted in the altruism score.
    #[serde(default)]
    pub harm_deduction: HarmDeduction,

    /// Tie-break for the selfish baseline search.
    #[serde(default)]
    pub tie_break: SelfishTieBreak,

    /// Decision retry budget.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl SessionConfig {
    /// The scoring policy these knobs describe.
    pub const fn scoring_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            harm_deduction: self.harm_deduction,
            tie_break: self.tie_break,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            seed: default_seed(),
            harm_deduction: HarmDeduction::default(),
            tie_break: SelfishTieBreak::default(),
            retry: RetryConfig::default(),
        }
    }
}

const fn default_rounds() -> u32 {
    1
}

const fn default_seed() -> u64 {
    42
}

/// Decision retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    /// Attempts per request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff between attempts, multiplied by the attempt number.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Deadline for a single attempt.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_backoff_ms() -> u64 {
    250
}

const fn default_timeout_ms() -> u64 {
    30_000
}

/// One seated player.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlayerConfig {
    /// The player's agent id.
    pub id: AgentId,
    /// Where the player's moves come from.
    pub source: SourceConfig,
}

/// Where a player's moves come from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// A language model behind the runner's configured backend.
    Llm {
        /// Model identifier passed to the backend.
        model: String,
        /// Prepend the altruism-injection preamble to every prompt.
        #[serde(default)]
        altruism_injection: bool,
    },
    /// A fixed list of moves replayed in order.
    Scripted {
        /// Moves, cycled when exhausted.
        moves: Vec<MoveValue>,
    },
    /// A human typing at the console.
    Console,
}

/// The game block, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameConfig {
    /// Hedonic group formation.
    Hedonic(HedonicConfig),
    /// Rank-slot congestion.
    Rank(RankConfig),
    /// Shared-stock commons.
    Commons(CommonsConfig),
    /// Two-coalition effort allocation.
    Coalition(CoalitionConfig),
    /// Two-seat strategy matrix.
    Matrix(MatrixConfig),
}

impl GameConfig {
    /// The game family this block configures.
    pub const fn kind(&self) -> GameKind {
        match self {
            Self::Hedonic(_) => GameKind::Hedonic,
            Self::Rank(_) => GameKind::Rank,
            Self::Commons(_) => GameKind::Commons,
            Self::Coalition(_) => GameKind::Coalition,
            Self::Matrix(_) => GameKind::Matrix,
        }
    }
}

/// Hedonic game parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HedonicConfig {
    /// Initial membership of every group.
    pub groups: BTreeMap<GroupId, Vec<AgentId>>,
    /// Friend and enemy graph.
    #[serde(default)]
    pub relationships: Relationships,
    /// Utility weights.
    #[serde(default)]
    pub weights: Weights,
    /// Carry each player's resolved world into its next round.
    #[serde(default)]
    pub persist_moves: bool,
    /// Move substituted for failed or invalid answers.
    #[serde(default = "default_hedonic_action")]
    pub default_action: HedonicAction,
}

const fn default_hedonic_action() -> HedonicAction {
    HedonicAction::Stay
}

impl HedonicConfig {
    /// Build the configured starting snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError`] if membership is not a partition or a weight is
    /// invalid.
    pub fn world(&self) -> Result<WorldModel, WorldError> {
        WorldModel::new(self.groups.clone(), self.relationships.clone(), self.weights)
    }

    fn validate(&self, players: &[PlayerConfig]) -> Result<(), ConfigError> {
        let world = self.world()?;
        for player in players {
            if !self.relationships.mentions(&player.id) {
                return Err(invalid(
                    "game.relationships",
                    format!("player {} is missing from the relationship graph", player.id),
                ));
            }
        }
        if let HedonicAction::Join(group) = &self.default_action {
            if world.members(group).is_none() {
                return Err(invalid(
                    "game.default_action",
                    format!("default joins unknown group {group}"),
                ));
            }
        }
        Ok(())
    }
}

/// Rank congestion parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RankConfig {
    /// Number of ranks on the board.
    pub ranks: u32,
    /// Optional friend graph used for scoring.
    #[serde(default)]
    pub friends: BTreeMap<AgentId, BTreeSet<AgentId>>,
    /// Rank substituted for failed or invalid answers (default: the worst rank).
    #[serde(default)]
    pub default_rank: Option<u32>,
}

impl RankConfig {
    /// The effective default rank.
    pub fn default_rank(&self) -> u32 {
        self.default_rank.unwrap_or(self.ranks)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ranks == 0 {
            return Err(invalid("game.ranks", "must be at least 1"));
        }
        let default = self.default_rank();
        if default == 0 || default > self.ranks {
            return Err(invalid(
                "game.default_rank",
                format!("{default} is outside 1..={}", self.ranks),
            ));
        }
        Ok(())
    }
}

/// Resource commons parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommonsConfig {
    /// Stock at the start of round 1.
    pub initial_stock: f64,
    /// Consumer population at the start of round 1.
    #[serde(default = "default_initial_consumers")]
    pub initial_consumers: f64,
    /// Ecological constants and the dynamics variant.
    pub ecology: CommonsParams,
    /// Draw substituted for failed or invalid answers.
    #[serde(default)]
    pub default_draw: f64,
}

const fn default_initial_consumers() -> f64 {
    10_000.0
}

impl CommonsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.ecology.validated()?;
        for (field, value) in [
            ("game.initial_stock", self.initial_stock),
            ("game.initial_consumers", self.initial_consumers),
            ("game.default_draw", self.default_draw),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, format!("{value} is not a non-negative number")));
            }
        }
        if self.default_draw > self.ecology.max_draw {
            return Err(invalid("game.default_draw", "exceeds ecology.max_draw"));
        }
        Ok(())
    }
}

/// Coalition effort allocation parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CoalitionConfig {
    /// Gains, model weight and friends.
    pub gains: CoalitionParams,
    /// C1 share (percent) substituted for failed or invalid answers.
    #[serde(default = "default_allocation")]
    pub default_allocation: f64,
}

const fn default_allocation() -> f64 {
    50.0
}

impl CoalitionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.gains.validate()?;
        if !(0.0..=100.0).contains(&self.default_allocation) {
            return Err(invalid("game.default_allocation", "must be within 0..=100"));
        }
        Ok(())
    }
}

/// Two-seat strategy matrix parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MatrixConfig {
    /// Strategy labels, the outcome grid and how entries are read.
    pub matrix: PayoffMatrix,
    /// Optional friend graph used for scoring.
    #[serde(default)]
    pub friends: BTreeMap<AgentId, BTreeSet<AgentId>>,
    /// One-based strategy substituted for failed or invalid answers
    /// (default: the last strategy).
    #[serde(default)]
    pub default_strategy: Option<usize>,
}

impl MatrixConfig {
    /// The effective default strategy, if it names one.
    pub fn default_strategy(&self) -> Option<Strategy> {
        match self.default_strategy {
            Some(number) => Strategy::from_number(number),
            None => self.matrix.strategies.len().checked_sub(1).map(Strategy),
        }
    }

    fn validate(&self, players: &[PlayerConfig]) -> Result<(), ConfigError> {
        self.matrix.validate()?;
        if players.len() != 2 {
            return Err(invalid(
                "players",
                format!("a matrix game seats exactly two players, got {}", players.len()),
            ));
        }
        let strategies = self.matrix.strategies.len();
        match self.default_strategy() {
            Some(strategy) if strategy.0 < strategies => Ok(()),
            _ => Err(invalid(
                "game.default_strategy",
                format!("must be within 1..={strategies}"),
            )),
        }
    }
}
