//! Game worlds, move resolvers, and counterfactual scoring for Altruism Arena.
//!
//! Everything in this crate is synchronous and pure: a world is a value, a
//! transition returns a new value, and randomness is always injected by the
//! caller so outcomes can be pinned in tests.
//!
//! # Modules
//!
//! - [`hedonic`] -- [`WorldModel`] snapshots of group membership with the
//!   friend/enemy utility and copy-on-transition moves.
//! - [`rank`] -- Rank-slot congestion resolver with gap shifting and
//!   cascading reassignment of congestion losers.
//! - [`commons`] -- Shared-stock dynamics (simple and logistic variants) and
//!   per-round draw worlds.
//! - [`coalition`] -- Two-coalition effort allocation with preference-model
//!   predictions.
//! - [`matrix`] -- Two-seat strategy matrices such as route choice under
//!   congestion.
//! - [`scorer`] -- The [`Counterfactual`] seam and the altruism scorer.
//! - [`error`] -- Error types for world operations.

pub mod coalition;
pub mod commons;
pub mod error;
pub mod hedonic;
pub mod matrix;
pub mod rank;
pub mod scorer;

// Re-export primary types at crate root.
pub use coalition::{CoalitionParams, CoalitionWorld, PreferenceModel};
pub use commons::{CommonsParams, CommonsState, CommonsWorld, Dynamics};
pub use error::WorldError;
pub use hedonic::{Relationships, Weights, WorldModel};
pub use matrix::{MatrixSeat, MatrixWorld, OutcomeSense, PayoffMatrix, Strategy};
pub use rank::{RankOutcome, RankWorld, resolve_congestion, slots_from_proposals};
pub use scorer::{
    Counterfactual, CounterfactualScore, HarmDeduction, ScoringPolicy, SelfishTieBreak,
    score_choice,
};
