//! Shared type definitions for the Altruism Arena game engine.
//!
//! This crate is the single source of truth for the values that cross crate
//! boundaries: identifiers, moves, and the per-round scoring record handed to
//! result sinks.
//!
//! # Modules
//!
//! - [`ids`] -- Name-based agent and group identifiers, UUID session ids
//! - [`actions`] -- Raw move values, legal action sets, hedonic actions
//! - [`enums`] -- Game family enumeration
//! - [`records`] -- Scoring records and move provenance

pub mod actions;
pub mod enums;
pub mod ids;
pub mod records;

// Re-export all public types at crate root for convenience.
pub use actions::{HedonicAction, LegalActions, MoveValue};
pub use enums::GameKind;
pub use ids::{AgentId, GroupId, SessionId};
pub use records::{ActionUtility, Provenance, ScoringRecord};
