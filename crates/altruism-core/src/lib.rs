//! Scenario configuration, decision retry, game sessions and result sinks
//! for Altruism Arena.
//!
//! This crate drives rounds of a game: it asks every seat's decision source
//! for a move, substitutes defaults when a source fails, hands the settled
//! moves to the game family's rules, and streams one scoring record per agent
//! per round to a result sink.
//!
//! # Modules
//!
//! - [`config`] -- Scenario loading from YAML into strongly-typed structs.
//! - [`decision`] -- [`DecisionSource`] trait and [`ScriptedDecisionSource`].
//! - [`retry`] -- Bounded retry with per-attempt timeout and backoff.
//! - [`games`] -- [`GameRules`] and the hedonic, rank, commons, coalition
//!   and matrix families.
//! - [`session`] -- The [`GameSession`] round loop.
//! - [`sink`] -- [`ResultSink`] with in-memory and JSON Lines implementations.
//! - [`report`] -- Per-player aggregates over a session.
//!
//! [`DecisionSource`]: decision::DecisionSource
//! [`ScriptedDecisionSource`]: decision::ScriptedDecisionSource
//! [`GameRules`]: games::GameRules
//! [`GameSession`]: session::GameSession
//! [`ResultSink`]: sink::ResultSink

pub mod config;
pub mod decision;
pub mod games;
pub mod report;
pub mod retry;
pub mod session;
pub mod sink;
