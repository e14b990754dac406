//! Command-line runner for Altruism Arena.
//!
//! Loads a scenario, seats each player with the decision source it names
//! (a language model, a scripted move list or a human at the console), plays
//! the session and appends one JSON line per agent per round to the results
//! file. A per-player summary is printed to standard output at the end.
//!
//! # Architecture
//!
//! ```text
//! scenario.yaml --> GameSession --> PromptEngine --> LlmBackend --> parse --> game rules
//!                        |
//!                        +--> JsonlSink (results.jsonl)
//! ```

mod config;
mod error;
mod llm;
mod parse;
mod prompt;
mod source;

use std::sync::Arc;

use altruism_core::config::{GameConfig, ScenarioConfig, SourceConfig};
use altruism_core::decision::DecisionSource;
use altruism_core::games::{
    CoalitionGame, CommonsGame, GameRules, HedonicGame, MatrixGame, RankGame,
};
use altruism_core::session::{GameSession, SessionError, SessionSummary};
use altruism_core::sink::{JsonlSink, ResultSink};
use altruism_types::AgentId;
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, RunnerConfig};
use crate::error::RunnerError;
use crate::llm::create_backend;
use crate::prompt::PromptEngine;
use crate::source::SourceFactory;

/// Application entry point.
///
/// Reads configuration from the environment, plays the scenario once and
/// prints the session report.
///
/// # Errors
///
/// Returns an error if configuration, templates or the scenario are invalid,
/// or if the session is aborted by a world or sink failure.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RunnerConfig::from_env()?;
    init_tracing(config.log_format);

    info!("altruism-runner starting");
    info!(
        scenario_file = %config.scenario_file.display(),
        results_file = %config.results_file.display(),
        templates_dir = config.templates_dir,
        backend = ?config.backend.backend_type,
        api_url = config.backend.api_url,
        "configuration loaded"
    );

    let scenario = ScenarioConfig::from_file(&config.scenario_file)
        .with_context(|| format!("loading {}", config.scenario_file.display()))?;
    info!(
        scenario = scenario.name,
        game = %scenario.game.kind(),
        players = scenario.players.len(),
        rounds = scenario.session.rounds,
        seed = scenario.session.seed,
        "scenario loaded"
    );

    let prompts = Arc::new(PromptEngine::new(&config.templates_dir)?);
    info!(templates_dir = config.templates_dir, "prompt templates loaded");

    let needs_llm = scenario
        .players
        .iter()
        .any(|p| matches!(p.source, SourceConfig::Llm { .. }));
    let backend = if needs_llm {
        if config.backend.api_key.is_empty() && config.backend.requires_key() {
            return Err(RunnerError::Config(
                "scenario seats LLM players but LLM_API_KEY is not set".to_owned(),
            )
            .into());
        }
        let backend = create_backend(&config.backend);
        info!(backend = backend.name(), "LLM backend configured");
        Some(Arc::new(backend))
    } else {
        None
    };

    let mut factory = SourceFactory {
        backend,
        prompts,
        console: None,
    };
    let sources = factory.build(&scenario.players)?;
    let sink = JsonlSink::open(&config.results_file)
        .with_context(|| format!("opening {}", config.results_file.display()))?;

    let ids = scenario.player_ids();
    let summary = match &scenario.game {
        GameConfig::Hedonic(game) => {
            run_session(&scenario, HedonicGame::new(game, ids)?, sources, sink).await?
        }
        GameConfig::Rank(game) => {
            run_session(&scenario, RankGame::new(game, ids), sources, sink).await?
        }
        GameConfig::Commons(game) => {
            run_session(&scenario, CommonsGame::new(game, ids), sources, sink).await?
        }
        GameConfig::Coalition(game) => {
            run_session(&scenario, CoalitionGame::new(game, ids), sources, sink).await?
        }
        GameConfig::Matrix(game) => {
            run_session(&scenario, MatrixGame::new(game, ids), sources, sink).await?
        }
    };

    info!(
        session = %summary.session,
        game = %summary.game,
        rounds_played = summary.rounds_played,
        ended_early = summary.ended_early,
        records = summary.records.len(),
        results_file = %config.results_file.display(),
        "results written"
    );
    println!("\n{} ({}, session {})", scenario.name, summary.game, summary.session);
    print!("{}", summary.report);

    Ok(())
}

/// Play one session of `game` and return its summary.
async fn run_session<G, D, S>(
    scenario: &ScenarioConfig,
    game: G,
    sources: Vec<(AgentId, D)>,
    sink: S,
) -> Result<SessionSummary, SessionError>
where
    G: GameRules,
    D: DecisionSource,
    S: ResultSink,
{
    let session = GameSession::new(&scenario.name, &scenario.session, game, sources, sink)?;
    let (summary, _sink) = session.run().await?;
    Ok(summary)
}

/// Install the global `tracing` subscriber.
///
/// Logs go to standard error so standard output stays free for console
/// prompts and the final report.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
