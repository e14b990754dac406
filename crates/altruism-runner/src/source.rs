//! Decision sources the runner can seat: language models, humans at the
//! console, and the core crate's scripted players.

use std::sync::Arc;

use altruism_core::config::{PlayerConfig, SourceConfig};
use altruism_core::decision::{
    DecisionError, DecisionRequest, DecisionSource, Proposal, ScriptedDecisionSource,
};
use altruism_types::{AgentId, MoveValue};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::RunnerError;
use crate::llm::{ChatMessage, LlmBackend};
use crate::parse::parse_reply;
use crate::prompt::PromptEngine;

/// A player driven by a language model.
///
/// The player keeps its own chat history for the length of a session, so the
/// model sees its earlier prompts and answers. A request that fails or times
/// out leaves the history untouched.
pub struct LlmDecisionSource {
    model: String,
    altruism_injection: bool,
    backend: Arc<LlmBackend>,
    prompts: Arc<PromptEngine>,
    history: Vec<ChatMessage>,
}

impl LlmDecisionSource {
    /// Seat `model` behind `backend`.
    pub fn new(
        model: impl Into<String>,
        altruism_injection: bool,
        backend: Arc<LlmBackend>,
        prompts: Arc<PromptEngine>,
    ) -> Self {
        Self {
            model: model.into(),
            altruism_injection,
            backend,
            prompts,
            history: Vec::new(),
        }
    }

    async fn ask(&mut self, request: &DecisionRequest) -> Result<Proposal, RunnerError> {
        let prompt = self.prompts.render(request, self.altruism_injection)?;

        let mut messages = self.history.clone();
        messages.push(ChatMessage::user(prompt.user));
        let reply = self
            .backend
            .complete(&self.model, &prompt.system, &messages)
            .await?;
        debug!(
            agent = %request.agent,
            round = request.round,
            model = %self.model,
            reply_len = reply.len(),
            "LLM replied"
        );

        let proposal = parse_reply(&reply)?;
        messages.push(ChatMessage::assistant(reply));
        self.history = messages;
        Ok(proposal)
    }
}

impl DecisionSource for LlmDecisionSource {
    fn name(&self) -> &str {
        &self.model
    }

    async fn propose(&mut self, request: &DecisionRequest) -> Result<Proposal, DecisionError> {
        self.ask(request)
            .await
            .map_err(|e| DecisionError::internal(e.to_string()))
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}

type ConsoleReader = Box<dyn AsyncBufRead + Send + Unpin>;
type ConsoleLines = Lines<ConsoleReader>;

/// Console input shared by every console player of a process.
pub type ConsoleInput = Arc<Mutex<ConsoleLines>>;

/// Open the shared console input on standard input.
pub fn console_input() -> ConsoleInput {
    shared_input(BufReader::new(tokio::io::stdin()))
}

fn shared_input(reader: impl AsyncBufRead + Send + Unpin + 'static) -> ConsoleInput {
    let reader: ConsoleReader = Box::new(reader);
    Arc::new(Mutex::new(reader.lines()))
}

/// A human player typing moves at the console.
///
/// Console players take turns. A player takes the input in
/// [`DecisionSource::ready`], before its attempt's deadline starts, and
/// holds it while its prompt is shown and its line is read.
pub struct ConsoleDecisionSource {
    input: ConsoleInput,
    prompts: Arc<PromptEngine>,
    turn: Option<OwnedMutexGuard<ConsoleLines>>,
}

impl ConsoleDecisionSource {
    /// Seat a human reading prompts rendered by `prompts`.
    pub const fn new(input: ConsoleInput, prompts: Arc<PromptEngine>) -> Self {
        Self {
            input,
            prompts,
            turn: None,
        }
    }

    async fn ask(&mut self, request: &DecisionRequest) -> Result<Proposal, RunnerError> {
        let mut input = match self.turn.take() {
            Some(turn) => turn,
            None => Arc::clone(&self.input).lock_owned().await,
        };
        let prompt = self.prompts.render(request, false)?;

        let banner = format!(
            "\n=== {} · round {} ===\n{}\nYour move ({}): ",
            request.agent, request.round, prompt.user, request.legal
        );
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(banner.as_bytes())
            .await
            .map_err(|e| RunnerError::Console(format!("failed to write prompt: {e}")))?;
        stdout
            .flush()
            .await
            .map_err(|e| RunnerError::Console(format!("failed to flush prompt: {e}")))?;

        let line = input
            .next_line()
            .await
            .map_err(|e| RunnerError::Console(format!("failed to read move: {e}")))?
            .ok_or_else(|| RunnerError::Console("standard input closed".to_owned()))?;

        let value = line.trim();
        if value.is_empty() {
            return Err(RunnerError::Parse("empty move".to_owned()));
        }
        Ok(Proposal::new(MoveValue::from(value), "entered at console"))
    }
}

impl DecisionSource for ConsoleDecisionSource {
    fn name(&self) -> &str {
        "console"
    }

    async fn ready(&mut self) {
        if self.turn.is_none() {
            self.turn = Some(Arc::clone(&self.input).lock_owned().await);
        }
    }

    async fn propose(&mut self, request: &DecisionRequest) -> Result<Proposal, DecisionError> {
        self.ask(request)
            .await
            .map_err(|e| DecisionError::internal(e.to_string()))
    }
}

/// Any decision source a scenario can name.
pub enum PlayerSource {
    /// Language model.
    Llm(LlmDecisionSource),
    /// Fixed move list.
    Scripted(ScriptedDecisionSource),
    /// Human at the console.
    Console(ConsoleDecisionSource),
}

impl DecisionSource for PlayerSource {
    fn name(&self) -> &str {
        match self {
            Self::Llm(s) => s.name(),
            Self::Scripted(s) => s.name(),
            Self::Console(s) => s.name(),
        }
    }

    async fn ready(&mut self) {
        match self {
            Self::Llm(s) => s.ready().await,
            Self::Scripted(s) => s.ready().await,
            Self::Console(s) => s.ready().await,
        }
    }

    async fn propose(&mut self, request: &DecisionRequest) -> Result<Proposal, DecisionError> {
        match self {
            Self::Llm(s) => s.propose(request).await,
            Self::Scripted(s) => s.propose(request).await,
            Self::Console(s) => s.propose(request).await,
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Llm(s) => s.reset(),
            Self::Scripted(s) => s.reset(),
            Self::Console(s) => s.reset(),
        }
    }
}

/// Shared collaborators the sources of one session are built from.
pub struct SourceFactory {
    /// LLM API, absent when no player needs one.
    pub backend: Option<Arc<LlmBackend>>,
    /// Rendered prompts for LLM and console players.
    pub prompts: Arc<PromptEngine>,
    /// Standard input, opened on first use.
    pub console: Option<ConsoleInput>,
}

impl SourceFactory {
    /// Build one source per configured player, in seat order.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] if an `llm` player is configured but
    /// no backend is available.
    pub fn build(
        &mut self,
        players: &[PlayerConfig],
    ) -> Result<Vec<(AgentId, PlayerSource)>, RunnerError> {
        let mut sources = Vec::with_capacity(players.len());
        for player in players {
            sources.push((player.id.clone(), self.build_one(player)?));
        }
        Ok(sources)
    }

    fn build_one(&mut self, player: &PlayerConfig) -> Result<PlayerSource, RunnerError> {
        Ok(match &player.source {
            SourceConfig::Llm {
                model,
                altruism_injection,
            } => {
                let backend = self.backend.clone().ok_or_else(|| {
                    RunnerError::Config(format!(
                        "player {} uses model {model} but no LLM backend is configured",
                        player.id
                    ))
                })?;
                PlayerSource::Llm(LlmDecisionSource::new(
                    model.clone(),
                    *altruism_injection,
                    backend,
                    Arc::clone(&self.prompts),
                ))
            }
            SourceConfig::Scripted { moves } => {
                PlayerSource::Scripted(ScriptedDecisionSource::new(moves.clone()))
            }
            SourceConfig::Console => {
                let input = self.console.get_or_insert_with(console_input);
                PlayerSource::Console(ConsoleDecisionSource::new(
                    Arc::clone(input),
                    Arc::clone(&self.prompts),
                ))
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use altruism_core::config::ScenarioConfig;
    use altruism_core::retry::{RetryPolicy, Solicited};
    use altruism_types::{GameKind, LegalActions, SessionId};

    use super::*;
    use crate::config::{BackendType, LlmBackendConfig};
    use crate::llm::create_backend;

    fn prompts() -> Arc<PromptEngine> {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/templates");
        Arc::new(PromptEngine::new(dir).unwrap())
    }

    fn request() -> DecisionRequest {
        DecisionRequest {
            session: SessionId::new(),
            round: 1,
            agent: AgentId::from("p1"),
            game: GameKind::Rank,
            context: serde_json::json!({
                "ranks": 3,
                "players": 2,
                "cumulative_points": 0,
                "last_rank": null,
                "last_board": null,
            }),
            legal: LegalActions::Integer { min: 1, max: 3 },
        }
    }

    /// A backend pointed at a port nothing listens on.
    fn dead_backend() -> Arc<LlmBackend> {
        Arc::new(create_backend(&LlmBackendConfig {
            backend_type: BackendType::OpenAi,
            api_url: "http://127.0.0.1:9".to_owned(),
            api_key: String::new(),
            temperature: 0.0,
        }))
    }

    const SCENARIO: &str = r"
players:
  - id: p1
    source: { type: scripted, moves: [1, 2] }
  - id: p2
    source: { type: llm, model: gpt-4o-mini, altruism_injection: true }
game:
  kind: rank
  ranks: 3
";

    #[test]
    fn llm_player_without_backend_is_rejected() {
        let scenario = ScenarioConfig::parse(SCENARIO).unwrap();
        let mut factory = SourceFactory {
            backend: None,
            prompts: prompts(),
            console: None,
        };
        assert!(matches!(
            factory.build(&scenario.players),
            Err(RunnerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn builds_sources_in_seat_order() {
        let scenario = ScenarioConfig::parse(SCENARIO).unwrap();
        let mut factory = SourceFactory {
            backend: Some(dead_backend()),
            prompts: prompts(),
            console: None,
        };
        let mut sources = factory.build(&scenario.players).unwrap();
        assert_eq!(sources.len(), 2);

        let (first, scripted) = sources.first_mut().unwrap();
        assert_eq!(first.as_str(), "p1");
        assert_eq!(scripted.name(), "script");
        let proposal = scripted.propose(&request()).await.unwrap();
        assert_eq!(proposal.value, MoveValue::Number(1.0));

        let (second, llm) = sources.get(1).unwrap();
        assert_eq!(second.as_str(), "p2");
        assert_eq!(llm.name(), "gpt-4o-mini");
        assert!(factory.console.is_none());
    }

    #[tokio::test]
    async fn failed_llm_call_leaves_history_untouched() {
        let mut source = LlmDecisionSource::new("gpt-4o-mini", false, dead_backend(), prompts());
        let result = source.propose(&request()).await;
        assert!(matches!(result, Err(DecisionError::Internal { .. })));
        assert!(source.history.is_empty());
    }

    #[tokio::test]
    async fn waiting_for_another_console_player_is_outside_the_deadline() {
        let input = shared_input(&b"2\n"[..]);
        let mut source = ConsoleDecisionSource::new(Arc::clone(&input), prompts());

        let other_player = Arc::clone(&input).lock_owned().await;
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(other_player);
        });

        let policy = RetryPolicy::new(1, Duration::from_millis(200), Duration::ZERO);
        let outcome = policy.solicit(&mut source, &request()).await;
        assert!(matches!(
            outcome,
            Solicited::Answered { ref proposal, attempts: 1 } if proposal.value == MoveValue::from("2")
        ));
        release.await.unwrap();
        assert!(source.turn.is_none());
    }

    #[tokio::test]
    async fn closed_console_is_an_error() {
        let mut source = ConsoleDecisionSource::new(shared_input(&b""[..]), prompts());
        assert!(matches!(
            source.propose(&request()).await,
            Err(DecisionError::Internal { .. })
        ));
    }
}
