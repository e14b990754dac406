//! Game session loop.
//!
//! A [`GameSession`] owns one game, one decision source per seat and one
//! result sink. Each round it:
//!
//! 1. Builds every seat's [`DecisionRequest`] from the state at round start.
//! 2. Dispatches all requests concurrently through the [`RetryPolicy`].
//! 3. Validates each answer, substituting the game's default move for
//!    invalid answers and exhausted retries.
//! 4. Resolves and scores the round, and streams every record to the sink.
//!
//! Decision failures never abort a session. Only world precondition
//! violations and sink failures do, and the sink is finished either way.

use std::collections::BTreeMap;

use altruism_types::{AgentId, GameKind, Provenance, SessionId};
use altruism_world::{ScoringPolicy, WorldError};
use chrono::Utc;
use futures::future::join_all;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::decision::{DecisionRequest, DecisionSource};
use crate::games::GameRules;
use crate::report::SessionReport;
use crate::retry::{RetryPolicy, Solicited};
use crate::sink::{ResultSink, RoundRecord, SessionHeader, SinkError};

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A seated agent has no decision source.
    #[error("no decision source for agent {agent}")]
    MissingSource {
        /// The agent without a source.
        agent: AgentId,
    },

    /// A decision source was supplied for an agent the game does not seat.
    #[error("agent {agent} is not seated in this game")]
    UnknownSeat {
        /// The unexpected agent.
        agent: AgentId,
    },

    /// A world precondition was violated.
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },

    /// The result sink failed.
    #[error("sink error: {source}")]
    Sink {
        /// The underlying sink error.
        #[from]
        source: SinkError,
    },
}

/// What a completed session produced.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// The session identifier.
    pub session: SessionId,
    /// Game family.
    pub game: GameKind,
    /// Rounds actually played.
    pub rounds_played: u32,
    /// Whether the game ended before the round budget.
    pub ended_early: bool,
    /// Every record, in round then seat order.
    pub records: Vec<RoundRecord>,
    /// Per-player aggregates.
    pub report: SessionReport,
}

/// One scenario run: a game, a decision source per seat and a result sink.
pub struct GameSession<G, D, S> {
    id: SessionId,
    scenario: String,
    game: G,
    seats: Vec<(AgentId, D)>,
    sink: S,
    rounds: u32,
    policy: ScoringPolicy,
    retry: RetryPolicy,
    rng: SmallRng,
}

impl<G, D, S> GameSession<G, D, S>
where
    G: GameRules,
    D: DecisionSource,
    S: ResultSink,
{
    /// Seat one decision source per game agent.
    ///
    /// Sources are reordered to the game's seat order.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingSource`] if a game agent has no source
    /// and [`SessionError::UnknownSeat`] if a source names an agent the game
    /// does not seat.
    pub fn new(
        scenario: impl Into<String>,
        settings: &SessionConfig,
        game: G,
        sources: Vec<(AgentId, D)>,
        sink: S,
    ) -> Result<Self, SessionError> {
        let mut sources: BTreeMap<AgentId, D> = sources.into_iter().collect();
        let mut seats = Vec::with_capacity(game.agents().len());
        for agent in game.agents() {
            let source = sources
                .remove(agent)
                .ok_or_else(|| SessionError::MissingSource {
                    agent: agent.clone(),
                })?;
            seats.push((agent.clone(), source));
        }
        if let Some(agent) = sources.into_keys().next() {
            return Err(SessionError::UnknownSeat { agent });
        }

        Ok(Self {
            id: SessionId::new(),
            scenario: scenario.into(),
            game,
            seats,
            sink,
            rounds: settings.rounds,
            policy: settings.scoring_policy(),
            retry: RetryPolicy::from(&settings.retry),
            rng: SmallRng::seed_from_u64(settings.seed),
        })
    }

    /// The session identifier.
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Play every round, then finish the sink.
    ///
    /// Returns the summary together with the finished sink.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if a world precondition is violated or the
    /// sink fails. The sink is finished before the error is returned.
    pub async fn run(mut self) -> Result<(SessionSummary, S), SessionError> {
        for (_, source) in &mut self.seats {
            source.reset();
        }

        let header = SessionHeader {
            session: self.id,
            scenario: self.scenario.clone(),
            game: self.game.kind(),
            players: self.game.agents().to_vec(),
            rounds: self.rounds,
            started_at: Utc::now(),
        };
        self.sink.begin(&header)?;
        info!(
            session = %self.id,
            scenario = %self.scenario,
            game = %header.game,
            players = header.players.len(),
            rounds = self.rounds,
            "Session starting"
        );

        let outcome = self.play().await;
        let finished = self.sink.finish();
        let summary = outcome?;
        finished?;

        info!(
            session = %summary.session,
            rounds_played = summary.rounds_played,
            ended_early = summary.ended_early,
            defaults = summary.report.defaults(),
            "Session ended"
        );
        Ok((summary, self.sink))
    }

    async fn play(&mut self) -> Result<SessionSummary, SessionError> {
        let mut records = Vec::new();
        let mut report = SessionReport::new();
        let mut rounds_played: u32 = 0;
        let mut ended_early = false;

        for round in 1..=self.rounds {
            if self.game.is_over() {
                info!(round, "Game over before round budget");
                ended_early = true;
                break;
            }

            for (agent, record) in self.play_round(round).await? {
                report.observe(&agent, &record.record);
                records.push(record);
            }
            rounds_played = round;
        }

        Ok(SessionSummary {
            session: self.id,
            game: self.game.kind(),
            rounds_played,
            ended_early,
            records,
            report,
        })
    }

    async fn play_round(
        &mut self,
        round: u32,
    ) -> Result<Vec<(AgentId, RoundRecord)>, SessionError> {
        // Every request is built before any is dispatched, so no source can
        // see another seat's move for this round.
        let requests: Vec<DecisionRequest> = self
            .seats
            .iter()
            .map(|(agent, _)| DecisionRequest {
                session: self.id,
                round,
                agent: agent.clone(),
                game: self.game.kind(),
                context: self.game.context(agent, round),
                legal: self.game.legal_actions(agent),
            })
            .collect();

        let retry = self.retry;
        let answers = join_all(self.seats.iter_mut().zip(requests).map(
            |((_, source), request)| async move {
                let solicited = retry.solicit(source, &request).await;
                (request.agent, solicited)
            },
        ))
        .await;

        let mut moves = BTreeMap::new();
        let mut provenance = BTreeMap::new();
        for (agent, solicited) in answers {
            let (chosen, prov, rationale) = self.settle(&agent, solicited);
            debug!(round, agent = %agent, action = %chosen, "Move settled");
            moves.insert(agent.clone(), chosen);
            provenance.insert(agent, (prov, rationale));
        }

        let mut scores = self
            .game
            .play_round(round, &moves, self.policy, &mut self.rng)?;

        let mut out = Vec::with_capacity(self.seats.len());
        for (agent, _) in &self.seats {
            let score = scores
                .remove(agent)
                .ok_or_else(|| WorldError::AgentNotFound(agent.clone()))?;
            let (prov, rationale) = provenance
                .remove(agent)
                .ok_or_else(|| WorldError::AgentNotFound(agent.clone()))?;
            let record = score
                .score
                .into_record(self.game.kind(), score.metrics, prov, rationale);
            self.sink.record(round, agent, &record)?;
            debug!(
                round,
                agent = %agent,
                chosen = %record.chosen_action,
                selfish = %record.selfish_action,
                altruism_score = record.altruism_score,
                "Agent scored"
            );
            out.push((
                agent.clone(),
                RoundRecord {
                    round,
                    agent: agent.clone(),
                    record,
                },
            ));
        }

        info!(round, agents = out.len(), "Round complete");
        Ok(out)
    }

    /// Turn a solicited answer into the move that will be played.
    fn settle(&self, agent: &AgentId, solicited: Solicited) -> (G::Move, Provenance, String) {
        match solicited {
            Solicited::Answered { proposal, attempts } => {
                match self.game.validate(agent, &proposal.value) {
                    Ok(chosen) => (
                        chosen,
                        Provenance::Decided { attempts },
                        proposal.rationale,
                    ),
                    Err(reason) => {
                        let default = self.game.default_move(agent);
                        warn!(
                            agent = %agent,
                            submitted = %proposal.value,
                            reason = %reason,
                            default = %default,
                            "Invalid move, substituting default"
                        );
                        let rationale = format!(
                            "{} (Invalid response: {reason}; defaulted to {default})",
                            proposal.rationale
                        );
                        (
                            default,
                            Provenance::InvalidAction {
                                attempts,
                                submitted: proposal.value.to_string(),
                            },
                            rationale,
                        )
                    }
                }
            }
            Solicited::Exhausted { attempts, error } => {
                let default = self.game.default_move(agent);
                warn!(
                    agent = %agent,
                    attempts,
                    error = %error,
                    default = %default,
                    "Decision failed, substituting default"
                );
                let rationale = format!("(Request failed, defaulted to {default}: {error})");
                (
                    default,
                    Provenance::Defaulted {
                        attempts,
                        error: error.to_string(),
                    },
                    rationale,
                )
            }
        }
    }
}
