//! Prompt template loading and rendering via `minijinja`.
//!
//! Templates are read from disk once at startup so wording can be tuned
//! without recompiling. Each game family has its own user-message template;
//! `system.j2` is shared and `altruism_injection.j2` is the preamble some
//! players get in front of every user message.

use altruism_core::decision::DecisionRequest;
use minijinja::Environment;

use crate::error::RunnerError;

/// Template names, each loaded from `<name>.j2`.
const TEMPLATES: [&str; 7] = [
    "system",
    "altruism_injection",
    "hedonic",
    "rank",
    "commons",
    "coalition",
    "matrix",
];

/// Manages prompt template loading and rendering.
pub struct PromptEngine {
    env: Environment<'static>,
}

/// A rendered prompt ready to send to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    /// System message: the rules of engagement and the answer format.
    pub system: String,
    /// User message: this round's situation and legal moves.
    pub user: String,
}

impl PromptEngine {
    /// Load every template from `templates_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Template`] if a file is missing or does not
    /// compile.
    pub fn new(templates_dir: &str) -> Result<Self, RunnerError> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);

        for name in TEMPLATES {
            let source = load_template(templates_dir, &format!("{name}.j2"))?;
            env.add_template_owned(name, source)
                .map_err(|e| RunnerError::Template(format!("failed to add {name} template: {e}")))?;
        }

        Ok(Self { env })
    }

    /// Render the prompt for one decision request.
    ///
    /// The template context is the game's own context object extended with
    /// `game`, `legal` (a sentence) and `legal_actions` (the structured form).
    /// With `altruism_injection` set, the injection preamble is prepended to
    /// the user message.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Template`] if rendering fails.
    pub fn render(
        &self,
        request: &DecisionRequest,
        altruism_injection: bool,
    ) -> Result<RenderedPrompt, RunnerError> {
        let ctx = template_context(request)?;

        let system = self.render_one("system", &ctx)?;
        let situation = self.render_one(request.game.as_str(), &ctx)?;
        let user = if altruism_injection {
            let preamble = self.render_one("altruism_injection", &ctx)?;
            format!("{}\n\n{}", preamble.trim_end(), situation)
        } else {
            situation
        };

        Ok(RenderedPrompt { system, user })
    }

    fn render_one(&self, name: &str, ctx: &serde_json::Value) -> Result<String, RunnerError> {
        self.env
            .get_template(name)
            .map_err(|e| RunnerError::Template(format!("missing {name} template: {e}")))?
            .render(ctx)
            .map_err(|e| RunnerError::Template(format!("{name} render failed: {e}")))
    }
}

fn template_context(request: &DecisionRequest) -> Result<serde_json::Value, RunnerError> {
    let mut ctx = match &request.context {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    ctx.insert("game".to_owned(), serde_json::to_value(request.game)?);
    ctx.insert("round".to_owned(), serde_json::to_value(request.round)?);
    ctx.insert("agent".to_owned(), serde_json::to_value(&request.agent)?);
    ctx.insert(
        "legal".to_owned(),
        serde_json::Value::String(request.legal.to_string()),
    );
    ctx.insert(
        "legal_actions".to_owned(),
        serde_json::to_value(&request.legal)?,
    );
    Ok(serde_json::Value::Object(ctx))
}

/// Read a template file from disk.
fn load_template(dir: &str, filename: &str) -> Result<String, RunnerError> {
    let path = std::path::Path::new(dir).join(filename);
    std::fs::read_to_string(&path)
        .map_err(|e| RunnerError::Template(format!("failed to read {}: {e}", path.display())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use altruism_types::{AgentId, GameKind, LegalActions, SessionId};

    use super::*;

    fn write_templates(dir: &std::path::Path) {
        let files = [
            ("system.j2", "You are {{ agent }}. Answer with JSON."),
            ("altruism_injection.j2", "Prioritize the well-being of others."),
            (
                "hedonic.j2",
                "Round {{ round }}. You are in {{ current_group }}.\nFriends: {{ friends | join(', ') }}\nChoose {{ legal }}.",
            ),
            ("rank.j2", "Pick a rank, {{ legal }}."),
            ("commons.j2", "Stock is {{ stock }}."),
            ("coalition.j2", "Split {{ total_effort }} units."),
            ("matrix.j2", "Pick one of {{ strategies | length }}."),
        ];
        for (name, body) in files {
            std::fs::write(dir.join(name), body).unwrap();
        }
    }

    fn hedonic_request() -> DecisionRequest {
        DecisionRequest {
            session: SessionId::new(),
            round: 2,
            agent: AgentId::from("You"),
            game: GameKind::Hedonic,
            context: serde_json::json!({
                "current_group": "Group A",
                "friends": ["Alice", "Clara"],
            }),
            legal: LegalActions::Choice {
                options: vec!["STAY".to_owned(), "LEAVE".to_owned()],
            },
        }
    }

    #[test]
    fn renders_the_game_template() {
        let dir = tempfile::tempdir().unwrap();
        write_templates(dir.path());
        let engine = PromptEngine::new(dir.path().to_str().unwrap()).unwrap();

        let prompt = engine.render(&hedonic_request(), false).unwrap();
        assert_eq!(prompt.system, "You are You. Answer with JSON.");
        assert!(prompt.user.starts_with("Round 2. You are in Group A."));
        assert!(prompt.user.contains("Friends: Alice, Clara"));
        assert!(prompt.user.contains("one of: STAY, LEAVE"));
    }

    #[test]
    fn injection_leads_the_user_message() {
        let dir = tempfile::tempdir().unwrap();
        write_templates(dir.path());
        let engine = PromptEngine::new(dir.path().to_str().unwrap()).unwrap();

        let prompt = engine.render(&hedonic_request(), true).unwrap();
        assert!(prompt.user.starts_with("Prioritize the well-being of others.\n\nRound 2."));
    }

    #[test]
    fn missing_template_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("system.j2"), "hi").unwrap();
        let result = PromptEngine::new(dir.path().to_str().unwrap());
        assert!(matches!(result, Err(RunnerError::Template(_))));
    }

    #[test]
    fn shipped_templates_render_every_family() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/templates");
        let engine = PromptEngine::new(dir).unwrap();
        for (game, context, legal) in [
            (
                GameKind::Hedonic,
                serde_json::json!({
                    "current_group": "Group A",
                    "groups": {"Group A": ["You", "Alice"], "Group B": ["Bob"]},
                    "friends": ["Alice"],
                    "enemies": ["Bob"],
                    "utility": 1.0,
                }),
                LegalActions::Choice {
                    options: vec!["STAY".to_owned(), "LEAVE".to_owned(), "JOIN Group B".to_owned()],
                },
            ),
            (
                GameKind::Rank,
                serde_json::json!({
                    "ranks": 4,
                    "players": 4,
                    "cumulative_points": 3,
                    "last_rank": 2,
                    "last_board": ["a", "You", null, null],
                }),
                LegalActions::Integer { min: 1, max: 4 },
            ),
            (
                GameKind::Commons,
                serde_json::json!({
                    "stock": 100.0,
                    "consumers": 10.0,
                    "crews": 2,
                    "max_draw": 10.0,
                }),
                LegalActions::Range { min: 0.0, max: 10.0 },
            ),
            (
                GameKind::Coalition,
                serde_json::json!({
                    "total_effort": 100.0,
                    "own_gain_c1": 2.0,
                    "own_gain_c2": 0.0,
                    "friends_gain_c1": 0.0,
                    "friends_gain_c2": 3.0,
                    "friends": ["Agent 2"],
                }),
                LegalActions::Range { min: 0.0, max: 100.0 },
            ),
            (
                GameKind::Matrix,
                serde_json::json!({
                    "sense": "cost",
                    "strategies": [
                        {"number": 1, "label": "Route 1"},
                        {"number": 2, "label": "Route 2"},
                    ],
                    "outcomes": [
                        {"mine": 1, "theirs": 1, "my_outcome": 6.0, "their_outcome": 6.0},
                        {"mine": 1, "theirs": 2, "my_outcome": 2.0, "their_outcome": 4.0},
                    ],
                    "cumulative_outcome": 4.0,
                    "last_self": "Route 2",
                    "last_other": "Route 1",
                }),
                LegalActions::Integer { min: 1, max: 2 },
            ),
        ] {
            let request = DecisionRequest {
                session: SessionId::new(),
                round: 1,
                agent: AgentId::from("You"),
                game,
                context,
                legal,
            };
            let prompt = engine.render(&request, true).unwrap();
            assert!(prompt.system.contains("\"value\""), "{game}");
            assert!(!prompt.user.is_empty(), "{game}");
        }
    }
}
