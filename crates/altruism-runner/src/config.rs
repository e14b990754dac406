//! Runner process configuration.
//!
//! Everything the binary needs beyond the scenario file comes from
//! environment variables: where the scenario and results live, where prompt
//! templates are, which LLM API to call and how to format logs. Models are
//! chosen per player in the scenario, not here.

use std::path::PathBuf;

use crate::error::RunnerError;

/// Complete runner configuration loaded from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Scenario YAML to play.
    pub scenario_file: PathBuf,
    /// JSON Lines file results are appended to.
    pub results_file: PathBuf,
    /// Directory holding the prompt templates.
    pub templates_dir: String,
    /// LLM API used by every `llm` player.
    pub backend: LlmBackendConfig,
    /// Log output format.
    pub log_format: LogFormat,
}

/// Connection settings for the LLM API.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmBackendConfig {
    /// Which API flavour to speak.
    pub backend_type: BackendType,
    /// Base API URL (e.g. `https://openrouter.ai/api/v1`).
    pub api_url: String,
    /// API key, empty when the endpoint needs none.
    pub api_key: String,
    /// Sampling temperature sent with every request.
    pub temperature: f64,
}

impl LlmBackendConfig {
    /// Whether requests will be rejected without an API key.
    pub fn requires_key(&self) -> bool {
        !self.api_url.contains("localhost") && !self.api_url.contains("127.0.0.1")
    }
}

/// Supported LLM API flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// `OpenAI`-compatible chat completions (`OpenAI`, `OpenRouter`, Ollama).
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

const DEFAULT_TEMPLATES_DIR: &str = "crates/altruism-runner/templates";
const DEFAULT_RESULTS_FILE: &str = "results.jsonl";
const DEFAULT_TEMPERATURE: f64 = 0.2;

impl RunnerConfig {
    /// Load configuration from environment variables.
    ///
    /// Required variables:
    /// - `SCENARIO_FILE` -- path to the scenario YAML
    ///
    /// Optional variables:
    /// - `RESULTS_FILE` -- results path (default `results.jsonl`)
    /// - `TEMPLATES_DIR` -- prompt templates (default `crates/altruism-runner/templates`)
    /// - `LLM_BACKEND` -- `openai`, `openrouter`, `ollama` or `anthropic` (default `openrouter`)
    /// - `LLM_API_URL` -- API base URL (default depends on the backend)
    /// - `LLM_API_KEY` -- API key (default empty)
    /// - `LLM_TEMPERATURE` -- sampling temperature (default 0.2)
    /// - `LOG_FORMAT` -- `text` or `json` (default `text`)
    pub fn from_env() -> Result<Self, RunnerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RunnerError> {
        let scenario_file = lookup("SCENARIO_FILE")
            .map(PathBuf::from)
            .ok_or_else(|| RunnerError::Config("missing required env var SCENARIO_FILE".to_owned()))?;

        let results_file =
            PathBuf::from(lookup("RESULTS_FILE").unwrap_or_else(|| DEFAULT_RESULTS_FILE.to_owned()));

        let templates_dir =
            lookup("TEMPLATES_DIR").unwrap_or_else(|| DEFAULT_TEMPLATES_DIR.to_owned());

        let backend = load_backend_config(&lookup)?;

        let log_format = match lookup("LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "" | "text" | "pretty" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(RunnerError::Config(format!("unknown LOG_FORMAT: {other}")));
            }
        };

        Ok(Self {
            scenario_file,
            results_file,
            templates_dir,
            backend,
            log_format,
        })
    }
}

fn load_backend_config(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<LlmBackendConfig, RunnerError> {
    let backend_str = lookup("LLM_BACKEND").unwrap_or_else(|| "openrouter".to_owned());

    let (backend_type, default_url) = match backend_str.to_lowercase().as_str() {
        "openai" => (BackendType::OpenAi, "https://api.openai.com/v1"),
        "openrouter" => (BackendType::OpenAi, "https://openrouter.ai/api/v1"),
        "ollama" => (BackendType::OpenAi, "http://localhost:11434/v1"),
        "anthropic" | "claude" => (BackendType::Anthropic, "https://api.anthropic.com/v1"),
        other => {
            return Err(RunnerError::Config(format!("unknown backend type: {other}")));
        }
    };

    let api_url = lookup("LLM_API_URL")
        .unwrap_or_else(|| default_url.to_owned())
        .trim_end_matches('/')
        .to_owned();
    let api_key = lookup("LLM_API_KEY").unwrap_or_default();

    let temperature = match lookup("LLM_TEMPERATURE") {
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map_err(|e| RunnerError::Config(format!("invalid LLM_TEMPERATURE: {e}")))?,
        None => DEFAULT_TEMPERATURE,
    };
    if !(0.0..=2.0).contains(&temperature) {
        return Err(RunnerError::Config(format!(
            "LLM_TEMPERATURE {temperature} is outside 0..=2"
        )));
    }

    Ok(LlmBackendConfig {
        backend_type,
        api_url,
        api_key,
        temperature,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<RunnerConfig, RunnerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        RunnerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_need_only_a_scenario() {
        let config = load(&[("SCENARIO_FILE", "scenarios/hedonic.yaml")]).unwrap();
        assert_eq!(config.scenario_file, PathBuf::from("scenarios/hedonic.yaml"));
        assert_eq!(config.results_file, PathBuf::from("results.jsonl"));
        assert_eq!(config.templates_dir, DEFAULT_TEMPLATES_DIR);
        assert_eq!(config.backend.backend_type, BackendType::OpenAi);
        assert_eq!(config.backend.api_url, "https://openrouter.ai/api/v1");
        assert!(config.backend.requires_key());
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn missing_scenario_is_an_error() {
        assert!(matches!(load(&[]), Err(RunnerError::Config(_))));
    }

    #[test]
    fn backend_selection() {
        let anthropic = load(&[("SCENARIO_FILE", "s.yaml"), ("LLM_BACKEND", "Anthropic")]).unwrap();
        assert_eq!(anthropic.backend.backend_type, BackendType::Anthropic);

        let ollama = load(&[
            ("SCENARIO_FILE", "s.yaml"),
            ("LLM_BACKEND", "ollama"),
            ("LLM_API_URL", "http://localhost:11434/v1/"),
        ])
        .unwrap();
        assert_eq!(ollama.backend.api_url, "http://localhost:11434/v1");
        assert!(!ollama.backend.requires_key());

        let unknown = load(&[("SCENARIO_FILE", "s.yaml"), ("LLM_BACKEND", "carrier-pigeon")]);
        assert!(matches!(unknown, Err(RunnerError::Config(_))));
    }

    #[test]
    fn temperature_and_log_format() {
        let config = load(&[
            ("SCENARIO_FILE", "s.yaml"),
            ("LLM_TEMPERATURE", "0.7"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert!((config.backend.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.log_format, LogFormat::Json);

        assert!(load(&[("SCENARIO_FILE", "s.yaml"), ("LLM_TEMPERATURE", "warm")]).is_err());
        assert!(load(&[("SCENARIO_FILE", "s.yaml"), ("LLM_TEMPERATURE", "5")]).is_err());
        assert!(load(&[("SCENARIO_FILE", "s.yaml"), ("LOG_FORMAT", "xml")]).is_err());
    }
}
