//! Error types for the runner binary.
//!
//! Covers everything between a scenario's players and the engine: environment
//! configuration, prompt rendering, LLM calls, response parsing and the
//! console.

/// Errors that can occur while producing a player's move.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Failed to load or render a prompt template.
    #[error("template error: {0}")]
    Template(String),

    /// An LLM backend returned an error or was unreachable.
    #[error("LLM backend error: {0}")]
    LlmBackend(String),

    /// The response did not contain a usable move.
    #[error("response parse error: {0}")]
    Parse(String),

    /// The console could not be read or written.
    #[error("console error: {0}")]
    Console(String),

    /// Configuration is invalid or missing.
    #[error("config error: {0}")]
    Config(String),

    /// Serialization or deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
