//! LLM backend abstraction and implementations.
//!
//! Backends are dispatched through an enum because async methods are not
//! dyn-compatible. Both flavours take a system prompt plus a player's chat
//! history and return the assistant's text; parsing the move out of that
//! text is [`crate::parse`]'s job.

use serde::{Deserialize, Serialize};

use crate::config::{BackendType, LlmBackendConfig};
use crate::error::RunnerError;

const MAX_TOKENS: u32 = 512;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The player's prompt.
    User,
    /// The model's earlier answer.
    Assistant,
}

/// One turn of a player's conversation with its model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// An LLM API shared by every `llm` player of a session.
pub enum LlmBackend {
    /// OpenAI-compatible chat completions API.
    OpenAi(HttpBackend),
    /// Anthropic Messages API.
    Anthropic(HttpBackend),
}

impl LlmBackend {
    /// Send the conversation to `model` and return the reply text.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::LlmBackend`] if the HTTP call fails, the API
    /// answers with a non-success status, or the reply has no text.
    pub async fn complete(
        &self,
        model: &str,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, RunnerError> {
        match self {
            Self::OpenAi(http) => {
                let body = openai_body(model, http.temperature, system, messages);
                let json = http
                    .post("chat/completions", &body, |req| {
                        req.bearer_auth(&http.api_key)
                    })
                    .await?;
                extract_openai_content(&json)
            }
            Self::Anthropic(http) => {
                let body = anthropic_body(model, http.temperature, system, messages);
                let json = http
                    .post("messages", &body, |req| {
                        req.header("x-api-key", &http.api_key)
                            .header("anthropic-version", "2023-06-01")
                    })
                    .await?;
                extract_anthropic_content(&json)
            }
        }
    }

    /// Human-readable name for logging.
    pub const fn name(&self) -> &str {
        match self {
            Self::OpenAi(_) => "openai-compatible",
            Self::Anthropic(_) => "anthropic",
        }
    }
}

/// HTTP plumbing common to both API flavours.
pub struct HttpBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    temperature: f64,
}

impl HttpBackend {
    fn new(config: &LlmBackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
        }
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
        authorize: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, RunnerError> {
        let url = format!("{}/{path}", self.api_url);
        let request = self.client.post(&url).json(body);

        let response = authorize(request)
            .send()
            .await
            .map_err(|e| RunnerError::LlmBackend(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(RunnerError::LlmBackend(format!(
                "{url} returned {status}: {error_body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RunnerError::LlmBackend(format!("response from {url} is not JSON: {e}")))
    }
}

/// Chat completions request body. The system prompt leads the message list.
fn openai_body(
    model: &str,
    temperature: f64,
    system: &str,
    messages: &[ChatMessage],
) -> serde_json::Value {
    let mut all = Vec::with_capacity(messages.len().saturating_add(1));
    all.push(serde_json::json!({"role": "system", "content": system}));
    all.extend(
        messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role, "content": m.content})),
    );

    serde_json::json!({
        "model": model,
        "messages": all,
        "temperature": temperature,
        "max_tokens": MAX_TOKENS,
        "response_format": {"type": "json_object"}
    })
}

/// Messages API request body. The system prompt is a top-level field.
fn anthropic_body(
    model: &str,
    temperature: f64,
    system: &str,
    messages: &[ChatMessage],
) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "max_tokens": MAX_TOKENS,
        "temperature": temperature,
        "system": system,
        "messages": messages,
    })
}

/// Extract `choices[0].message.content` from a chat completions response.
fn extract_openai_content(json: &serde_json::Value) -> Result<String, RunnerError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            RunnerError::LlmBackend("response missing choices[0].message.content".to_owned())
        })
}

/// Concatenate the text blocks of a Messages API response.
fn extract_anthropic_content(json: &serde_json::Value) -> Result<String, RunnerError> {
    let text: String = json
        .get("content")
        .and_then(serde_json::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|block| block.get("text").and_then(serde_json::Value::as_str))
        .collect();
    if text.is_empty() {
        return Err(RunnerError::LlmBackend(
            "response has no text content blocks".to_owned(),
        ));
    }
    Ok(text)
}

/// Create an LLM backend from configuration.
pub fn create_backend(config: &LlmBackendConfig) -> LlmBackend {
    let http = HttpBackend::new(config);
    match config.backend_type {
        BackendType::OpenAi => LlmBackend::OpenAi(http),
        BackendType::Anthropic => LlmBackend::Anthropic(http),
    }
}
