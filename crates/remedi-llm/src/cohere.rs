use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{BoxFuture, LlmProvider, Message, Role};
use crate::retry::{reject_status, send_with_retry};

const CHAT_PATH: &str = "/v1/chat";
const EMBED_PATH: &str = "/v2/embed";

/// Decoding and transport knobs for the Cohere backend.
#[derive(Clone, Debug)]
pub struct CohereOptions {
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub request_timeout: Duration,
}

impl Default for CohereOptions {
    fn default() -> Self {
        Self {
            model: "command-r".into(),
            embedding_model: "embed-english-light-v3.0".into(),
            temperature: 0.4,
            max_tokens: 500,
            max_retries: 3,
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct CohereProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    opts: CohereOptions,
}

impl fmt::Debug for CohereProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CohereProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("opts", &self.opts)
            .finish()
    }
}

impl Clone for CohereProvider {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            opts: self.opts.clone(),
        }
    }
}

impl CohereProvider {
    /// Build a provider with a per-request timeout baked into the HTTP client.
    ///
    /// Falls back to a default client if the builder fails (only possible with
    /// a broken TLS backend).
    #[must_use]
    pub fn new(api_key: String, base_url: String, opts: CohereOptions) -> Self {
        let client = reqwest::Client::builder()
            .timeout(opts.request_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("failed to build HTTP client with timeout: {e}, using default");
                reqwest::Client::new()
            });
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_owned(),
            opts,
        }
    }

    async fn send_chat(&self, messages: Vec<Message>) -> Result<String, LlmError> {
        let (preamble, history, message) = split_messages(&messages)?;

        let body = ChatRequestBody {
            model: &self.opts.model,
            message: &message,
            preamble: preamble.as_deref(),
            chat_history: if history.is_empty() {
                None
            } else {
                Some(&history)
            },
            temperature: self.opts.temperature,
            max_tokens: self.opts.max_tokens,
        };

        let url = format!("{}{CHAT_PATH}", self.base_url);
        let response = send_with_retry("cohere", self.opts.max_retries, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .header("content-type", "application/json")
                .json(&body)
                .send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;

        if !status.is_success() {
            return Err(reject_status("cohere", status, &text));
        }

        let resp: ChatApiResponse = serde_json::from_str(&text)?;
        if resp.text.is_empty() {
            return Err(LlmError::EmptyResponse { provider: "cohere" });
        }
        Ok(resp.text)
    }

    async fn send_embed(&self, text: String) -> Result<Vec<f32>, LlmError> {
        let body = EmbedRequestBody {
            model: &self.opts.embedding_model,
            texts: &[text.as_str()],
            input_type: "search_query",
            embedding_types: &["float"],
        };

        let url = format!("{}{EMBED_PATH}", self.base_url);
        let response = send_with_retry("cohere", self.opts.max_retries, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .header("content-type", "application/json")
                .json(&body)
                .send()
        })
        .await?;

        let status = response.status();
        let raw = response.text().await.map_err(LlmError::Http)?;

        if !status.is_success() {
            return Err(reject_status("cohere", status, &raw));
        }

        let resp: EmbedApiResponse = serde_json::from_str(&raw)?;
        resp.embeddings
            .float
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse { provider: "cohere" })
    }
}

impl LlmProvider for CohereProvider {
    fn chat(&self, messages: &[Message]) -> BoxFuture<'_, Result<String, LlmError>> {
        let messages = messages.to_vec();
        Box::pin(self.send_chat(messages))
    }

    fn embed(&self, text: &str) -> BoxFuture<'_, Result<Vec<f32>, LlmError>> {
        let text = text.to_owned();
        Box::pin(self.send_embed(text))
    }

    fn name(&self) -> &'static str {
        "cohere"
    }
}

/// Split a message list into the Cohere chat request shape: system messages
/// join into the preamble, the final user message becomes `message`, and
/// everything in between becomes `chat_history`.
fn split_messages(
    messages: &[Message],
) -> Result<(Option<String>, Vec<HistoryEntry>, String), LlmError> {
    let mut preamble_parts = Vec::new();
    let mut turns = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => preamble_parts.push(msg.content.as_str()),
            Role::User => turns.push(HistoryEntry {
                role: "USER",
                message: msg.content.clone(),
            }),
            Role::Assistant => turns.push(HistoryEntry {
                role: "CHATBOT",
                message: msg.content.clone(),
            }),
        }
    }

    if !turns.last().is_some_and(|e| e.role == "USER") {
        return Err(LlmError::Other(
            "conversation must end with a user message".into(),
        ));
    }
    let message = turns.pop().map(|e| e.message).unwrap_or_default();

    let preamble = if preamble_parts.is_empty() {
        None
    } else {
        Some(preamble_parts.join("\n\n"))
    };

    Ok((preamble, turns, message))
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    preamble: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_history: Option<&'a [HistoryEntry]>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize, Debug)]
struct HistoryEntry {
    role: &'static str,
    message: String,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    text: String,
}

#[derive(Serialize)]
struct EmbedRequestBody<'a> {
    model: &'a str,
    texts: &'a [&'a str],
    input_type: &'a str,
    embedding_types: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedApiResponse {
    embeddings: EmbedVectors,
}

#[derive(Deserialize)]
struct EmbedVectors {
    #[serde(default)]
    float: Vec<Vec<f32>>,
}
