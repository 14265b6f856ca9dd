use futures::future::BoxFuture;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use agentdag_core::error::{DagError, Result};
use agentdag_core::traits::ChatClient;
use agentdag_core::types::{ChatMessage, ChatRequest};

/// OpenAI-compatible chat-completions client. Works with any endpoint that
/// speaks the `/v1/chat/completions` shape (OpenAI, Ollama, vLLM, Groq).
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    /// Reuse an already configured HTTP client (timeouts, user agent).
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize, Debug)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the first choice's text out of a completion response body.
fn first_choice(body: &str) -> Result<String> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| DagError::LlmParse(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.unwrap_or_default())
        .ok_or_else(|| DagError::LlmParse("no response from model".to_string()))
}

impl ChatClient for OpenAiClient {
    fn chat(&self, request: ChatRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let method = Method::from_bytes(request.method.to_uppercase().as_bytes())
                .map_err(|_| DagError::LlmRequest(format!("invalid HTTP method: {}", request.method)))?;

            debug!(
                url = %request.url,
                model = %request.model,
                messages = request.messages.len(),
                "Sending chat request"
            );

            let body = CompletionBody {
                model: &request.model,
                messages: &request.messages,
            };

            let mut req = self
                .http
                .request(method, &request.url)
                .header("Content-Type", "application/json")
                .json(&body);
            if !request.api_key.is_empty() {
                req = req.header("Authorization", format!("Bearer {}", request.api_key));
            }

            let response = req
                .send()
                .await
                .map_err(|e| DagError::LlmRequest(e.to_string()))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| DagError::LlmRequest(e.to_string()))?;

            if !status.is_success() {
                warn!(status = %status, "Chat request rejected");
                return Err(DagError::LlmRequest(format!("HTTP {}: {}", status, text)));
            }

            first_choice(&text)
        })
    }
}
