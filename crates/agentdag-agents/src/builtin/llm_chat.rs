use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::info;

use agentdag_core::error::Result;
use agentdag_core::traits::{AgentWork, ChatClient};
use agentdag_core::types::{AgentContext, ChatMessage, ChatRequest, ChildResults, Role};

use crate::template;

/// A message as written in the graph; `content` is a template over the
/// node's child results.
#[derive(Debug, Deserialize)]
struct MessageTemplate {
    role: Role,
    content: String,
}

/// Chat-completions call whose prompt is built from child results.
///
/// Node parameters: `messages` (list of `{role, content}`), or a single
/// `promptTemplate` sent as one user message; optional `model`, `url` and
/// `method` override the `[llm]` config.
pub struct LlmChatAgent {
    client: Arc<dyn ChatClient>,
    key_env: Option<String>,
}

impl LlmChatAgent {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self {
            client,
            key_env: None,
        }
    }

    /// Environment variable reported by `required_env`.
    pub fn with_key_env(mut self, var: impl Into<String>) -> Self {
        self.key_env = Some(var.into());
        self
    }

    fn build_messages(ctx: &AgentContext, children: &ChildResults) -> Result<Vec<ChatMessage>> {
        let templates: Vec<MessageTemplate> = match ctx.param("messages")? {
            Some(messages) => messages,
            None => {
                let prompt: String = ctx.require("promptTemplate").map_err(|_| {
                    ctx.fail("expected a 'messages' list or a 'promptTemplate' parameter")
                })?;
                vec![MessageTemplate {
                    role: Role::User,
                    content: prompt,
                }]
            }
        };

        if templates.is_empty() {
            return Err(ctx.fail("'messages' is empty"));
        }

        templates
            .into_iter()
            .map(|m| {
                template::render(&m.content, children)
                    .map(|content| ChatMessage {
                        role: m.role,
                        content,
                    })
                    .map_err(|e| ctx.fail(e.to_string()))
            })
            .collect()
    }
}

impl AgentWork for LlmChatAgent {
    fn kind(&self) -> &str {
        "openAICall"
    }

    fn description(&self) -> &str {
        "Chat completion whose messages are templates over the child results."
    }

    fn required_env(&self) -> Vec<String> {
        self.key_env.iter().cloned().collect()
    }

    fn run(&self, ctx: AgentContext, children: ChildResults) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let messages = Self::build_messages(&ctx, &children)?;
            let llm = &ctx.config.llm;
            let request = ChatRequest {
                url: ctx.param_str("url").unwrap_or(llm.base_url.as_str()).to_string(),
                method: ctx.param_str("method").unwrap_or("POST").to_string(),
                model: ctx.param_str("model").unwrap_or(llm.model.as_str()).to_string(),
                api_key: llm.resolve_api_key()?,
                messages,
            };

            info!(
                node = %ctx.node_id,
                model = %request.model,
                messages = request.messages.len(),
                "Calling chat model"
            );
            self.client.chat(request).await
        })
    }
}
