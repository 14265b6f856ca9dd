pub mod providers;
pub mod retry;

use agentdag_core::config::LlmConfig;
use agentdag_core::traits::ChatClient;

pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Build the chat client used by LLM nodes: an OpenAI-compatible client
/// wrapped in retry/backoff per `config.retry`.
pub fn create_client(config: &LlmConfig, http: reqwest::Client) -> Box<dyn ChatClient> {
    let inner: Box<dyn ChatClient> = Box::new(OpenAiClient::with_client(http));
    if config.retry.max_retries == 0 {
        return inner;
    }
    Box::new(RetryingClient::new(inner, config.retry.clone()))
}
