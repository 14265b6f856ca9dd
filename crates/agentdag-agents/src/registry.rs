use std::sync::Arc;

use agentdag_core::config::AppConfig;
use agentdag_core::error::Result;
use agentdag_core::traits::ChatClient;
use agentdag_engine::AgentRegistry;

use crate::builtin::*;
use crate::http;

/// Create a registry with every built-in agent registered.
pub fn with_builtins(config: &AppConfig) -> Result<AgentRegistry> {
    let mut registry = AgentRegistry::new();
    register_builtins(&mut registry, config)?;
    Ok(registry)
}

/// Add the built-in agents to an existing registry.
pub fn register_builtins(registry: &mut AgentRegistry, config: &AppConfig) -> Result<()> {
    let client = http::build_client(&config.http)?;

    // ── Mocks ───────────────────────────────────────────────
    registry.register(CryptoMentionsAgent);
    registry.register(CryptoSentimentAgent);

    // ── Text ────────────────────────────────────────────────
    registry.register(TemplateAgent);
    registry.register(StaticAgent);

    // ── HTTP ────────────────────────────────────────────────
    registry.register(WeatherForecastAgent::new(client.clone()));
    registry.register(NearBySearchAgent::new(client.clone()));

    // ── LLM ─────────────────────────────────────────────────
    let chat: Arc<dyn ChatClient> = Arc::from(agentdag_llm::create_client(&config.llm, client));
    let mut llm = LlmChatAgent::new(chat);
    if config.llm.api_key.as_deref().map_or(true, str::is_empty) {
        llm = llm.with_key_env(config.llm.api_key_env.clone());
    }
    registry.register(llm);

    Ok(())
}
