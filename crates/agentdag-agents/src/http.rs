use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use agentdag_core::config::HttpConfig;
use agentdag_core::error::{DagError, Result};

/// Shared HTTP client for every built-in that talks to the network.
pub fn build_client(config: &HttpConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|e| DagError::Http(format!("Failed to create HTTP client: {}", e)))
}

/// Read a credential from the environment. Empty counts as missing.
pub fn env_credential(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(DagError::MissingCredential(var.to_string())),
    }
}

/// GET `url` with `query` and parse the body as JSON.
///
/// Query values are never logged; several of them are API keys.
pub async fn get_json(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<serde_json::Value> {
    debug!(url = %url, params = query.len(), "HTTP GET");

    let resp = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| DagError::Http(format!("Request failed: {}", e.without_url())))?;

    let status = resp.status();
    let body = resp.text().await.map_err(|e| {
        DagError::Http(format!("Failed to read response body: {}", e.without_url()))
    })?;

    if !status.is_success() {
        return Err(DagError::Http(format!(
            "HTTP {} {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown"),
            body.trim()
        )));
    }

    Ok(serde_json::from_str(&body)?)
}

/// Two-space indented JSON, the shape downstream templates receive.
pub fn pretty(value: &serde_json::Value) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
