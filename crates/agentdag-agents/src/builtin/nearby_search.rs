use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use agentdag_core::error::{DagError, Result};
use agentdag_core::traits::AgentWork;
use agentdag_core::types::{AgentContext, ChildResults};

use crate::http;

const NEARBY_SEARCH_URL: &str = "https://maps.googleapis.com/maps/api/place/nearbysearch/json";
const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Google Places nearby search; the result is the pretty-printed response.
pub struct NearBySearchAgent {
    http: Client,
    endpoint: String,
    key_env: String,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

/// `payload` of a nearby-search node.
#[derive(Debug, Deserialize)]
struct Payload {
    location: Location,
    radius: u32,
    #[serde(rename = "type", default)]
    place_type: Option<String>,
}

impl NearBySearchAgent {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            endpoint: NEARBY_SEARCH_URL.to_string(),
            key_env: API_KEY_ENV.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_key_env(mut self, var: impl Into<String>) -> Self {
        self.key_env = var.into();
        self
    }
}

/// Places answers HTTP 200 with a non-OK `status` for most failures.
fn check_status(response: &serde_json::Value) -> Result<()> {
    match response.get("status").and_then(|s| s.as_str()) {
        None | Some("OK") | Some("ZERO_RESULTS") => Ok(()),
        Some(status) => {
            let detail = response
                .get("error_message")
                .and_then(|m| m.as_str())
                .unwrap_or("no details");
            Err(DagError::Http(format!("Places API status {}: {}", status, detail)))
        }
    }
}

impl AgentWork for NearBySearchAgent {
    fn kind(&self) -> &str {
        "nearBySearch"
    }

    fn description(&self) -> &str {
        "Google Places nearby search for payload {location {lat, lng}, radius, type}."
    }

    fn required_env(&self) -> Vec<String> {
        vec![self.key_env.clone()]
    }

    fn run(&self, ctx: AgentContext, _children: ChildResults) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let payload: Payload = ctx.require("payload")?;
            let key = http::env_credential(&self.key_env)?;

            let mut query = vec![
                (
                    "location",
                    format!("{},{}", payload.location.lat, payload.location.lng),
                ),
                ("radius", payload.radius.to_string()),
            ];
            if let Some(place_type) = payload.place_type.filter(|t| !t.is_empty()) {
                query.push(("type", place_type));
            }
            query.push(("key", key));

            info!(node = %ctx.node_id, radius = payload.radius, "Searching nearby places");
            let response = http::get_json(&self.http, &self.endpoint, &query).await?;
            check_status(&response)?;
            http::pretty(&response)
        })
    }
}
