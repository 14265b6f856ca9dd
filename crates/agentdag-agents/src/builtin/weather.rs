use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use agentdag_core::error::Result;
use agentdag_core::traits::AgentWork;
use agentdag_core::types::{AgentContext, ChildResults};

use crate::http;

const ONE_CALL_URL: &str = "https://api.openweathermap.org/data/3.0/onecall";
const API_KEY_ENV: &str = "OPEN_WEATHER_API_KEY";

/// OpenWeather One Call lookup; the result is the pretty-printed response.
pub struct WeatherForecastAgent {
    http: Client,
    endpoint: String,
    key_env: String,
}

/// `queryParameters` of a weather node.
#[derive(Debug, Deserialize)]
struct QueryParameters {
    lat: f64,
    lon: f64,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    units: Option<String>,
    #[serde(default)]
    exclude: Option<String>,
}

impl QueryParameters {
    fn to_query(&self, app_id: String) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("lat", self.lat.to_string()),
            ("lon", self.lon.to_string()),
            ("appid", app_id),
        ];
        for (key, value) in [
            ("lang", &self.lang),
            ("units", &self.units),
            ("exclude", &self.exclude),
        ] {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                query.push((key, v.to_string()));
            }
        }
        query
    }
}

impl WeatherForecastAgent {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            endpoint: ONE_CALL_URL.to_string(),
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

impl AgentWork for WeatherForecastAgent {
    fn kind(&self) -> &str {
        "weatherForecast"
    }

    fn description(&self) -> &str {
        "OpenWeather One Call forecast for queryParameters {lat, lon, lang, units, exclude}."
    }

    fn required_env(&self) -> Vec<String> {
        vec![self.key_env.clone()]
    }

    fn run(&self, ctx: AgentContext, _children: ChildResults) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let params: QueryParameters = ctx.require("queryParameters")?;
            let app_id = http::env_credential(&self.key_env)?;

            info!(node = %ctx.node_id, lat = params.lat, lon = params.lon, "Fetching weather forecast");
            let response = http::get_json(&self.http, &self.endpoint, &params.to_query(app_id)).await?;
            http::pretty(&response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentdag_core::config::{AppConfig, HttpConfig};
    use agentdag_core::error::DagError;
    use std::sync::Arc;

    fn ctx(params: serde_json::Value) -> AgentContext {
        let params = params.as_object().cloned().unwrap_or_default();
        AgentContext::new(
            "weatherForecast",
            "weatherForecast",
            Arc::new(params),
            Arc::new(AppConfig::default()),
        )
    }

    fn client() -> Client {
        http::build_client(&HttpConfig::default()).unwrap()
    }

    #[test]
    fn test_query_skips_empty_options() {
        let params = QueryParameters {
            lat: 52.5,
            lon: 13.4,
            lang: Some("en".into()),
            units: Some(String::new()),
            exclude: None,
        };
        let query = params.to_query("key".into());
        let keys: Vec<&str> = query.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["lat", "lon", "appid", "lang"]);
    }

    #[tokio::test]
    async fn test_missing_key_fails() {
        let agent = WeatherForecastAgent::new(client()).with_key_env("AGENTDAG_TEST_NO_WEATHER_KEY");
        let err = agent
            .run(
                ctx(serde_json::json!({"queryParameters": {"lat": 1.0, "lon": 2.0}})),
                ChildResults::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DagError::MissingCredential(_)));
    }

    #[tokio::test]
    async fn test_missing_parameters_fail() {
        let agent = WeatherForecastAgent::new(client());
        let err = agent
            .run(ctx(serde_json::json!({})), ChildResults::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DagError::WorkUnit { .. }));
    }

    #[tokio::test]
    async fn test_fetches_and_pretty_prints() {
        std::env::set_var("AGENTDAG_TEST_WEATHER_KEY", "secret");
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/onecall")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("appid".into(), "secret".into()),
                mockito::Matcher::UrlEncoded("units".into(), "metric".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"timezone":"Europe/Berlin","current":{"temp":21.5}}"#)
            .create_async()
            .await;

        let agent = WeatherForecastAgent::new(client())
            .with_endpoint(format!("{}/onecall", server.url()))
            .with_key_env("AGENTDAG_TEST_WEATHER_KEY");
        let out = agent
            .run(
                ctx(serde_json::json!({
                    "queryParameters": {"lat": 52.52, "lon": 13.405, "lang": "en", "units": "metric"}
                })),
                ChildResults::new(),
            )
            .await
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["current"]["temp"], serde_json::json!(21.5));
        assert!(out.contains("\n  \"current\""));
        mock.assert_async().await;
    }
}
