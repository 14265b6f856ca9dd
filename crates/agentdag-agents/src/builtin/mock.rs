//! Fixed-output agents used by the crypto demo graph.

use futures::future::BoxFuture;
use tracing::debug;

use agentdag_core::error::Result;
use agentdag_core::traits::AgentWork;
use agentdag_core::types::{AgentContext, ChildResults};

pub struct CryptoMentionsAgent;

impl AgentWork for CryptoMentionsAgent {
    fn kind(&self) -> &str {
        "fetchCryptoMentions"
    }

    fn description(&self) -> &str {
        "Mock: returns a fixed list of trending crypto tickers."
    }

    fn run(&self, ctx: AgentContext, _children: ChildResults) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            debug!(node = %ctx.node_id, "Returning mock crypto mentions");
            Ok("BTC, ETH, SOL".to_string())
        })
    }
}

pub struct CryptoSentimentAgent;

impl AgentWork for CryptoSentimentAgent {
    fn kind(&self) -> &str {
        "analyzeCryptoSentiment"
    }

    fn description(&self) -> &str {
        "Mock: reports a fixed sentiment for its children's mentions."
    }

    fn run(&self, ctx: AgentContext, children: ChildResults) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            debug!(node = %ctx.node_id, inputs = children.len(), "Returning mock sentiment");
            Ok("Sentiment: positive".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentdag_core::config::AppConfig;
    use std::sync::Arc;

    fn ctx(kind: &str) -> AgentContext {
        AgentContext::new(kind, kind, Arc::default(), Arc::new(AppConfig::default()))
    }

    #[tokio::test]
    async fn test_fixed_outputs() {
        let mentions = CryptoMentionsAgent
            .run(ctx("fetchCryptoMentions"), ChildResults::new())
            .await
            .unwrap();
        assert_eq!(mentions, "BTC, ETH, SOL");

        let mut children = ChildResults::new();
        children.insert("fetchCryptoMentions".into(), mentions);
        let sentiment = CryptoSentimentAgent
            .run(ctx("analyzeCryptoSentiment"), children)
            .await
            .unwrap();
        assert_eq!(sentiment, "Sentiment: positive");
    }
}
