use futures::future::BoxFuture;

use agentdag_core::error::Result;
use agentdag_core::traits::AgentWork;
use agentdag_core::types::{AgentContext, ChildResults};

use crate::template;

/// Renders the `template` parameter against the children's results.
pub struct TemplateAgent;

impl AgentWork for TemplateAgent {
    fn kind(&self) -> &str {
        "template"
    }

    fn description(&self) -> &str {
        "Render the `template` parameter, substituting {{.child}} with child results."
    }

    fn run(&self, ctx: AgentContext, children: ChildResults) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let text: String = ctx.require("template")?;
            template::render(&text, &children).map_err(|e| ctx.fail(e.to_string()))
        })
    }
}

/// Returns the `output` parameter verbatim.
pub struct StaticAgent;

impl AgentWork for StaticAgent {
    fn kind(&self) -> &str {
        "static"
    }

    fn description(&self) -> &str {
        "Return the `output` parameter unchanged."
    }

    fn run(&self, ctx: AgentContext, _children: ChildResults) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            match ctx.params.get("output") {
                Some(serde_json::Value::String(s)) => Ok(s.clone()),
                Some(other) => Ok(other.to_string()),
                None => Err(ctx.fail("missing parameter 'output'")),
            }
        })
    }
}
