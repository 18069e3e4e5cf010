//! A handful of built-in tools, mostly useful as fixtures for tests and as
//! a template for embedders wiring in their own tool set (spec §4.9).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::context::{Tool, ToolDescriptor, ToolError, ToolExecutionContext, ToolSource};

/// `research.search` — the tool referenced by spec §8 scenario S4/S5.
pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn short_name(&self) -> &str {
        "search"
    }
    fn namespace(&self) -> &str {
        "research"
    }
    fn requires_confirmation(&self) -> bool {
        true
    }
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            full_name: self.full_name(),
            short_name: self.short_name().to_string(),
            namespace: self.namespace().to_string(),
            description: "Search external sources for a query".to_string(),
            parameters_schema: json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"],
            }),
            requires_confirmation: true,
            source: ToolSource::BuiltIn,
            headers: Default::default(),
        }
    }

    async fn execute(&self, ctx: &ToolExecutionContext) -> Result<Value, ToolError> {
        let query = ctx
            .arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParameters("missing `query`".to_string()))?;
        Ok(json!({ "results": [format!("result for {query}")] }))
    }
}

/// `util.echo` — trivial tool that never requires confirmation.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn short_name(&self) -> &str {
        "echo"
    }
    fn namespace(&self) -> &str {
        "util"
    }
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            full_name: self.full_name(),
            short_name: self.short_name().to_string(),
            namespace: self.namespace().to_string(),
            description: "Echo the given text back".to_string(),
            parameters_schema: json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
            }),
            requires_confirmation: false,
            source: ToolSource::BuiltIn,
            headers: Default::default(),
        }
    }

    async fn execute(&self, ctx: &ToolExecutionContext) -> Result<Value, ToolError> {
        Ok(ctx.arguments.clone())
    }
}

pub fn all_builtin_tools() -> Vec<std::sync::Arc<dyn Tool>> {
    vec![std::sync::Arc::new(SearchTool), std::sync::Arc::new(EchoTool)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_requires_query_argument() {
        let tool = SearchTool;
        let ctx = ToolExecutionContext {
            task_id: "t1".into(),
            chat_session_id: None,
            user_id: None,
            arguments: json!({}),
            headers: Default::default(),
        };
        let err = tool.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }
}
