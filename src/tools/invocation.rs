//! Tool Invocation Service (C2): buffered/streamed execution with
//! documented header precedence (spec §4.9).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, BoxStream};

use crate::contracts::{ToolRequest, ToolResult};
use crate::error::{CoreError, CoreResult};
use crate::tools::context::ToolExecutionContext;
use crate::tools::registry::ToolRegistry;

/// Progressive output from a streamed tool execution.
#[derive(Debug, Clone)]
pub enum ToolChunk {
    Progress { message: String, percent: Option<f32> },
    Result(ToolResult),
}

/// Header layers in descending precedence order (spec §4.9, highest wins):
/// per-call `metadata.tool_headers` → per-tool descriptor metadata →
/// per-task metadata → context-derived headers → static server/tool headers.
pub fn merge_headers(layers: &[&HashMap<String, String>]) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for layer in layers.iter().rev() {
        for (k, v) in layer.iter() {
            out.insert(k.clone(), v.clone());
        }
    }
    out
}

pub struct ToolInvocationService {
    registry: Arc<ToolRegistry>,
    static_headers: HashMap<String, String>,
}

impl ToolInvocationService {
    pub fn new(registry: Arc<ToolRegistry>, static_headers: HashMap<String, String>) -> Self {
        Self {
            registry,
            static_headers,
        }
    }

    fn build_headers(
        &self,
        req: &ToolRequest,
        context_headers: &HashMap<String, String>,
        descriptor_headers: &HashMap<String, String>,
        task_headers: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        merge_headers(&[
            &req.headers,
            descriptor_headers,
            task_headers,
            context_headers,
            &self.static_headers,
        ])
    }

    pub async fn execute_tool(
        &self,
        req: ToolRequest,
        context_headers: HashMap<String, String>,
        task_headers: HashMap<String, String>,
    ) -> CoreResult<ToolResult> {
        let tool = self
            .registry
            .find(&req.tool_full_name)
            .ok_or_else(|| CoreError::ToolNotDeclared {
                tool_full_name: req.tool_full_name.clone(),
            })?;
        let descriptor = tool.descriptor();
        let headers = self.build_headers(&req, &context_headers, &descriptor.headers, &task_headers);

        let ctx = ToolExecutionContext {
            task_id: req.task_id.clone(),
            chat_session_id: req.chat_session_id.clone(),
            user_id: None,
            arguments: req.arguments.clone(),
            headers,
        };

        let started = Instant::now();
        let outcome = tool.execute(&ctx).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(content) => Ok(ToolResult {
                tool_full_name: req.tool_full_name,
                tool_call_id: None,
                is_error: false,
                content,
                duration_ms,
            }),
            Err(e) => Err(e.into_core_error(&req.tool_full_name)),
        }
    }

    /// Streamed execution surface (spec §4.9). Tools in this crate are all
    /// buffered; the single `Result` chunk is the terminal element, matching
    /// the same-shaped terminal guarantee as a live `StreamChunk` sequence.
    pub async fn execute_tool_stream(
        &self,
        req: ToolRequest,
        context_headers: HashMap<String, String>,
        task_headers: HashMap<String, String>,
    ) -> CoreResult<BoxStream<'static, ToolChunk>> {
        let result = self.execute_tool(req, context_headers, task_headers).await;
        let chunk = match result {
            Ok(r) => ToolChunk::Result(r),
            Err(e) => ToolChunk::Result(ToolResult {
                tool_full_name: e.code().to_string(),
                tool_call_id: None,
                is_error: true,
                content: serde_json::json!({"error": e.to_string()}),
                duration_ms: 0,
            }),
        };
        Ok(Box::pin(stream::iter(vec![chunk])))
    }
}
