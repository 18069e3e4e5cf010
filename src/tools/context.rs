//! Tool contract: descriptors, execution context, and errors (spec §4.9 C1/C2).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::CoreError;

/// Where a resolved tool implementation comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolSource {
    BuiltIn,
    Mcp { server: String },
    FrameworkNative,
}

/// Static description of a tool, as returned to the model and used for
/// resolution/permission checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub full_name: String,
    pub short_name: String,
    pub namespace: String,
    pub description: String,
    pub parameters_schema: Value,
    pub requires_confirmation: bool,
    pub source: ToolSource,
    /// Descriptor-level headers merged at invocation time (spec §4.9).
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum ToolError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("execution failed: {0}")]
    Execution(String),
    #[error("tool timed out")]
    Timeout,
    #[error("unauthorized")]
    Unauthorized,
    #[error("tool not found: {0}")]
    NotFound(String),
}

impl ToolError {
    pub fn into_core_error(self, tool_full_name: &str) -> CoreError {
        match self {
            ToolError::InvalidParameters(reason) => CoreError::ToolInvalidParameters {
                tool_full_name: tool_full_name.to_string(),
                reason,
            },
            ToolError::Execution(reason) => CoreError::ToolExecution {
                tool_full_name: tool_full_name.to_string(),
                reason,
            },
            ToolError::Timeout => CoreError::ToolTimeout {
                tool_full_name: tool_full_name.to_string(),
            },
            ToolError::Unauthorized => CoreError::ToolUnauthorized {
                tool_full_name: tool_full_name.to_string(),
            },
            ToolError::NotFound(_) => CoreError::ToolNotDeclared {
                tool_full_name: tool_full_name.to_string(),
            },
        }
    }
}

/// Everything a tool needs to execute one call.
#[derive(Debug, Clone)]
pub struct ToolExecutionContext {
    pub task_id: String,
    pub chat_session_id: Option<String>,
    pub user_id: Option<String>,
    pub arguments: Value,
    pub headers: HashMap<String, String>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn short_name(&self) -> &str;
    fn namespace(&self) -> &str;
    fn full_name(&self) -> String {
        format!("{}.{}", self.namespace(), self.short_name())
    }
    fn requires_confirmation(&self) -> bool {
        false
    }
    fn descriptor(&self) -> ToolDescriptor;
    async fn execute(&self, ctx: &ToolExecutionContext) -> Result<Value, ToolError>;
}
