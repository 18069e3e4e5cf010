//! Wire-level request/response/error shapes shared across layers (spec §6, C12).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single message in a conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniversalMessage {
    pub role: MessageRole,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

/// Message content is either a plain string or a list of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Best-effort flattened text, used for transcript migration/recovery
    /// injection where only plain text is needed.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.clone()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        /// Base64 data URL or raw bytes encoded as base64.
        data: String,
        mime_type: String,
    },
    File {
        uri: String,
        mime_type: Option<String>,
    },
    ToolCall {
        tool_call_id: String,
        tool_full_name: String,
        arguments: Value,
    },
}

/// Caller/session-supplied context describing who is asking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub session_token: Option<String>,
    #[serde(default)]
    pub permissions: HashMap<String, Value>,
    #[serde(default)]
    pub preferences: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionContext {
    pub chat_session_id: Option<String>,
    pub framework_session_id: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<UniversalMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sync,
    Live,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_mode: Option<ExecutionMode>,
    pub task_timeout_ms: Option<u64>,
}

/// A symbolic or fully-described tool available to this task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UniversalTool {
    Name(String),
    Descriptor(crate::tools::ToolDescriptor),
}

/// Per-request metadata bag; carries stream-mode flag and header overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(default)]
    pub stream_mode: bool,
    #[serde(default)]
    pub tool_headers: HashMap<String, String>,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

/// Inbound request to the Execution Engine (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: String,
    pub task_type: String,
    pub description: Option<String>,
    #[serde(default)]
    pub user_context: UserContext,
    pub session_context: Option<SessionContext>,
    pub messages: Vec<UniversalMessage>,
    pub agent_id: Option<String>,
    /// Business `chat_session_id`.
    pub session_id: Option<String>,
    pub agent_config: Option<crate::agent::AgentConfig>,
    #[serde(default)]
    pub available_tools: Vec<UniversalTool>,
    #[serde(default)]
    pub execution_context: ExecutionContext,
    #[serde(default)]
    pub metadata: TaskMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Error,
    Partial,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub duration_ms: u64,
    pub token_usage: Option<TokenUsage>,
    pub framework: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
    pub source: Option<String>,
    pub retriable: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool_full_name: String,
    pub arguments: Value,
    pub task_id: String,
    pub chat_session_id: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_full_name: String,
    pub tool_call_id: Option<String>,
    pub is_error: bool,
    pub content: Value,
    pub duration_ms: u64,
}

/// Outbound result of a synchronous execution (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub messages: Vec<UniversalMessage>,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
    pub error: Option<ErrorPayload>,
    pub execution_metadata: ExecutionMetadata,
}

impl TaskResult {
    pub fn error(task_id: impl Into<String>, error: ErrorPayload) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Error,
            messages: Vec::new(),
            agent_id: None,
            session_id: None,
            tool_results: Vec::new(),
            error: Some(error),
            execution_metadata: ExecutionMetadata::default(),
        }
    }
}
