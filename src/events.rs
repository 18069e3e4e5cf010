//! `StreamChunk` wire type (spec §3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    PlanDelta,
    PlanSummary,
    ToolProposal,
    ToolResult,
    AssistantText,
    Progress,
    HitlPrompt,
    Complete,
    Cancelled,
    Error,
}

impl ChunkType {
    /// Terminal chunk types end a live stream (spec §5 ordering guarantees).
    pub fn is_terminal(self) -> bool {
        matches!(self, ChunkType::Complete | ChunkType::Cancelled | ChunkType::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Plan,
    Assistant,
    Tool,
    Control,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub stage: Option<Stage>,
    pub interaction_id: Option<String>,
    pub tool_full_name: Option<String>,
    pub tool_short_name: Option<String>,
    pub tool_namespace: Option<String>,
    pub duration_ms: Option<u64>,
    pub token_count: Option<u64>,
    pub is_final: bool,
    /// Set when a fallback policy resolved this chunk instead of a real
    /// client/runtime response (spec §4.7 step 3).
    pub auto_timeout: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub task_id: String,
    pub chunk_type: ChunkType,
    /// Dotted subtype, e.g. `tool.error`.
    pub chunk_kind: String,
    /// Monotonically increasing per live task (spec §5).
    pub sequence_id: u64,
    pub content: Value,
    pub metadata: ChunkMetadata,
}
