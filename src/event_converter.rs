//! Event Converter (C7): translates runtime events into typed `StreamChunk`s
//! (spec §4.6).

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::events::{ChunkMetadata, ChunkType, Stage, StreamChunk};

#[derive(Default)]
struct ConverterState {
    /// Reasoning bursts accumulated since the last assistant message, used
    /// to synthesize the `PLAN_SUMMARY` the moment assistant text starts
    /// (spec §4.6 "the last reasoning burst ... becomes `PLAN_SUMMARY`").
    plan_buffer: String,
    assistant_started: bool,
}

/// One instance per live task: owns the task's sequence counter and the
/// plan-summary accumulation state. Per-chunk translation itself is pure.
pub struct EventConverter {
    task_id: String,
    seq: AtomicU64,
    state: Mutex<ConverterState>,
}

impl EventConverter {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            seq: AtomicU64::new(0),
            state: Mutex::new(ConverterState::default()),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// `metadata.is_final` is taken as given, not derived from `chunk_type`:
    /// `ChunkType::Error` covers both a stream-ending error and a scoped
    /// `tool.error`, and only the former is final (spec §7).
    fn chunk(
        &self,
        chunk_type: ChunkType,
        chunk_kind: impl Into<String>,
        content: Value,
        metadata: ChunkMetadata,
    ) -> StreamChunk {
        StreamChunk {
            task_id: self.task_id.clone(),
            chunk_type,
            chunk_kind: chunk_kind.into(),
            sequence_id: self.next_seq(),
            content,
            metadata,
        }
    }

    /// A reasoning token: always emits `PLAN_DELTA` and buffers the text in
    /// case it needs to be replayed as the eventual `PLAN_SUMMARY`.
    pub fn reasoning_token(&self, text: &str) -> StreamChunk {
        self.state.lock().plan_buffer.push_str(text);
        self.chunk(
            ChunkType::PlanDelta,
            "plan.delta",
            json!({ "text": text }),
            ChunkMetadata {
                stage: Some(Stage::Plan),
                ..Default::default()
            },
        )
    }

    /// Incremental assistant text. The first call after reasoning tokens
    /// also yields a preceding `PLAN_SUMMARY` chunk.
    pub fn assistant_text_delta(&self, text: &str) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        let summary_text = {
            let mut state = self.state.lock();
            if !state.assistant_started {
                state.assistant_started = true;
                if !state.plan_buffer.is_empty() {
                    Some(std::mem::take(&mut state.plan_buffer))
                } else {
                    None
                }
            } else {
                None
            }
        };
        if let Some(summary) = summary_text {
            out.push(self.chunk(
                ChunkType::PlanSummary,
                "plan.summary",
                json!({ "text": summary }),
                ChunkMetadata {
                    stage: Some(Stage::Plan),
                    ..Default::default()
                },
            ));
        }
        out.push(self.chunk(
            ChunkType::AssistantText,
            "assistant.text",
            json!({ "text": text }),
            ChunkMetadata {
                stage: Some(Stage::Assistant),
                ..Default::default()
            },
        ));
        out
    }

    pub fn tool_proposal(
        &self,
        interaction_id: &str,
        tool_full_name: &str,
        arguments: &Value,
        requires_confirmation: bool,
    ) -> StreamChunk {
        let (namespace, short_name) = split_tool_name(tool_full_name);
        self.chunk(
            ChunkType::ToolProposal,
            "tool.proposal",
            json!({ "arguments_preview": arguments }),
            ChunkMetadata {
                stage: Some(Stage::Tool),
                interaction_id: Some(interaction_id.to_string()),
                tool_full_name: Some(tool_full_name.to_string()),
                tool_short_name: Some(short_name),
                tool_namespace: Some(namespace),
                duration_ms: None,
                token_count: None,
                is_final: false,
                auto_timeout: false,
            },
        )
        .tap_requires_confirmation(requires_confirmation)
    }

    pub fn tool_result(
        &self,
        interaction_id: &str,
        tool_full_name: &str,
        result: &Value,
        is_error: bool,
        duration_ms: u64,
        auto_timeout: bool,
    ) -> StreamChunk {
        let (namespace, short_name) = split_tool_name(tool_full_name);
        let metadata = ChunkMetadata {
            stage: Some(Stage::Tool),
            interaction_id: Some(interaction_id.to_string()),
            tool_full_name: Some(tool_full_name.to_string()),
            tool_short_name: Some(short_name),
            tool_namespace: Some(namespace),
            duration_ms: Some(duration_ms),
            token_count: None,
            is_final: false,
            auto_timeout,
        };
        if is_error {
            self.chunk(ChunkType::Error, "tool.error", result.clone(), metadata)
        } else {
            self.chunk(ChunkType::ToolResult, "tool.result", result.clone(), metadata)
        }
    }

    pub fn progress(&self, message: &str) -> StreamChunk {
        self.chunk(
            ChunkType::Progress,
            "tool.progress",
            json!({ "message": message }),
            ChunkMetadata {
                stage: Some(Stage::Tool),
                ..Default::default()
            },
        )
    }

    pub fn hitl_prompt(&self, interaction_id: &str, prompt: &str) -> StreamChunk {
        self.chunk(
            ChunkType::HitlPrompt,
            "control.hitl_prompt",
            json!({ "prompt": prompt }),
            ChunkMetadata {
                stage: Some(Stage::Control),
                interaction_id: Some(interaction_id.to_string()),
                ..Default::default()
            },
        )
    }

    pub fn complete(&self) -> StreamChunk {
        self.chunk(
            ChunkType::Complete,
            "control.complete",
            Value::Null,
            ChunkMetadata {
                stage: Some(Stage::Control),
                is_final: true,
                ..Default::default()
            },
        )
    }

    pub fn cancelled(&self, reason: &str) -> StreamChunk {
        self.chunk(
            ChunkType::Cancelled,
            "control.cancelled",
            json!({ "reason": reason }),
            ChunkMetadata {
                stage: Some(Stage::Control),
                is_final: true,
                ..Default::default()
            },
        )
    }

    /// Stream-terminating error, distinct from a scoped `tool.error` (spec
    /// §7): this is the only `ChunkType::Error` chunk with `is_final: true`.
    pub fn error(&self, code: &str, message: &str) -> StreamChunk {
        self.chunk(
            ChunkType::Error,
            code.to_string(),
            json!({ "message": message }),
            ChunkMetadata {
                stage: Some(Stage::Error),
                is_final: true,
                ..Default::default()
            },
        )
    }
}

fn split_tool_name(full_name: &str) -> (String, String) {
    match full_name.rsplit_once('.') {
        Some((ns, short)) => (ns.to_string(), short.to_string()),
        None => (String::new(), full_name.to_string()),
    }
}

trait TapRequiresConfirmation {
    fn tap_requires_confirmation(self, requires_confirmation: bool) -> Self;
}

impl TapRequiresConfirmation for StreamChunk {
    fn tap_requires_confirmation(mut self, requires_confirmation: bool) -> Self {
        if let Value::Object(ref mut map) = self.content {
            map.insert("requires_confirmation".to_string(), json!(requires_confirmation));
        }
        self
    }
}
