//! The `Runner` abstraction: the only contract assumed of the underlying LLM
//! framework runtime (spec §1, "only a `Runner` abstraction is assumed").
//!
//! Everything in this module describes an external collaborator's boundary.
//! Concrete LLM providers, transport, and the framework runtime itself are
//! out of scope; this crate only needs to drive them through these traits.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::agent::AgentConfig;
use crate::contracts::{TokenUsage, ToolResult, UniversalMessage};
use crate::error::CoreResult;

/// Raw event emitted by the underlying model runtime, consumed by the
/// Event Converter (C7, spec §4.6).
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A reasoning/thinking token, tagged `stage=plan`.
    ReasoningToken { text: String },
    /// Incremental assistant-visible text.
    AssistantTextDelta { text: String },
    /// A completed tool-call request from the model.
    ToolCallRequested {
        tool_full_name: String,
        arguments: Value,
        requires_confirmation: bool,
    },
    /// The completion of a tool execution that the runtime itself drove.
    ToolCallCompleted {
        tool_full_name: String,
        result: Value,
        is_error: bool,
        duration_ms: u64,
    },
    UsageUpdate(TokenUsage),
    /// The turn was interrupted (cancellation, upstream error, etc).
    Interrupted,
    /// The turn completed normally.
    Completed,
}

pub type RuntimeEventStream = BoxStream<'static, RuntimeEvent>;

/// A decision relayed back to the runtime for a pending tool proposal
/// (spec §4.7 step 2).
#[derive(Debug, Clone)]
pub enum ToolDecision {
    Approved,
    Rejected { reason: Option<String> },
    Edited { arguments: Value },
}

/// Client-to-runtime control channel for a single live task.
#[async_trait]
pub trait Communicator: Send + Sync {
    async fn send_tool_decision(
        &self,
        interaction_id: &str,
        decision: ToolDecision,
    ) -> CoreResult<()>;
    async fn send_user_message(&self, text: String) -> CoreResult<()>;
    async fn cancel(&self, reason: String) -> CoreResult<()>;
}

/// Outcome of a synchronous (non-streaming) run.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub messages: Vec<UniversalMessage>,
    pub tool_results: Vec<ToolResult>,
    pub token_usage: Option<TokenUsage>,
}

/// A single instantiated model-runtime connection, bound to one agent
/// configuration (spec §3 "Runner", §4.4).
#[async_trait]
pub trait FrameworkRunner: Send + Sync {
    /// Provision a new framework-level session and return its id.
    async fn create_session(&self, user_id: &str) -> CoreResult<String>;

    async fn destroy_session(&self, framework_session_id: &str) -> CoreResult<()>;

    /// Read back the full transcript for migration/recovery (spec §4.3
    /// "transcript injection precedence").
    async fn extract_history(&self, framework_session_id: &str) -> CoreResult<Vec<UniversalMessage>>;

    /// Replay a transcript into a (typically fresh) framework session.
    async fn inject_history(
        &self,
        framework_session_id: &str,
        transcript: &[UniversalMessage],
    ) -> CoreResult<()>;

    async fn run_async(
        &self,
        framework_session_id: &str,
        messages: Vec<UniversalMessage>,
    ) -> CoreResult<RunOutcome>;

    async fn run_live(
        &self,
        framework_session_id: &str,
        messages: Vec<UniversalMessage>,
    ) -> CoreResult<(RuntimeEventStream, std::sync::Arc<dyn Communicator>)>;
}

/// Builds a [`FrameworkRunner`] for a given agent configuration. The Runner
/// Manager calls this lazily, once per distinct configuration fingerprint
/// (spec §4.4).
#[async_trait]
pub trait RunnerFactory: Send + Sync {
    async fn build(&self, agent_config: &AgentConfig) -> CoreResult<std::sync::Arc<dyn FrameworkRunner>>;
}
