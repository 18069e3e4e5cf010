//! Structured error taxonomy shared across every layer (spec §6/§7).
//!
//! Every variant carries typed context and a fixed wire code via
//! [`CoreError::code`]. Components define their own narrower error enums
//! where useful and convert into `CoreError` at the boundary, never losing
//! the original message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::contracts::ErrorPayload;

/// Canonical, serializable error type for the execution core.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CoreError {
    #[error("request validation failed: {0}")]
    RequestValidation(String),

    #[error("no framework adapter available to serve this request")]
    FrameworkUnavailable,

    #[error("framework execution failed: {0}")]
    FrameworkExecution(String),

    #[error("runner missing for agent: {agent_id}")]
    RunnerMissing { agent_id: String },

    #[error("agent not found: {agent_id}")]
    AgentNotFound { agent_id: String },

    #[error("chat session is cleared: {chat_session_id}")]
    SessionCleared { chat_session_id: String },

    #[error("no recovery record for chat session: {chat_session_id}")]
    RecoveryMissing { chat_session_id: String },

    #[error("recovery failed for chat session {chat_session_id}: {reason}")]
    RecoveryFailed {
        chat_session_id: String,
        reason: String,
    },

    #[error("chat session busy: {chat_session_id}")]
    SessionBusy { chat_session_id: String },

    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("tool not declared: {tool_full_name}")]
    ToolNotDeclared { tool_full_name: String },

    #[error("invalid tool parameters for {tool_full_name}: {reason}")]
    ToolInvalidParameters {
        tool_full_name: String,
        reason: String,
    },

    #[error("tool execution failed for {tool_full_name}: {reason}")]
    ToolExecution {
        tool_full_name: String,
        reason: String,
    },

    #[error("tool timed out: {tool_full_name}")]
    ToolTimeout { tool_full_name: String },

    #[error("tool unauthorized: {tool_full_name}")]
    ToolUnauthorized { tool_full_name: String },

    #[error("interaction already resolved: {interaction_id}")]
    InteractionAlreadyResolved { interaction_id: String },

    #[error("interaction auto-timed-out: {interaction_id}")]
    InteractionAutoTimeout { interaction_id: String },

    #[error("recovery store unavailable: {0}")]
    RecoveryStoreUnavailable(String),

    #[error("task execution timed out")]
    ExecutionTimeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The canonical dotted error code from spec §6.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::RequestValidation(_) => "request.validation",
            CoreError::FrameworkUnavailable => "framework.unavailable",
            CoreError::FrameworkExecution(_) => "framework.execution",
            CoreError::RunnerMissing { .. } => "framework.runner_missing",
            CoreError::AgentNotFound { .. } => "agent.not_found",
            CoreError::SessionCleared { .. } => "session.cleared",
            CoreError::RecoveryMissing { .. } => "session.recovery_missing",
            CoreError::RecoveryFailed { .. } => "session.recovery_failed",
            CoreError::SessionBusy { .. } => "session.busy",
            CoreError::StreamInterrupted(_) => "stream.interrupted",
            CoreError::ToolNotDeclared { .. } => "tool.not_declared",
            CoreError::ToolInvalidParameters { .. } => "tool.invalid_parameters",
            CoreError::ToolExecution { .. } => "tool.execution",
            CoreError::ToolTimeout { .. } => "tool.timeout",
            CoreError::ToolUnauthorized { .. } => "tool.unauthorized",
            CoreError::InteractionAlreadyResolved { .. } => "interaction.already_resolved",
            CoreError::InteractionAutoTimeout { .. } => "interaction.auto_timeout",
            CoreError::RecoveryStoreUnavailable(_) => "recovery.store_unavailable",
            CoreError::ExecutionTimeout => "framework.execution_timeout",
            CoreError::Internal(_) => "internal",
        }
    }

    /// Whether a caller may reasonably retry the same request.
    pub fn retriable(&self) -> bool {
        matches!(
            self,
            CoreError::FrameworkExecution(_)
                | CoreError::ToolExecution { .. }
                | CoreError::ToolTimeout { .. }
                | CoreError::RecoveryStoreUnavailable(_)
                | CoreError::ExecutionTimeout
        )
    }
}

impl From<CoreError> for ErrorPayload {
    fn from(e: CoreError) -> Self {
        ErrorPayload {
            code: e.code().to_string(),
            message: e.to_string(),
            details: None,
            source: None,
            retriable: Some(e.retriable()),
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(e: anyhow::Error) -> Self {
        CoreError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Internal(format!("serialization error: {e}"))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
