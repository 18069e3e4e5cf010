//! Execution Engine & Router (C11): single entry point; classifies a
//! `TaskRequest` and dispatches it to the Framework Adapter (spec §4.1).

use std::sync::Arc;

use crate::adapter::FrameworkAdapter;
use crate::agent::AgentConfig;
use crate::contracts::{ExecutionMode, TaskRequest, TaskResult};
use crate::error::{CoreError, CoreResult};
use crate::stream::StreamSession;

/// How the router resolved a request's target agent/session, independent of
/// sync vs. live execution (spec §4.1 "Routing").
#[derive(Debug, Clone)]
pub enum RequestPlan {
    ContinueSession {
        agent_id: String,
        chat_session_id: String,
    },
    NewSessionOnExistingAgent {
        agent_id: String,
    },
    CreateAgentAndSession {
        agent_config: AgentConfig,
        chat_session_id: Option<String>,
    },
    Recover {
        chat_session_id: String,
    },
}

/// Classifies a request by field presence, in the documented priority order
/// (spec §4.1):
/// 1. `agent_id` and `session_id` both present → ContinueSession.
/// 2. `agent_id` only → NewSessionOnExistingAgent.
/// 3. `agent_config` present → CreateAgentAndSession.
/// 4. Neither of the above, but `session_id` is present → Recover (it is
///    assumed to reference a previously cleared chat session; an unknown id
///    surfaces as `session.recovery_missing` when recovery is attempted).
/// 5. Otherwise → `request.validation`.
pub fn classify(req: &TaskRequest) -> CoreResult<RequestPlan> {
    match (&req.agent_id, &req.session_id, &req.agent_config) {
        (Some(agent_id), Some(chat_session_id), _) => Ok(RequestPlan::ContinueSession {
            agent_id: agent_id.clone(),
            chat_session_id: chat_session_id.clone(),
        }),
        (Some(agent_id), None, _) => Ok(RequestPlan::NewSessionOnExistingAgent {
            agent_id: agent_id.clone(),
        }),
        (None, chat_session_id, Some(agent_config)) => Ok(RequestPlan::CreateAgentAndSession {
            agent_config: agent_config.clone(),
            chat_session_id: chat_session_id.clone(),
        }),
        (None, Some(chat_session_id), None) => Ok(RequestPlan::Recover {
            chat_session_id: chat_session_id.clone(),
        }),
        (None, None, None) => Err(CoreError::RequestValidation(
            "request must include agent_id, agent_config, or session_id".to_string(),
        )),
    }
}

fn wants_live(req: &TaskRequest) -> bool {
    req.execution_context.execution_mode == Some(ExecutionMode::Live) || req.metadata.stream_mode
}

/// Single entry point for task execution (spec C11). Holds one
/// [`FrameworkAdapter`]; the router's "plug point" for multiple adapters is
/// intentionally not implemented here, matching spec §4.1's "strategy
/// selection is static in the reference implementation".
pub struct ExecutionEngine {
    adapter: Arc<FrameworkAdapter>,
}

impl ExecutionEngine {
    pub fn new(adapter: Arc<FrameworkAdapter>) -> Self {
        Self { adapter }
    }

    /// Synchronous end-to-end execution regardless of `execution_mode` —
    /// callers that want streaming must use `execute_task_live`.
    pub async fn execute_task(&self, req: TaskRequest) -> TaskResult {
        self.adapter.execute_task(req).await
    }

    /// Returns a handle exposing an event stream plus HITL control
    /// operations. Honors `execution_mode`/`stream_mode` only insofar as a
    /// caller may check `wants_live` itself before choosing this method;
    /// calling it always runs live.
    pub async fn execute_task_live(&self, req: TaskRequest) -> CoreResult<Arc<StreamSession>> {
        self.adapter.execute_task_live(req).await
    }

    /// Convenience alias that forces live mode regardless of what the
    /// caller populated in `execution_context`/`metadata` (spec §4.1).
    pub async fn start_live_session(&self, mut req: TaskRequest) -> CoreResult<Arc<StreamSession>> {
        req.execution_context.execution_mode = Some(ExecutionMode::Live);
        self.adapter.execute_task_live(req).await
    }

    /// Dispatches to sync or live based on the request's own declared mode
    /// (spec §4.1 "Live vs. sync is chosen by `execution_mode == \"live\"`").
    pub async fn execute(&self, req: TaskRequest) -> CoreResult<ExecutionOutcome> {
        if wants_live(&req) {
            Ok(ExecutionOutcome::Live(self.execute_task_live(req).await?))
        } else {
            Ok(ExecutionOutcome::Sync(self.execute_task(req).await))
        }
    }

    pub async fn shutdown(&self) {
        self.adapter.shutdown().await;
    }
}

/// Result of the mode-aware `ExecutionEngine::execute`.
pub enum ExecutionOutcome {
    Sync(TaskResult),
    Live(Arc<StreamSession>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ExecutionContext, TaskMetadata, UserContext};

    fn base_req() -> TaskRequest {
        TaskRequest {
            task_id: "t1".into(),
            task_type: "chat".into(),
            description: None,
            user_context: UserContext::default(),
            session_context: None,
            messages: vec![],
            agent_id: None,
            session_id: None,
            agent_config: None,
            available_tools: vec![],
            execution_context: ExecutionContext::default(),
            metadata: TaskMetadata::default(),
        }
    }

    #[test]
    fn agent_and_session_both_present_is_continue() {
        let mut req = base_req();
        req.agent_id = Some("a1".into());
        req.session_id = Some("c1".into());
        assert!(matches!(classify(&req).unwrap(), RequestPlan::ContinueSession { .. }));
    }

    #[test]
    fn agent_only_is_new_session_on_existing_agent() {
        let mut req = base_req();
        req.agent_id = Some("a1".into());
        assert!(matches!(
            classify(&req).unwrap(),
            RequestPlan::NewSessionOnExistingAgent { .. }
        ));
    }

    #[test]
    fn agent_config_present_wins_over_bare_session_id() {
        let mut req = base_req();
        req.session_id = Some("c1".into());
        req.agent_config = Some(AgentConfig {
            agent_type: "general".into(),
            system_prompt: "hi".into(),
            model: "m1".into(),
            declared_tools: vec![],
            framework_settings: serde_json::Value::Null,
        });
        assert!(matches!(
            classify(&req).unwrap(),
            RequestPlan::CreateAgentAndSession { .. }
        ));
    }

    #[test]
    fn bare_session_id_is_recover() {
        let mut req = base_req();
        req.session_id = Some("c1".into());
        assert!(matches!(classify(&req).unwrap(), RequestPlan::Recover { .. }));
    }

    #[test]
    fn nothing_present_is_validation_error() {
        let req = base_req();
        let err = classify(&req).unwrap_err();
        assert_eq!(err.code(), "request.validation");
    }

    #[test]
    fn live_mode_is_detected_from_execution_context_or_metadata() {
        let mut by_mode = base_req();
        by_mode.execution_context.execution_mode = Some(ExecutionMode::Live);
        assert!(wants_live(&by_mode));

        let mut by_flag = base_req();
        by_flag.metadata.stream_mode = true;
        assert!(wants_live(&by_flag));

        assert!(!wants_live(&base_req()));
    }
}
