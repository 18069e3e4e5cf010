//! Framework Adapter (C10): orchestrates the Agent/Runner/Session managers,
//! the Tool Invocation Service, and the Stream Session Wrapper for one
//! concrete [`crate::runtime::FrameworkRunner`] backend (spec §4.2).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::{AgentConfig, AgentManager};
use crate::config::RuntimeConfig;
use crate::contracts::{ExecutionMetadata, TaskRequest, TaskResult, TaskStatus};
use crate::engine::{classify, RequestPlan};
use crate::error::{CoreError, CoreResult};
use crate::runner::RunnerManager;
use crate::runtime::RunnerFactory;
use crate::session::{CoordinateOutcome, SessionManager};
use crate::stream::StreamSession;
use crate::tools::ToolInvocationService;

/// One lock per `chat_session_id`, handed out on demand. Overlapping
/// requests against the same chat session serialize on it rather than
/// racing the Session Manager (spec §5, "concurrent tasks on one chat
/// session: disallowed").
struct SessionLocks {
    locks: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    fn new() -> Self {
        Self {
            locks: AsyncMutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, chat_session_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(chat_session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

pub struct FrameworkAdapter {
    agents: Arc<AgentManager>,
    runners: Arc<RunnerManager>,
    sessions: Arc<SessionManager>,
    factory: Arc<dyn RunnerFactory>,
    tools: Arc<ToolInvocationService>,
    config: RuntimeConfig,
    session_locks: SessionLocks,
    live_sessions: AsyncMutex<HashMap<String, Arc<StreamSession>>>,
}

impl FrameworkAdapter {
    pub fn new(
        agents: Arc<AgentManager>,
        runners: Arc<RunnerManager>,
        sessions: Arc<SessionManager>,
        factory: Arc<dyn RunnerFactory>,
        tools: Arc<ToolInvocationService>,
        config: RuntimeConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            agents,
            runners,
            sessions,
            factory,
            tools,
            config,
            session_locks: SessionLocks::new(),
            live_sessions: AsyncMutex::new(HashMap::new()),
        })
    }

    /// Resolves the router's [`RequestPlan`] into a concrete
    /// `(target_agent_id, agent_config_for_creation, chat_session_id)`
    /// triple, minting a fresh chat session id or agent id where the plan
    /// calls for one. For `Recover`, this is also where the stored record's
    /// `agent_id`/config are looked up (spec §4.1 priority 4).
    async fn resolve_target(
        &self,
        req: &TaskRequest,
        now: DateTime<Utc>,
    ) -> CoreResult<(String, Option<AgentConfig>, String)> {
        match classify(req)? {
            RequestPlan::ContinueSession { agent_id, chat_session_id } => {
                Ok((agent_id, req.agent_config.clone(), chat_session_id))
            }
            RequestPlan::NewSessionOnExistingAgent { agent_id } => {
                Ok((agent_id, None, Uuid::new_v4().to_string()))
            }
            RequestPlan::CreateAgentAndSession {
                agent_config,
                chat_session_id,
            } => {
                let agent_id = self.agents.create_agent(agent_config.clone(), None, now);
                let chat_session_id = chat_session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
                Ok((agent_id, Some(agent_config), chat_session_id))
            }
            RequestPlan::Recover { chat_session_id } => {
                let (agent_id, agent_config) = self.sessions.recover_chat_session(&chat_session_id, now).await?;
                Ok((agent_id, Some(agent_config), chat_session_id))
            }
        }
    }

    /// Spec §4.2 step 2: on `session.cleared`, recover once and retry.
    async fn coordinate_with_recovery(
        &self,
        chat_session_id: &str,
        user_id: &str,
        target_agent_id: &str,
        target_agent_config: Option<&AgentConfig>,
        now: DateTime<Utc>,
    ) -> CoreResult<CoordinateOutcome> {
        let first = self
            .sessions
            .coordinate_chat_session(
                chat_session_id,
                user_id,
                target_agent_id,
                target_agent_config,
                &self.agents,
                &self.runners,
                self.factory.as_ref(),
                now,
            )
            .await;

        match first {
            Ok(outcome) => Ok(outcome),
            Err(CoreError::SessionCleared { .. }) => {
                let (recovered_agent_id, recovered_config) =
                    self.sessions.recover_chat_session(chat_session_id, now).await?;
                let agent_id = if target_agent_config.is_some() {
                    target_agent_id.to_string()
                } else {
                    recovered_agent_id
                };
                let config = target_agent_config.cloned().or(Some(recovered_config));

                self.sessions
                    .coordinate_chat_session(
                        chat_session_id,
                        user_id,
                        &agent_id,
                        config.as_ref(),
                        &self.agents,
                        &self.runners,
                        self.factory.as_ref(),
                        now,
                    )
                    .await
                    .map_err(|e| match e {
                        CoreError::SessionCleared { chat_session_id } => CoreError::RecoveryFailed {
                            chat_session_id,
                            reason: "session remained cleared after recovery".to_string(),
                        },
                        other => other,
                    })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn execute_task(&self, req: TaskRequest) -> TaskResult {
        let task_id = req.task_id.clone();
        match self.run_sync(req).await {
            Ok(result) => result,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "task execution failed");
                TaskResult::error(task_id, e.into())
            }
        }
    }

    async fn run_sync(&self, req: TaskRequest) -> CoreResult<TaskResult> {
        let started = std::time::Instant::now();
        let now = Utc::now();
        let (target_agent_id, target_agent_config, chat_session_id) = self.resolve_target(&req, now).await?;

        let lock = self.session_locks.acquire(&chat_session_id).await;
        let _permit = lock.lock().await;

        let user_id = req
            .user_context
            .user_id
            .clone()
            .unwrap_or_else(|| "anonymous".to_string());

        let outcome = self
            .coordinate_with_recovery(
                &chat_session_id,
                &user_id,
                &target_agent_id,
                target_agent_config.as_ref(),
                now,
            )
            .await?;

        self.agents.touch(&target_agent_id, now);
        let handle = self.runners.get_handle(&outcome.runner_id).await?;
        let run_outcome = handle.run_async(&outcome.framework_session_id, req.messages).await?;

        info!(task_id = %req.task_id, chat_session_id = %chat_session_id, target_agent_id = %target_agent_id, "task executed");

        Ok(TaskResult {
            task_id: req.task_id,
            status: TaskStatus::Success,
            messages: run_outcome.messages,
            agent_id: Some(target_agent_id),
            session_id: Some(chat_session_id),
            tool_results: run_outcome.tool_results,
            error: None,
            execution_metadata: ExecutionMetadata {
                duration_ms: started.elapsed().as_millis() as u64,
                token_usage: run_outcome.token_usage,
                framework: "agent-runtime-core".to_string(),
            },
        })
    }

    pub async fn execute_task_live(&self, req: TaskRequest) -> CoreResult<Arc<StreamSession>> {
        let now = Utc::now();
        let (target_agent_id, target_agent_config, chat_session_id) = self.resolve_target(&req, now).await?;

        let lock = self.session_locks.acquire(&chat_session_id).await;
        let _permit = lock.lock().await;

        let user_id = req
            .user_context
            .user_id
            .clone()
            .unwrap_or_else(|| "anonymous".to_string());

        let outcome = self
            .coordinate_with_recovery(
                &chat_session_id,
                &user_id,
                &target_agent_id,
                target_agent_config.as_ref(),
                now,
            )
            .await?;

        self.agents.touch(&target_agent_id, now);
        let handle = self.runners.get_handle(&outcome.runner_id).await?;
        let (raw_stream, communicator) = handle.run_live(&outcome.framework_session_id, req.messages).await?;

        let session = Arc::new(StreamSession::spawn(
            req.task_id.clone(),
            raw_stream,
            communicator,
            self.tools.clone(),
            Some(chat_session_id.clone()),
            req.metadata.tool_headers.clone(),
            chrono::Duration::milliseconds(self.config.approval_default_timeout_ms as i64),
            self.config.approval_policy,
        ));

        self.live_sessions.lock().await.insert(req.task_id.clone(), session.clone());
        info!(task_id = %req.task_id, chat_session_id = %chat_session_id, target_agent_id = %target_agent_id, "live task started");
        Ok(session)
    }

    /// Spec §4.2 / §5 "Resource shutdown": drains idle scans, closes the
    /// recovery store, terminates all live `StreamSession`s (each emitting
    /// a `CANCELLED{reason="system_shutdown"}` chunk), releases tools, then
    /// destroys runners before agents.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<StreamSession>> = {
            let mut live = self.live_sessions.lock().await;
            live.drain().map(|(_, s)| s).collect()
        };
        for session in sessions {
            session.shutdown_cancel("system_shutdown").await;
        }

        for runner_id in self.runners.all_runner_ids().await {
            self.runners.cleanup_runner(&runner_id).await;
        }
        for agent_id in self.agents.all_ids() {
            self.agents.cleanup_agent(&agent_id);
        }
        info!("framework adapter shutdown complete");
    }

    /// Sweeps idle chat sessions, then idle runners, using the configured
    /// thresholds. Intended to be driven by a periodic task in the host
    /// process (spec §4.3/§4.4 `idle_scan`).
    pub async fn run_idle_scan(&self, now: DateTime<Utc>) {
        let cleared = self
            .sessions
            .idle_scan(
                chrono::Duration::seconds(self.config.idle_session_threshold_secs as i64),
                &self.agents,
                &self.runners,
                now,
            )
            .await;
        if !cleared.is_empty() {
            info!(count = cleared.len(), "idle_scan cleared chat sessions");
        }

        let destroyed = self
            .runners
            .idle_scan(chrono::Duration::seconds(self.config.runner_idle_threshold_secs as i64), now)
            .await;
        if !destroyed.is_empty() {
            info!(count = destroyed.len(), "idle_scan destroyed runners");
        }
    }
}
