use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::agent::{AgentConfig, AgentManager};
use crate::contracts::UniversalMessage;
use crate::error::{CoreError, CoreResult};
use crate::runner::RunnerManager;
use crate::runtime::RunnerFactory;
use crate::session::recovery::{RecoveryStore, SessionRecoveryRecord};
use crate::session::{ChatSession, ChatSessionState};

/// Result of `coordinate_chat_session` (spec §4.3).
#[derive(Debug, Clone)]
pub struct CoordinateOutcome {
    pub framework_session_id: String,
    pub runner_id: String,
    pub switch_occurred: bool,
    pub previous_agent_id: Option<String>,
}

struct State {
    chat_sessions: HashMap<String, ChatSession>,
    pending_recoveries: HashMap<String, SessionRecoveryRecord>,
}

/// Owns `ChatSession` and the Recovery Store handle exclusively (spec §3
/// "Ownership"). Cross-manager calls take explicit parameters rather than
/// held references, per the §5 "message-style" locking discipline.
pub struct SessionManager {
    state: Mutex<State>,
    recovery_store: Arc<dyn RecoveryStore>,
}

impl SessionManager {
    pub fn new(recovery_store: Arc<dyn RecoveryStore>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                chat_sessions: HashMap::new(),
                pending_recoveries: HashMap::new(),
            }),
            recovery_store,
        })
    }

    /// Spec §4.3. Resolves (creating if needed) the live framework session
    /// backing `chat_session_id`, performing an agent-switch or recovery
    /// sequence as needed.
    #[allow(clippy::too_many_arguments)]
    pub async fn coordinate_chat_session(
        &self,
        chat_session_id: &str,
        user_id: &str,
        target_agent_id: &str,
        target_agent_config: Option<&AgentConfig>,
        agent_manager: &AgentManager,
        runner_manager: &RunnerManager,
        factory: &dyn RunnerFactory,
        now: DateTime<Utc>,
    ) -> CoreResult<CoordinateOutcome> {
        let (existing_agent_id, existing_fw_id, existing_runner_id, mut pending_recovery) = {
            let mut state = self.state.lock().await;
            let session = state
                .chat_sessions
                .entry(chat_session_id.to_string())
                .or_insert_with(|| ChatSession::new(chat_session_id, user_id, now));

            if session.state == ChatSessionState::Cleared {
                return Err(CoreError::SessionCleared {
                    chat_session_id: chat_session_id.to_string(),
                });
            }

            let pending = state.pending_recoveries.remove(chat_session_id);
            (
                session.active_agent_id.clone(),
                session.active_framework_session_id.clone(),
                session.active_runner_id.clone(),
                pending,
            )
        };

        let same_agent_reuse = pending_recovery.is_none()
            && existing_fw_id.is_some()
            && existing_agent_id.as_deref() == Some(target_agent_id);

        if same_agent_reuse {
            let fw_id = existing_fw_id.clone().unwrap();
            if runner_manager.get_session(&fw_id).await.is_ok() {
                let mut state = self.state.lock().await;
                if let Some(session) = state.chat_sessions.get_mut(chat_session_id) {
                    session.touch(now);
                }
                return Ok(CoordinateOutcome {
                    framework_session_id: fw_id,
                    runner_id: existing_runner_id.unwrap(),
                    switch_occurred: false,
                    previous_agent_id: None,
                });
            }
            // The cached framework session vanished out from under us (e.g.
            // the runner was reaped by idle_scan); fall through to a switch.
        }

        // Extract transcript from the outgoing framework session, if any.
        let mut transcript: Vec<UniversalMessage> = Vec::new();
        if let Some(old_fw_id) = &existing_fw_id {
            if let Ok((_, handle)) = runner_manager.get_session(old_fw_id).await {
                transcript = handle.extract_history(old_fw_id).await.unwrap_or_default();
                let _ = handle.destroy_session(old_fw_id).await;
            }
            // A now-sessionless runner is left for `idle_scan` to reclaim,
            // respecting the grace window (spec §4.2).
            runner_manager.remove_session(old_fw_id).await;
        }

        // Ensure the target agent exists.
        if agent_manager.get_agent(target_agent_id).is_err() {
            let config = target_agent_config.ok_or_else(|| CoreError::AgentNotFound {
                agent_id: target_agent_id.to_string(),
            })?;
            agent_manager.put_agent(target_agent_id, config.clone(), now);
        }
        let agent = agent_manager.get_agent(target_agent_id)?;

        let runner_id = runner_manager
            .get_or_create_runner(target_agent_id, &agent.config, factory, now)
            .await?;
        let new_fw_id = runner_manager.create_session(&runner_id, user_id, now).await?;
        let handle = runner_manager.get_handle(&runner_id).await?;

        // A pending recovery record takes precedence over a live-extracted
        // transcript: if one is pending there was no live session above.
        if let Some(record) = pending_recovery.take() {
            match handle.inject_history(&new_fw_id, &record.chat_history).await {
                Ok(()) => {
                    if let Err(e) = self.recovery_store.purge(chat_session_id).await {
                        warn!(chat_session_id, error = %e, "recovery.store_unavailable on purge");
                    }
                }
                Err(e) => {
                    warn!(chat_session_id, error = %e, "session.recovery_retry");
                    let mut state = self.state.lock().await;
                    state.pending_recoveries.insert(chat_session_id.to_string(), record);
                    return Err(CoreError::RecoveryFailed {
                        chat_session_id: chat_session_id.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        } else if !transcript.is_empty() {
            let _ = handle.inject_history(&new_fw_id, &transcript).await;
        }

        let mut state = self.state.lock().await;
        let session = state
            .chat_sessions
            .entry(chat_session_id.to_string())
            .or_insert_with(|| ChatSession::new(chat_session_id, user_id, now));
        session.active_agent_id = Some(target_agent_id.to_string());
        session.active_framework_session_id = Some(new_fw_id.clone());
        session.active_runner_id = Some(runner_id.clone());
        session.last_switch_at = Some(now);
        session.state = ChatSessionState::Active;
        session.touch(now);

        info!(chat_session_id, target_agent_id, "chat session coordinated via switch");

        Ok(CoordinateOutcome {
            framework_session_id: new_fw_id,
            runner_id,
            switch_occurred: true,
            previous_agent_id: existing_agent_id,
        })
    }

    /// Spec §4.3 `cleanup_chat_session`.
    pub async fn cleanup_chat_session(
        &self,
        chat_session_id: &str,
        reason: &str,
        agent_manager: &AgentManager,
        runner_manager: &RunnerManager,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let (user_id, agent_id, framework_session_id) = {
            let state = self.state.lock().await;
            match state.chat_sessions.get(chat_session_id) {
                Some(s) => (s.user_id.clone(), s.active_agent_id.clone(), s.active_framework_session_id.clone()),
                None => return Ok(()),
            }
        };

        let mut transcript = Vec::new();
        if let Some(fw_id) = &framework_session_id {
            if let Ok((_, handle)) = runner_manager.get_session(fw_id).await {
                transcript = handle.extract_history(fw_id).await.unwrap_or_default();
                let _ = handle.destroy_session(fw_id).await;
            }
            runner_manager.remove_session(fw_id).await;
        }

        if let Some(agent_id) = &agent_id {
            if let Ok(agent_config) = agent_manager.get_agent(agent_id).map(|a| a.config) {
                let record = SessionRecoveryRecord {
                    chat_session_id: chat_session_id.to_string(),
                    user_id,
                    agent_id: agent_id.clone(),
                    agent_config,
                    chat_history: transcript,
                    archived_at: now,
                    reason: reason.to_string(),
                };
                if let Err(e) = self.recovery_store.save(record).await {
                    warn!(chat_session_id, error = %e, "recovery.store_unavailable on save; continuing teardown");
                }
            }
        }

        let mut state = self.state.lock().await;
        if let Some(session) = state.chat_sessions.get_mut(chat_session_id) {
            session.state = ChatSessionState::Cleared;
            session.active_agent_id = None;
            session.active_framework_session_id = None;
            session.active_runner_id = None;
            session.touch(now);
        }
        info!(chat_session_id, reason, "chat session cleared");
        Ok(())
    }

    /// Spec §4.3 `recover_chat_session`. Loads the record and marks the
    /// session `PENDING_RECOVERY`; actual transcript injection happens on
    /// the next successful `coordinate_chat_session`. Returns the record's
    /// `(agent_id, agent_config)` so a caller that only had a bare
    /// `chat_session_id` (no `agent_id`) can resolve a target for that
    /// follow-up call (spec §4.1 Router priority 4, "Recover").
    pub async fn recover_chat_session(
        &self,
        chat_session_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<(String, AgentConfig)> {
        let record = self
            .recovery_store
            .load(chat_session_id)
            .await?
            .ok_or_else(|| CoreError::RecoveryMissing {
                chat_session_id: chat_session_id.to_string(),
            })?;

        let agent_id = record.agent_id.clone();
        let agent_config = record.agent_config.clone();

        let mut state = self.state.lock().await;
        let session = state
            .chat_sessions
            .entry(chat_session_id.to_string())
            .or_insert_with(|| ChatSession::new(chat_session_id, &record.user_id, now));
        session.state = ChatSessionState::PendingRecovery;
        session.touch(now);
        state.pending_recoveries.insert(chat_session_id.to_string(), record);
        Ok((agent_id, agent_config))
    }

    /// Spec §4.3 `idle_scan`: clears sessions idle past `idle_threshold`.
    pub async fn idle_scan(
        &self,
        idle_threshold: chrono::Duration,
        agent_manager: &AgentManager,
        runner_manager: &RunnerManager,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let candidates: Vec<String> = {
            let state = self.state.lock().await;
            state
                .chat_sessions
                .values()
                .filter(|s| s.state == ChatSessionState::Active && now - s.last_activity > idle_threshold)
                .map(|s| s.chat_session_id.clone())
                .collect()
        };
        for id in &candidates {
            let _ = self
                .cleanup_chat_session(id, "idle", agent_manager, runner_manager, now)
                .await;
        }
        candidates
    }

    pub async fn get_state(&self, chat_session_id: &str) -> Option<ChatSessionState> {
        self.state.lock().await.chat_sessions.get(chat_session_id).map(|s| s.state)
    }

    pub async fn snapshot(&self, chat_session_id: &str) -> Option<ChatSession> {
        self.state.lock().await.chat_sessions.get(chat_session_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::recovery::InMemoryRecoveryStore;
    use crate::test_support::StubRunnerFactory;

    fn cfg(agent_type: &str) -> AgentConfig {
        AgentConfig {
            agent_type: agent_type.to_string(),
            system_prompt: "hi".into(),
            model: "m1".into(),
            declared_tools: vec![],
            framework_settings: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn first_coordinate_creates_session_and_reuses_on_second_call() {
        let sm = SessionManager::new(InMemoryRecoveryStore::new());
        let am = AgentManager::new();
        let rm = RunnerManager::new();
        let factory = StubRunnerFactory::default();
        let now = Utc::now();

        let out1 = sm
            .coordinate_chat_session("c1", "u1", "a1", Some(&cfg("general")), &am, &rm, &factory, now)
            .await
            .unwrap();
        assert!(out1.switch_occurred);

        let out2 = sm
            .coordinate_chat_session("c1", "u1", "a1", None, &am, &rm, &factory, now)
            .await
            .unwrap();
        assert!(!out2.switch_occurred);
        assert_eq!(out1.framework_session_id, out2.framework_session_id);
        assert_eq!(rm.runner_count().await, 1);
    }

    #[tokio::test]
    async fn agent_switch_preserves_history_via_transcript_injection() {
        let sm = SessionManager::new(InMemoryRecoveryStore::new());
        let am = AgentManager::new();
        let rm = RunnerManager::new();
        let factory = StubRunnerFactory::default();
        let now = Utc::now();

        let out1 = sm
            .coordinate_chat_session("c1", "u1", "a1", Some(&cfg("general")), &am, &rm, &factory, now)
            .await
            .unwrap();
        let handle = rm.get_handle(&out1.runner_id).await.unwrap();
        handle.run_async(&out1.framework_session_id, vec![]).await.unwrap();

        let out2 = sm
            .coordinate_chat_session("c1", "u1", "a2", Some(&cfg("coder")), &am, &rm, &factory, now)
            .await
            .unwrap();
        assert!(out2.switch_occurred);
        assert_eq!(out2.previous_agent_id.as_deref(), Some("a1"));

        let handle2 = rm.get_handle(&out2.runner_id).await.unwrap();
        let transcript = handle2.extract_history(&out2.framework_session_id).await.unwrap();
        assert!(!transcript.is_empty(), "history from the old session must carry over");
    }

    #[tokio::test]
    async fn cleanup_then_coordinate_without_recovery_fails_cleared() {
        let sm = SessionManager::new(InMemoryRecoveryStore::new());
        let am = AgentManager::new();
        let rm = RunnerManager::new();
        let factory = StubRunnerFactory::default();
        let now = Utc::now();

        sm.coordinate_chat_session("c1", "u1", "a1", Some(&cfg("general")), &am, &rm, &factory, now)
            .await
            .unwrap();
        sm.cleanup_chat_session("c1", "idle", &am, &rm, now).await.unwrap();

        let err = sm
            .coordinate_chat_session("c1", "u1", "a1", None, &am, &rm, &factory, now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "session.cleared");
    }

    #[tokio::test]
    async fn recover_then_coordinate_restores_transcript_and_purges_record() {
        let sm = SessionManager::new(InMemoryRecoveryStore::new());
        let am = AgentManager::new();
        let rm = RunnerManager::new();
        let factory = StubRunnerFactory::default();
        let t0 = Utc::now();

        let out1 = sm
            .coordinate_chat_session("c1", "u1", "a1", Some(&cfg("general")), &am, &rm, &factory, t0)
            .await
            .unwrap();
        let handle = rm.get_handle(&out1.runner_id).await.unwrap();
        handle
            .run_async(&out1.framework_session_id, vec![])
            .await
            .unwrap();

        sm.cleanup_chat_session("c1", "idle", &am, &rm, t0).await.unwrap();
        sm.recover_chat_session("c1", t0).await.unwrap();
        assert_eq!(sm.get_state("c1").await, Some(ChatSessionState::PendingRecovery));

        let out2 = sm
            .coordinate_chat_session("c1", "u1", "a1", None, &am, &rm, &factory, t0)
            .await
            .unwrap();
        assert_eq!(sm.get_state("c1").await, Some(ChatSessionState::Active));

        let handle2 = rm.get_handle(&out2.runner_id).await.unwrap();
        let transcript = handle2.extract_history(&out2.framework_session_id).await.unwrap();
        assert!(!transcript.is_empty());
    }

    #[tokio::test]
    async fn idle_scan_clears_only_sessions_past_threshold() {
        let sm = SessionManager::new(InMemoryRecoveryStore::new());
        let am = AgentManager::new();
        let rm = RunnerManager::new();
        let factory = StubRunnerFactory::default();
        let t0 = Utc::now();

        sm.coordinate_chat_session("c1", "u1", "a1", Some(&cfg("general")), &am, &rm, &factory, t0)
            .await
            .unwrap();

        let later = t0 + chrono::Duration::minutes(31);
        let cleared = sm
            .idle_scan(chrono::Duration::minutes(30), &am, &rm, later)
            .await;
        assert_eq!(cleared, vec!["c1".to_string()]);
        assert_eq!(sm.get_state("c1").await, Some(ChatSessionState::Cleared));
    }
}
