use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::agent::AgentConfig;
use crate::error::{CoreError, CoreResult};
use crate::runner::Runner;
use crate::runtime::{FrameworkRunner, RunnerFactory};

struct State {
    runners: HashMap<String, Runner>,
    handles: HashMap<String, Arc<dyn FrameworkRunner>>,
    agent_to_runner: HashMap<String, String>,
    fingerprint_to_runner: HashMap<String, String>,
    session_to_runner: HashMap<String, String>,
}

/// A read-only view of a runner's bookkeeping, for inspection/tests.
#[derive(Debug, Clone)]
pub struct RunnerSnapshot {
    pub runner_id: String,
    pub owning_agent_id: String,
    pub session_count: usize,
}

/// Owns `Runner` instances keyed by `runner_id` (spec C4).
pub struct RunnerManager {
    state: Mutex<State>,
}

impl RunnerManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                runners: HashMap::new(),
                handles: HashMap::new(),
                agent_to_runner: HashMap::new(),
                fingerprint_to_runner: HashMap::new(),
                session_to_runner: HashMap::new(),
            }),
        })
    }

    /// Lazily creates (or reuses) a runner for `agent_id` (spec §4.4).
    pub async fn get_or_create_runner(
        &self,
        agent_id: &str,
        agent_config: &AgentConfig,
        factory: &dyn RunnerFactory,
        now: DateTime<Utc>,
    ) -> CoreResult<String> {
        let fingerprint = agent_config.fingerprint();

        {
            let state = self.state.lock().await;
            if let Some(runner_id) = state.agent_to_runner.get(agent_id) {
                if state.runners.contains_key(runner_id) {
                    return Ok(runner_id.clone());
                }
            }
            if let Some(runner_id) = state.fingerprint_to_runner.get(&fingerprint) {
                if state.runners.contains_key(runner_id) {
                    let runner_id = runner_id.clone();
                    drop(state);
                    let mut state = self.state.lock().await;
                    state
                        .agent_to_runner
                        .insert(agent_id.to_string(), runner_id.clone());
                    return Ok(runner_id);
                }
            }
        }

        // Build outside the lock: runner construction may be slow I/O.
        let handle = factory.build(agent_config).await?;

        let mut state = self.state.lock().await;
        // Another caller may have won the race while we were building.
        if let Some(runner_id) = state.fingerprint_to_runner.get(&fingerprint) {
            if state.runners.contains_key(runner_id) {
                let runner_id = runner_id.clone();
                state
                    .agent_to_runner
                    .insert(agent_id.to_string(), runner_id.clone());
                return Ok(runner_id);
            }
        }

        let runner_id = Uuid::new_v4().to_string();
        state
            .runners
            .insert(runner_id.clone(), Runner::new(&runner_id, agent_id, &fingerprint, now));
        state.handles.insert(runner_id.clone(), handle);
        state
            .fingerprint_to_runner
            .insert(fingerprint, runner_id.clone());
        state
            .agent_to_runner
            .insert(agent_id.to_string(), runner_id.clone());
        Ok(runner_id)
    }

    pub async fn create_session(
        &self,
        runner_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<String> {
        let handle = {
            let state = self.state.lock().await;
            state
                .handles
                .get(runner_id)
                .cloned()
                .ok_or_else(|| CoreError::RunnerMissing {
                    agent_id: runner_id.to_string(),
                })?
        };

        let framework_session_id = handle.create_session(user_id).await?;

        let mut state = self.state.lock().await;
        if let Some(runner) = state.runners.get_mut(runner_id) {
            runner
                .sessions
                .insert(framework_session_id.clone(), user_id.to_string());
            runner.touch(now);
        }
        state
            .session_to_runner
            .insert(framework_session_id.clone(), runner_id.to_string());
        Ok(framework_session_id)
    }

    pub async fn get_session(
        &self,
        framework_session_id: &str,
    ) -> CoreResult<(String, Arc<dyn FrameworkRunner>)> {
        let state = self.state.lock().await;
        let runner_id = state
            .session_to_runner
            .get(framework_session_id)
            .cloned()
            .ok_or_else(|| CoreError::RunnerMissing {
                agent_id: framework_session_id.to_string(),
            })?;
        let handle = state
            .handles
            .get(&runner_id)
            .cloned()
            .ok_or_else(|| CoreError::RunnerMissing {
                agent_id: runner_id.clone(),
            })?;
        Ok((runner_id, handle))
    }

    pub async fn get_handle(&self, runner_id: &str) -> CoreResult<Arc<dyn FrameworkRunner>> {
        let state = self.state.lock().await;
        state
            .handles
            .get(runner_id)
            .cloned()
            .ok_or_else(|| CoreError::RunnerMissing {
                agent_id: runner_id.to_string(),
            })
    }

    /// Removes the session→runner binding. Returns the owning runner id and
    /// whether that runner is now session-less (candidate for eviction).
    pub async fn remove_session(&self, framework_session_id: &str) -> Option<(String, bool)> {
        let mut state = self.state.lock().await;
        let runner_id = state.session_to_runner.remove(framework_session_id)?;
        if let Some(runner) = state.runners.get_mut(&runner_id) {
            runner.sessions.remove(framework_session_id);
            return Some((runner_id.clone(), runner.is_idle()));
        }
        Some((runner_id, true))
    }

    /// Destroys a runner and drops its agent back-references. The caller is
    /// responsible for notifying the Agent Manager / Adapter of the
    /// cleanup (spec §4.4 invariant).
    pub async fn cleanup_runner(&self, runner_id: &str) -> Vec<String> {
        let mut state = self.state.lock().await;
        let Some(runner) = state.runners.remove(runner_id) else {
            return Vec::new();
        };
        state.handles.remove(runner_id);
        state.fingerprint_to_runner.remove(&runner.config_fingerprint);
        for session_id in runner.sessions.keys() {
            state.session_to_runner.remove(session_id);
        }
        let affected_agents: Vec<String> = state
            .agent_to_runner
            .iter()
            .filter(|(_, r)| r.as_str() == runner_id)
            .map(|(a, _)| a.clone())
            .collect();
        for agent_id in &affected_agents {
            state.agent_to_runner.remove(agent_id);
        }
        affected_agents
    }

    /// Destroys runners with zero sessions idle past `idle_threshold`.
    /// Returns the destroyed runner ids (the caller should notify
    /// dependents; `cleanup_runner` is invoked internally for each).
    pub async fn idle_scan(&self, idle_threshold: chrono::Duration, now: DateTime<Utc>) -> Vec<String> {
        let candidates: Vec<String> = {
            let state = self.state.lock().await;
            state
                .runners
                .values()
                .filter(|r| r.is_idle() && now - r.last_activity > idle_threshold)
                .map(|r| r.runner_id.clone())
                .collect()
        };
        let mut destroyed = Vec::new();
        for runner_id in candidates {
            self.cleanup_runner(&runner_id).await;
            destroyed.push(runner_id);
        }
        destroyed
    }

    pub async fn snapshot(&self, runner_id: &str) -> Option<RunnerSnapshot> {
        let state = self.state.lock().await;
        state.runners.get(runner_id).map(|r| RunnerSnapshot {
            runner_id: r.runner_id.clone(),
            owning_agent_id: r.owning_agent_id.clone(),
            session_count: r.sessions.len(),
        })
    }

    pub async fn runner_count(&self) -> usize {
        self.state.lock().await.runners.len()
    }

    /// All known runner ids, used by `shutdown()`'s teardown cascade (spec §5).
    pub async fn all_runner_ids(&self) -> Vec<String> {
        self.state.lock().await.runners.keys().cloned().collect()
    }

    pub async fn session_count(&self, runner_id: &str) -> usize {
        self.state
            .lock()
            .await
            .runners
            .get(runner_id)
            .map(|r| r.sessions.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubRunnerFactory;

    fn cfg() -> AgentConfig {
        AgentConfig {
            agent_type: "general".into(),
            system_prompt: "hi".into(),
            model: "m1".into(),
            declared_tools: vec![],
            framework_settings: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn reuses_runner_for_same_agent() {
        let mgr = RunnerManager::new();
        let factory = StubRunnerFactory::default();
        let now = Utc::now();
        let r1 = mgr
            .get_or_create_runner("a1", &cfg(), &factory, now)
            .await
            .unwrap();
        let r2 = mgr
            .get_or_create_runner("a1", &cfg(), &factory, now)
            .await
            .unwrap();
        assert_eq!(r1, r2);
        assert_eq!(mgr.runner_count().await, 1);
    }

    #[tokio::test]
    async fn reuses_runner_across_agents_with_equivalent_fingerprint() {
        let mgr = RunnerManager::new();
        let factory = StubRunnerFactory::default();
        let now = Utc::now();
        let r1 = mgr
            .get_or_create_runner("a1", &cfg(), &factory, now)
            .await
            .unwrap();
        let r2 = mgr
            .get_or_create_runner("a2", &cfg(), &factory, now)
            .await
            .unwrap();
        assert_eq!(r1, r2);
    }

    #[tokio::test]
    async fn idle_scan_only_evicts_sessionless_runners_past_threshold() {
        let mgr = RunnerManager::new();
        let factory = StubRunnerFactory::default();
        let t0 = Utc::now();
        let runner_id = mgr
            .get_or_create_runner("a1", &cfg(), &factory, t0)
            .await
            .unwrap();

        let destroyed = mgr
            .idle_scan(chrono::Duration::minutes(15), t0 + chrono::Duration::minutes(20))
            .await;
        assert_eq!(destroyed, vec![runner_id]);
        assert_eq!(mgr.runner_count().await, 0);
    }

    #[tokio::test]
    async fn idle_scan_skips_runners_with_active_sessions() {
        let mgr = RunnerManager::new();
        let factory = StubRunnerFactory::default();
        let t0 = Utc::now();
        let runner_id = mgr
            .get_or_create_runner("a1", &cfg(), &factory, t0)
            .await
            .unwrap();
        mgr.create_session(&runner_id, "user-1", t0).await.unwrap();

        let destroyed = mgr
            .idle_scan(chrono::Duration::minutes(15), t0 + chrono::Duration::minutes(20))
            .await;
        assert!(destroyed.is_empty());
        assert_eq!(mgr.runner_count().await, 1);
    }
}
