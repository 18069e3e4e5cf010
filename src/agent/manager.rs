use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::agent::{Agent, AgentConfig};
use crate::error::{CoreError, CoreResult};

/// Owns `Agent` objects keyed by `agent_id` (spec C3).
///
/// Guarded by a single coarse lock, per the "one manager = one logical lock"
/// discipline in spec §5.
pub struct AgentManager {
    agents: Mutex<HashMap<String, Agent>>,
}

impl AgentManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            agents: Mutex::new(HashMap::new()),
        })
    }

    /// Idempotent creation by `(agent_type, user_id, fingerprint)` when
    /// `reuse_key` is supplied; otherwise always creates a fresh agent_id.
    pub fn create_agent(
        &self,
        config: AgentConfig,
        reuse_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> String {
        let mut agents = self.agents.lock();

        if let Some(key) = reuse_key {
            if let Some(existing) = agents
                .values()
                .find(|a| a.agent_id == key && a.config.fingerprint() == config.fingerprint())
            {
                return existing.agent_id.clone();
            }
        }

        let agent_id = reuse_key
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        agents.insert(agent_id.clone(), Agent::new(agent_id.clone(), config, now));
        agent_id
    }

    /// Insert an agent under an explicit, caller-chosen id (used when the
    /// router is told `agent_id` directly alongside `agent_config`).
    pub fn put_agent(&self, agent_id: impl Into<String>, config: AgentConfig, now: DateTime<Utc>) {
        let agent_id = agent_id.into();
        let mut agents = self.agents.lock();
        agents.insert(agent_id.clone(), Agent::new(agent_id, config, now));
    }

    pub fn get_agent(&self, agent_id: &str) -> CoreResult<Agent> {
        self.agents
            .lock()
            .get(agent_id)
            .cloned()
            .ok_or_else(|| CoreError::AgentNotFound {
                agent_id: agent_id.to_string(),
            })
    }

    pub fn touch(&self, agent_id: &str, now: DateTime<Utc>) {
        if let Some(agent) = self.agents.lock().get_mut(agent_id) {
            agent.touch(now);
        }
    }

    pub fn cleanup_agent(&self, agent_id: &str) -> bool {
        self.agents.lock().remove(agent_id).is_some()
    }

    /// Sweep agents idle past `idle_threshold`, returning the ids destroyed.
    pub fn cleanup_expired_agents(
        &self,
        idle_threshold: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let mut agents = self.agents.lock();
        let expired: Vec<String> = agents
            .values()
            .filter(|a| now - a.last_activity > idle_threshold)
            .map(|a| a.agent_id.clone())
            .collect();
        for id in &expired {
            agents.remove(id);
        }
        expired
    }

    pub fn exists(&self, agent_id: &str) -> bool {
        self.agents.lock().contains_key(agent_id)
    }

    /// All known agent ids, used by `shutdown()`'s teardown cascade (spec §5).
    pub fn all_ids(&self) -> Vec<String> {
        self.agents.lock().keys().cloned().collect()
    }
}

impl Default for AgentManager {
    fn default() -> Self {
        Self {
            agents: Mutex::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> AgentConfig {
        AgentConfig {
            agent_type: "general".into(),
            system_prompt: "You are helpful".into(),
            model: "m1".into(),
            declared_tools: vec![],
            framework_settings: serde_json::Value::Null,
        }
    }

    #[test]
    fn create_then_get_roundtrips() {
        let mgr = AgentManager::new();
        let now = Utc::now();
        let id = mgr.create_agent(cfg(), None, now);
        let agent = mgr.get_agent(&id).unwrap();
        assert_eq!(agent.config.model, "m1");
    }

    #[test]
    fn missing_agent_is_not_found() {
        let mgr = AgentManager::new();
        let err = mgr.get_agent("nope").unwrap_err();
        assert_eq!(err.code(), "agent.not_found");
    }

    #[test]
    fn cleanup_expired_removes_only_idle_agents() {
        let mgr = AgentManager::new();
        let t0 = Utc::now();
        let id_old = mgr.create_agent(cfg(), None, t0);
        let id_new = mgr.create_agent(cfg(), None, t0 + chrono::Duration::minutes(20));

        let expired = mgr.cleanup_expired_agents(
            chrono::Duration::minutes(15),
            t0 + chrono::Duration::minutes(21),
        );

        assert_eq!(expired, vec![id_old.clone()]);
        assert!(!mgr.exists(&id_old));
        assert!(mgr.exists(&id_new));
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive_to_tools() {
        let a = cfg();
        let mut b = cfg();
        b.declared_tools.push("search".into());
        assert_eq!(a.fingerprint(), cfg().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
