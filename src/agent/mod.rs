//! Agent Manager (C3): owns `Agent` objects keyed by `agent_id`.

mod manager;

pub use manager::AgentManager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persisted configuration for an agent (spec §3 "Agent").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_type: String,
    pub system_prompt: String,
    pub model: String,
    #[serde(default)]
    pub declared_tools: Vec<String>,
    /// Opaque framework-specific settings, passed through untouched.
    #[serde(default)]
    pub framework_settings: Value,
}

impl AgentConfig {
    /// A stable fingerprint used by the Runner Manager to decide whether two
    /// configurations may share a runner (spec §4.4 "deduplicated by
    /// `config_fingerprint`").
    pub fn fingerprint(&self) -> String {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.agent_type.hash(&mut hasher);
        self.system_prompt.hash(&mut hasher);
        self.model.hash(&mut hasher);
        let mut tools = self.declared_tools.clone();
        tools.sort();
        tools.hash(&mut hasher);
        // `framework_settings` is serialized canonically (serde_json preserves
        // insertion order for objects unless the caller already normalized
        // it); good enough for dedup purposes, not for strict equality.
        if let Ok(s) = serde_json::to_string(&self.framework_settings) {
            s.hash(&mut hasher);
        }
        format!("{:016x}", hasher.finish())
    }
}

/// Persistent descriptor that runners are built from (spec §3 "Agent").
#[derive(Debug, Clone)]
pub struct Agent {
    pub agent_id: String,
    pub config: AgentConfig,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Agent {
    pub fn new(agent_id: impl Into<String>, config: AgentConfig, now: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent_id.into(),
            config,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }
}
