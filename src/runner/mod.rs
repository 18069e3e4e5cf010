//! Runner Manager (C4): owns `Runner` instances and the runner pool.

mod manager;

pub use manager::{RunnerManager, RunnerSnapshot};

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// An instantiated model-runtime bound to one agent configuration fingerprint
/// (spec §3 "Runner").
pub struct Runner {
    pub runner_id: String,
    pub owning_agent_id: String,
    pub config_fingerprint: String,
    /// `session_id -> user_id`, stored per-session per the open question in
    /// spec §9: "implementations MUST store `user_id` per framework session,
    /// not per runner".
    pub sessions: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Runner {
    pub fn new(
        runner_id: impl Into<String>,
        owning_agent_id: impl Into<String>,
        config_fingerprint: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            runner_id: runner_id.into(),
            owning_agent_id: owning_agent_id.into(),
            config_fingerprint: config_fingerprint.into(),
            sessions: HashMap::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }

    pub fn is_idle(&self) -> bool {
        self.sessions.is_empty()
    }
}
