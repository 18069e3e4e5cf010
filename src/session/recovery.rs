//! Recovery Store (C6): persists `SessionRecoveryRecord`s keyed by
//! `chat_session_id` so a cleared chat session can resume with transcript
//! continuity (spec §4.10).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::agent::AgentConfig;
use crate::contracts::UniversalMessage;
use crate::error::CoreResult;

/// Serialized snapshot of a cleared chat session (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecoveryRecord {
    pub chat_session_id: String,
    pub user_id: String,
    pub agent_id: String,
    pub agent_config: AgentConfig,
    pub chat_history: Vec<UniversalMessage>,
    pub archived_at: DateTime<Utc>,
    pub reason: String,
}

/// Persists and retrieves [`SessionRecoveryRecord`]s. All operations may
/// fail with `recovery.store_unavailable`; the Session Manager treats such
/// failures as non-fatal (spec §4.10).
#[async_trait]
pub trait RecoveryStore: Send + Sync {
    async fn save(&self, record: SessionRecoveryRecord) -> CoreResult<()>;
    async fn load(&self, chat_session_id: &str) -> CoreResult<Option<SessionRecoveryRecord>>;
    async fn purge(&self, chat_session_id: &str) -> CoreResult<()>;
}

/// `recovery_store_kind = "memory"` (spec §6 Configuration). Backing other
/// kinds (redis, ...) is an external bootstrap/deployment concern; only the
/// trait boundary is specified here.
#[derive(Default)]
pub struct InMemoryRecoveryStore {
    records: Mutex<HashMap<String, SessionRecoveryRecord>>,
}

impl InMemoryRecoveryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl RecoveryStore for InMemoryRecoveryStore {
    async fn save(&self, record: SessionRecoveryRecord) -> CoreResult<()> {
        self.records.lock().insert(record.chat_session_id.clone(), record);
        Ok(())
    }

    async fn load(&self, chat_session_id: &str) -> CoreResult<Option<SessionRecoveryRecord>> {
        Ok(self.records.lock().get(chat_session_id).cloned())
    }

    async fn purge(&self, chat_session_id: &str) -> CoreResult<()> {
        self.records.lock().remove(chat_session_id);
        Ok(())
    }
}
