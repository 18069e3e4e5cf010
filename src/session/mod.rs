//! Session Manager (C5): coordinates business `ChatSession`s over framework
//! sessions, drives agent-switch transitions, and runs idle eviction.

mod manager;
pub mod recovery;

pub use manager::{CoordinateOutcome, SessionManager};
pub use recovery::{InMemoryRecoveryStore, RecoveryStore, SessionRecoveryRecord};

use chrono::{DateTime, Utc};

/// `ChatSession` lifecycle state (spec §3, §4.3 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatSessionState {
    Active,
    Cleared,
    PendingRecovery,
}

/// Business-level conversation identity (spec §3 "ChatSession").
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub chat_session_id: String,
    pub user_id: String,
    pub active_agent_id: Option<String>,
    pub active_framework_session_id: Option<String>,
    pub active_runner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub last_switch_at: Option<DateTime<Utc>>,
    pub state: ChatSessionState,
}

impl ChatSession {
    pub fn new(chat_session_id: impl Into<String>, user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            chat_session_id: chat_session_id.into(),
            user_id: user_id.into(),
            active_agent_id: None,
            active_framework_session_id: None,
            active_runner_id: None,
            created_at: now,
            last_activity: now,
            last_switch_at: None,
            state: ChatSessionState::Active,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }
}
