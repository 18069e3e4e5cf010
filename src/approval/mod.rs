//! Approval Broker (C8): mediates every tool proposal as an `Interaction`
//! with timeout-bounded fallback policies (spec §4.7).

mod broker;

pub use broker::ApprovalBroker;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// One pending human-in-the-loop gate, typically a tool proposal awaiting
/// approval (spec §3 "Interaction").
#[derive(Debug, Clone)]
pub struct Interaction {
    pub interaction_id: String,
    pub chat_session_id: Option<String>,
    pub tool_full_name: String,
    pub arguments: Value,
    pub requires_confirmation: bool,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub state: InteractionState,
    pub resolution: Option<Resolution>,
}

/// Terminal-or-pending state of an [`Interaction`] (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    Pending,
    Approved,
    Rejected,
    Edited,
    TimedOut,
    Cancelled,
}

impl InteractionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, InteractionState::Pending)
    }
}

/// How a pending interaction was ultimately resolved.
#[derive(Debug, Clone)]
pub enum Resolution {
    Approved,
    Rejected { user_message: Option<String> },
    Edited { arguments: Value },
    AutoTimeout,
}
