use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::approval::{Interaction, InteractionState, Resolution};
use crate::config::ApprovalPolicy;
use crate::error::{CoreError, CoreResult};
use crate::runtime::{Communicator, ToolDecision};

/// Owns the table `{interaction_id -> Interaction}` for a single live task
/// (spec §4.7).
pub struct ApprovalBroker {
    table: Mutex<HashMap<String, Interaction>>,
    notifies: Mutex<HashMap<String, Arc<Notify>>>,
    communicator: Arc<dyn Communicator>,
    default_timeout: chrono::Duration,
    policy: ApprovalPolicy,
}

impl ApprovalBroker {
    pub fn new(communicator: Arc<dyn Communicator>, default_timeout: chrono::Duration, policy: ApprovalPolicy) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            notifies: Mutex::new(HashMap::new()),
            communicator,
            default_timeout,
            policy,
        }
    }

    /// Inserts a `PENDING` interaction for a newly proposed tool call and
    /// returns its id (spec §4.7 step 1).
    pub fn propose(
        &self,
        tool_full_name: impl Into<String>,
        arguments: Value,
        requires_confirmation: bool,
        chat_session_id: Option<String>,
        now: DateTime<Utc>,
    ) -> String {
        let interaction_id = Uuid::new_v4().to_string();
        let interaction = Interaction {
            interaction_id: interaction_id.clone(),
            chat_session_id,
            tool_full_name: tool_full_name.into(),
            arguments,
            requires_confirmation,
            created_at: now,
            deadline: now + self.default_timeout,
            state: InteractionState::Pending,
            resolution: None,
        };
        self.table.lock().insert(interaction_id.clone(), interaction);
        self.notifies.lock().insert(interaction_id.clone(), Arc::new(Notify::new()));
        interaction_id
    }

    /// Blocks until `interaction_id` reaches a terminal state, applying the
    /// timeout fallback policy itself once its real-time deadline passes.
    /// Returns `None` if the interaction is unknown (already closed).
    pub async fn wait_for_resolution(&self, interaction_id: &str) -> Option<Interaction> {
        loop {
            let (notify, deadline) = {
                let table = self.table.lock();
                match table.get(interaction_id) {
                    Some(i) if i.state.is_terminal() => return Some(i.clone()),
                    Some(i) => {
                        let notify = self.notifies.lock().get(interaction_id).cloned()?;
                        (notify, i.deadline)
                    }
                    None => return None,
                }
            };

            let wait = (deadline - Utc::now()).to_std().unwrap_or(std::time::Duration::ZERO);
            match tokio::time::timeout(wait, notify.notified()).await {
                Ok(()) => continue,
                Err(_) => {
                    self.apply_timeouts(Utc::now()).await;
                }
            }
        }
    }

    /// Spec §4.7 step 2. Single-flight: a second call after a terminal state
    /// returns `interaction.already_resolved`.
    pub async fn approve_tool(
        &self,
        interaction_id: &str,
        approved: bool,
        user_message: Option<String>,
        response_data: Option<Value>,
    ) -> CoreResult<()> {
        let (new_state, resolution, decision) = if approved {
            if let Some(arguments) = response_data {
                (
                    InteractionState::Edited,
                    Resolution::Edited { arguments: arguments.clone() },
                    ToolDecision::Edited { arguments },
                )
            } else {
                (InteractionState::Approved, Resolution::Approved, ToolDecision::Approved)
            }
        } else {
            (
                InteractionState::Rejected,
                Resolution::Rejected {
                    user_message: user_message.clone(),
                },
                ToolDecision::Rejected { reason: user_message },
            )
        };

        {
            let mut table = self.table.lock();
            let interaction = table
                .get_mut(interaction_id)
                .ok_or_else(|| CoreError::InteractionAlreadyResolved {
                    interaction_id: interaction_id.to_string(),
                })?;
            if interaction.state.is_terminal() {
                return Err(CoreError::InteractionAlreadyResolved {
                    interaction_id: interaction_id.to_string(),
                });
            }
            interaction.state = new_state;
            interaction.resolution = Some(resolution);
        }
        if let Some(notify) = self.notifies.lock().get(interaction_id) {
            notify.notify_waiters();
        }

        self.communicator.send_tool_decision(interaction_id, decision).await
    }

    /// Resolves every interaction past `deadline` using the configured
    /// fallback policy (spec §4.7 step 3). Returns the interactions just
    /// resolved this way, so the caller can emit synthetic chunks.
    pub async fn apply_timeouts(&self, now: DateTime<Utc>) -> Vec<Interaction> {
        let due: Vec<String> = {
            let table = self.table.lock();
            table
                .values()
                .filter(|i| i.state == InteractionState::Pending && now >= i.deadline)
                .map(|i| i.interaction_id.clone())
                .collect()
        };
        let mut resolved = Vec::new();
        for id in due {
            if let Some(interaction) = self.resolve_via_policy(&id).await {
                resolved.push(interaction);
            }
        }
        resolved
    }

    /// Resolves every still-pending interaction regardless of deadline
    /// (spec §4.7 step 5, invoked on stream close).
    pub async fn finalize(&self) -> Vec<Interaction> {
        let pending: Vec<String> = {
            let table = self.table.lock();
            table
                .values()
                .filter(|i| i.state == InteractionState::Pending)
                .map(|i| i.interaction_id.clone())
                .collect()
        };
        let mut resolved = Vec::new();
        for id in pending {
            if let Some(interaction) = self.resolve_via_policy(&id).await {
                resolved.push(interaction);
            }
        }
        resolved
    }

    async fn resolve_via_policy(&self, interaction_id: &str) -> Option<Interaction> {
        let decision = match self.policy {
            ApprovalPolicy::AutoApprove => ToolDecision::Approved,
            ApprovalPolicy::AutoCancel => ToolDecision::Rejected {
                reason: Some("auto_cancel: approval deadline elapsed".to_string()),
            },
            ApprovalPolicy::SafeDefault => ToolDecision::Rejected {
                reason: Some("safe_default: approval deadline elapsed".to_string()),
            },
        };

        {
            let mut table = self.table.lock();
            let interaction = table.get_mut(interaction_id)?;
            if interaction.state.is_terminal() {
                return None;
            }
            interaction.state = InteractionState::TimedOut;
            interaction.resolution = Some(Resolution::AutoTimeout);
        }
        if let Some(notify) = self.notifies.lock().get(interaction_id) {
            notify.notify_waiters();
        }

        let _ = self.communicator.send_tool_decision(interaction_id, decision).await;
        self.table.lock().get(interaction_id).cloned()
    }

    /// Spec §4.7 step 6: releases runtime handles and clears the table.
    pub fn close(&self) {
        self.table.lock().clear();
        self.notifies.lock().clear();
    }

    pub fn list_pending(&self) -> Vec<Interaction> {
        self.table
            .lock()
            .values()
            .filter(|i| i.state == InteractionState::Pending)
            .cloned()
            .collect()
    }

    pub fn get(&self, interaction_id: &str) -> Option<Interaction> {
        self.table.lock().get(interaction_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubCommunicator;

    fn broker(policy: ApprovalPolicy) -> (Arc<StubCommunicator>, ApprovalBroker) {
        let comm = Arc::new(StubCommunicator::default());
        let broker = ApprovalBroker::new(comm.clone(), chrono::Duration::seconds(90), policy);
        (comm, broker)
    }

    #[tokio::test]
    async fn approve_transitions_to_approved_and_relays_decision() {
        let (comm, broker) = broker(ApprovalPolicy::AutoCancel);
        let now = Utc::now();
        let id = broker.propose("research.search", serde_json::json!({}), true, None, now);

        broker.approve_tool(&id, true, None, None).await.unwrap();
        assert_eq!(broker.get(&id).unwrap().state, InteractionState::Approved);
        assert_eq!(comm.decisions.lock()[0].1, "approved");
    }

    #[tokio::test]
    async fn response_data_with_approved_true_yields_edited_state() {
        let (_, broker) = broker(ApprovalPolicy::AutoCancel);
        let now = Utc::now();
        let id = broker.propose("research.search", serde_json::json!({}), true, None, now);

        broker
            .approve_tool(&id, true, None, Some(serde_json::json!({"query": "Y"})))
            .await
            .unwrap();
        assert_eq!(broker.get(&id).unwrap().state, InteractionState::Edited);
    }

    #[tokio::test]
    async fn duplicate_response_after_terminal_state_is_rejected() {
        let (_, broker) = broker(ApprovalPolicy::AutoCancel);
        let now = Utc::now();
        let id = broker.propose("research.search", serde_json::json!({}), true, None, now);

        broker.approve_tool(&id, true, None, None).await.unwrap();
        let err = broker.approve_tool(&id, false, None, None).await.unwrap_err();
        assert_eq!(err.code(), "interaction.already_resolved");
    }

    #[tokio::test]
    async fn timeout_fallback_resolves_pending_interactions_past_deadline() {
        let (comm, broker) = broker(ApprovalPolicy::AutoCancel);
        let now = Utc::now();
        let id = broker.propose("research.search", serde_json::json!({}), true, None, now);

        let resolved = broker.apply_timeouts(now + chrono::Duration::seconds(91)).await;
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].state, InteractionState::TimedOut);
        assert!(matches!(comm.decisions.lock()[0].1.as_str(), s if s.starts_with("rejected")));
    }

    #[tokio::test]
    async fn timeout_fallback_does_not_fire_before_deadline() {
        let (_, broker) = broker(ApprovalPolicy::AutoCancel);
        let now = Utc::now();
        broker.propose("research.search", serde_json::json!({}), true, None, now);

        let resolved = broker.apply_timeouts(now + chrono::Duration::seconds(10)).await;
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn finalize_resolves_all_pending_regardless_of_deadline() {
        let (_, broker) = broker(ApprovalPolicy::AutoApprove);
        let now = Utc::now();
        broker.propose("research.search", serde_json::json!({}), true, None, now);

        let resolved = broker.finalize().await;
        assert_eq!(resolved.len(), 1);
        assert!(broker.list_pending().is_empty());
    }

    #[tokio::test]
    async fn wait_for_resolution_returns_once_approved() {
        let comm = Arc::new(StubCommunicator::default());
        let broker = Arc::new(ApprovalBroker::new(comm, chrono::Duration::seconds(90), ApprovalPolicy::AutoCancel));
        let now = Utc::now();
        let id = broker.propose("research.search", serde_json::json!({}), true, None, now);

        let waiter = {
            let broker = broker.clone();
            let id = id.clone();
            tokio::spawn(async move { broker.wait_for_resolution(&id).await })
        };
        broker.approve_tool(&id, true, None, None).await.unwrap();
        let resolved = waiter.await.unwrap().unwrap();
        assert_eq!(resolved.state, InteractionState::Approved);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_resolution_applies_timeout_fallback_past_real_deadline() {
        let comm = Arc::new(StubCommunicator::default());
        let broker = ApprovalBroker::new(comm, chrono::Duration::milliseconds(10), ApprovalPolicy::AutoCancel);
        let now = Utc::now();
        let id = broker.propose("research.search", serde_json::json!({}), true, None, now);

        let resolved = broker.wait_for_resolution(&id).await.unwrap();
        assert_eq!(resolved.state, InteractionState::TimedOut);
    }

    #[tokio::test]
    async fn close_clears_the_table() {
        let (_, broker) = broker(ApprovalPolicy::AutoCancel);
        let now = Utc::now();
        broker.propose("research.search", serde_json::json!({}), true, None, now);
        broker.close();
        assert!(broker.list_pending().is_empty());
        assert!(broker.get("anything").is_none());
    }
}
