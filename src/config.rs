//! Configuration shapes recognized by the execution core (spec §6).
//!
//! Loading from disk/env is an external bootstrap concern (spec §1); this
//! module only defines the shape and documented defaults.

use serde::{Deserialize, Serialize};

fn default_idle_session_threshold_secs() -> u64 {
    30 * 60
}

fn default_runner_idle_threshold_secs() -> u64 {
    15 * 60
}

fn default_approval_timeout_ms() -> u64 {
    90_000
}

/// Fallback policy applied when an [`crate::approval::Interaction`] reaches
/// its deadline without a client response (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    AutoCancel,
    AutoApprove,
    SafeDefault,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        ApprovalPolicy::AutoCancel
    }
}

/// Backend kind for the [`crate::session::recovery::RecoveryStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStoreKind {
    Memory,
    Redis,
    #[serde(other)]
    Other,
}

impl Default for RecoveryStoreKind {
    fn default() -> Self {
        RecoveryStoreKind::Memory
    }
}

/// Runtime configuration for the execution core (spec §6 "Configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// `ChatSession` idle threshold before `idle_scan` clears it.
    pub idle_session_threshold_secs: u64,
    /// `Runner` idle threshold before it is destroyed.
    pub runner_idle_threshold_secs: u64,
    /// Default deadline for an `Interaction` awaiting client response.
    pub approval_default_timeout_ms: u64,
    /// Fallback behavior when an interaction's deadline elapses.
    pub approval_policy: ApprovalPolicy,
    /// Which recovery store backend to use.
    pub recovery_store_kind: RecoveryStoreKind,
    /// Whether the Tool Invocation Service is active at all.
    pub enable_tool_service: bool,
    /// Tool sources enabled for resolution (e.g. `["builtin", "mcp"]`).
    pub enabled_tool_sources: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            idle_session_threshold_secs: default_idle_session_threshold_secs(),
            runner_idle_threshold_secs: default_runner_idle_threshold_secs(),
            approval_default_timeout_ms: default_approval_timeout_ms(),
            approval_policy: ApprovalPolicy::default(),
            recovery_store_kind: RecoveryStoreKind::default(),
            enable_tool_service: true,
            enabled_tool_sources: vec!["builtin".to_string(), "mcp".to_string()],
        }
    }
}

impl RuntimeConfig {
    pub fn idle_session_threshold(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.idle_session_threshold_secs)
    }

    pub fn runner_idle_threshold(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.runner_idle_threshold_secs)
    }

    pub fn approval_default_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.approval_default_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.idle_session_threshold_secs, 1800);
        assert_eq!(cfg.runner_idle_threshold_secs, 900);
        assert_eq!(cfg.approval_default_timeout_ms, 90_000);
        assert_eq!(cfg.approval_policy, ApprovalPolicy::AutoCancel);
    }

    #[test]
    fn deserializes_partial_toml_with_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str(r#"{"approval_policy":"auto_approve"}"#)
            .expect("partial config should deserialize with defaults filled in");
        assert_eq!(cfg.approval_policy, ApprovalPolicy::AutoApprove);
        assert_eq!(cfg.idle_session_threshold_secs, 1800);
    }
}
