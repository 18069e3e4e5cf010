//! In-memory `Runner` stub used by unit and integration tests, analogous to
//! the teacher's `test_utils::mocks` — lets manager/engine tests run without
//! a real model backend.
#![cfg(test)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::agent::AgentConfig;
use crate::contracts::{MessageContent, MessageRole, UniversalMessage};
use crate::error::CoreResult;
use crate::runtime::{
    Communicator, FrameworkRunner, RunOutcome, RunnerFactory, RuntimeEvent, RuntimeEventStream,
    ToolDecision,
};

#[derive(Default)]
pub struct StubRunner {
    transcripts: Mutex<HashMap<String, Vec<UniversalMessage>>>,
}

#[async_trait]
impl FrameworkRunner for StubRunner {
    async fn create_session(&self, _user_id: &str) -> CoreResult<String> {
        let id = Uuid::new_v4().to_string();
        self.transcripts.lock().insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn destroy_session(&self, framework_session_id: &str) -> CoreResult<()> {
        self.transcripts.lock().remove(framework_session_id);
        Ok(())
    }

    async fn extract_history(&self, framework_session_id: &str) -> CoreResult<Vec<UniversalMessage>> {
        Ok(self
            .transcripts
            .lock()
            .get(framework_session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn inject_history(
        &self,
        framework_session_id: &str,
        transcript: &[UniversalMessage],
    ) -> CoreResult<()> {
        self.transcripts
            .lock()
            .entry(framework_session_id.to_string())
            .or_default()
            .splice(0..0, transcript.iter().cloned());
        Ok(())
    }

    async fn run_async(
        &self,
        framework_session_id: &str,
        messages: Vec<UniversalMessage>,
    ) -> CoreResult<RunOutcome> {
        let mut transcripts = self.transcripts.lock();
        let history = transcripts.entry(framework_session_id.to_string()).or_default();
        history.extend(messages);

        let seen: Vec<String> = history
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_text())
            .collect();
        let reply = UniversalMessage {
            role: MessageRole::Assistant,
            content: MessageContent::Text(format!("ack: {}", seen.join(" | "))),
        };
        history.push(reply.clone());

        Ok(RunOutcome {
            messages: vec![reply],
            tool_results: Vec::new(),
            token_usage: None,
        })
    }

    async fn run_live(
        &self,
        framework_session_id: &str,
        messages: Vec<UniversalMessage>,
    ) -> CoreResult<(RuntimeEventStream, Arc<dyn Communicator>)> {
        let wants_tool = messages
            .iter()
            .any(|m| m.content.as_text().contains("search"));

        {
            let mut transcripts = self.transcripts.lock();
            transcripts
                .entry(framework_session_id.to_string())
                .or_default()
                .extend(messages);
        }

        let mut events = vec![
            RuntimeEvent::ReasoningToken {
                text: "thinking about the request".into(),
            },
            RuntimeEvent::AssistantTextDelta {
                text: "Working on it".into(),
            },
        ];
        if wants_tool {
            events.push(RuntimeEvent::ToolCallRequested {
                tool_full_name: "research.search".into(),
                arguments: serde_json::json!({"query": "X"}),
                requires_confirmation: true,
            });
        } else {
            events.push(RuntimeEvent::Completed);
        }

        let stream: RuntimeEventStream = Box::pin(stream::iter(events));
        let communicator: Arc<dyn Communicator> = Arc::new(StubCommunicator::default());
        Ok((stream, communicator))
    }
}

#[derive(Default)]
pub struct StubCommunicator {
    pub decisions: Mutex<Vec<(String, String)>>,
    pub cancelled: Mutex<Option<String>>,
}

#[async_trait]
impl Communicator for StubCommunicator {
    async fn send_tool_decision(&self, interaction_id: &str, decision: ToolDecision) -> CoreResult<()> {
        let label = match decision {
            ToolDecision::Approved => "approved".to_string(),
            ToolDecision::Rejected { reason } => format!("rejected:{:?}", reason),
            ToolDecision::Edited { arguments } => format!("edited:{arguments}"),
        };
        self.decisions.lock().push((interaction_id.to_string(), label));
        Ok(())
    }

    async fn send_user_message(&self, _text: String) -> CoreResult<()> {
        Ok(())
    }

    async fn cancel(&self, reason: String) -> CoreResult<()> {
        *self.cancelled.lock() = Some(reason);
        Ok(())
    }
}

#[derive(Default)]
pub struct StubRunnerFactory {
    pub shared: Arc<StubRunner>,
}

#[async_trait]
impl RunnerFactory for StubRunnerFactory {
    async fn build(&self, _agent_config: &AgentConfig) -> CoreResult<Arc<dyn FrameworkRunner>> {
        Ok(self.shared.clone() as Arc<dyn FrameworkRunner>)
    }
}
