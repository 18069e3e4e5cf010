//! Stream Session Wrapper (C9): drives one live task's `RuntimeEventStream`
//! through the Event Converter and Approval Broker, fanning out typed
//! `StreamChunk`s to every subscriber (spec §4.8).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::approval::{ApprovalBroker, Interaction, Resolution};
use crate::config::ApprovalPolicy;
use crate::contracts::ToolRequest;
use crate::error::CoreResult;
use crate::event_converter::EventConverter;
use crate::event_fanout::EventFanout;
use crate::events::StreamChunk;
use crate::runtime::{Communicator, RuntimeEvent, RuntimeEventStream};
use crate::tools::invocation::ToolInvocationService;

/// Client-facing handle for one live task (spec §4.8). Cloning is not
/// provided; a task has exactly one `StreamSession`, shared behind an `Arc`
/// by callers that need multiple references.
pub struct StreamSession {
    task_id: String,
    fanout: Arc<EventFanout>,
    broker: Arc<ApprovalBroker>,
    communicator: Arc<dyn Communicator>,
    converter: Arc<EventConverter>,
    finished: Arc<AtomicBool>,
    driver: tokio::task::JoinHandle<()>,
}

impl StreamSession {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        task_id: impl Into<String>,
        runtime_stream: RuntimeEventStream,
        communicator: Arc<dyn Communicator>,
        tools: Arc<ToolInvocationService>,
        chat_session_id: Option<String>,
        task_headers: HashMap<String, String>,
        approval_timeout: chrono::Duration,
        approval_policy: ApprovalPolicy,
    ) -> Self {
        let task_id = task_id.into();
        let fanout = Arc::new(EventFanout::new());
        let broker = Arc::new(ApprovalBroker::new(communicator.clone(), approval_timeout, approval_policy));
        let converter = Arc::new(EventConverter::new(task_id.clone()));
        let finished = Arc::new(AtomicBool::new(false));

        let driver = tokio::spawn(drive(
            converter.clone(),
            runtime_stream,
            fanout.clone(),
            broker.clone(),
            tools,
            chat_session_id,
            task_headers,
            finished.clone(),
        ));

        Self {
            task_id,
            fanout,
            broker,
            communicator,
            converter,
            finished,
            driver,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Subscribes a new receiver to this task's chunk stream. Chunks
    /// published before this call are not replayed (spec §5, transport-only
    /// fanout; no history buffer beyond the broadcast channel's backlog).
    pub fn events(&self) -> broadcast::Receiver<StreamChunk> {
        self.fanout.subscribe()
    }

    /// Same subscription as [`Self::events`], adapted into a `Stream` for
    /// callers that want to `.next()`/combinator their way through chunks
    /// instead of driving a raw `broadcast::Receiver`. A lagged subscriber
    /// (falling behind the 256-entry fanout buffer) sees the gap surface as
    /// an `Err` item rather than a silent skip.
    pub fn event_stream(&self) -> impl Stream<Item = Result<StreamChunk, BroadcastStreamRecvError>> {
        BroadcastStream::new(self.fanout.subscribe())
    }

    pub async fn approve_tool(
        &self,
        interaction_id: &str,
        approved: bool,
        user_message: Option<String>,
        response_data: Option<Value>,
    ) -> CoreResult<()> {
        self.broker
            .approve_tool(interaction_id, approved, user_message, response_data)
            .await
    }

    pub async fn send_user_message(&self, text: String) -> CoreResult<()> {
        self.communicator.send_user_message(text).await
    }

    pub async fn cancel(&self, reason: String) -> CoreResult<()> {
        self.communicator.cancel(reason).await
    }

    pub fn list_pending_interactions(&self) -> Vec<Interaction> {
        self.broker.list_pending()
    }

    /// Idempotent. Finalizes any still-pending interactions and tears down
    /// the broker, then stops the driver. Safe to call more than once, and
    /// safe to never call explicitly: if the caller simply drops every
    /// `events()` receiver without calling `close`, the driver still runs
    /// the underlying stream to completion and finalizes on its own (spec
    /// §4.8, "closing must trigger broker finalize+close even when the
    /// iterator is abandoned mid-stream").
    pub async fn close(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.broker.finalize().await;
        self.broker.close();
        self.driver.abort();
    }

    /// Used only by the Framework Adapter's `shutdown()` cascade (spec §5,
    /// "terminates all StreamSessions, emitting `CANCELLED` with reason
    /// `system_shutdown`"). Unlike `close`, this always emits a terminal
    /// `CANCELLED` chunk before tearing down, rather than leaving whatever
    /// terminal chunk the driver itself produced (or none, if abandoned).
    pub async fn shutdown_cancel(&self, reason: &str) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.communicator.cancel(reason.to_string()).await;
        self.fanout.publish(self.converter.cancelled(reason));
        self.broker.finalize().await;
        self.broker.close();
        self.driver.abort();
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    converter: Arc<EventConverter>,
    mut runtime_stream: RuntimeEventStream,
    fanout: Arc<EventFanout>,
    broker: Arc<ApprovalBroker>,
    tools: Arc<ToolInvocationService>,
    chat_session_id: Option<String>,
    task_headers: HashMap<String, String>,
    finished: Arc<AtomicBool>,
) {
    let task_id = converter.task_id().to_string();

    while let Some(event) = runtime_stream.next().await {
        match event {
            RuntimeEvent::ReasoningToken { text } => {
                fanout.publish(converter.reasoning_token(&text));
            }
            RuntimeEvent::AssistantTextDelta { text } => {
                for chunk in converter.assistant_text_delta(&text) {
                    fanout.publish(chunk);
                }
            }
            RuntimeEvent::ToolCallRequested {
                tool_full_name,
                arguments,
                requires_confirmation,
            } => {
                handle_tool_call_requested(
                    &task_id,
                    &converter,
                    &fanout,
                    &broker,
                    &tools,
                    &chat_session_id,
                    &task_headers,
                    tool_full_name,
                    arguments,
                    requires_confirmation,
                )
                .await;
            }
            RuntimeEvent::ToolCallCompleted {
                tool_full_name,
                result,
                is_error,
                duration_ms,
            } => {
                fanout.publish(converter.tool_result("", &tool_full_name, &result, is_error, duration_ms, false));
            }
            RuntimeEvent::UsageUpdate(_) => {
                // Folded into execution metadata by the adapter, not its own chunk type.
            }
            RuntimeEvent::Interrupted => {
                fanout.publish(converter.cancelled("runtime_interrupted"));
                break;
            }
            RuntimeEvent::Completed => {
                fanout.publish(converter.complete());
                break;
            }
        }
    }

    if !finished.swap(true, Ordering::SeqCst) {
        broker.finalize().await;
        broker.close();
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_tool_call_requested(
    task_id: &str,
    converter: &EventConverter,
    fanout: &Arc<EventFanout>,
    broker: &Arc<ApprovalBroker>,
    tools: &Arc<ToolInvocationService>,
    chat_session_id: &Option<String>,
    task_headers: &HashMap<String, String>,
    tool_full_name: String,
    arguments: Value,
    requires_confirmation: bool,
) {
    let interaction_id = broker.propose(
        tool_full_name.clone(),
        arguments.clone(),
        requires_confirmation,
        chat_session_id.clone(),
        Utc::now(),
    );
    fanout.publish(converter.tool_proposal(&interaction_id, &tool_full_name, &arguments, requires_confirmation));

    let resolved = broker.wait_for_resolution(&interaction_id).await;
    let resolution = resolved.as_ref().and_then(|i| i.resolution.clone());
    let auto_timeout = matches!(resolution, Some(Resolution::AutoTimeout));

    let executed_arguments = match resolution {
        Some(Resolution::Approved) => arguments,
        Some(Resolution::Edited { arguments: edited }) => edited,
        Some(Resolution::Rejected { user_message }) => {
            let reason = user_message.unwrap_or_else(|| "tool call rejected".to_string());
            fanout.publish(converter.tool_result(
                &interaction_id,
                &tool_full_name,
                &json!({ "error": reason }),
                true,
                0,
                false,
            ));
            return;
        }
        Some(Resolution::AutoTimeout) | None => {
            fanout.publish(converter.tool_result(
                &interaction_id,
                &tool_full_name,
                &json!({ "error": "approval timed out" }),
                true,
                0,
                auto_timeout,
            ));
            return;
        }
    };

    let req = ToolRequest {
        tool_full_name: tool_full_name.clone(),
        arguments: executed_arguments,
        task_id: task_id.to_string(),
        chat_session_id: chat_session_id.clone(),
        headers: HashMap::new(),
    };
    match tools.execute_tool(req, HashMap::new(), task_headers.clone()).await {
        Ok(result) => {
            fanout.publish(converter.tool_result(
                &interaction_id,
                &tool_full_name,
                &result.content,
                result.is_error,
                result.duration_ms,
                false,
            ));
        }
        Err(e) => {
            fanout.publish(converter.tool_result(
                &interaction_id,
                &tool_full_name,
                &json!({ "error": e.to_string() }),
                true,
                0,
                false,
            ));
        }
    }
}
