//! Execution core that multiplexes long-lived conversational agent sessions
//! over a pluggable LLM runtime, with streaming events and human-in-the-loop
//! tool approval.
//!
//! Only a [`runtime::FrameworkRunner`] implementation is assumed of the
//! underlying model backend; everything else — agent/runner/session
//! lifecycle, event conversion, tool gating — is owned by this crate.

pub mod adapter;
pub mod agent;
pub mod approval;
pub mod config;
pub mod contracts;
pub mod engine;
pub mod error;
pub mod event_converter;
pub mod event_fanout;
pub mod events;
pub mod runner;
pub mod runtime;
pub mod session;
pub mod stream;
pub mod tools;

#[cfg(test)]
pub mod test_support;

pub use adapter::FrameworkAdapter;
pub use config::RuntimeConfig;
pub use engine::ExecutionEngine;
pub use error::{CoreError, CoreResult};
pub use events::StreamChunk;
pub use stream::StreamSession;
