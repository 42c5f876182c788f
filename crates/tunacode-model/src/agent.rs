// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::{Message, MessagePart, UsageMetrics};

/// Literal marker an agent places at the start of an assistant text part to
/// signal that the user's request is satisfied.  Case-sensitive; leading
/// whitespace before the marker is permitted.
pub const TASK_COMPLETE_MARKER: &str = "TUNACODE_TASK_COMPLETE";

/// One streamed segment of an agent iteration: a partial assistant message
/// with optional tool-call parts and usage info.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub parts: Vec<MessagePart>,
    pub usage: Option<UsageMetrics>,
}

impl Node {
    pub fn text(content: impl Into<String>) -> Self {
        Self { parts: vec![MessagePart::text(content)], usage: None }
    }

    pub fn with_parts(parts: Vec<MessagePart>) -> Self {
        Self { parts, usage: None }
    }

    pub fn with_usage(mut self, usage: UsageMetrics) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, MessagePart::ToolCall { .. }))
    }
}

/// Failure surfaced by the agent stream.
///
/// `UserAbort` and `Cancelled` are distinguished so the orchestrator can map
/// them to the right turn outcome; everything else is a transport failure
/// with a message suitable for logs.
#[derive(Debug, Error)]
pub enum AgentStreamError {
    #[error("aborted by user")]
    UserAbort,
    #[error("stream cancelled")]
    Cancelled,
    #[error("model transport error: {0}")]
    Transport(String),
}

pub type NodeStream = BoxStream<'static, Result<Node, AgentStreamError>>;

/// The LLM capability consumed by the orchestrator.
///
/// One `iter_stream` call corresponds to one agent iteration: the
/// implementation sends `history` to the model and yields [`Node`]s as the
/// response streams in.  Implementations must surface user-driven
/// cancellation as [`AgentStreamError::UserAbort`] and cooperative
/// cancellation as [`AgentStreamError::Cancelled`].
#[async_trait]
pub trait LLMAgent: Send + Sync {
    /// The `provider:model` spec this agent was resolved from.
    fn model_name(&self) -> &str;

    async fn iter_stream(&self, history: Vec<Message>) -> Result<NodeStream, AgentStreamError>;
}
