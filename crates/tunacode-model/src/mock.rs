// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{
    AgentStreamError, LLMAgent, Message, MessageRole, Node, NodeStream, UsageMetrics,
    TASK_COMPLETE_MARKER,
};

/// Deterministic offline agent.  Echoes the last user message back as a
/// completed task.  Backs the built-in `mock` provider so the headless CLI
/// works without a network transport.
pub struct MockAgent {
    name: String,
}

impl MockAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl LLMAgent for MockAgent {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn iter_stream(&self, history: Vec<Message>) -> Result<NodeStream, AgentStreamError> {
        let reply = history
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.text())
            .unwrap_or_else(|| "[no input]".to_string());
        let node = Node::text(format!("{TASK_COMPLETE_MARKER} MOCK: {reply}")).with_usage(
            UsageMetrics {
                request_tokens: 10,
                response_tokens: 10,
                total_tokens: 20,
                last_call_tokens: 20,
                ..Default::default()
            },
        );
        Ok(Box::pin(stream::iter(vec![Ok(node)])))
    }
}

/// A pre-scripted agent for tests.  Each `iter_stream` call pops the next
/// iteration script from the front of the queue; an exhausted queue yields
/// an empty iteration (no parts), which the orchestrator treats as an empty
/// response.
///
/// `last_history` records the exact history sent on the most recent call so
/// tests can assert what the orchestrator produced after sanitize/prune.
pub struct ScriptedMockAgent {
    scripts: Mutex<VecDeque<Vec<Result<Node, AgentStreamError>>>>,
    pub last_history: Arc<Mutex<Option<Vec<Message>>>>,
    pub call_count: Arc<Mutex<usize>>,
}

impl ScriptedMockAgent {
    /// Build an agent from iteration scripts.  The outer `Vec` is the
    /// ordered list of iterations; the inner `Vec` the nodes emitted for
    /// that iteration.
    pub fn new(scripts: Vec<Vec<Node>>) -> Self {
        Self {
            scripts: Mutex::new(
                scripts
                    .into_iter()
                    .map(|nodes| nodes.into_iter().map(Ok).collect())
                    .collect(),
            ),
            last_history: Arc::new(Mutex::new(None)),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Build an agent whose iterations may also fail mid-stream.
    pub fn with_results(scripts: Vec<Vec<Result<Node, AgentStreamError>>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            last_history: Arc::new(Mutex::new(None)),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Convenience: one iteration that completes the task with `text`.
    pub fn completes_with(text: impl Into<String>) -> Self {
        Self::new(vec![vec![Node::text(format!(
            "{TASK_COMPLETE_MARKER} {}",
            text.into()
        ))]])
    }
}

#[async_trait]
impl LLMAgent for ScriptedMockAgent {
    fn model_name(&self) -> &str {
        "mock:scripted"
    }

    async fn iter_stream(&self, history: Vec<Message>) -> Result<NodeStream, AgentStreamError> {
        *self.last_history.lock().unwrap() = Some(history);
        *self.call_count.lock().unwrap() += 1;
        let nodes = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![Ok(Node::default())]);
        Ok(Box::pin(stream::iter(nodes)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn mock_agent_echoes_last_user_message() {
        let agent = MockAgent::new("mock:dev");
        let mut s = agent.iter_stream(vec![Message::user("ping")]).await.unwrap();
        let node = s.next().await.unwrap().unwrap();
        let text = match &node.parts[0] {
            crate::MessagePart::Text { content } => content.clone(),
            other => panic!("expected text, got {other:?}"),
        };
        assert!(text.starts_with(TASK_COMPLETE_MARKER));
        assert!(text.contains("ping"));
    }

    #[tokio::test]
    async fn scripted_agent_pops_scripts_in_order() {
        let agent = ScriptedMockAgent::new(vec![
            vec![Node::text("first")],
            vec![Node::text("second")],
        ]);
        let mut s1 = agent.iter_stream(vec![]).await.unwrap();
        let n1 = s1.next().await.unwrap().unwrap();
        let mut s2 = agent.iter_stream(vec![]).await.unwrap();
        let n2 = s2.next().await.unwrap().unwrap();
        assert!(matches!(&n1.parts[0], crate::MessagePart::Text { content } if content == "first"));
        assert!(matches!(&n2.parts[0], crate::MessagePart::Text { content } if content == "second"));
    }

    #[tokio::test]
    async fn exhausted_scripts_yield_empty_node() {
        let agent = ScriptedMockAgent::new(vec![]);
        let mut s = agent.iter_stream(vec![]).await.unwrap();
        let node = s.next().await.unwrap().unwrap();
        assert!(node.parts.is_empty());
    }

    #[tokio::test]
    async fn last_history_records_what_was_sent() {
        let agent = ScriptedMockAgent::new(vec![vec![Node::text("x")]]);
        let _ = agent.iter_stream(vec![Message::user("sent")]).await.unwrap();
        let hist = agent.last_history.lock().unwrap();
        assert_eq!(hist.as_ref().unwrap()[0].text(), "sent");
    }
}
