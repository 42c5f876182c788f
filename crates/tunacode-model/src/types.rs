// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Message parts ────────────────────────────────────────────────────────────

/// A single part of a conversation message.
///
/// - `Text` – user-visible prose
/// - `Thought` – internal reasoning; never forwarded to tools and stripped
///   from transport history on resume
/// - `ToolCall` – the assistant requests a tool invocation
/// - `ToolReturn` – the recorded result of a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePart {
    Text {
        content: String,
    },
    Thought {
        content: String,
    },
    ToolCall {
        id: String,
        name: String,
        args: serde_json::Value,
    },
    ToolReturn {
        id: String,
        content: String,
        is_error: bool,
    },
}

impl MessagePart {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text { content: content.into() }
    }

    pub fn thought(content: impl Into<String>) -> Self {
        Self::Thought { content: content.into() }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        Self::ToolCall { id: id.into(), name: name.into(), args }
    }

    pub fn tool_return(id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self::ToolReturn { id: id.into(), content: content.into(), is_error }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    ToolReturn,
}

/// A single message in the conversation history.
///
/// Immutable once appended to a session.  Role invariants:
/// `Assistant` may carry `Text`, `Thought`, and `ToolCall` parts; a
/// `ToolReturn` message carries exactly one `ToolReturn` part; `System` and
/// `User` carry one `Text` part each.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
    pub timestamp: DateTime<Utc>,
    /// Per-run correlation id; cleared by the sanitizer before resume so
    /// stale run identifiers never reach the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl Message {
    fn with_parts(role: MessageRole, parts: Vec<MessagePart>) -> Self {
        Self { role, parts, timestamp: Utc::now(), run_id: None }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::with_parts(MessageRole::System, vec![MessagePart::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_parts(MessageRole::User, vec![MessagePart::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_parts(MessageRole::Assistant, vec![MessagePart::text(text)])
    }

    pub fn assistant_with_parts(parts: Vec<MessagePart>) -> Self {
        Self::with_parts(MessageRole::Assistant, parts)
    }

    pub fn tool_return(
        id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::with_parts(
            MessageRole::ToolReturn,
            vec![MessagePart::tool_return(id, content, is_error)],
        )
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Concatenated text content of all `Text` parts.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for p in &self.parts {
            if let MessagePart::Text { content } = p {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(content);
            }
        }
        out
    }

    /// Ids of all `ToolCall` parts in this message, in order.
    pub fn tool_call_ids(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::ToolCall { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The tool-return id, when this is a `ToolReturn` message.
    pub fn tool_return_id(&self) -> Option<&str> {
        self.parts.iter().find_map(|p| match p {
            MessagePart::ToolReturn { id, .. } => Some(id.as_str()),
            _ => None,
        })
    }

    /// True when all text-bearing parts trim to empty and the message holds
    /// no tool calls or returns.
    pub fn is_effectively_empty(&self) -> bool {
        self.parts.iter().all(|p| match p {
            MessagePart::Text { content } | MessagePart::Thought { content } => {
                content.trim().is_empty()
            }
            _ => false,
        })
    }

    /// Content equality ignoring the timestamp, for round-trip checks.
    pub fn content_eq(&self, other: &Message) -> bool {
        self.role == other.role && self.parts == other.parts && self.run_id == other.run_id
    }

    /// Approximate token count: 4 characters per token for text, name plus
    /// serialized arguments for tool calls.
    pub fn approx_tokens(&self) -> usize {
        let chars: usize = self
            .parts
            .iter()
            .map(|p| match p {
                MessagePart::Text { content } | MessagePart::Thought { content } => content.len(),
                MessagePart::ToolCall { name, args, .. } => name.len() + args.to_string().len(),
                MessagePart::ToolReturn { content, .. } => content.len(),
            })
            .sum();
        (chars / 4).max(1)
    }
}

// ─── Usage accounting ─────────────────────────────────────────────────────────

/// Accumulated token/cost usage for a session.  Values only ever grow;
/// per-turn deltas are computed by snapshot subtraction in the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub request_tokens: u64,
    pub response_tokens: u64,
    pub total_tokens: u64,
    pub last_call_tokens: u64,
    pub last_cost: f64,
    pub session_cost: f64,
}

impl UsageMetrics {
    pub fn add(&mut self, other: &UsageMetrics) {
        self.request_tokens += other.request_tokens;
        self.response_tokens += other.response_tokens;
        self.total_tokens += other.total_tokens;
        self.last_call_tokens = other.last_call_tokens;
        self.last_cost = other.last_cost;
        self.session_cost += other.last_cost;
    }

    /// The growth of `self` relative to an earlier snapshot.
    pub fn delta_since(&self, earlier: &UsageMetrics) -> UsageMetrics {
        UsageMetrics {
            request_tokens: self.request_tokens - earlier.request_tokens,
            response_tokens: self.response_tokens - earlier.response_tokens,
            total_tokens: self.total_tokens - earlier.total_tokens,
            last_call_tokens: self.last_call_tokens,
            last_cost: self.last_cost,
            session_cost: self.session_cost - earlier.session_cost,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── Construction ─────────────────────────────────────────────────────────

    #[test]
    fn user_message_has_single_text_part() {
        let m = Message::user("hello");
        assert_eq!(m.role, MessageRole::User);
        assert_eq!(m.parts.len(), 1);
        assert_eq!(m.text(), "hello");
    }

    #[test]
    fn tool_return_message_carries_one_return_part() {
        let m = Message::tool_return("call-1", "output", false);
        assert_eq!(m.role, MessageRole::ToolReturn);
        assert_eq!(m.tool_return_id(), Some("call-1"));
    }

    #[test]
    fn tool_call_ids_in_order() {
        let m = Message::assistant_with_parts(vec![
            MessagePart::tool_call("a", "read_file", json!({"path": "x"})),
            MessagePart::text("and"),
            MessagePart::tool_call("b", "grep", json!({"pattern": "y"})),
        ]);
        assert_eq!(m.tool_call_ids(), vec!["a", "b"]);
    }

    // ── Emptiness ────────────────────────────────────────────────────────────

    #[test]
    fn whitespace_only_message_is_empty() {
        let m = Message::assistant("  \n\t ");
        assert!(m.is_effectively_empty());
    }

    #[test]
    fn message_with_tool_call_is_not_empty() {
        let m = Message::assistant_with_parts(vec![MessagePart::tool_call(
            "a",
            "read_file",
            json!({}),
        )]);
        assert!(!m.is_effectively_empty());
    }

    #[test]
    fn zero_part_message_is_empty() {
        let m = Message::assistant_with_parts(vec![]);
        assert!(m.is_effectively_empty());
    }

    // ── Token approximation ──────────────────────────────────────────────────

    #[test]
    fn approx_tokens_divides_by_four() {
        assert_eq!(Message::user("12345678").approx_tokens(), 2);
    }

    #[test]
    fn approx_tokens_minimum_is_one() {
        assert_eq!(Message::user("").approx_tokens(), 1);
    }

    // ── Usage ────────────────────────────────────────────────────────────────

    #[test]
    fn usage_add_accumulates_totals() {
        let mut u = UsageMetrics::default();
        u.add(&UsageMetrics {
            request_tokens: 10,
            response_tokens: 5,
            total_tokens: 15,
            last_call_tokens: 15,
            last_cost: 0.01,
            session_cost: 0.0,
        });
        u.add(&UsageMetrics {
            request_tokens: 20,
            response_tokens: 10,
            total_tokens: 30,
            last_call_tokens: 30,
            last_cost: 0.02,
            session_cost: 0.0,
        });
        assert_eq!(u.total_tokens, 45);
        assert_eq!(u.last_call_tokens, 30);
        assert!((u.session_cost - 0.03).abs() < 1e-9);
    }

    #[test]
    fn usage_delta_since_snapshot() {
        let mut u = UsageMetrics::default();
        u.add(&UsageMetrics { total_tokens: 10, last_call_tokens: 10, ..Default::default() });
        let snap = u;
        u.add(&UsageMetrics { total_tokens: 7, last_call_tokens: 7, ..Default::default() });
        assert_eq!(u.delta_since(&snap).total_tokens, 7);
    }

    // ── Serialisation ────────────────────────────────────────────────────────

    #[test]
    fn part_serialises_with_kind_tag() {
        let p = MessagePart::tool_call("id-1", "grep", json!({"pattern": "x"}));
        let j = serde_json::to_value(&p).unwrap();
        assert_eq!(j["kind"], "tool_call");
        assert_eq!(j["name"], "grep");
    }

    #[test]
    fn message_round_trips_through_serde() {
        let m = Message::assistant_with_parts(vec![
            MessagePart::thought("considering"),
            MessagePart::text("done"),
        ]);
        let j = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&j).unwrap();
        assert!(back.content_eq(&m));
    }
}
