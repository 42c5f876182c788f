// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
//! Conversion between the canonical [`Message`] model and the LLM transport
//! shape.
//!
//! The transport shape is plain JSON: `{"role": …, "parts": [{"kind": …}]}`.
//! [`from_transport`] is deliberately tolerant — heterogeneous model
//! providers emit both `{"content": "…"}` and `{"parts": […]}` styles, and
//! unknown part kinds are downgraded to `Text` with a lossless string
//! rendering rather than rejected.

use serde_json::{json, Value};
use thiserror::Error;

use crate::{Message, MessagePart, MessageRole};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport message is not a JSON object")]
    NotAnObject,
    #[error("transport message has missing or unknown role: {0:?}")]
    BadRole(Option<String>),
}

/// Emit the transport JSON for one canonical message.
pub fn to_transport(msg: &Message) -> Value {
    let parts: Vec<Value> = msg
        .parts
        .iter()
        .map(|p| match p {
            MessagePart::Text { content } => json!({"kind": "text", "content": content}),
            MessagePart::Thought { content } => json!({"kind": "thought", "content": content}),
            MessagePart::ToolCall { id, name, args } => {
                json!({"kind": "tool_call", "id": id, "name": name, "args": args})
            }
            MessagePart::ToolReturn { id, content, is_error } => {
                json!({"kind": "tool_return", "id": id, "content": content, "is_error": is_error})
            }
        })
        .collect();
    json!({"role": role_str(msg.role), "parts": parts})
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::ToolReturn => "tool_return",
    }
}

fn parse_role(raw: &str) -> Option<MessageRole> {
    match raw {
        "system" => Some(MessageRole::System),
        "user" => Some(MessageRole::User),
        "assistant" => Some(MessageRole::Assistant),
        // "tool" is what OpenAI-style providers call the return role.
        "tool_return" | "tool" => Some(MessageRole::ToolReturn),
        _ => None,
    }
}

/// Parse a transport-shaped JSON value back into a canonical message.
///
/// Accepts both `{"parts": […]}` and the flat `{"content": "…"}` style.
/// The timestamp is regenerated; round-trip equality is modulo timestamp.
pub fn from_transport(raw: &Value) -> Result<Message, TransportError> {
    let obj = raw.as_object().ok_or(TransportError::NotAnObject)?;
    let role_raw = obj.get("role").and_then(Value::as_str);
    let role = role_raw
        .and_then(parse_role)
        .ok_or_else(|| TransportError::BadRole(role_raw.map(String::from)))?;

    let mut parts = Vec::new();
    match obj.get("parts").and_then(Value::as_array) {
        Some(raw_parts) => {
            for rp in raw_parts {
                parts.push(parse_part(rp));
            }
        }
        None => {
            // Flat style: a single text content field.
            let content = obj
                .get("content")
                .map(|c| match c {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default();
            parts.push(MessagePart::text(content));
        }
    }

    Ok(Message {
        role,
        parts,
        timestamp: chrono::Utc::now(),
        run_id: obj.get("run_id").and_then(Value::as_str).map(String::from),
    })
}

/// Parse one transport part.  Unknown kinds (or malformed known kinds)
/// become `Text` with a lossless string fallback so no provider output is
/// ever dropped.
fn parse_part(raw: &Value) -> MessagePart {
    let kind = raw.get("kind").and_then(Value::as_str).unwrap_or("");
    match kind {
        "text" => {
            if let Some(content) = raw.get("content").and_then(Value::as_str) {
                return MessagePart::text(content);
            }
        }
        "thought" => {
            if let Some(content) = raw.get("content").and_then(Value::as_str) {
                return MessagePart::thought(content);
            }
        }
        "tool_call" => {
            if let (Some(id), Some(name)) = (
                raw.get("id").and_then(Value::as_str),
                raw.get("name").and_then(Value::as_str),
            ) {
                let args = raw.get("args").cloned().unwrap_or(Value::Object(Default::default()));
                return MessagePart::tool_call(id, name, args);
            }
        }
        "tool_return" => {
            if let (Some(id), Some(content)) = (
                raw.get("id").and_then(Value::as_str),
                raw.get("content").and_then(Value::as_str),
            ) {
                let is_error = raw.get("is_error").and_then(Value::as_bool).unwrap_or(false);
                return MessagePart::tool_return(id, content, is_error);
            }
        }
        _ => {}
    }
    MessagePart::text(raw.to_string())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
