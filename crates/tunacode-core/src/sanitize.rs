// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! History sanitization.
//!
//! Guarantees that a message list is a valid input for the next model call:
//! no dangling tool calls, no duplicate adjacent user turns, no empty
//! assistant messages, no stale system prompts or run ids.  Each operation
//! is idempotent; the structural trio runs to a fixpoint with a hard
//! iteration bound.

use std::collections::HashSet;

use tunacode_model::{Message, MessagePart, MessageRole};

/// Content marker identifying an error tool return as a retry record.
/// A tool call accompanied by one of these is awaiting a model retry and
/// must survive sanitization.
pub const RETRY_MARKER: &str = "[retry scheduled]";

/// Hard bound on fixpoint passes.  Each pass strictly decreases the message
/// count or changes nothing, so the bound is a guard against pathological
/// input rather than a correctness requirement.
const MAX_SANITIZE_PASSES: usize = 8;

/// Remove `ToolCall` parts that have no matching `ToolReturn` later in the
/// history.  A message left with no parts is dropped.  Returns true when
/// anything changed.
pub fn remove_dangling_tool_calls(messages: &mut Vec<Message>) -> bool {
    // Ids answered anywhere in the history.  Position is checked below:
    // a return counts only if it appears after the call's message.
    let mut changed = false;
    let return_positions: Vec<(usize, String)> = messages
        .iter()
        .enumerate()
        .flat_map(|(i, m)| {
            m.parts.iter().filter_map(move |p| match p {
                MessagePart::ToolReturn { id, .. } => Some((i, id.clone())),
                _ => None,
            })
        })
        .collect();

    let mut rebuilt: Vec<Message> = Vec::with_capacity(messages.len());
    for (i, msg) in messages.iter().enumerate() {
        if msg.role != MessageRole::Assistant {
            rebuilt.push(msg.clone());
            continue;
        }
        let kept: Vec<MessagePart> = msg
            .parts
            .iter()
            .filter(|p| match p {
                MessagePart::ToolCall { id, .. } => {
                    let answered = return_positions
                        .iter()
                        .any(|(ri, rid)| *ri > i && rid == id);
                    if !answered {
                        changed = true;
                    }
                    answered
                }
                _ => true,
            })
            .cloned()
            .collect();
        if kept.is_empty() {
            changed = true;
            continue;
        }
        let mut m = msg.clone();
        m.parts = kept;
        rebuilt.push(m);
    }
    if changed {
        *messages = rebuilt;
    }
    changed
}

/// Collapse adjacent `User` messages, keeping only the later one.
/// Protects against duplicate turns introduced by retry logic.
pub fn collapse_consecutive_user_messages(messages: &mut Vec<Message>) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i + 1 < messages.len() {
        if messages[i].role == MessageRole::User && messages[i + 1].role == MessageRole::User {
            messages.remove(i);
            changed = true;
        } else {
            i += 1;
        }
    }
    changed
}

/// Drop assistant messages whose parts reduce to the empty string after
/// trimming.  Retry-marked error returns are untouched — they live in
/// `ToolReturn` messages, not assistant ones.
pub fn remove_empty_assistant_messages(messages: &mut Vec<Message>) -> bool {
    let before = messages.len();
    messages.retain(|m| !(m.role == MessageRole::Assistant && m.is_effectively_empty()));
    messages.len() != before
}

/// Remove `System` messages from a resumed history; the current turn's
/// system prompt is re-applied externally.
pub fn strip_system_messages(messages: &mut Vec<Message>) -> bool {
    let before = messages.len();
    messages.retain(|m| m.role != MessageRole::System);
    messages.len() != before
}

/// Clear transient per-run identifiers so resumed history does not leak run
/// correlation to the model.
pub fn clear_run_ids(messages: &mut [Message]) -> bool {
    let mut changed = false;
    for m in messages {
        if m.run_id.take().is_some() {
            changed = true;
        }
    }
    changed
}

/// Full resume sanitization: strip systems and run ids, then apply the
/// structural cleanups to a fixpoint (bounded at 8 passes).
pub fn sanitize_history_for_resume(messages: &mut Vec<Message>) {
    strip_system_messages(messages);
    clear_run_ids(messages);
    run_structural_fixpoint(messages);
}

/// Structural-only cleanup used after exceptional exits (cancel, timeout,
/// orchestrator error) on the live session messages.
pub fn cleanup_after_interruption(messages: &mut Vec<Message>) {
    run_structural_fixpoint(messages);
}

fn run_structural_fixpoint(messages: &mut Vec<Message>) {
    for _ in 0..MAX_SANITIZE_PASSES {
        let mut changed = remove_dangling_tool_calls(messages);
        changed |= collapse_consecutive_user_messages(messages);
        changed |= remove_empty_assistant_messages(messages);
        if !changed {
            break;
        }
    }
}

/// Ids of retry-protected tool calls: error returns carrying the retry
/// marker.  Exposed so the node processor can avoid double-reporting.
pub fn retry_protected_ids(messages: &[Message]) -> HashSet<String> {
    messages
        .iter()
        .flat_map(|m| {
            m.parts.iter().filter_map(|p| match p {
                MessagePart::ToolReturn { id, content, is_error: true }
                    if content.contains(RETRY_MARKER) =>
                {
                    Some(id.clone())
                }
                _ => None,
            })
        })
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tunacode_model::Message;

    fn call(id: &str) -> MessagePart {
        MessagePart::tool_call(id, "read_file", json!({"path": "x"}))
    }

    // ── Dangling removal ─────────────────────────────────────────────────────

    #[test]
    fn dangling_call_is_removed() {
        let mut msgs = vec![
            Message::user("go"),
            Message::assistant_with_parts(vec![MessagePart::text("reading"), call("c1")]),
        ];
        assert!(remove_dangling_tool_calls(&mut msgs));
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].parts.len(), 1);
        assert!(msgs[1].tool_call_ids().is_empty());
    }

    #[test]
    fn answered_call_is_kept() {
        let mut msgs = vec![
            Message::assistant_with_parts(vec![call("c1")]),
            Message::tool_return("c1", "contents", false),
        ];
        assert!(!remove_dangling_tool_calls(&mut msgs));
        assert_eq!(msgs[0].tool_call_ids(), vec!["c1"]);
    }

    #[test]
    fn return_before_call_does_not_count() {
        // A return that precedes the call (corrupt ordering) leaves the call
        // dangling.
        let mut msgs = vec![
            Message::tool_return("c1", "early", false),
            Message::assistant_with_parts(vec![call("c1")]),
        ];
        assert!(remove_dangling_tool_calls(&mut msgs));
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn message_losing_all_parts_is_dropped() {
        let mut msgs = vec![Message::assistant_with_parts(vec![call("c1")])];
        assert!(remove_dangling_tool_calls(&mut msgs));
        assert!(msgs.is_empty());
    }

    #[test]
    fn retry_marked_error_return_protects_call() {
        let mut msgs = vec![
            Message::assistant_with_parts(vec![call("c1")]),
            Message::tool_return("c1", format!("transport failed {RETRY_MARKER}"), true),
        ];
        assert!(!remove_dangling_tool_calls(&mut msgs));
        assert_eq!(retry_protected_ids(&msgs).len(), 1);
    }

    #[test]
    fn dangling_removal_is_idempotent() {
        let mut msgs = vec![
            Message::user("go"),
            Message::assistant_with_parts(vec![MessagePart::text("t"), call("c1")]),
        ];
        remove_dangling_tool_calls(&mut msgs);
        let snapshot = msgs.clone();
        assert!(!remove_dangling_tool_calls(&mut msgs));
        assert_eq!(msgs.len(), snapshot.len());
    }

    // ── Consecutive users ────────────────────────────────────────────────────

    #[test]
    fn later_of_two_adjacent_users_wins() {
        let mut msgs = vec![Message::user("first"), Message::user("second")];
        assert!(collapse_consecutive_user_messages(&mut msgs));
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].text(), "second");
    }

    #[test]
    fn three_adjacent_users_collapse_to_last() {
        let mut msgs = vec![Message::user("a"), Message::user("b"), Message::user("c")];
        collapse_consecutive_user_messages(&mut msgs);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].text(), "c");
    }

    #[test]
    fn separated_users_untouched() {
        let mut msgs = vec![Message::user("a"), Message::assistant("r"), Message::user("b")];
        assert!(!collapse_consecutive_user_messages(&mut msgs));
        assert_eq!(msgs.len(), 3);
    }

    // ── Empty responses ──────────────────────────────────────────────────────

    #[test]
    fn empty_assistant_is_dropped() {
        let mut msgs = vec![Message::assistant("  \n "), Message::assistant("real")];
        assert!(remove_empty_assistant_messages(&mut msgs));
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn empty_user_is_kept() {
        // Only assistant messages are subject to empty removal.
        let mut msgs = vec![Message::user("")];
        assert!(!remove_empty_assistant_messages(&mut msgs));
        assert_eq!(msgs.len(), 1);
    }

    // ── System / run ids ─────────────────────────────────────────────────────

    #[test]
    fn system_messages_are_stripped() {
        let mut msgs = vec![Message::system("prompt"), Message::user("hi")];
        assert!(strip_system_messages(&mut msgs));
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn run_ids_are_cleared() {
        let mut msgs = vec![Message::user("x").with_run_id("r1")];
        assert!(clear_run_ids(&mut msgs));
        assert!(msgs[0].run_id.is_none());
        assert!(!clear_run_ids(&mut msgs));
    }

    // ── Fixpoint ─────────────────────────────────────────────────────────────

    #[test]
    fn fixpoint_resolves_cascading_cleanup() {
        // Removing the dangling call empties the assistant message, which
        // leaves two users adjacent; the fixpoint must resolve all three.
        let mut msgs = vec![
            Message::user("first"),
            Message::assistant_with_parts(vec![call("c1")]),
            Message::user("second"),
        ];
        sanitize_history_for_resume(&mut msgs);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].text(), "second");
    }

    #[test]
    fn sanitize_is_idempotent_on_valid_history() {
        let mut msgs = vec![
            Message::user("go"),
            Message::assistant_with_parts(vec![call("c1")]),
            Message::tool_return("c1", "out", false),
            Message::assistant("done"),
        ];
        sanitize_history_for_resume(&mut msgs);
        let snapshot: Vec<String> = msgs.iter().map(|m| format!("{:?}", m.parts)).collect();
        sanitize_history_for_resume(&mut msgs);
        let again: Vec<String> = msgs.iter().map(|m| format!("{:?}", m.parts)).collect();
        assert_eq!(snapshot, again);
    }

    #[test]
    fn cleanup_after_interruption_keeps_valid_prefix() {
        let mut msgs = vec![
            Message::user("go"),
            Message::assistant_with_parts(vec![MessagePart::text("working"), call("c1")]),
        ];
        cleanup_after_interruption(&mut msgs);
        assert_eq!(msgs.len(), 2);
        assert!(msgs[1].tool_call_ids().is_empty());
        assert_eq!(msgs[1].text(), "working");
    }
}
