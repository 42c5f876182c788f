// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Resume pipeline: everything that happens to the history before it is
//! handed to the model.
//!
//! Order per call: [`filter_compacted`] → [`prune_old_tool_outputs`] →
//! [`sanitize_history_for_resume`].  A rolling summary checkpoint is
//! generated opportunistically when the estimated token count crosses the
//! configured threshold; failure to summarize is logged and never aborts
//! the turn.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, warn};

use tunacode_model::{LLMAgent, Message, MessagePart, MessageRole};

use crate::sanitize::sanitize_history_for_resume;

/// Reserved prefix of a rolling-summary checkpoint message.
pub const SUMMARY_MARKER: &str = "[SUMMARY] ";

/// Tool returns older than this many user turns get their content stubbed.
const PRUNE_KEEP_RECENT_TURNS: usize = 6;

const SUMMARIZE_PROMPT: &str =
    "Summarise the conversation so far in a concise, information-dense way. \
     Preserve every technical detail, decision, file name, and tool outcome \
     that may matter for future work. The summary will replace the older \
     history to free up context space.";

/// Truncate everything before the most recent summary checkpoint.
///
/// A checkpoint is an assistant message whose text begins with
/// [`SUMMARY_MARKER`].  When none exists the history is returned unchanged.
pub fn filter_compacted(messages: &[Message]) -> Vec<Message> {
    let checkpoint = messages.iter().rposition(|m| {
        m.role == MessageRole::Assistant && m.text().starts_with(SUMMARY_MARKER)
    });
    match checkpoint {
        Some(i) => messages[i..].to_vec(),
        None => messages.to_vec(),
    }
}

/// Replace the content of tool returns older than the most recent
/// `keep_recent_turns` user turns with a short byte-count stub.  The
/// tool-call parts themselves are preserved so the call/return pairing
/// stays intact.
pub fn prune_old_tool_outputs(messages: &mut [Message], keep_recent_turns: usize) -> usize {
    // Index of the user message that starts the protected tail.
    let user_positions: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == MessageRole::User)
        .map(|(i, _)| i)
        .collect();
    if user_positions.len() <= keep_recent_turns {
        return 0;
    }
    let cutoff = user_positions[user_positions.len() - keep_recent_turns];

    let mut pruned = 0;
    for msg in messages[..cutoff].iter_mut() {
        for part in msg.parts.iter_mut() {
            if let MessagePart::ToolReturn { content, .. } = part {
                if !content.starts_with("<pruned:") {
                    *content = format!("<pruned: {} bytes>", content.len());
                    pruned += 1;
                }
            }
        }
    }
    pruned
}

/// Default token estimator: four characters per token across all parts.
pub fn approx_history_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| m.approx_tokens()).sum()
}

/// The per-call history preparation pipeline.
///
/// `estimate_tokens` is a plain function pointer so the estimator is
/// replaceable without touching the pipeline.
pub struct ResumePipeline {
    pub summary_threshold: usize,
    pub keep_recent_turns: usize,
    pub estimate_tokens: fn(&[Message]) -> usize,
}

impl Default for ResumePipeline {
    fn default() -> Self {
        Self {
            summary_threshold: 120_000,
            keep_recent_turns: PRUNE_KEEP_RECENT_TURNS,
            estimate_tokens: approx_history_tokens,
        }
    }
}

impl ResumePipeline {
    pub fn with_threshold(summary_threshold: usize) -> Self {
        Self { summary_threshold, ..Self::default() }
    }

    /// Produce the effective history for the next model call.  Works on a
    /// copy; the session messages are never mutated here.
    pub fn prepare(&self, messages: &[Message]) -> Vec<Message> {
        let mut history = filter_compacted(messages);
        prune_old_tool_outputs(&mut history, self.keep_recent_turns);
        sanitize_history_for_resume(&mut history);
        history
    }

    pub fn needs_summary(&self, messages: &[Message]) -> bool {
        (self.estimate_tokens)(messages) > self.summary_threshold
    }

    /// Generate a rolling-summary checkpoint by delegating to the agent.
    ///
    /// On success the returned message list is `[checkpoint, …recent tail]`
    /// ready to replace the session history.  Any failure is logged and
    /// `None` returned — summarization is opportunistic.
    pub async fn summarize(
        &self,
        agent: &Arc<dyn LLMAgent>,
        messages: &[Message],
    ) -> Option<Vec<Message>> {
        let mut request = self.prepare(messages);
        request.push(Message::user(SUMMARIZE_PROMPT));

        let mut stream = match agent.iter_stream(request).await {
            Ok(s) => s,
            Err(e) => {
                warn!("summary generation failed to start: {e}");
                return None;
            }
        };

        let mut summary = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(node) => {
                    for part in node.parts {
                        if let MessagePart::Text { content } = part {
                            summary.push_str(&content);
                        }
                    }
                }
                Err(e) => {
                    warn!("summary generation failed mid-stream: {e}");
                    return None;
                }
            }
        }
        if summary.trim().is_empty() {
            warn!("summary generation returned empty text");
            return None;
        }

        // Keep the most recent turns verbatim after the checkpoint.
        let tail_start = tail_start_index(messages, self.keep_recent_turns);
        let mut rebuilt =
            vec![Message::assistant(format!("{SUMMARY_MARKER}{}", summary.trim()))];
        rebuilt.extend_from_slice(&messages[tail_start..]);
        debug!(
            dropped = tail_start,
            kept = rebuilt.len(),
            "rolling summary checkpoint installed"
        );
        Some(rebuilt)
    }
}

/// First index of the protected recent tail: the `keep_recent`th user
/// message from the end, or 0 when there are fewer turns than that.
fn tail_start_index(messages: &[Message], keep_recent: usize) -> usize {
    let user_positions: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == MessageRole::User)
        .map(|(i, _)| i)
        .collect();
    if user_positions.len() <= keep_recent {
        return 0;
    }
    user_positions[user_positions.len() - keep_recent]
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
