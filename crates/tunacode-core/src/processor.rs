// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Per-node processing: classify streamed parts, batch read-only tool
//! calls, serialize write/execute calls, and drive authorization.
//!
//! Ordering guarantees enforced here: tool returns are appended in the
//! source order of the tool-call parts, a write call is never reordered
//! against the read-only calls around it, and every registered call ends
//! the node with a matching return (real, denial, or cancellation).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use tunacode_model::{Message, MessagePart, Node};
use tunacode_tools::{
    AllowOrDeny, AuthContext, AuthorizationEngine, AuthorizationResult, ConfirmationUi,
    ToolCatalog, ToolError, ToolExecutor, ToolStatusCallback,
};

use crate::error::CoreError;
use crate::parallel::{execute_parallel, ParallelCall};
use crate::sanitize::RETRY_MARKER;
use crate::session::{ReActKind, Session};

/// Collaborators the processor needs for one node.
pub struct ProcessorDeps<'a> {
    pub executor: Arc<dyn ToolExecutor>,
    pub auth: &'a AuthorizationEngine,
    pub catalog: &'a ToolCatalog,
    pub confirm: &'a dyn ConfirmationUi,
    pub status: Option<&'a dyn ToolStatusCallback>,
    pub max_retries: u32,
    pub max_parallel: usize,
}

impl<'a> ProcessorDeps<'a> {
    fn notify(&self, message: &str, tool_name: Option<&str>) {
        if let Some(cb) = self.status {
            cb.notify(message, tool_name);
        }
    }
}

/// What one node contributed to the iteration.  The orchestrator folds
/// these into its empty-response / truncation / completion checks.
#[derive(Debug, Default)]
pub struct NodeReport {
    pub text: String,
    pub had_tool_calls: bool,
    pub had_thought: bool,
}

struct PendingCall {
    key: String,
    id: String,
    name: String,
    args: Value,
}

/// Process one streamed node: append the assistant message, extract
/// thoughts, and dispatch tool calls.
pub async fn process_node(
    session: &mut Session,
    node: Node,
    deps: &ProcessorDeps<'_>,
) -> Result<NodeReport, CoreError> {
    let mut report = NodeReport::default();
    let mut parts = node.parts;

    for part in &parts {
        match part {
            MessagePart::Text { content } => {
                if !report.text.is_empty() {
                    report.text.push('\n');
                }
                report.text.push_str(content);
            }
            MessagePart::Thought { content } => {
                report.had_thought = true;
                session.react.push(ReActKind::Thought, content.clone());
            }
            _ => {}
        }
    }

    // Models without native tool-call support sometimes inline JSON calls in
    // the text.  Promote those to synthetic tool-call parts, but only when
    // the node carried no structured calls of its own.
    let has_structured = parts.iter().any(|p| matches!(p, MessagePart::ToolCall { .. }));
    if !has_structured && !report.text.is_empty() {
        let base_micros = chrono::Utc::now().timestamp_micros();
        for (i, (name, args)) in extract_inline_tool_calls(&report.text).into_iter().enumerate() {
            // Offset by position so two matches in one node never collide.
            let id = format!("fallback_{}", base_micros + i as i64);
            debug!(tool = %name, id = %id, "promoted inline JSON to tool call");
            parts.push(MessagePart::tool_call(id, name, args));
        }
    }

    // Register every call before the message is appended so the registry
    // and the message parts agree on (name, args) from the start.
    let mut calls: Vec<PendingCall> = Vec::new();
    for part in &parts {
        if let MessagePart::ToolCall { id, name, args } = part {
            let key = session.tool_calls.register(id, name, args.clone());
            calls.push(PendingCall {
                key,
                id: id.clone(),
                name: name.clone(),
                args: args.clone(),
            });
        }
    }
    report.had_tool_calls = !calls.is_empty();

    if !parts.is_empty() {
        let msg = Message::assistant_with_parts(parts)
            .with_run_id(session.runtime.run_id.clone());
        session.push(msg);
    }

    if let Some(usage) = node.usage {
        session.usage.add(&usage);
    }

    // Partition the ordered calls into maximal read-only runs; any
    // write/execute call forms its own singleton run so side effects keep
    // their source order.
    let mut idx = 0;
    while idx < calls.len() {
        if session.runtime.operation_cancelled() {
            cancel_remaining(session, &calls[idx..], deps);
            return Ok(report);
        }
        let run_end = if deps.catalog.is_read_only(&calls[idx].name) {
            let mut end = idx + 1;
            while end < calls.len() && deps.catalog.is_read_only(&calls[end].name) {
                end += 1;
            }
            end
        } else {
            idx + 1
        };

        let run = &calls[idx..run_end];
        if run.len() >= 2 && deps.catalog.is_read_only(&run[0].name) {
            dispatch_parallel_run(session, run, deps).await?;
        } else {
            dispatch_one(session, &run[0], deps).await;
        }
        idx = run_end;
    }

    Ok(report)
}

/// Resolve the authorization decision for one call, prompting the UI on
/// `Confirm`.
async fn resolve_authorization(
    session: &Session,
    call: &PendingCall,
    deps: &ProcessorDeps<'_>,
) -> Result<(), String> {
    let ctx = AuthContext {
        tool_name: &call.name,
        tool_args: &call.args,
        session_yolo: session.runtime.yolo,
        session_plan_mode: session.runtime.plan_mode,
        catalog: deps.catalog,
    };
    match deps.auth.decide(&ctx) {
        AuthorizationResult::Allow => Ok(()),
        AuthorizationResult::Deny(reason) => Err(reason),
        AuthorizationResult::Confirm => {
            deps.notify("awaiting confirmation", Some(&call.name));
            match deps.confirm.ask(&call.name, &call.args).await {
                AllowOrDeny::Allow => Ok(()),
                AllowOrDeny::Deny => Err("tool use rejected by user".to_string()),
            }
        }
    }
}

fn record_denial(session: &mut Session, call: &PendingCall, reason: &str, deps: &ProcessorDeps<'_>) {
    warn!(tool = %call.name, %reason, "tool call denied");
    deps.notify("denied", Some(&call.name));
    session.tool_calls.fail(&call.key, reason);
    session.push(Message::tool_return(
        &call.id,
        format!("Tool call denied: {reason}"),
        true,
    ));
}

fn record_result(
    session: &mut Session,
    call: &PendingCall,
    result: Result<String, ToolError>,
    deps: &ProcessorDeps<'_>,
) {
    match result {
        Ok(output) => {
            deps.notify("completed", Some(&call.name));
            session.react.push(ReActKind::Observation, summary_line(&output));
            session.tool_calls.complete(&call.key, output.clone());
            session.push(Message::tool_return(&call.id, output, false));
        }
        Err(ToolError::Cancelled) => {
            deps.notify("cancelled", Some(&call.name));
            session.tool_calls.cancel(&call.key);
            session.push(Message::tool_return(&call.id, "cancelled", true));
        }
        Err(e) => {
            deps.notify("failed", Some(&call.name));
            session.react.push(ReActKind::Observation, format!("error: {e}"));
            // A transport failure that exhausted its retries is marked so the
            // sanitizer treats the call as retryable rather than dangling.
            let content = if e.is_transport() {
                format!("{e} {RETRY_MARKER}")
            } else {
                e.to_string()
            };
            session.tool_calls.fail(&call.key, content.clone());
            session.push(Message::tool_return(&call.id, content, true));
        }
    }
}

fn cancel_remaining(session: &mut Session, calls: &[PendingCall], deps: &ProcessorDeps<'_>) {
    for call in calls {
        deps.notify("cancelled", Some(&call.name));
        session.tool_calls.cancel(&call.key);
        session.push(Message::tool_return(&call.id, "cancelled", true));
    }
}

/// Dispatch one call sequentially, honouring the transport retry budget.
/// The invocation races the cancel signal so a user abort interrupts even a
/// long-running tool.
async fn dispatch_one(session: &mut Session, call: &PendingCall, deps: &ProcessorDeps<'_>) {
    if let Err(reason) = resolve_authorization(session, call, deps).await {
        record_denial(session, call, &reason, deps);
        return;
    }

    deps.notify("dispatching", Some(&call.name));
    session.react.push(ReActKind::Action, format!("{}({})", call.name, call.args));
    session.tool_calls.start(&call.key);

    let retrying = RetryingExecutor {
        inner: Arc::clone(&deps.executor),
        budget: deps.max_retries,
    };
    let mut cancel = session.runtime.cancel.subscribe();
    let result = if *cancel.borrow() {
        Err(ToolError::Cancelled)
    } else {
        tokio::select! {
            biased;
            _ = cancel.changed() => Err(ToolError::Cancelled),
            result = retrying.invoke(&call.name, &call.args) => result,
        }
    };
    record_result(session, call, result, deps);
}

/// Wraps the real executor with the transport retry budget so batched calls
/// get the same retry behaviour as sequential ones.
struct RetryingExecutor {
    inner: Arc<dyn ToolExecutor>,
    budget: u32,
}

#[async_trait]
impl ToolExecutor for RetryingExecutor {
    async fn invoke(&self, name: &str, args: &Value) -> Result<String, ToolError> {
        let mut result = self.inner.invoke(name, args).await;
        let mut attempts = 0;
        while attempts < self.budget && matches!(&result, Err(e) if e.is_transport()) {
            attempts += 1;
            warn!(tool = %name, attempts, "transport error, retrying tool call");
            result = self.inner.invoke(name, args).await;
        }
        result
    }
}

/// Dispatch a read-only run of length ≥ 2 through the parallel executor.
async fn dispatch_parallel_run(
    session: &mut Session,
    run: &[PendingCall],
    deps: &ProcessorDeps<'_>,
) -> Result<(), CoreError> {
    // Authorization first; denied calls keep their slot so returns stay in
    // source order.
    let mut allowed: Vec<Option<ParallelCall>> = Vec::with_capacity(run.len());
    let mut denials: Vec<Option<String>> = Vec::with_capacity(run.len());
    for call in run {
        match resolve_authorization(session, call, deps).await {
            Ok(()) => {
                let args = normalize_batch_args(&call.args).map_err(CoreError::ToolBatchingJson)?;
                allowed.push(Some(ParallelCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    args,
                }));
                denials.push(None);
            }
            Err(reason) => {
                allowed.push(None);
                denials.push(Some(reason));
            }
        }
    }

    let batch: Vec<ParallelCall> = allowed.iter().flatten().cloned().collect();
    for (call, slot) in run.iter().zip(&allowed) {
        if slot.is_some() {
            deps.notify("dispatching", Some(&call.name));
            session.react.push(ReActKind::Action, format!("{}({})", call.name, call.args));
            session.tool_calls.start(&call.key);
        }
    }

    let retrying = Arc::new(RetryingExecutor {
        inner: Arc::clone(&deps.executor),
        budget: deps.max_retries,
    });
    let mut results = execute_parallel(
        retrying,
        batch,
        deps.max_parallel,
        session.runtime.cancel.subscribe(),
    )
    .await
    .into_iter();

    // Reassemble in source order: denied slots report their denial, allowed
    // slots consume the next batch result.
    for (call, (slot, denial)) in run.iter().zip(allowed.iter().zip(&denials)) {
        match (slot, denial) {
            (Some(_), _) => {
                let result = results.next().unwrap_or(Err(ToolError::Cancelled));
                record_result(session, call, result, deps);
            }
            (None, Some(reason)) => record_denial(session, call, reason, deps),
            (None, None) => unreachable!("call neither allowed nor denied"),
        }
    }
    Ok(())
}

/// Batched args must be JSON objects before fan-out; a raw string that does
/// not parse is a batching failure (sequential dispatch forwards raw
/// strings to the executor untouched).
fn normalize_batch_args(args: &Value) -> Result<Value, String> {
    match args {
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .map_err(|e| format!("tool args {raw:?} are not valid JSON: {e}")),
        other => Ok(other.clone()),
    }
}

// ─── Inline tool-call extraction ─────────────────────────────────────────────

/// Best-effort extraction of `{"tool": "<name>", "args": {…}}` objects from
/// assistant text, including inside ```json fenced blocks.
pub(crate) fn extract_inline_tool_calls(text: &str) -> Vec<(String, Value)> {
    let mut found = Vec::new();

    let mut scan = |segment: &str| {
        let mut search_from = 0;
        while let Some(rel) = segment[search_from..].find('{') {
            let start = search_from + rel;
            match balanced_json_object(&segment[start..]) {
                Some(end) => {
                    let candidate = &segment[start..start + end];
                    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                        if let (Some(tool), Some(args)) =
                            (value.get("tool").and_then(Value::as_str), value.get("args"))
                        {
                            found.push((tool.to_string(), args.clone()));
                        }
                    }
                    search_from = start + end;
                }
                None => break,
            }
        }
    };

    // Fenced ```json blocks first, then the remaining prose.
    let mut rest = String::new();
    let mut in_json_fence = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if in_json_fence {
            if trimmed == "```" {
                in_json_fence = false;
            } else {
                rest.push_str(line);
                rest.push('\n');
            }
        } else if trimmed == "```json" {
            in_json_fence = true;
        } else {
            rest.push_str(line);
            rest.push('\n');
        }
    }
    scan(&rest);
    found
}

/// Length of the balanced JSON object starting at the first byte of `s`
/// (which must be `{`), honouring strings and escapes.  `None` when the
/// object never closes.
fn balanced_json_object(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn summary_line(output: &str) -> String {
    let first = output.lines().next().unwrap_or("");
    if first.chars().count() > 120 {
        let head: String = first.chars().take(120).collect();
        format!("{head}…")
    } else {
        first.to_string()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── Inline extraction ────────────────────────────────────────────────────

    #[test]
    fn extracts_plain_inline_object() {
        let text = r#"I will read it: {"tool": "read_file", "args": {"path": "a.rs"}}"#;
        let calls = extract_inline_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "read_file");
        assert_eq!(calls[0].1, json!({"path": "a.rs"}));
    }

    #[test]
    fn extracts_nested_braces() {
        let text = r#"{"tool": "grep", "args": {"pattern": "fn {", "opts": {"cs": true}}}"#;
        let calls = extract_inline_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["opts"]["cs"], json!(true));
    }

    #[test]
    fn extracts_from_json_fence() {
        let text = "Here you go:\n```json\n{\"tool\": \"list_dir\", \"args\": {\"path\": \".\"}}\n```\ndone";
        let calls = extract_inline_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "list_dir");
    }

    #[test]
    fn ignores_unrelated_json() {
        let text = r#"config looks like {"a": 1, "b": 2}"#;
        assert!(extract_inline_tool_calls(text).is_empty());
    }

    #[test]
    fn ignores_unclosed_object() {
        let text = r#"broken {"tool": "grep", "args": {"#;
        assert!(extract_inline_tool_calls(text).is_empty());
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_scanner() {
        let text = r#"{"tool": "grep", "args": {"pattern": "}{"}} trailing"#;
        let calls = extract_inline_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["pattern"], json!("}{"));
    }

    #[test]
    fn extracts_multiple_objects() {
        let text = r#"{"tool": "read_file", "args": {"path": "a"}} and {"tool": "read_file", "args": {"path": "b"}}"#;
        assert_eq!(extract_inline_tool_calls(text).len(), 2);
    }

    // ── Batch args normalization ─────────────────────────────────────────────

    #[test]
    fn object_args_pass_through() {
        assert_eq!(normalize_batch_args(&json!({"a": 1})).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn string_args_are_parsed() {
        let raw = Value::String("{\"path\": \"x\"}".into());
        assert_eq!(normalize_batch_args(&raw).unwrap(), json!({"path": "x"}));
    }

    #[test]
    fn garbage_string_args_fail() {
        let raw = Value::String("not json".into());
        assert!(normalize_batch_args(&raw).is_err());
    }
}
