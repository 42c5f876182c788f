// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! The per-turn request orchestrator.
//!
//! Owns the iteration loop against the agent stream: global timeout,
//! iteration bound, empty-response recovery, truncation and
//! intention-without-action nudges, task-completion detection, and the
//! guarantee that every exceptional exit leaves the session history valid
//! for the next turn.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use tunacode_config::Settings;
use tunacode_model::{AgentStreamError, LLMAgent, Message, UsageMetrics};
use tunacode_tools::{AuthorizationEngine, ConfirmationUi, ToolCatalog, ToolExecutor,
    ToolStatusCallback};

use crate::detect::{announces_without_acting, looks_truncated, strip_task_complete};
use crate::error::CoreError;
use crate::fallback::synthesize_fallback;
use crate::processor::{process_node, ProcessorDeps};
use crate::resume::ResumePipeline;
use crate::sanitize::cleanup_after_interruption;
use crate::session::Session;

/// Outcome of one user turn.  `run_turn` always returns one of these; raw
/// errors never cross the orchestrator boundary.
#[derive(Debug)]
pub enum TurnResult {
    Completed { final_text: String, usage_delta: UsageMetrics },
    FallbackSynthesized { text: String, reason: String },
    Cancelled,
    TimedOut,
}

enum Inner {
    Completed(String),
    Fallback { text: String, reason: String },
}

/// Drives the agent ↔ tool loop for a session.
///
/// Construction requires a resolved agent, so agent-init failures surface
/// before any session mutation.
pub struct Orchestrator {
    agent: Arc<dyn LLMAgent>,
    executor: Arc<dyn ToolExecutor>,
    auth: AuthorizationEngine,
    catalog: ToolCatalog,
    confirm: Arc<dyn ConfirmationUi>,
    status: Option<Arc<dyn ToolStatusCallback>>,
    settings: Arc<Settings>,
    pipeline: ResumePipeline,
}

impl Orchestrator {
    pub fn new(
        agent: Arc<dyn LLMAgent>,
        executor: Arc<dyn ToolExecutor>,
        confirm: Arc<dyn ConfirmationUi>,
        settings: Arc<Settings>,
    ) -> Self {
        let catalog = ToolCatalog::with_lists(
            settings.denied_tools.iter().cloned(),
            settings.template_allow_list.iter().cloned(),
            settings.tool_ignore_list.iter().cloned(),
        );
        let pipeline = ResumePipeline::with_threshold(settings.summary_threshold);
        Self {
            agent,
            executor,
            auth: AuthorizationEngine::new(),
            catalog,
            confirm,
            status: None,
            settings,
            pipeline,
        }
    }

    pub fn with_status(mut self, status: Arc<dyn ToolStatusCallback>) -> Self {
        self.status = Some(status);
        self
    }

    /// Replace the token estimator used by the resume pipeline.
    pub fn with_token_estimator(
        mut self,
        estimate: fn(&[Message]) -> usize,
    ) -> Self {
        self.pipeline.estimate_tokens = estimate;
        self
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Run one user turn to completion.
    ///
    /// Appends at least the user message and one assistant message; the
    /// dangling-tool invariant holds on return regardless of outcome.
    pub async fn run_turn(&self, session: &mut Session, user_text: &str) -> TurnResult {
        if session.runtime.operation_cancelled() {
            // Cancelled before the turn even started; leave history untouched.
            return TurnResult::Cancelled;
        }

        let usage_before = session.usage;
        session.react.clear();
        session.runtime.current_iteration = 0;
        session.runtime.run_id = Uuid::new_v4().to_string();
        session.push(Message::user(user_text).with_run_id(session.runtime.run_id.clone()));

        // Opportunistic rolling summary before the first model call.
        if self.pipeline.needs_summary(&session.messages) {
            if let Some(rebuilt) = self.pipeline.summarize(&self.agent, &session.messages).await {
                session.messages = rebuilt;
            }
        }

        // The timeout is re-read per turn; mid-turn config changes never apply.
        let timeout_secs = self.settings.global_request_timeout;
        let result = if timeout_secs > 0.0 {
            match tokio::time::timeout(
                Duration::from_secs_f64(timeout_secs),
                self.run_impl(session),
            )
            .await
            {
                Ok(inner) => inner,
                Err(_) => Err(CoreError::GlobalRequestTimeout { seconds: timeout_secs }),
            }
        } else {
            self.run_impl(session).await
        };

        session.runtime.is_streaming_active = false;
        session.runtime.current_iteration = 0;

        match result {
            Ok(Inner::Completed(final_text)) => TurnResult::Completed {
                final_text,
                usage_delta: session.usage.delta_since(&usage_before),
            },
            Ok(Inner::Fallback { text, reason }) => {
                TurnResult::FallbackSynthesized { text, reason }
            }
            Err(e) => self.recover(session, e),
        }
    }

    /// Convert an exceptional exit into a turn result: cancel open tool
    /// calls, repair the history, and append a user-visible explanation.
    fn recover(&self, session: &mut Session, error: CoreError) -> TurnResult {
        let cancelled_keys = session.tool_calls.cancel_open();
        let cancelled_ids: Vec<String> = cancelled_keys
            .iter()
            .filter_map(|k| session.tool_calls.get(k).map(|r| r.id.clone()))
            .collect();
        for id in cancelled_ids {
            session.push(Message::tool_return(id, "cancelled", true));
        }
        cleanup_after_interruption(&mut session.messages);

        match error {
            CoreError::UserAbort => {
                session.push(Message::assistant(
                    "The operation was cancelled before it finished.",
                ));
                // The cancellation is consumed by this turn; the next turn
                // starts clean.
                session.runtime.cancel.reset();
                TurnResult::Cancelled
            }
            CoreError::GlobalRequestTimeout { seconds } => {
                session.push(Message::assistant(format!(
                    "Request exceeded the {seconds} s time limit."
                )));
                TurnResult::TimedOut
            }
            CoreError::ToolBatchingJson(detail) => {
                warn!("tool batching failed: {detail}");
                let text = synthesize_fallback(
                    session,
                    "tool-call batching failed",
                    self.settings.fallback_verbosity,
                );
                session.push(Message::assistant(text.clone()));
                TurnResult::FallbackSynthesized { text, reason: "tool-call batching failed".into() }
            }
            other => {
                warn!("turn failed: {other}");
                let text = format!(
                    "The model request failed and the turn was ended early. \
                     You can retry the request. ({other})"
                );
                session.push(Message::assistant(text.clone()));
                TurnResult::FallbackSynthesized { text, reason: "model request failed".into() }
            }
        }
    }

    async fn run_impl(&self, session: &mut Session) -> Result<Inner, CoreError> {
        let max_iterations = self.settings.max_iterations;
        let mut iterations = 0u32;
        let mut consecutive_empty = 0u32;
        let mut empties_exhausted = false;

        while iterations < max_iterations {
            iterations += 1;
            session.runtime.current_iteration = iterations;
            session.runtime.iteration_count += 1;

            // Sanitize/prune a fresh copy before every model call.
            let history = self.pipeline.prepare(&session.messages);

            session.runtime.is_streaming_active = true;
            let mut stream = self
                .agent
                .iter_stream(history)
                .await
                .map_err(map_stream_error)?;

            let mut text = String::new();
            let mut had_tool_calls = false;
            let mut had_thought = false;
            while let Some(item) = stream.next().await {
                let node = item.map_err(map_stream_error)?;
                let report = process_node(session, node, &self.deps()).await?;
                if !report.text.is_empty() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&report.text);
                }
                had_tool_calls |= report.had_tool_calls;
                had_thought |= report.had_thought;

                if session.runtime.operation_cancelled() {
                    return Err(CoreError::UserAbort);
                }

                // Completion is checked per node: the marker only counts at
                // the start of an assistant text part, so a later node can
                // complete the turn even after earlier narration nodes.
                if let Some(final_text) = strip_task_complete(&report.text) {
                    if report.had_tool_calls {
                        // Premature completion: the model declared the task
                        // done while requesting tools in the same node.
                        debug!("ignoring completion marker emitted alongside tool calls");
                    } else {
                        return Ok(Inner::Completed(final_text));
                    }
                }
            }
            session.runtime.is_streaming_active = false;

            if !had_tool_calls && !had_thought && text.trim().is_empty() {
                consecutive_empty += 1;
                if consecutive_empty >= 3 {
                    empties_exhausted = true;
                    break;
                }
                // Recovery attempts do not consume an iteration slot.
                iterations -= 1;
                session.push(Message::user(empty_response_fixup(session)));
                continue;
            }
            consecutive_empty = 0;

            // Truncation is checked regardless of tool calls; only the
            // intention nudge requires a tool-call-free iteration.
            if looks_truncated(&text) {
                session.push(Message::user(
                    "Your previous response was cut off; complete it and continue.",
                ));
                continue;
            }
            if !had_tool_calls && announces_without_acting(&text) {
                session.push(Message::user(
                    "Execute the tool you described rather than announcing it.",
                ));
                continue;
            }
        }

        let reason = if empties_exhausted {
            "three consecutive empty responses".to_string()
        } else {
            format!("maximum iterations ({max_iterations}) reached")
        };
        let text = if self.settings.fallback_response {
            synthesize_fallback(session, &reason, self.settings.fallback_verbosity)
        } else {
            format!("The turn ended before the task completed ({reason}).")
        };
        session.push(Message::assistant(text.clone()));
        Ok(Inner::Fallback { text, reason })
    }

    fn deps(&self) -> ProcessorDeps<'_> {
        ProcessorDeps {
            executor: Arc::clone(&self.executor),
            auth: &self.auth,
            catalog: &self.catalog,
            confirm: self.confirm.as_ref(),
            status: self.status.as_deref(),
            max_retries: self.settings.max_retries,
            max_parallel: self.settings.effective_max_parallel(),
        }
    }
}

fn map_stream_error(e: AgentStreamError) -> CoreError {
    match e {
        // Cooperative cancellation and user aborts clean up identically.
        AgentStreamError::UserAbort | AgentStreamError::Cancelled => CoreError::UserAbort,
        AgentStreamError::Transport(msg) => CoreError::Stream(msg),
    }
}

/// Synthetic user message injected after an empty iteration.
fn empty_response_fixup(session: &Session) -> String {
    let names: Vec<String> = session.tool_calls.iter().map(|r| r.name.clone()).collect();
    let tail = &names[names.len().saturating_sub(5)..];
    let prior = if tail.is_empty() { "none".to_string() } else { tail.join(", ") };
    format!(
        "FAILURE: empty response. Execute a tool or produce substantive output. \
         Prior tools: {prior}"
    )
}
