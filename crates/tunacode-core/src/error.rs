// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Errors raised inside a turn.
///
/// None of these escape [`crate::Orchestrator::run_turn`]: every variant is
/// converted into a [`crate::TurnResult`] plus a user-visible assistant
/// message after sanitizer cleanup.  Agent-construction and configuration
/// failures are separate kinds (`AgentInitError`, `ConfigError`) raised
/// before any session exists; they never pass through here.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("operation cancelled by user")]
    UserAbort,

    #[error("request exceeded the {seconds} s time limit")]
    GlobalRequestTimeout { seconds: f64 },

    #[error("could not assemble batched tool-call arguments: {0}")]
    ToolBatchingJson(String),

    #[error("model stream failed: {0}")]
    Stream(String),
}
