// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Tool invocation failure.
///
/// The transport/domain split drives retry policy: transport failures are
/// retried up to the configured budget, domain failures (non-zero exit,
/// file not found) are surfaced to the model unretried so it can decide.
/// The `Display` text is what the model sees — no stack traces.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("tool transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Domain(String),
    #[error("cancelled")]
    Cancelled,
}

impl ToolError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ToolError::Transport(_))
    }
}

/// Single-tool dispatch capability consumed by the node processor.
///
/// `args` may be a JSON object or a raw string — some models emit
/// unstructured tool arguments — and implementations are responsible for
/// parsing.  Must be re-entrant: the parallel executor invokes it from
/// several tasks at once.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn invoke(&self, name: &str, args: &Value) -> Result<String, ToolError>;
}

/// A single registered tool, for in-process executors.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    async fn invoke(&self, args: &Value) -> Result<String, ToolError>;
}

/// Resolution of a `Confirm` authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowOrDeny {
    Allow,
    Deny,
}

/// UI capability invoked only on `Confirm` authorization results.
/// Implementations must not block indefinitely; a headless UI answers
/// without prompting.
#[async_trait]
pub trait ConfirmationUi: Send + Sync {
    async fn ask(&self, tool_name: &str, args: &Value) -> AllowOrDeny;
}

/// Optional status sink called at dispatch/auth-wait/completion/failure
/// transitions.  Rendering is the UI's concern.
pub trait ToolStatusCallback: Send + Sync {
    fn notify(&self, message: &str, tool_name: Option<&str>);
}
