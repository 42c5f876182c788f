// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
mod detect;
mod error;
mod fallback;
mod orchestrator;
mod parallel;
mod processor;
mod resume;
mod sanitize;
mod session;

pub use detect::{announces_without_acting, looks_truncated, strip_task_complete};
pub use error::CoreError;
pub use fallback::synthesize_fallback;
pub use orchestrator::{Orchestrator, TurnResult};
pub use parallel::{execute_parallel, ParallelCall};
pub use processor::{process_node, NodeReport, ProcessorDeps};
pub use resume::{filter_compacted, prune_old_tool_outputs, ResumePipeline, SUMMARY_MARKER};
pub use sanitize::{
    clear_run_ids, cleanup_after_interruption, collapse_consecutive_user_messages,
    remove_dangling_tool_calls, remove_empty_assistant_messages, retry_protected_ids,
    sanitize_history_for_resume, strip_system_messages, RETRY_MARKER,
};
pub use session::{
    CancelSignal, ReActEntry, ReActKind, ReActScratchpad, RuntimeState, Session, TodoItem,
    TodoStatus, ToolCallRecord, ToolCallRegistry, ToolCallStatus,
};
