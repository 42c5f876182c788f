// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
//! Fallback response synthesis.
//!
//! When the iteration bound is reached without a completion signal, the
//! orchestrator cannot ask the model for a wrap-up — the budget is spent.
//! Instead a deterministic summary is assembled from the session's own
//! records: files read, commands run, todo state, and concrete next steps.

use serde_json::Value;

use tunacode_config::FallbackVerbosity;

use crate::session::{Session, TodoStatus, ToolCallStatus};

/// Build the fallback assistant text for a turn that hit the iteration
/// bound (or another non-completing exit named by `reason`).
pub fn synthesize_fallback(
    session: &Session,
    reason: &str,
    verbosity: FallbackVerbosity,
) -> String {
    let files = files_read(session);
    let commands = commands_run(session);
    let open_todos: Vec<&str> = session
        .todos
        .iter()
        .filter(|t| matches!(t.status, TodoStatus::Pending | TodoStatus::InProgress))
        .map(|t| t.content.as_str())
        .collect();
    let done_todos = session
        .todos
        .iter()
        .filter(|t| t.status == TodoStatus::Completed)
        .count();
    let failed_calls = session
        .tool_calls
        .iter()
        .filter(|r| r.status == ToolCallStatus::Failed)
        .count();

    let mut out = format!("The turn ended before the task completed ({reason}).");

    if verbosity == FallbackVerbosity::Minimal {
        if !open_todos.is_empty() {
            out.push_str(&format!(" {} todo item(s) remain open.", open_todos.len()));
        }
        return out;
    }

    out.push_str("\n\nProgress so far:");
    if files.is_empty() && commands.is_empty() && session.todos.is_empty() {
        out.push_str("\n- No tool activity was recorded this turn.");
    }
    if !files.is_empty() {
        out.push_str(&format!("\n- Files read: {}", files.join(", ")));
    }
    if !commands.is_empty() {
        out.push_str(&format!("\n- Commands run: {}", commands.join("; ")));
    }
    if done_todos > 0 {
        out.push_str(&format!("\n- Todos completed: {done_todos}"));
    }
    if failed_calls > 0 {
        out.push_str(&format!("\n- Tool calls that failed: {failed_calls}"));
    }

    out.push_str("\n\nNext steps:");
    if open_todos.is_empty() {
        out.push_str("\n- Re-run with a narrower request, or raise max_iterations.");
    } else {
        for todo in &open_todos {
            out.push_str(&format!("\n- {todo}"));
        }
    }

    if verbosity == FallbackVerbosity::Detailed {
        out.push_str("\n\nTool call log:");
        for rec in session.tool_calls.iter() {
            out.push_str(&format!("\n- {} [{:?}] {}", rec.name, rec.status, rec.args));
        }
    }
    out
}

/// Paths passed to `read_file` this turn, deduplicated, in call order.
fn files_read(session: &Session) -> Vec<String> {
    let mut seen = Vec::new();
    for rec in session.tool_calls.iter().filter(|r| r.name == "read_file") {
        if let Some(path) = path_arg(&rec.args) {
            if !seen.contains(&path) {
                seen.push(path);
            }
        }
    }
    seen
}

fn path_arg(args: &Value) -> Option<String> {
    for key in ["path", "file_path", "filepath"] {
        if let Some(p) = args.get(key).and_then(Value::as_str) {
            return Some(p.to_string());
        }
    }
    None
}

/// Command strings passed to the execute tools this turn.
fn commands_run(session: &Session) -> Vec<String> {
    session
        .tool_calls
        .iter()
        .filter(|r| r.name == "bash" || r.name == "run_command")
        .filter_map(|r| {
            r.args
                .get("command")
                .or_else(|| r.args.get("cmd"))
                .and_then(Value::as_str)
                .map(String::from)
        })
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, TodoItem};
    use serde_json::json;
    use std::sync::Arc;
    use tunacode_config::Settings;

    fn session_with_activity() -> Session {
        let mut s = Session::new(Arc::new(Settings::default()));
        let k1 = s.tool_calls.register("c1", "read_file", json!({"path": "src/main.rs"}));
        s.tool_calls.complete(&k1, "…");
        let k2 = s.tool_calls.register("c2", "bash", json!({"command": "cargo check"}));
        s.tool_calls.complete(&k2, "ok");
        let k3 = s.tool_calls.register("c3", "grep", json!({"pattern": "x"}));
        s.tool_calls.fail(&k3, "bad pattern");
        s.todos.push(TodoItem {
            id: "t1".into(),
            content: "wire up the parser".into(),
            status: crate::session::TodoStatus::Pending,
            priority: 1,
            created_at: chrono::Utc::now(),
        });
        s
    }

    #[test]
    fn normal_lists_files_commands_and_todos() {
        let s = session_with_activity();
        let text = synthesize_fallback(&s, "max iterations reached", FallbackVerbosity::Normal);
        assert!(text.contains("src/main.rs"));
        assert!(text.contains("cargo check"));
        assert!(text.contains("wire up the parser"));
        assert!(text.contains("failed: 1"));
    }

    #[test]
    fn minimal_is_one_line() {
        let s = session_with_activity();
        let text = synthesize_fallback(&s, "max iterations reached", FallbackVerbosity::Minimal);
        assert!(!text.contains('\n'));
        assert!(text.contains("1 todo item(s)"));
    }

    #[test]
    fn detailed_includes_tool_log() {
        let s = session_with_activity();
        let text = synthesize_fallback(&s, "max iterations reached", FallbackVerbosity::Detailed);
        assert!(text.contains("Tool call log:"));
        assert!(text.contains("grep"));
    }

    #[test]
    fn empty_session_still_produces_guidance() {
        let s = Session::new(Arc::new(Settings::default()));
        let text = synthesize_fallback(&s, "max iterations reached", FallbackVerbosity::Normal);
        assert!(text.contains("No tool activity"));
        assert!(text.contains("Next steps:"));
    }

    #[test]
    fn duplicate_file_reads_are_deduplicated() {
        let mut s = Session::new(Arc::new(Settings::default()));
        s.tool_calls.register("a", "read_file", json!({"path": "x.rs"}));
        s.tool_calls.register("b", "read_file", json!({"path": "x.rs"}));
        assert_eq!(files_read(&s), vec!["x.rs"]);
    }

    #[test]
    fn alternate_path_keys_are_recognized() {
        let mut s = Session::new(Arc::new(Settings::default()));
        s.tool_calls.register("a", "read_file", json!({"file_path": "y.rs"}));
        assert_eq!(files_read(&s), vec!["y.rs"]);
    }
}
