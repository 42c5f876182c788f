// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
use std::collections::HashSet;

/// Behavioural category of a tool, derived from the catalog sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    /// Does not mutate the workspace or external state; safe to batch in
    /// parallel.
    ReadOnly,
    /// Mutates files.
    Write,
    /// Invokes shells or runs code.
    Execute,
    /// Not present in any set; treated like a write for safety.
    Unknown,
}

/// Data table describing the known tools and the configured allow/deny
/// lists.  The authorization engine and the node processor consult it; both
/// the sets and the rule list are extensible without touching the engine.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    pub read_only: HashSet<String>,
    pub write: HashSet<String>,
    pub execute: HashSet<String>,
    /// Rule priority 80: refused outright, even under yolo.
    pub denied: HashSet<String>,
    /// Rule priority 40: granted by the active session template.
    pub template_allow: HashSet<String>,
    /// Rule priority 30: user-configured confirmation skip list.
    pub ignored: HashSet<String>,
}

fn set(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self {
            // present_plan requires plan mode to be active; it is categorized
            // read-only so the plan-mode block (which covers write/execute
            // only) never locks the agent out of presenting its plan.
            read_only: set(&[
                "read_file",
                "grep",
                "list_dir",
                "glob",
                "research_codebase",
                "present_plan",
                "todoread",
            ]),
            write: set(&["write_file", "update_file", "todowrite", "todoclear"]),
            execute: set(&["bash", "run_command"]),
            denied: HashSet::new(),
            template_allow: HashSet::new(),
            ignored: HashSet::new(),
        }
    }
}

impl ToolCatalog {
    /// Build a catalog from the configured name lists, keeping the built-in
    /// category sets.
    pub fn with_lists(
        denied: impl IntoIterator<Item = String>,
        template_allow: impl IntoIterator<Item = String>,
        ignored: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            denied: denied.into_iter().collect(),
            template_allow: template_allow.into_iter().collect(),
            ignored: ignored.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn category(&self, tool: &str) -> ToolCategory {
        if self.read_only.contains(tool) {
            ToolCategory::ReadOnly
        } else if self.write.contains(tool) {
            ToolCategory::Write
        } else if self.execute.contains(tool) {
            ToolCategory::Execute
        } else {
            ToolCategory::Unknown
        }
    }

    pub fn is_read_only(&self, tool: &str) -> bool {
        self.category(tool) == ToolCategory::ReadOnly
    }

    /// True for tools the plan-mode rule blocks: write or execute.
    /// Uncategorized tools are not blocked; they fall through to the default
    /// confirm rule instead.
    pub fn is_mutating(&self, tool: &str) -> bool {
        matches!(self.category(tool), ToolCategory::Write | ToolCategory::Execute)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_sets_are_disjoint() {
        let c = ToolCatalog::default();
        for t in &c.read_only {
            assert!(!c.write.contains(t) && !c.execute.contains(t), "{t} in two sets");
        }
        for t in &c.write {
            assert!(!c.execute.contains(t), "{t} in two sets");
        }
    }

    #[test]
    fn read_file_is_read_only() {
        assert!(ToolCatalog::default().is_read_only("read_file"));
    }

    #[test]
    fn present_plan_is_read_only() {
        assert!(ToolCatalog::default().is_read_only("present_plan"));
    }

    #[test]
    fn write_file_is_mutating() {
        assert!(ToolCatalog::default().is_mutating("write_file"));
    }

    #[test]
    fn bash_is_execute() {
        assert_eq!(ToolCatalog::default().category("bash"), ToolCategory::Execute);
    }

    #[test]
    fn unknown_tool_is_not_mutating() {
        let c = ToolCatalog::default();
        assert_eq!(c.category("mystery"), ToolCategory::Unknown);
        assert!(!c.is_mutating("mystery"));
    }

    #[test]
    fn with_lists_populates_config_sets() {
        let c = ToolCatalog::with_lists(
            vec!["bash".into()],
            vec!["grep".into()],
            vec!["todoread".into()],
        );
        assert!(c.denied.contains("bash"));
        assert!(c.template_allow.contains("grep"));
        assert!(c.ignored.contains("todoread"));
        // Built-in categories are preserved.
        assert!(c.is_read_only("read_file"));
    }
}
