// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
//! Tri-state tool authorization.
//!
//! Rules are pure functions over [`AuthContext`], ordered by priority.
//! The first rule returning `Some` wins; the priority-0 default always
//! answers `Confirm`, so [`AuthorizationEngine::decide`] is total.

use serde_json::Value;

use crate::catalog::ToolCatalog;

/// The tri-state authorization decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationResult {
    Allow,
    Confirm,
    Deny(String),
}

/// Everything a rule may look at.  Built per tool call by the node
/// processor from session flags and the catalog.
pub struct AuthContext<'a> {
    pub tool_name: &'a str,
    pub tool_args: &'a Value,
    pub session_yolo: bool,
    pub session_plan_mode: bool,
    pub catalog: &'a ToolCatalog,
}

/// A single authorization rule.  Higher priority evaluates first.
pub trait AuthRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn priority(&self) -> u8;
    fn evaluate(&self, ctx: &AuthContext<'_>) -> Option<AuthorizationResult>;
}

// ─── Built-in rules ───────────────────────────────────────────────────────────

struct PlanModeBlock;
impl AuthRule for PlanModeBlock {
    fn name(&self) -> &'static str {
        "plan-mode-block"
    }
    fn priority(&self) -> u8 {
        100
    }
    fn evaluate(&self, ctx: &AuthContext<'_>) -> Option<AuthorizationResult> {
        if ctx.session_plan_mode && ctx.catalog.is_mutating(ctx.tool_name) {
            return Some(AuthorizationResult::Deny(
                "plan mode blocks modifying or executing tools".into(),
            ));
        }
        None
    }
}

struct ToolDenyList;
impl AuthRule for ToolDenyList {
    fn name(&self) -> &'static str {
        "tool-deny-list"
    }
    fn priority(&self) -> u8 {
        80
    }
    fn evaluate(&self, ctx: &AuthContext<'_>) -> Option<AuthorizationResult> {
        if ctx.catalog.denied.contains(ctx.tool_name) {
            return Some(AuthorizationResult::Deny("tool denied by configuration".into()));
        }
        None
    }
}

struct Yolo;
impl AuthRule for Yolo {
    fn name(&self) -> &'static str {
        "yolo"
    }
    fn priority(&self) -> u8 {
        60
    }
    fn evaluate(&self, ctx: &AuthContext<'_>) -> Option<AuthorizationResult> {
        ctx.session_yolo.then_some(AuthorizationResult::Allow)
    }
}

struct ReadOnlyAutoAllow;
impl AuthRule for ReadOnlyAutoAllow {
    fn name(&self) -> &'static str {
        "read-only-auto-allow"
    }
    fn priority(&self) -> u8 {
        50
    }
    fn evaluate(&self, ctx: &AuthContext<'_>) -> Option<AuthorizationResult> {
        ctx.catalog
            .is_read_only(ctx.tool_name)
            .then_some(AuthorizationResult::Allow)
    }
}

struct TemplateAllow;
impl AuthRule for TemplateAllow {
    fn name(&self) -> &'static str {
        "template-allow"
    }
    fn priority(&self) -> u8 {
        40
    }
    fn evaluate(&self, ctx: &AuthContext<'_>) -> Option<AuthorizationResult> {
        ctx.catalog
            .template_allow
            .contains(ctx.tool_name)
            .then_some(AuthorizationResult::Allow)
    }
}

struct IgnoreList;
impl AuthRule for IgnoreList {
    fn name(&self) -> &'static str {
        "ignore-list"
    }
    fn priority(&self) -> u8 {
        30
    }
    fn evaluate(&self, ctx: &AuthContext<'_>) -> Option<AuthorizationResult> {
        ctx.catalog
            .ignored
            .contains(ctx.tool_name)
            .then_some(AuthorizationResult::Allow)
    }
}

struct DefaultConfirm;
impl AuthRule for DefaultConfirm {
    fn name(&self) -> &'static str {
        "default-confirm"
    }
    fn priority(&self) -> u8 {
        0
    }
    fn evaluate(&self, _ctx: &AuthContext<'_>) -> Option<AuthorizationResult> {
        Some(AuthorizationResult::Confirm)
    }
}

// ─── Engine ───────────────────────────────────────────────────────────────────

/// Priority-ordered rule engine.  Custom rules can be pushed at any
/// priority; ties between rules are broken by insertion order (earlier
/// wins), matching a stable sort.
pub struct AuthorizationEngine {
    rules: Vec<Box<dyn AuthRule>>,
}

impl AuthorizationEngine {
    pub fn new() -> Self {
        let mut engine = Self { rules: Vec::new() };
        engine.push_rule(Box::new(PlanModeBlock));
        engine.push_rule(Box::new(ToolDenyList));
        engine.push_rule(Box::new(Yolo));
        engine.push_rule(Box::new(ReadOnlyAutoAllow));
        engine.push_rule(Box::new(TemplateAllow));
        engine.push_rule(Box::new(IgnoreList));
        engine.push_rule(Box::new(DefaultConfirm));
        engine
    }

    pub fn push_rule(&mut self, rule: Box<dyn AuthRule>) {
        self.rules.push(rule);
        self.rules.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    pub fn decide(&self, ctx: &AuthContext<'_>) -> AuthorizationResult {
        for rule in &self.rules {
            if let Some(result) = rule.evaluate(ctx) {
                return result;
            }
        }
        // Unreachable while DefaultConfirm is registered; kept total anyway.
        AuthorizationResult::Confirm
    }
}

impl Default for AuthorizationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
