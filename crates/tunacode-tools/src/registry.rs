// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{Tool, ToolError, ToolExecutor};

/// In-process tool executor: dispatches by name to registered [`Tool`]s.
///
/// The concrete workspace tools (file I/O, shell, grep) live outside this
/// crate; embedders register them at startup.  Unknown names produce a
/// domain error so the model observes the refusal and can correct itself.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn invoke(&self, name: &str, args: &Value) -> Result<String, ToolError> {
        match self.tools.get(name) {
            Some(tool) => tool.invoke(args).await,
            None => Err(ToolError::Domain(format!("unknown tool: {name}"))),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
