// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::{LLMAgent, MockAgent};

/// Agent construction failure.  Propagated to the caller before any session
/// state is touched.
#[derive(Debug, Error)]
pub enum AgentInitError {
    #[error("model spec must be \"provider:model\", got {0:?}")]
    MalformedSpec(String),
    #[error("unknown provider {0:?}; register a transport for it first")]
    UnknownProvider(String),
    #[error("provider {provider:?} failed to initialise: {reason}")]
    ProviderFailed { provider: String, reason: String },
}

type AgentFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn LLMAgent>, AgentInitError> + Send + Sync>;

/// Maps provider names to agent factories.
///
/// The `mock` provider is built in so the headless CLI and the test suite
/// run without a network transport.  Real transports (HTTP drivers for
/// hosted providers) are external collaborators; embedders register them
/// here at startup.
pub struct AgentRegistry {
    factories: HashMap<String, AgentFactory>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        let mut reg = Self { factories: HashMap::new() };
        reg.register("mock", |model| {
            Ok(Arc::new(MockAgent::new(format!("mock:{model}"))) as Arc<dyn LLMAgent>)
        });
        reg
    }

    pub fn register<F>(&mut self, provider: impl Into<String>, factory: F)
    where
        F: Fn(&str) -> Result<Arc<dyn LLMAgent>, AgentInitError> + Send + Sync + 'static,
    {
        self.factories.insert(provider.into(), Arc::new(factory));
    }

    /// Resolve a `provider:model` spec into an agent.
    pub fn resolve(&self, spec: &str) -> Result<Arc<dyn LLMAgent>, AgentInitError> {
        let (provider, model) = spec
            .split_once(':')
            .ok_or_else(|| AgentInitError::MalformedSpec(spec.to_string()))?;
        if provider.is_empty() || model.is_empty() {
            return Err(AgentInitError::MalformedSpec(spec.to_string()));
        }
        let factory = self
            .factories
            .get(provider)
            .ok_or_else(|| AgentInitError::UnknownProvider(provider.to_string()))?;
        factory(model)
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve `spec` against the default registry (built-in providers only).
pub fn resolve_agent(spec: &str) -> Result<Arc<dyn LLMAgent>, AgentInitError> {
    AgentRegistry::new().resolve(spec)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
