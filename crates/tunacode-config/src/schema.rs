// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation failure.
///
/// Raised at load time, before any session or orchestrator exists, so the
/// turn loop never observes an invalid value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("settings.max_iterations must be in 1..=200, got {0}")]
    MaxIterationsOutOfRange(u32),
    #[error("settings.global_request_timeout must be >= 0, got {0}")]
    NegativeTimeout(f64),
    #[error("settings.max_parallel must be >= 1, got 0")]
    ZeroMaxParallel,
    #[error("settings.default_model must be \"provider:model\", got {0:?}")]
    MalformedModelSpec(String),
    #[error("config file error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    Parse(String),
}

/// Verbosity of the synthesized fallback response produced when the
/// iteration bound is reached without task completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackVerbosity {
    Minimal,
    #[default]
    Normal,
    Detailed,
}

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `false`, so fields
/// that should be enabled unless explicitly disabled need a named function.
fn default_true() -> bool {
    true
}

fn default_max_iterations() -> u32 {
    40
}

fn default_max_retries() -> u32 {
    3
}

fn default_global_request_timeout() -> f64 {
    90.0
}

fn default_max_parallel() -> u32 {
    (num_cpus::get() as u32).min(8).max(1)
}

fn default_summary_threshold() -> usize {
    120_000
}

fn default_model() -> String {
    "mock:dev".to_string()
}

/// Core settings consumed by the orchestrator, node processor, and
/// authorization engine.
///
/// All values are validated by [`Settings::validate`] during [`crate::load`];
/// the orchestrator never sees an invalid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Maximum number of agent iterations per user turn before a fallback
    /// response is synthesized.  Valid range 1–200.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Per-tool retry budget for transport-level failures.  Tool-domain
    /// errors (non-zero exit, file not found) are never retried; they are
    /// surfaced to the model as error tool returns.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-turn wall-clock timeout in seconds.  `0.0` disables the timeout
    /// entirely; cancellation still works without it.
    #[serde(default = "default_global_request_timeout")]
    pub global_request_timeout: f64,

    /// Concurrency bound for parallel read-only tool batches.
    /// Overridable at runtime with the `TUNACODE_MAX_PARALLEL` environment
    /// variable (see [`Settings::effective_max_parallel`]).
    #[serde(default = "default_max_parallel")]
    pub max_parallel: u32,

    /// Synthesize a progress summary when the iteration bound is reached.
    /// When disabled the turn ends with a one-line notice instead.
    #[serde(default = "default_true")]
    pub fallback_response: bool,

    /// Size of the synthesized fallback response.
    #[serde(default)]
    pub fallback_verbosity: FallbackVerbosity,

    /// Estimated token count at which the rolling-summary checkpoint is
    /// generated before the next model call.
    #[serde(default = "default_summary_threshold")]
    pub summary_threshold: usize,

    /// Tools allowed without confirmation (authorization rule priority 30).
    #[serde(default)]
    pub tool_ignore_list: Vec<String>,

    /// Tools granted by the active session template (rule priority 40).
    #[serde(default)]
    pub template_allow_list: Vec<String>,

    /// Tools refused outright (rule priority 80; beats yolo).
    #[serde(default)]
    pub denied_tools: Vec<String>,

    /// Auto-allow every tool without prompting (rule priority 60).
    #[serde(default)]
    pub yolo: bool,

    /// Block write and execute tools; the agent must present a plan instead
    /// (rule priority 100).
    #[serde(default)]
    pub plan_mode: bool,

    /// Model selector in `provider:model` form.  Changed via the `model`
    /// subcommand, which persists the new value to the user config file.
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_retries: default_max_retries(),
            global_request_timeout: default_global_request_timeout(),
            max_parallel: default_max_parallel(),
            fallback_response: true,
            fallback_verbosity: FallbackVerbosity::default(),
            summary_threshold: default_summary_threshold(),
            tool_ignore_list: Vec::new(),
            template_allow_list: Vec::new(),
            denied_tools: Vec::new(),
            yolo: false,
            plan_mode: false,
            default_model: default_model(),
        }
    }
}

impl Settings {
    /// Validate every field range.  Called by the loader; callers that build
    /// `Settings` programmatically (tests, embedders) should call it too.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 || self.max_iterations > 200 {
            return Err(ConfigError::MaxIterationsOutOfRange(self.max_iterations));
        }
        if self.global_request_timeout < 0.0 || !self.global_request_timeout.is_finite() {
            return Err(ConfigError::NegativeTimeout(self.global_request_timeout));
        }
        if self.max_parallel == 0 {
            return Err(ConfigError::ZeroMaxParallel);
        }
        if !self.default_model.contains(':') {
            return Err(ConfigError::MalformedModelSpec(self.default_model.clone()));
        }
        Ok(())
    }

    /// The parallel-batch concurrency bound, honouring the
    /// `TUNACODE_MAX_PARALLEL` environment override when it parses as a
    /// positive integer.
    pub fn effective_max_parallel(&self) -> usize {
        if let Ok(raw) = std::env::var("TUNACODE_MAX_PARALLEL") {
            if let Ok(n) = raw.trim().parse::<usize>() {
                if n > 0 {
                    return n;
                }
            }
        }
        self.max_parallel as usize
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
