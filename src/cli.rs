// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// TunaCode — agent orchestration core for a terminal AI coding assistant.
#[derive(Parser, Debug)]
#[command(name = "tunacode", version, about)]
pub struct Cli {
    /// Explicit config file, merged over the discovered layers.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging to stderr (RUST_LOG overrides).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one prompt headlessly and print the result.
    ///
    /// Exit codes: 0 completed or fallback, 124 timed out, 130 cancelled,
    /// 1 invalid configuration, 2 agent initialisation failure.
    Run {
        /// The user prompt for this turn.
        prompt: String,

        /// Auto-allow every tool call (sets yolo for this invocation).
        #[arg(long)]
        auto_approve: bool,

        /// Serialize the turn result and message delta as JSON on stdout.
        #[arg(long)]
        output_json: bool,

        /// Override the per-turn timeout in seconds (0 disables).
        #[arg(long)]
        timeout: Option<f64>,

        /// Working directory for the turn.
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Model override in `provider:model` form.
        #[arg(long)]
        model: Option<String>,
    },

    /// Set the default model and persist it to the user config file.
    Model {
        /// Model spec in `provider:model` form.
        spec: String,
    },

    /// Print the effective merged configuration and exit.
    ShowConfig,
}
