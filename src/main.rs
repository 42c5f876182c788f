// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use tunacode_config::{save_user_config, ConfigError};
use tunacode_core::{Orchestrator, Session, TurnResult};
use tunacode_model::{resolve_agent, to_transport};
use tunacode_tools::{AllowOrDeny, ConfirmationUi, ToolRegistry, ToolStatusCallback};

// ── Exit codes ────────────────────────────────────────────────────────────────

const EXIT_SUCCESS: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_AGENT_INIT_ERROR: u8 = 2;
const EXIT_TIMEOUT: u8 = 124;
const EXIT_INTERRUPT: u8 = 130;

// ── Headless collaborators ────────────────────────────────────────────────────

/// Headless confirmation: there is no prompt to show, so anything that
/// reaches `Confirm` is refused.  `--auto-approve` sets yolo, which
/// authorizes tools before confirmation is ever consulted.
struct HeadlessConfirm;

#[async_trait]
impl ConfirmationUi for HeadlessConfirm {
    async fn ask(&self, tool_name: &str, _args: &Value) -> AllowOrDeny {
        debug!(tool = tool_name, "headless run refuses unconfirmed tool");
        AllowOrDeny::Deny
    }
}

/// Status transitions go to the log; there is no status bar in headless mode.
struct LogStatus;

impl ToolStatusCallback for LogStatus {
    fn notify(&self, message: &str, tool_name: Option<&str>) {
        match tool_name {
            Some(tool) => debug!(%tool, "{message}"),
            None => debug!("{message}"),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::ShowConfig => match tunacode_config::load(cli.config.as_deref()) {
            Ok(settings) => {
                println!("{}", serde_yaml::to_string(&settings).unwrap_or_default());
                ExitCode::from(EXIT_SUCCESS)
            }
            Err(e) => config_failure(e),
        },
        Commands::Model { spec } => set_default_model(cli.config.as_deref(), &spec),
        Commands::Run { prompt, auto_approve, output_json, timeout, cwd, model } => {
            run_headless(
                cli.config.as_deref(),
                &prompt,
                auto_approve,
                output_json,
                timeout,
                cwd.as_deref(),
                model.as_deref(),
            )
            .await
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn config_failure(e: ConfigError) -> ExitCode {
    eprintln!("configuration error: {e}");
    ExitCode::from(EXIT_CONFIG_ERROR)
}

/// Persist a new default model to the user config file.
fn set_default_model(config: Option<&std::path::Path>, spec: &str) -> ExitCode {
    let mut settings = match tunacode_config::load(config) {
        Ok(s) => s,
        Err(e) => return config_failure(e),
    };
    settings.default_model = spec.to_string();
    if let Err(e) = settings.validate() {
        return config_failure(e);
    }
    // The model must also be resolvable, not just well-formed.
    if let Err(e) = resolve_agent(spec) {
        eprintln!("cannot use model {spec:?}: {e}");
        return ExitCode::from(EXIT_AGENT_INIT_ERROR);
    }
    match save_user_config(&settings) {
        Ok(path) => {
            println!("default model set to {spec} ({})", path.display());
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => config_failure(e),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_headless(
    config: Option<&std::path::Path>,
    prompt: &str,
    auto_approve: bool,
    output_json: bool,
    timeout: Option<f64>,
    cwd: Option<&std::path::Path>,
    model: Option<&str>,
) -> ExitCode {
    let mut settings = match tunacode_config::load(config) {
        Ok(s) => s,
        Err(e) => return config_failure(e),
    };
    if let Some(t) = timeout {
        settings.global_request_timeout = t;
    }
    if auto_approve {
        settings.yolo = true;
    }
    if let Some(m) = model {
        settings.default_model = m.to_string();
    }
    // CLI overrides go through the same validation as file values.
    if let Err(e) = settings.validate() {
        return config_failure(e);
    }

    if let Some(dir) = cwd {
        if let Err(e) = std::env::set_current_dir(dir) {
            eprintln!("cannot change directory to {}: {e}", dir.display());
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    }

    let agent = match resolve_agent(&settings.default_model) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("agent initialisation failed: {e}");
            return ExitCode::from(EXIT_AGENT_INIT_ERROR);
        }
    };

    let settings = Arc::new(settings);
    // Workspace tools are registered by embedders; the headless core runs
    // with an empty registry and the model observes "unknown tool" errors.
    let executor = Arc::new(ToolRegistry::new());
    let orchestrator = Orchestrator::new(
        agent,
        executor,
        Arc::new(HeadlessConfirm),
        Arc::clone(&settings),
    )
    .with_status(Arc::new(LogStatus));

    let mut session = Session::new(settings);
    let delta_from = session.messages.len();
    let result = orchestrator.run_turn(&mut session, prompt).await;

    if output_json {
        let delta: Vec<Value> = session.messages[delta_from..].iter().map(to_transport).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "result": result_json(&result),
                "messages": delta,
            }))
            .unwrap_or_default()
        );
    } else {
        match &result {
            TurnResult::Completed { final_text, .. } => println!("{final_text}"),
            TurnResult::FallbackSynthesized { text, .. } => println!("{text}"),
            TurnResult::Cancelled => eprintln!("cancelled"),
            TurnResult::TimedOut => {
                eprintln!(
                    "request exceeded the {} s time limit",
                    session.settings.global_request_timeout
                );
            }
        }
    }

    ExitCode::from(match result {
        TurnResult::Completed { .. } | TurnResult::FallbackSynthesized { .. } => EXIT_SUCCESS,
        TurnResult::Cancelled => EXIT_INTERRUPT,
        TurnResult::TimedOut => EXIT_TIMEOUT,
    })
}

fn result_json(result: &TurnResult) -> Value {
    match result {
        TurnResult::Completed { final_text, usage_delta } => json!({
            "kind": "completed",
            "final_text": final_text,
            "usage_delta": usage_delta,
        }),
        TurnResult::FallbackSynthesized { text, reason } => json!({
            "kind": "fallback_synthesized",
            "text": text,
            "reason": reason,
        }),
        TurnResult::Cancelled => json!({"kind": "cancelled"}),
        TurnResult::TimedOut => json!({"kind": "timed_out"}),
    }
}
