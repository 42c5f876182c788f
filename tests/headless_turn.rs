// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
//! End-to-end turn against the built-in mock provider, wired the same way
//! the headless CLI wires it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use tunacode_config::Settings;
use tunacode_core::{Orchestrator, Session, TurnResult};
use tunacode_model::resolve_agent;
use tunacode_tools::{AllowOrDeny, ConfirmationUi, ToolRegistry};

struct DenyAll;

#[async_trait]
impl ConfirmationUi for DenyAll {
    async fn ask(&self, _tool_name: &str, _args: &Value) -> AllowOrDeny {
        AllowOrDeny::Deny
    }
}

fn wire(settings: Settings) -> (Orchestrator, Session) {
    let settings = Arc::new(settings);
    let agent = resolve_agent(&settings.default_model).expect("mock provider resolves");
    let orchestrator = Orchestrator::new(
        agent,
        Arc::new(ToolRegistry::new()),
        Arc::new(DenyAll),
        Arc::clone(&settings),
    );
    (orchestrator, Session::new(settings))
}

#[tokio::test]
async fn mock_provider_completes_a_turn() {
    let (orchestrator, mut session) = wire(Settings::default());
    match orchestrator.run_turn(&mut session, "say hello").await {
        TurnResult::Completed { final_text, .. } => {
            assert!(final_text.contains("say hello"));
        }
        other => panic!("expected Completed, got {other:?}"),
    }
    // At least the user message and one assistant message were appended.
    assert!(session.messages.len() >= 2);
}

#[tokio::test]
async fn snapshot_survives_a_completed_turn() {
    let (orchestrator, mut session) = wire(Settings::default());
    orchestrator.run_turn(&mut session, "first request").await;

    let snapshot = session.snapshot();
    let restored = Session::restore(Arc::new(Settings::default()), &snapshot);
    assert_eq!(restored.messages.len(), session.messages.len());

    // The restored session supports a follow-up turn.
    let (orchestrator2, _) = wire(Settings::default());
    let mut restored = restored;
    match orchestrator2.run_turn(&mut restored, "second request").await {
        TurnResult::Completed { final_text, .. } => {
            assert!(final_text.contains("second request"));
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}
