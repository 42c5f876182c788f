// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
mod agent;
mod mock;
mod registry;
mod transport;
mod types;

pub use agent::{AgentStreamError, LLMAgent, Node, NodeStream, TASK_COMPLETE_MARKER};
pub use mock::{MockAgent, ScriptedMockAgent};
pub use registry::{resolve_agent, AgentInitError, AgentRegistry};
pub use transport::{from_transport, to_transport, TransportError};
pub use types::{Message, MessagePart, MessageRole, UsageMetrics};
