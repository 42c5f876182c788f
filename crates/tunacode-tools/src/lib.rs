// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: Apache-2.0
pub mod authorization;
pub mod catalog;
pub mod registry;
pub mod tool;

pub use authorization::{AuthContext, AuthRule, AuthorizationEngine, AuthorizationResult};
pub use catalog::{ToolCatalog, ToolCategory};
pub use registry::ToolRegistry;
pub use tool::{AllowOrDeny, ConfirmationUi, Tool, ToolError, ToolExecutor, ToolStatusCallback};
