// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
mod loader;
mod schema;

pub use loader::{load, save_user_config, user_config_path};
pub use schema::{ConfigError, FallbackVerbosity, Settings};
