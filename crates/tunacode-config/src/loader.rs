// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{ConfigError, Settings};

/// Ordered list of config file locations searched from lowest to highest
/// priority.  Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. System-wide default
    paths.push(PathBuf::from("/etc/tunacode/config.yaml"));
    paths.push(PathBuf::from("/etc/tunacode/config.yml"));

    // 2. XDG / home
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/tunacode/config.yaml"));
        paths.push(home.join(".config/tunacode/config.yml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("tunacode/config.yaml"));
        paths.push(cfg.join("tunacode/config.yml"));
    }

    // 3. Workspace-local
    paths.push(PathBuf::from(".tunacode/config.yaml"));
    paths.push(PathBuf::from(".tunacode/config.yml"));
    paths.push(PathBuf::from(".tunacode.yaml"));
    paths.push(PathBuf::from(".tunacode.yml"));

    paths
}

/// The user-level config file written by `tunacode model`.
pub fn user_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config/tunacode/config.yaml")
}

/// Load settings by merging all discovered YAML files, then validate.
/// The `extra` argument may provide an explicit path (e.g. `--config`).
pub fn load(extra: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            merge_file(&mut merged, &path)?;
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        merge_file(&mut merged, p)?;
    }

    let settings: Settings = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty())
    {
        Settings::default()
    } else {
        serde_yaml::from_value(merged).map_err(|e| ConfigError::Parse(e.to_string()))?
    };
    settings.validate()?;
    Ok(settings)
}

fn merge_file(dst: &mut serde_yaml::Value, path: &Path) -> Result<(), ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
    let layer: serde_yaml::Value = serde_yaml::from_str(&text)
        .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
    merge_yaml(dst, layer);
    Ok(())
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                match d.get_mut(&k) {
                    Some(existing) => merge_yaml(existing, v),
                    None => {
                        d.insert(k, v);
                    }
                }
            }
        }
        (d, s) => *d = s,
    }
}

/// Persist `settings` to the user config file, creating parent directories.
///
/// Used by the `model` subcommand: changing the default model takes effect
/// immediately and survives the process.
pub fn save_user_config(settings: &Settings) -> Result<PathBuf, ConfigError> {
    settings.validate()?;
    let path = user_config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", parent.display())))?;
    }
    let text = serde_yaml::to_string(settings).map_err(|e| ConfigError::Parse(e.to_string()))?;
    std::fs::write(&path, text).map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
    Ok(path)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
