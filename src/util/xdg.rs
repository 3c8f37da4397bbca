use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

const APP_NAME: &str = "cfgport";

fn base_dir(var: &str, fallback: &str) -> Result<PathBuf> {
    match env::var_os(var) {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => directories::BaseDirs::new()
            .context("Failed to get home directory")
            .map(|dirs| dirs.home_dir().join(fallback)),
    }
}

/// Get the XDG config directory for cfgport
///
/// Returns `$XDG_CONFIG_HOME/cfgport` or `~/.config/cfgport` if not set
pub fn config_dir() -> Result<PathBuf> {
    Ok(base_dir("XDG_CONFIG_HOME", ".config")?.join(APP_NAME))
}

/// Get the XDG state directory for cfgport
///
/// Returns `$XDG_STATE_HOME/cfgport` or `~/.local/state/cfgport` if not set
pub fn state_dir() -> Result<PathBuf> {
    Ok(base_dir("XDG_STATE_HOME", ".local/state")?.join(APP_NAME))
}
