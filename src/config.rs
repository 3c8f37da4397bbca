use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::merge::MergeStrategy;

/// User preferences from `config.toml`. Command-line flags override them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub default_strategy: MergeStrategy,
    #[serde(default = "enabled")]
    pub backup: bool,
    #[serde(default = "enabled")]
    pub adapt_paths: bool,
    /// Where packages are written when no output is given
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Root for pre-import backups
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_strategy: MergeStrategy::default(),
            backup: true,
            adapt_paths: true,
            output_dir: None,
            backup_dir: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {:?}", path))
    }
}

fn enabled() -> bool {
    true
}
