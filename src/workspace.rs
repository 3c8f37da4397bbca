use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::Config;
use crate::layout::HomeLayout;
use crate::platform::PlatformContext;
use crate::util::xdg;

/// Locations cfgport itself owns.
#[derive(Debug, Clone, Copy)]
pub enum WorkspacePath {
    /// Preferences: $XDG_CONFIG_HOME/cfgport/config.toml
    ConfigFile,
    /// Backup root: `backup_dir` from the config, else $XDG_STATE_HOME/cfgport/backups
    Backups,
}

/// Everything a command needs: preferences, the local platform and the
/// home directory whose tool configuration is exported or replaced.
#[derive(Debug)]
pub struct Workspace {
    config_dir: PathBuf,
    state_dir: PathBuf,
    config: Config,
    context: PlatformContext,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        let config_dir = xdg::config_dir()?;
        let state_dir = xdg::state_dir()?;
        let context = PlatformContext::detect().context("Failed to detect platform")?;

        let mut workspace = Self {
            config_dir,
            state_dir,
            config: Config::default(),
            context,
        };
        workspace.config = Config::load(&workspace.path(WorkspacePath::ConfigFile))?;
        Ok(workspace)
    }

    pub fn path(&self, path_type: WorkspacePath) -> PathBuf {
        match path_type {
            WorkspacePath::ConfigFile => self.config_dir.join("config.toml"),
            WorkspacePath::Backups => self
                .config
                .backup_dir
                .clone()
                .unwrap_or_else(|| self.state_dir.join("backups")),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> &PlatformContext {
        &self.context
    }

    pub fn layout(&self) -> HomeLayout {
        HomeLayout::new(&self.context.home)
    }
}
