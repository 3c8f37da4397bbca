use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::layout::{ExportScope, ToolSelection};
use crate::merge::MergeStrategy;

/// Configuration portability for AI coding assistants
///
/// cfgport packages Claude Code and Codex configuration (settings,
/// profiles, MCP servers, commands and prompts) into a single archive and
/// restores it on another machine, translating paths between platforms
/// and merging with whatever is already installed.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Package installed configuration into an archive
    Export {
        /// Tool whose configuration is exported
        #[arg(short, long, value_enum, default_value_t = ToolArg::ClaudeCode)]
        tool: ToolArg,

        /// Subset of configuration to export
        #[arg(short, long, value_enum, default_value_t = ScopeArg::All)]
        scope: ScopeArg,

        /// Keep API keys and tokens instead of redacting them
        #[arg(long)]
        include_sensitive: bool,

        /// Package file (.zip or .tar.gz) or directory to write into
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Free-form note stored in the manifest
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Restore a package onto this machine
    Import {
        /// Package produced by `cfgport export`
        #[arg(value_name = "PACKAGE")]
        package: PathBuf,

        /// How incoming configuration combines with existing files
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Skip the pre-import backup (disables rollback)
        #[arg(long)]
        no_backup: bool,

        /// Do not translate paths from the source platform
        #[arg(long)]
        no_adapt: bool,

        /// Only import files for this tool
        #[arg(short, long, value_enum, default_value_t = ToolArg::All)]
        tool: ToolArg,

        /// Only import this subset of configuration
        #[arg(short, long, value_enum, default_value_t = ScopeArg::All)]
        scope: ScopeArg,
    },

    /// Check a package without importing it
    Validate {
        #[arg(value_name = "PACKAGE")]
        package: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolArg {
    ClaudeCode,
    Codex,
    All,
}

impl From<ToolArg> for ToolSelection {
    fn from(arg: ToolArg) -> Self {
        match arg {
            ToolArg::ClaudeCode => ToolSelection::ClaudeCode,
            ToolArg::Codex => ToolSelection::Codex,
            ToolArg::All => ToolSelection::All,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeArg {
    All,
    Workflows,
    Mcp,
    Settings,
}

impl From<ScopeArg> for ExportScope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::All => ExportScope::All,
            ScopeArg::Workflows => ExportScope::Workflows,
            ScopeArg::Mcp => ExportScope::Mcp,
            ScopeArg::Settings => ExportScope::Settings,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyArg {
    Replace,
    Merge,
    SkipExisting,
}

impl From<StrategyArg> for MergeStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Replace => MergeStrategy::Replace,
            StrategyArg::Merge => MergeStrategy::Merge,
            StrategyArg::SkipExisting => MergeStrategy::SkipExisting,
        }
    }
}
