use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PortError, Result};

/// Coding assistants whose configuration can be packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolType {
    ClaudeCode,
    Codex,
}

impl ToolType {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolType::ClaudeCode => "claude-code",
            ToolType::Codex => "codex",
        }
    }
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tools an operation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolSelection {
    #[default]
    ClaudeCode,
    Codex,
    All,
}

impl ToolSelection {
    pub fn tools(self) -> &'static [ToolType] {
        match self {
            ToolSelection::ClaudeCode => &[ToolType::ClaudeCode],
            ToolSelection::Codex => &[ToolType::Codex],
            ToolSelection::All => &[ToolType::ClaudeCode, ToolType::Codex],
        }
    }

    pub fn includes(self, tool: ToolType) -> bool {
        self.tools().contains(&tool)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ToolSelection::ClaudeCode => "claude-code",
            ToolSelection::Codex => "codex",
            ToolSelection::All => "all",
        }
    }
}

/// Subset of configuration an export or import targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportScope {
    #[default]
    All,
    Workflows,
    Mcp,
    Settings,
}

impl ExportScope {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportScope::All => "all",
            ExportScope::Workflows => "workflows",
            ExportScope::Mcp => "mcp",
            ExportScope::Settings => "settings",
        }
    }

    fn admits(self, scopes: &[ExportScope]) -> bool {
        self == ExportScope::All || scopes.contains(&self)
    }
}

/// Category tag recorded for every packaged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileCategory {
    Settings,
    ProfileCredentials,
    Workflow,
    AgentDefinition,
    McpServiceConfig,
    HookDefinition,
    SkillDefinition,
}

/// One configuration location on disk and its place in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigSource {
    pub tool: ToolType,
    /// Path relative to the home directory.
    pub home_relative: &'static str,
    /// Path (or directory prefix) inside the archive.
    pub archive_path: &'static str,
    pub category: FileCategory,
    pub is_dir: bool,
    /// Scopes other than `All` that include this source.
    scopes: &'static [ExportScope],
}

impl ConfigSource {
    pub fn in_scope(&self, scope: ExportScope) -> bool {
        scope.admits(self.scopes)
    }

    fn contains_archive_path(&self, path: &str) -> bool {
        if self.is_dir {
            path.strip_prefix(self.archive_path)
                .is_some_and(|rest| rest.starts_with('/'))
        } else {
            path == self.archive_path
        }
    }
}

const fn file(
    tool: ToolType,
    home_relative: &'static str,
    archive_path: &'static str,
    category: FileCategory,
    scopes: &'static [ExportScope],
) -> ConfigSource {
    ConfigSource {
        tool,
        home_relative,
        archive_path,
        category,
        is_dir: false,
        scopes,
    }
}

const fn dir(
    tool: ToolType,
    home_relative: &'static str,
    archive_path: &'static str,
    category: FileCategory,
    scopes: &'static [ExportScope],
) -> ConfigSource {
    ConfigSource {
        tool,
        home_relative,
        archive_path,
        category,
        is_dir: true,
        scopes,
    }
}

use ExportScope::{Mcp, Settings, Workflows};
use ToolType::{ClaudeCode, Codex};

/// Every location the exporter knows how to collect.
pub const CONFIG_SOURCES: &[ConfigSource] = &[
    file(ClaudeCode, ".claude/settings.json", "claude/settings.json", FileCategory::Settings, &[Settings]),
    file(ClaudeCode, ".claude/CLAUDE.md", "claude/CLAUDE.md", FileCategory::Settings, &[Settings]),
    dir(ClaudeCode, ".claude/commands", "workflows/claude", FileCategory::Workflow, &[Workflows]),
    dir(ClaudeCode, ".claude/agents", "claude/agents", FileCategory::AgentDefinition, &[Workflows]),
    file(ClaudeCode, ".claude.json", "mcp/.claude.json", FileCategory::McpServiceConfig, &[Mcp]),
    file(ClaudeCode, ".claude/profiles.json", "claude/profiles.json", FileCategory::ProfileCredentials, &[]),
    dir(ClaudeCode, ".claude/hooks", "claude/hooks", FileCategory::HookDefinition, &[]),
    dir(ClaudeCode, ".claude/skills", "claude/skills", FileCategory::SkillDefinition, &[]),
    file(Codex, ".codex/config.toml", "codex/config.toml", FileCategory::Settings, &[Settings, Mcp]),
    file(Codex, ".codex/AGENTS.md", "codex/AGENTS.md", FileCategory::Settings, &[Settings]),
    dir(Codex, ".codex/prompts", "workflows/codex", FileCategory::Workflow, &[Workflows]),
    file(Codex, ".codex/auth.json", "codex/auth.json", FileCategory::ProfileCredentials, &[]),
];

/// Archive prefix to home-relative directory. Exporter and importer both
/// resolve through this table; longer prefixes are listed first.
const ARCHIVE_PREFIXES: &[(&str, &str)] = &[
    ("workflows/claude/", ".claude/commands/"),
    ("workflows/codex/", ".codex/prompts/"),
    ("mcp/", ""),
    ("claude/", ".claude/"),
    ("codex/", ".codex/"),
];

/// Reject archive paths that could escape the target directory.
pub fn check_archive_path(path: &str) -> Result<()> {
    let unsafe_path = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.contains(':')
        || path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");

    if unsafe_path {
        return Err(PortError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Map an archive path to its home-relative restore location.
pub fn home_relative_target(archive_path: &str) -> Result<String> {
    check_archive_path(archive_path)?;

    ARCHIVE_PREFIXES
        .iter()
        .find_map(|(prefix, target)| {
            archive_path
                .strip_prefix(prefix)
                .map(|rest| format!("{target}{rest}"))
        })
        .ok_or_else(|| PortError::InvalidPath(archive_path.to_string()))
}

/// Find the configuration source an archive path belongs to.
pub fn source_for_archive_path(archive_path: &str) -> Option<&'static ConfigSource> {
    CONFIG_SOURCES
        .iter()
        .find(|source| source.contains_archive_path(archive_path))
}

/// Tool directories rooted at a particular home directory.
#[derive(Debug, Clone)]
pub struct HomeLayout {
    home: PathBuf,
}

impl HomeLayout {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn source_path(&self, source: &ConfigSource) -> PathBuf {
        self.join(source.home_relative)
    }

    /// Absolute restore location for an archive path.
    pub fn target_path(&self, archive_path: &str) -> Result<PathBuf> {
        Ok(self.join(&home_relative_target(archive_path)?))
    }

    /// Whether any of the tools has configuration on disk.
    pub fn has_any_config(&self) -> bool {
        [".claude", ".codex", ".claude.json"]
            .iter()
            .any(|relative| self.join(relative).exists())
    }

    fn join(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.home.clone(), |path, segment| path.join(segment))
    }
}
