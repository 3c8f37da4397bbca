use chrono::Local;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{IoContext, PortError, Result};
use crate::layout::{ExportScope, FileCategory, HomeLayout, ToolSelection, ToolType, CONFIG_SOURCES};
use crate::manifest::{ExportFileInfo, ExportMetadata};
use crate::package::{archive_relative, build_archive, checksum, unix_mode, PackageEntry};
use crate::platform::Platform;
use crate::sanitize::sanitize_file;

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub tool: ToolSelection,
    pub scope: ExportScope,
    /// Keep credentials instead of redacting them
    pub include_sensitive: bool,
    /// Package file, or a directory to place the default file name in
    pub output: Option<PathBuf>,
    pub description: Option<String>,
}

/// A file found on disk that belongs in the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedFile {
    pub tool: ToolType,
    pub source: PathBuf,
    pub archive_path: String,
    pub category: FileCategory,
}

#[derive(Debug, Clone, Default)]
pub struct ExportResult {
    pub success: bool,
    pub package_path: Option<PathBuf>,
    pub file_count: usize,
    pub total_size: u64,
    pub warnings: Vec<String>,
    pub metadata: Option<ExportMetadata>,
}

/// Enumerate the files relevant to `scope` for the selected tools. Absent
/// files and directories are skipped.
pub fn collect(layout: &HomeLayout, scope: ExportScope, tool: ToolSelection) -> Result<Vec<CollectedFile>> {
    let mut files = Vec::new();

    for source in CONFIG_SOURCES
        .iter()
        .filter(|source| tool.includes(source.tool) && source.in_scope(scope))
    {
        let path = layout.source_path(source);

        if !source.is_dir {
            if path.is_file() {
                files.push(CollectedFile {
                    tool: source.tool,
                    source: path,
                    archive_path: source.archive_path.to_string(),
                    category: source.category,
                });
            } else {
                debug!("Skipping absent {}", path.display());
            }
            continue;
        }

        if !path.is_dir() {
            debug!("Skipping absent directory {}", path.display());
            continue;
        }

        for entry in WalkDir::new(&path).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                let failed = err.path().unwrap_or(&path).to_path_buf();
                PortError::io("Failed to walk directory", failed, io::Error::other(err))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            files.push(CollectedFile {
                tool: source.tool,
                source: entry.path().to_path_buf(),
                archive_path: format!("{}/{}", source.archive_path, archive_relative(&path, entry.path())),
                category: source.category,
            });
        }
    }

    debug!(count = files.len(), scope = scope.as_str(), tool = tool.as_str(), "Collected files");
    Ok(files)
}

/// `cfgport-<tool>-<scope>-<YYYYMMDD-HHMMSS>.zip`
pub fn default_file_name(tool: ToolSelection, scope: ExportScope) -> String {
    format!(
        "cfgport-{}-{}-{}.zip",
        tool.as_str(),
        scope.as_str(),
        Local::now().format("%Y%m%d-%H%M%S")
    )
}

fn output_path(options: &ExportOptions) -> PathBuf {
    let file_name = default_file_name(options.tool, options.scope);
    match &options.output {
        Some(path) if path.is_dir() => path.join(file_name),
        Some(path) => path.clone(),
        None => PathBuf::from(file_name),
    }
}

/// Sanitize, checksum and package collected files.
///
/// An empty file list is a successful export that produced nothing.
pub fn build_package(files: &[CollectedFile], options: &ExportOptions, platform: Platform) -> Result<ExportResult> {
    if files.is_empty() {
        info!("Nothing to export");
        return Ok(ExportResult {
            success: true,
            warnings: vec![format!(
                "nothing to export for {} ({} scope)",
                options.tool.as_str(),
                options.scope.as_str()
            )],
            ..ExportResult::default()
        });
    }

    let mut tools: Vec<ToolType> = Vec::new();
    for file in files {
        if !tools.contains(&file.tool) {
            tools.push(file.tool);
        }
    }

    let mut metadata = ExportMetadata::new(platform, tools, options.scope);
    metadata.description = options.description.clone();

    let mut entries = Vec::with_capacity(files.len());
    let mut warnings = Vec::new();

    for file in files {
        let data = fs::read(&file.source).io_context("Failed to read config file", &file.source)?;
        let sanitized = sanitize_file(&file.archive_path, &data);
        let redacted = sanitized.redacted;

        let data = if options.include_sensitive {
            metadata.has_sensitive_data |= redacted;
            data
        } else {
            sanitized.data
        };

        metadata.files.push(ExportFileInfo {
            path: file.archive_path.clone(),
            category: file.category,
            size: data.len() as u64,
            checksum: checksum(&data),
            sanitized: redacted && !options.include_sensitive,
        });
        entries.push(PackageEntry::bytes(file.archive_path.clone(), data).with_mode(unix_mode(&file.source)));
    }

    if metadata.has_sensitive_data {
        warnings.push("package contains credentials; store it securely".to_string());
    }

    let output = output_path(options);
    let package_path = build_archive(&entries, &metadata, &output)?;
    info!("Exported {} files to {}", metadata.files.len(), package_path.display());

    Ok(ExportResult {
        success: true,
        package_path: Some(package_path),
        file_count: metadata.files.len(),
        total_size: metadata.total_size(),
        warnings,
        metadata: Some(metadata),
    })
}

/// Collect and package in one step.
pub fn export(layout: &HomeLayout, options: &ExportOptions, platform: Platform) -> Result<ExportResult> {
    let files = collect(layout, options.scope, options.tool)?;
    build_package(&files, options, platform)
}

/// Home-relative location of a collected file, for display.
pub fn display_path(layout: &HomeLayout, file: &CollectedFile) -> String {
    let relative = file.source.strip_prefix(layout.home()).unwrap_or(&file.source);
    Path::new("~").join(relative).display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::read_archive;
    use crate::sanitize::API_KEY_PLACEHOLDER;
    use tempfile::TempDir;

    fn write(home: &Path, relative: &str, contents: &str) {
        let path = home.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn archive_paths(files: &[CollectedFile]) -> Vec<&str> {
        files.iter().map(|file| file.archive_path.as_str()).collect()
    }

    fn populated_home() -> TempDir {
        let home = TempDir::new().unwrap();
        write(home.path(), ".claude/settings.json", r#"{"env":{"ANTHROPIC_API_KEY":"sk-ant-1"}}"#);
        write(home.path(), ".claude/profiles.json", r#"{"profiles":{"work":{"apiKey":"sk-w"}}}"#);
        write(home.path(), ".claude/commands/review.md", "# review");
        write(home.path(), ".claude/commands/git/commit.md", "# commit");
        write(home.path(), ".claude.json", r#"{"mcpServers":{}}"#);
        write(home.path(), ".codex/config.toml", "model = \"o3\"\n");
        write(home.path(), ".codex/prompts/plan.md", "# plan");
        home
    }

    #[test]
    fn collects_by_scope() {
        let home = populated_home();
        let layout = HomeLayout::new(home.path());

        let settings = collect(&layout, ExportScope::Settings, ToolSelection::ClaudeCode).unwrap();
        assert_eq!(archive_paths(&settings), ["claude/settings.json"]);

        let workflows = collect(&layout, ExportScope::Workflows, ToolSelection::All).unwrap();
        assert_eq!(
            archive_paths(&workflows),
            ["workflows/claude/git/commit.md", "workflows/claude/review.md", "workflows/codex/plan.md"]
        );

        let mcp = collect(&layout, ExportScope::Mcp, ToolSelection::All).unwrap();
        assert_eq!(archive_paths(&mcp), ["mcp/.claude.json", "codex/config.toml"]);

        let all = collect(&layout, ExportScope::All, ToolSelection::ClaudeCode).unwrap();
        assert!(archive_paths(&all).contains(&"claude/profiles.json"));
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn empty_home_exports_nothing() {
        let home = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let options = ExportOptions {
            output: Some(out.path().to_path_buf()),
            ..ExportOptions::default()
        };

        let result = export(&HomeLayout::new(home.path()), &options, Platform::Linux).unwrap();

        assert!(result.success);
        assert_eq!(result.file_count, 0);
        assert!(result.package_path.is_none());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn packages_are_sanitized_by_default() {
        let home = populated_home();
        let out = TempDir::new().unwrap();
        let options = ExportOptions {
            scope: ExportScope::Settings,
            output: Some(out.path().join("settings.zip")),
            ..ExportOptions::default()
        };

        let result = export(&HomeLayout::new(home.path()), &options, Platform::Linux).unwrap();

        assert_eq!(result.file_count, 1);
        let metadata = result.metadata.unwrap();
        assert!(metadata.files[0].sanitized);
        assert!(!metadata.has_sensitive_data);

        let contents = read_archive(&result.package_path.unwrap()).unwrap();
        let settings = String::from_utf8(contents.get("claude/settings.json").unwrap().to_vec()).unwrap();
        assert!(settings.contains(API_KEY_PLACEHOLDER));
        assert!(!settings.contains("sk-ant-1"));
    }

    #[test]
    fn include_sensitive_keeps_credentials() {
        let home = populated_home();
        let out = TempDir::new().unwrap();
        let options = ExportOptions {
            scope: ExportScope::Settings,
            include_sensitive: true,
            output: Some(out.path().join("settings.tar.gz")),
            ..ExportOptions::default()
        };

        let result = export(&HomeLayout::new(home.path()), &options, Platform::Linux).unwrap();

        let metadata = result.metadata.unwrap();
        assert!(metadata.has_sensitive_data);
        assert!(!metadata.files[0].sanitized);
        assert_eq!(result.warnings.len(), 1);

        let contents = read_archive(&result.package_path.unwrap()).unwrap();
        let settings = contents.get("claude/settings.json").unwrap();
        assert_eq!(settings, br#"{"env":{"ANTHROPIC_API_KEY":"sk-ant-1"}}"#);
    }

    #[test]
    fn default_name_encodes_tool_and_scope() {
        let name = default_file_name(ToolSelection::Codex, ExportScope::Mcp);
        assert!(name.starts_with("cfgport-codex-mcp-"));
        assert!(name.ends_with(".zip"));
    }

    #[test]
    fn display_path_is_home_relative() {
        let home = populated_home();
        let layout = HomeLayout::new(home.path());
        let files = collect(&layout, ExportScope::Settings, ToolSelection::Codex).unwrap();
        assert_eq!(display_path(&layout, &files[0]), Path::new("~").join(".codex/config.toml").display().to_string());
    }
}
