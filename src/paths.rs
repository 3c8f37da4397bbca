//! Cross-platform translation of path strings inside configuration trees.
//!
//! Windows is the only non-POSIX family. Drive-letter paths map to the
//! mounted form (`C:\Users\x` <-> `/c/Users/x`, or `/mnt/c/Users/x` under
//! WSL) and the home-directory environment token maps between
//! `%USERPROFILE%` and `$HOME`. A leading `~` is expanded against the
//! target's home directory before separators are rewritten.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::debug;

use crate::platform::{Platform, PlatformContext};
use crate::value::{ConfigMap, ConfigValue};

/// Short command names that resolve through the target's own `PATH`.
pub const INTERPRETERS: &[&str] = &[
    "node", "npx", "npm", "pnpm", "pnpx", "yarn", "bun", "bunx", "deno", "python", "python3", "pip",
    "pipx", "uv", "uvx", "docker", "cmd", "sh", "bash", "powershell", "pwsh",
];

/// Launchers that Windows only runs through `cmd /c`.
const CMD_WRAPPED: &[&str] = &["npx", "pnpx", "pnpm", "npm", "yarn", "bunx"];

/// Keys whose value is a map of named service definitions.
const SERVICE_KEYS: &[&str] = &["mcpServers", "mcp_servers"];

static ENV_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:%(?P<win>[A-Za-z_][A-Za-z0-9_]*)%|\$\{(?P<braced>[A-Za-z_][A-Za-z0-9_]*)\}|\$(?P<bare>[A-Za-z_][A-Za-z0-9_]*))")
        .expect("environment token pattern compiles")
});

static DRIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<letter>[A-Za-z]):(?P<rest>[\\/].*)?$").expect("drive pattern compiles")
});

static DRIVE_MOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(?P<mnt>mnt/)?(?P<letter>[A-Za-z])(?P<rest>/.*)?$").expect("drive mount pattern compiles")
});

/// How a path-like string was classified before translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathKind {
    Absolute,
    Relative,
    EnvironmentVariable,
    /// Mixed separators; translated best-effort and always flagged.
    Ambiguous,
}

/// One translated value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathMapping {
    /// Dot path of the value inside its document
    pub location: String,
    pub original: String,
    pub adapted: String,
    pub kind: PathKind,
    /// False when no faithful equivalent exists on the target
    pub success: bool,
    /// Set when the mapping needs manual review
    pub warning: Option<String>,
}

/// Output of adapting a tree: a new tree plus what changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Adaptation {
    pub value: ConfigValue,
    pub mappings: Vec<PathMapping>,
    pub warnings: Vec<String>,
}

impl Adaptation {
    fn identity(value: &ConfigValue) -> Self {
        Self {
            value: value.clone(),
            mappings: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Classify a string that looks like a filesystem path, or `None` if it does not.
pub fn classify(value: &str) -> Option<PathKind> {
    if value.is_empty() || value.contains('\n') || value.contains("://") || value.starts_with('@') {
        return None;
    }

    let mixed = value.contains('/') && value.contains('\\');
    let kind = if ENV_TOKEN.is_match(value) {
        PathKind::EnvironmentVariable
    } else if is_home_shorthand(value)
        || DRIVE.is_match(value)
        || value.starts_with('/')
        || value.starts_with('\\')
    {
        PathKind::Absolute
    } else if is_explicit_relative(value) || (value.contains('\\') && !value.contains(char::is_whitespace)) {
        PathKind::Relative
    } else {
        return None;
    };

    Some(if mixed { PathKind::Ambiguous } else { kind })
}

fn is_home_shorthand(value: &str) -> bool {
    value == "~" || value.starts_with("~/") || value.starts_with("~\\")
}

fn is_explicit_relative(value: &str) -> bool {
    ["./", "../", ".\\", "..\\"]
        .iter()
        .any(|prefix| value.starts_with(prefix))
        && !value.contains(char::is_whitespace)
}

fn is_executable_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    ["command", "executable", "binary"]
        .iter()
        .any(|needle| key.contains(needle))
        || matches!(key.as_str(), "bin" | "cmd" | "exe" | "program")
}

fn is_interpreter(command: &str) -> bool {
    let lowered = command.to_ascii_lowercase();
    let stem = [".exe", ".cmd", ".bat"]
        .iter()
        .find_map(|ext| lowered.strip_suffix(ext))
        .unwrap_or(&lowered);
    INTERPRETERS.contains(&stem)
}

struct Translation {
    adapted: String,
    success: bool,
    notes: Vec<String>,
}

impl Translation {
    fn ok(adapted: String) -> Self {
        Self {
            adapted,
            success: true,
            notes: Vec::new(),
        }
    }
}

struct Adapter<'a> {
    source: Platform,
    target: &'a PlatformContext,
    mappings: Vec<PathMapping>,
    warnings: Vec<String>,
}

impl<'a> Adapter<'a> {
    fn new(source: Platform, target: &'a PlatformContext) -> Self {
        Self {
            source,
            target,
            mappings: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn finish(self, value: ConfigValue) -> Adaptation {
        Adaptation {
            value,
            mappings: self.mappings,
            warnings: self.warnings,
        }
    }

    fn with_target_separators(&self, value: &str) -> String {
        if self.target.platform.is_windows() {
            value.replace('/', "\\")
        } else {
            value.replace('\\', "/")
        }
    }

    fn env_token(&self, name: &str, rest: &str, notes: &mut Vec<String>) -> String {
        let is_home = name.eq_ignore_ascii_case("HOME") || name.eq_ignore_ascii_case("USERPROFILE");
        let name = if is_home && self.target.platform.is_windows() {
            "USERPROFILE"
        } else if is_home {
            "HOME"
        } else {
            name
        };

        if !is_home && self.target.var(name).is_none() {
            notes.push(format!("environment variable {name} is not set on the target system"));
        }

        let rest = self.with_target_separators(rest);
        if self.target.platform.is_windows() {
            format!("%{name}%{rest}")
        } else {
            format!("${name}{rest}")
        }
    }

    fn translate(&self, value: &str, kind: PathKind) -> Translation {
        let source_windows = self.source.is_windows();
        let target_windows = self.target.platform.is_windows();

        if kind == PathKind::Ambiguous {
            let normalized = if source_windows {
                value.replace('/', "\\")
            } else {
                value.replace('\\', "/")
            };
            let kind = classify(&normalized).unwrap_or(PathKind::Relative);
            let mut translation = self.translate(&normalized, kind);
            translation
                .notes
                .push("mixed path separators; verify the translated path".to_string());
            return translation;
        }

        if !source_windows && !target_windows {
            return self.translate_between_posix(value, kind);
        }

        match kind {
            PathKind::EnvironmentVariable => {
                let mut notes = Vec::new();
                let adapted = match ENV_TOKEN.captures(value) {
                    Some(caps) => {
                        let name = caps
                            .name("win")
                            .or_else(|| caps.name("braced"))
                            .or_else(|| caps.name("bare"))
                            .map(|m| m.as_str())
                            .unwrap_or_default();
                        let token_end = caps.get(0).map(|m| m.end()).unwrap_or_default();
                        self.env_token(name, &value[token_end..], &mut notes)
                    }
                    None => self.with_target_separators(value),
                };
                Translation {
                    adapted,
                    success: true,
                    notes,
                }
            }
            PathKind::Absolute if is_home_shorthand(value) => {
                let home = self.target.expand_home("~");
                Translation::ok(format!("{home}{}", self.with_target_separators(&value[1..])))
            }
            PathKind::Absolute if target_windows => self.posix_to_windows_absolute(value),
            PathKind::Absolute => match DRIVE.captures(value) {
                Some(caps) => {
                    let letter = caps["letter"].to_ascii_lowercase();
                    let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or_default();
                    Translation::ok(format!(
                        "{}{letter}{}",
                        self.target.platform.drive_mount_prefix(),
                        rest.replace('\\', "/")
                    ))
                }
                None => Translation::ok(value.replace('\\', "/")),
            },
            PathKind::Relative | PathKind::Ambiguous => Translation::ok(self.with_target_separators(value)),
        }
    }

    fn posix_to_windows_absolute(&self, value: &str) -> Translation {
        if let Some(caps) = DRIVE_MOUNT.captures(value) {
            let letter = caps["letter"].to_ascii_uppercase();
            let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or_default();
            return Translation::ok(format!("{letter}:{}", rest.replace('/', "\\")));
        }

        let adapted = value.replace('/', "\\");
        if value.starts_with("//") {
            return Translation::ok(adapted);
        }

        Translation {
            adapted,
            success: false,
            notes: vec!["POSIX path has no drive letter on Windows".to_string()],
        }
    }

    fn translate_between_posix(&self, value: &str, kind: PathKind) -> Translation {
        if kind != PathKind::Absolute {
            return Translation::ok(value.to_string());
        }
        if is_home_shorthand(value) {
            return Translation::ok(self.target.expand_home(&value.replace('\\', "/")));
        }

        let source_prefix = self.source.drive_mount_prefix();
        let target_prefix = self.target.platform.drive_mount_prefix();
        if source_prefix == target_prefix {
            return Translation::ok(value.to_string());
        }

        match DRIVE_MOUNT.captures(value) {
            Some(caps) if caps.name("mnt").is_some() == (source_prefix == "/mnt/") => {
                let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or_default();
                Translation::ok(format!("{target_prefix}{}{rest}", &caps["letter"]))
            }
            _ => Translation::ok(value.to_string()),
        }
    }

    /// Translate one string value, recording a mapping when it changes.
    fn adapt_string(&mut self, location: &str, key: Option<&str>, value: &str) -> String {
        let Some(kind) = classify(value) else {
            return value.to_string();
        };

        let Translation {
            adapted,
            success,
            mut notes,
        } = self.translate(value, kind);

        if adapted == value && notes.is_empty() {
            return adapted;
        }

        if key.is_some_and(is_executable_key) {
            notes.push("executable path translated; confirm it exists on the target system".to_string());
        }

        let warning = (!notes.is_empty()).then(|| notes.join("; "));
        if let Some(warning) = &warning {
            self.warnings
                .push(format!("{location}: '{value}' -> '{adapted}' ({warning})"));
        }

        debug!(location, original = value, adapted = %adapted, ?kind, "Adapted path");
        self.mappings.push(PathMapping {
            location: location.to_string(),
            original: value.to_string(),
            adapted: adapted.clone(),
            kind,
            success,
            warning,
        });
        adapted
    }

    fn walk(&mut self, location: &str, key: Option<&str>, value: &ConfigValue) -> ConfigValue {
        match value {
            ConfigValue::String(text) => ConfigValue::String(self.adapt_string(location, key, text)),
            ConfigValue::Sequence(items) => ConfigValue::Sequence(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| self.walk(&join(location, &index.to_string()), key, item))
                    .collect(),
            ),
            ConfigValue::Map(map) => {
                let mut adapted = ConfigMap::new();
                for (child_key, child) in map {
                    let child_location = join(location, child_key);
                    let value = if SERVICE_KEYS.contains(&child_key.as_str()) && child.as_map().is_some() {
                        self.services(&child_location, child)
                    } else {
                        self.walk(&child_location, Some(child_key), child)
                    };
                    adapted.insert(child_key.clone(), value);
                }
                ConfigValue::Map(adapted)
            }
            other => other.clone(),
        }
    }

    fn services(&mut self, location: &str, services: &ConfigValue) -> ConfigValue {
        let Some(map) = services.as_map() else {
            return services.clone();
        };

        let mut adapted = ConfigMap::new();
        for (name, definition) in map {
            let service_location = join(location, name);
            adapted.insert(name.clone(), self.service(&service_location, definition));
        }
        ConfigValue::Map(adapted)
    }

    fn service(&mut self, location: &str, definition: &ConfigValue) -> ConfigValue {
        let Some(fields) = definition.as_map() else {
            return definition.clone();
        };

        let mut adapted = ConfigMap::new();
        for (key, value) in fields {
            let field_location = join(location, key);
            let value = match (key.as_str(), value) {
                ("command", ConfigValue::String(command)) if is_interpreter(command) => value.clone(),
                ("command" | "cwd", _) => self.walk(&field_location, Some(key), value),
                ("args", _) => self.walk(&field_location, Some("args"), value),
                ("env", ConfigValue::Map(env)) => {
                    let mut vars = ConfigMap::new();
                    for (name, var) in env {
                        vars.insert(name.clone(), self.walk(&join(&field_location, name), Some(name), var));
                    }
                    ConfigValue::Map(vars)
                }
                _ => value.clone(),
            };
            adapted.insert(key.clone(), value);
        }
        self.rewrap_launcher(location, &mut adapted);
        ConfigValue::Map(adapted)
    }

    /// Windows runs npm-style launchers through `cmd /c`; add or strip that
    /// wrapper when a definition crosses between Windows and POSIX.
    fn rewrap_launcher(&mut self, location: &str, fields: &mut ConfigMap) {
        let command = fields.get("command").and_then(ConfigValue::as_str).map(str::to_string);
        let Some(command) = command else {
            return;
        };
        let mut args: Vec<ConfigValue> = fields
            .get("args")
            .and_then(ConfigValue::as_sequence)
            .map(<[ConfigValue]>::to_vec)
            .unwrap_or_default();

        if self.source.is_windows() && !self.target.platform.is_windows() {
            let wrapped = command.eq_ignore_ascii_case("cmd")
                && args
                    .first()
                    .and_then(ConfigValue::as_str)
                    .is_some_and(|flag| flag.eq_ignore_ascii_case("/c"));
            let inner = args.get(1).and_then(ConfigValue::as_str).map(str::to_string);
            if let (true, Some(inner)) = (wrapped, inner) {
                args = args.split_off(2);
                fields.insert("command".to_string(), ConfigValue::String(inner.clone()));
                fields.insert("args".to_string(), ConfigValue::Sequence(args));
                self.warnings
                    .push(format!("{location}: removed 'cmd /c' wrapper around '{inner}'"));
            }
        } else if !self.source.is_windows()
            && self.target.platform.is_windows()
            && CMD_WRAPPED.contains(&command.as_str())
        {
            let mut wrapped = vec![ConfigValue::from("/c"), ConfigValue::String(command.clone())];
            wrapped.append(&mut args);
            fields.insert("command".to_string(), ConfigValue::from("cmd"));
            fields.insert("args".to_string(), ConfigValue::Sequence(wrapped));
            self.warnings
                .push(format!("{location}: wrapped '{command}' in 'cmd /c' for Windows"));
        }
    }
}

fn join(location: &str, segment: &str) -> String {
    if location.is_empty() {
        segment.to_string()
    } else {
        format!("{location}.{segment}")
    }
}

/// Rewrite every path-like string in `tree` from `source` conventions to
/// the target's. Identical platforms return an untouched copy.
pub fn adapt(tree: &ConfigValue, source: Platform, target: &PlatformContext) -> Adaptation {
    if source == target.platform {
        return Adaptation::identity(tree);
    }

    let mut adapter = Adapter::new(source, target);
    let value = adapter.walk("", None, tree);
    adapter.finish(value)
}

/// Adapt a map of named service definitions: command, arguments, working
/// directory and environment values of each service.
pub fn adapt_service_definitions(
    services: &ConfigValue,
    source: Platform,
    target: &PlatformContext,
) -> Adaptation {
    if source == target.platform {
        return Adaptation::identity(services);
    }

    let mut adapter = Adapter::new(source, target);
    let value = adapter.services("", services);
    adapter.finish(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tree(json: serde_json::Value) -> ConfigValue {
        ConfigValue::from_json(json)
    }

    fn linux() -> PlatformContext {
        PlatformContext::new(Platform::Linux, "/home/bob")
    }

    fn windows() -> PlatformContext {
        PlatformContext::new(Platform::Windows, "C:\\Users\\bob")
    }

    #[rstest]
    #[case("C:\\Users\\X", Some(PathKind::Absolute))]
    #[case("C:/Users/X", Some(PathKind::Absolute))]
    #[case("/usr/local/bin/node", Some(PathKind::Absolute))]
    #[case("~/.claude", Some(PathKind::Absolute))]
    #[case("%USERPROFILE%\\.claude", Some(PathKind::EnvironmentVariable))]
    #[case("$HOME/.codex", Some(PathKind::EnvironmentVariable))]
    #[case("${HOME}/.codex", Some(PathKind::EnvironmentVariable))]
    #[case("./scripts/run.sh", Some(PathKind::Relative))]
    #[case("scripts\\run.cmd", Some(PathKind::Relative))]
    #[case("C:\\tools/bin", Some(PathKind::Ambiguous))]
    #[case("https://api.anthropic.com/v1", None)]
    #[case("@modelcontextprotocol/server-filesystem", None)]
    #[case("anthropic/claude-sonnet-4", None)]
    #[case("application/json", None)]
    #[case("opus", None)]
    #[case("", None)]
    fn classification(#[case] value: &str, #[case] expected: Option<PathKind>) {
        assert_eq!(classify(value), expected);
    }

    #[rstest]
    #[case(Platform::Windows)]
    #[case(Platform::Macos)]
    #[case(Platform::Linux)]
    #[case(Platform::Wsl)]
    fn same_platform_is_identity(#[case] platform: Platform) {
        let input = tree(serde_json::json!({
            "statusLine": { "command": "C:\\tools\\status.exe" },
            "paths": ["~/x", "/usr/bin", "%APPDATA%\\x"]
        }));
        let ctx = PlatformContext::new(platform, "/home/bob");
        let result = adapt(&input, platform, &ctx);

        assert_eq!(result.value, input);
        assert!(result.mappings.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn drive_paths_map_to_mounted_form() {
        let input = tree(serde_json::json!({ "outputDir": "C:\\Users\\X\\exports" }));
        let result = adapt(&input, Platform::Windows, &linux());

        assert_eq!(result.value.get("outputDir"), Some(&ConfigValue::from("/c/Users/X/exports")));
        assert_eq!(result.mappings.len(), 1);
        assert_eq!(result.mappings[0].kind, PathKind::Absolute);
        assert_eq!(result.mappings[0].location, "outputDir");
        assert!(result.mappings[0].warning.is_none());
    }

    #[test]
    fn wsl_uses_mnt_prefix() {
        let ctx = PlatformContext::new(Platform::Wsl, "/home/bob");
        let input = tree(serde_json::json!({ "dir": "D:\\work" }));
        let result = adapt(&input, Platform::Windows, &ctx);
        assert_eq!(result.value.get("dir"), Some(&ConfigValue::from("/mnt/d/work")));
    }

    #[test]
    fn home_tokens_swap_between_families() {
        let input = tree(serde_json::json!({ "a": "%USERPROFILE%\\.claude\\agents" }));
        let to_posix = adapt(&input, Platform::Windows, &linux());
        assert_eq!(to_posix.value.get("a"), Some(&ConfigValue::from("$HOME/.claude/agents")));
        assert_eq!(to_posix.mappings[0].kind, PathKind::EnvironmentVariable);
        assert!(to_posix.warnings.is_empty());

        let back = adapt(&to_posix.value, Platform::Linux, &windows());
        assert_eq!(back.value, input);
    }

    #[test]
    fn unknown_env_tokens_are_flagged() {
        let input = tree(serde_json::json!({ "cache": "%APPDATA%\\cache" }));
        let result = adapt(&input, Platform::Windows, &linux());
        assert_eq!(result.value.get("cache"), Some(&ConfigValue::from("$APPDATA/cache")));
        assert_eq!(result.warnings.len(), 1);

        let with_env = linux().with_env("APPDATA", "/home/bob/.local/share");
        let result = adapt(&input, Platform::Windows, &with_env);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn home_shorthand_expands_against_target() {
        let input = tree(serde_json::json!({ "dir": "~/.claude/commands" }));
        let result = adapt(&input, Platform::Macos, &linux());
        assert_eq!(result.value.get("dir"), Some(&ConfigValue::from("/home/bob/.claude/commands")));

        let result = adapt(&input, Platform::Linux, &windows());
        assert_eq!(
            result.value.get("dir"),
            Some(&ConfigValue::from("C:\\Users\\bob\\.claude\\commands"))
        );
    }

    #[test]
    fn posix_root_paths_cannot_map_to_windows() {
        let input = tree(serde_json::json!({ "log": "/var/log/claude.log" }));
        let result = adapt(&input, Platform::Linux, &windows());
        assert_eq!(result.value.get("log"), Some(&ConfigValue::from("\\var\\log\\claude.log")));
        assert!(!result.mappings[0].success);
        assert!(result.mappings[0].warning.is_some());
    }

    #[test]
    fn unambiguous_paths_round_trip() {
        let input = tree(serde_json::json!({
            "a": "C:\\Users\\X\\project",
            "b": "%USERPROFILE%\\.codex",
            "c": ["D:\\data", ".\\scripts\\run.cmd"]
        }));
        let there = adapt(&input, Platform::Windows, &linux());
        let back = adapt(&there.value, Platform::Linux, &windows());
        assert_eq!(back.value, input);
    }

    #[rstest]
    #[case("C:", "/c")]
    #[case("C:\\", "/c/")]
    fn bare_drives_round_trip(#[case] drive: &str, #[case] mounted: &str) {
        let input = tree(serde_json::json!({ "root": drive }));
        let there = adapt(&input, Platform::Windows, &linux());
        assert_eq!(there.value.get("root"), Some(&ConfigValue::from(mounted)));

        let back = adapt(&there.value, Platform::Linux, &windows());
        assert_eq!(back.value, input);
    }

    #[test]
    fn mixed_separators_always_warn() {
        let input = tree(serde_json::json!({ "dir": "C:\\tools/bin" }));
        let result = adapt(&input, Platform::Windows, &linux());
        assert_eq!(result.mappings[0].kind, PathKind::Ambiguous);
        assert!(result.mappings[0].warning.is_some());
        assert_eq!(result.value.get("dir"), Some(&ConfigValue::from("/c/tools/bin")));
    }

    #[test]
    fn executable_keys_are_flagged_for_review() {
        let input = tree(serde_json::json!({ "statusLine": { "command": "C:\\tools\\status.exe" } }));
        let result = adapt(&input, Platform::Windows, &linux());
        assert_eq!(
            result.value.pointer("statusLine.command"),
            Some(&ConfigValue::from("/c/tools/status.exe"))
        );
        assert!(result.mappings[0].warning.as_deref().unwrap().contains("executable"));
    }

    #[test]
    fn service_definitions_adapt_command_args_and_env() {
        let services = tree(serde_json::json!({
            "fs": {
                "command": "C:\\tools\\node.exe",
                "args": ["C:\\mcp\\fs\\index.js", "--root", "%USERPROFILE%\\code"],
                "env": { "LOG_DIR": "C:\\logs" },
                "type": "stdio"
            },
            "ctx7": { "command": "npx", "args": ["-y", "@upstash/context7-mcp"] }
        }));

        let result = adapt_service_definitions(&services, Platform::Windows, &linux());

        assert_eq!(result.value.pointer("fs.command"), Some(&ConfigValue::from("/c/tools/node.exe")));
        let args = result.value.pointer("fs.args").unwrap().as_sequence().unwrap();
        assert_eq!(args[0], ConfigValue::from("/c/mcp/fs/index.js"));
        assert_eq!(args[1], ConfigValue::from("--root"));
        assert_eq!(args[2], ConfigValue::from("$HOME/code"));
        assert_eq!(result.value.pointer("fs.env.LOG_DIR"), Some(&ConfigValue::from("/c/logs")));
        assert_eq!(result.value.pointer("fs.type"), Some(&ConfigValue::from("stdio")));
        assert_eq!(result.value.get("ctx7"), services.get("ctx7"));

        let command = result
            .mappings
            .iter()
            .find(|mapping| mapping.location == "fs.command")
            .unwrap();
        assert!(command.warning.is_some());
    }

    #[test]
    fn cmd_wrapper_is_removed_leaving_windows() {
        let services = tree(serde_json::json!({
            "ctx7": { "command": "cmd", "args": ["/c", "npx", "-y", "@upstash/context7-mcp"] }
        }));
        let result = adapt_service_definitions(&services, Platform::Windows, &linux());
        assert_eq!(result.value.pointer("ctx7.command"), Some(&ConfigValue::from("npx")));
        assert_eq!(
            result.value.pointer("ctx7.args"),
            Some(&tree(serde_json::json!(["-y", "@upstash/context7-mcp"])))
        );

        let back = adapt_service_definitions(&result.value, Platform::Linux, &windows());
        assert_eq!(back.value, services);
    }

    #[test]
    fn nested_service_maps_are_recognized_by_adapt() {
        let input = tree(serde_json::json!({
            "mcpServers": { "fs": { "command": "C:\\tools\\node.exe" } }
        }));
        let result = adapt(&input, Platform::Windows, &linux());
        assert_eq!(
            result.value.pointer("mcpServers.fs.command"),
            Some(&ConfigValue::from("/c/tools/node.exe"))
        );
        assert_eq!(result.mappings[0].location, "mcpServers.fs.command");
    }

    #[test]
    fn interpreters_are_never_rewritten() {
        assert!(is_interpreter("node"));
        assert!(is_interpreter("NPX.CMD"));
        assert!(is_interpreter("python3.exe"));
        assert!(!is_interpreter("C:\\tools\\node.exe"));
    }
}
