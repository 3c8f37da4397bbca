//! Credential redaction for packaged configuration.
//!
//! Structured files (JSON, TOML) are redacted through a fixed set of
//! [`SensitiveField`] rules evaluated over the [`ConfigValue`] tree. Flat
//! `key=value` text falls back to a best-effort pattern match on key names;
//! it catches the common spellings of "API key" and "auth token" and nothing
//! more.

use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::debug;

use crate::value::{ConfigValue, DocumentFormat};

pub const API_KEY_PLACEHOLDER: &str = "***REDACTED_API_KEY***";
pub const AUTH_TOKEN_PLACEHOLDER: &str = "***REDACTED_AUTH_TOKEN***";

/// A path into a configuration tree whose value must not leave the machine.
///
/// Paths are dot separated; a `*` segment matches every key of a map or
/// every element of a sequence at that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensitiveField {
    pub path: &'static str,
    pub placeholder: &'static str,
}

const fn field(path: &'static str, placeholder: &'static str) -> SensitiveField {
    SensitiveField { path, placeholder }
}

pub const SENSITIVE_FIELDS: &[SensitiveField] = &[
    field("env.ANTHROPIC_API_KEY", API_KEY_PLACEHOLDER),
    field("env.ANTHROPIC_AUTH_TOKEN", AUTH_TOKEN_PLACEHOLDER),
    field("primaryApiKey", API_KEY_PLACEHOLDER),
    field("profiles.*.apiKey", API_KEY_PLACEHOLDER),
    field("profiles.*.authToken", AUTH_TOKEN_PLACEHOLDER),
    field("OPENAI_API_KEY", API_KEY_PLACEHOLDER),
    field("tokens.*", AUTH_TOKEN_PLACEHOLDER),
    field("model_providers.*.experimental_bearer_token", AUTH_TOKEN_PLACEHOLDER),
    field("mcpServers.*.env.API_KEY", API_KEY_PLACEHOLDER),
    field("mcp_servers.*.env.API_KEY", API_KEY_PLACEHOLDER),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Key(&'a str),
    Any,
}

fn parse_pattern(path: &str) -> Vec<Segment<'_>> {
    path.split('.')
        .map(|segment| match segment {
            "*" => Segment::Any,
            key => Segment::Key(key),
        })
        .collect()
}

/// One concrete step of a resolved path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Key(String),
    Index(usize),
}

fn render_location(steps: &[Step]) -> String {
    steps
        .iter()
        .map(|step| match step {
            Step::Key(key) => key.clone(),
            Step::Index(index) => index.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Resolve a pattern to the concrete paths of every value it matches.
fn resolve(node: &ConfigValue, pattern: &[Segment<'_>], prefix: &mut Vec<Step>, out: &mut Vec<Vec<Step>>) {
    let Some((head, rest)) = pattern.split_first() else {
        out.push(prefix.clone());
        return;
    };

    match (head, node) {
        (Segment::Key(key), ConfigValue::Map(map)) => {
            if let Some(child) = map.get(*key) {
                prefix.push(Step::Key(key.to_string()));
                resolve(child, rest, prefix, out);
                prefix.pop();
            }
        }
        (Segment::Any, ConfigValue::Map(map)) => {
            for (key, child) in map {
                prefix.push(Step::Key(key.clone()));
                resolve(child, rest, prefix, out);
                prefix.pop();
            }
        }
        (Segment::Any, ConfigValue::Sequence(items)) => {
            for (index, child) in items.iter().enumerate() {
                prefix.push(Step::Index(index));
                resolve(child, rest, prefix, out);
                prefix.pop();
            }
        }
        _ => {}
    }
}

fn matches(node: &ConfigValue, rule: &SensitiveField) -> Vec<Vec<Step>> {
    let mut out = Vec::new();
    resolve(node, &parse_pattern(rule.path), &mut Vec::new(), &mut out);
    out
}

fn lookup<'a>(node: &'a ConfigValue, steps: &[Step]) -> Option<&'a ConfigValue> {
    steps.iter().try_fold(node, |node, step| match (step, node) {
        (Step::Key(key), ConfigValue::Map(map)) => map.get(key),
        (Step::Index(index), ConfigValue::Sequence(items)) => items.get(*index),
        _ => None,
    })
}

fn lookup_mut<'a>(node: &'a mut ConfigValue, steps: &[Step]) -> Option<&'a mut ConfigValue> {
    steps.iter().try_fold(node, |node, step| match (step, node) {
        (Step::Key(key), ConfigValue::Map(map)) => map.get_mut(key),
        (Step::Index(index), ConfigValue::Sequence(items)) => items.get_mut(*index),
        _ => None,
    })
}

/// Find the value in `existing` corresponding to `steps` in `incoming`.
///
/// Sequence elements carrying a `name` are paired by name rather than by
/// position, so reordered profile lists still line up.
fn counterpart<'a>(existing: &'a ConfigValue, incoming: &ConfigValue, steps: &[Step]) -> Option<&'a ConfigValue> {
    let mut local = existing;
    let mut remote = incoming;

    for step in steps {
        (local, remote) = match (step, local, remote) {
            (Step::Key(key), ConfigValue::Map(local_map), ConfigValue::Map(remote_map)) => {
                (local_map.get(key)?, remote_map.get(key)?)
            }
            (Step::Index(index), ConfigValue::Sequence(local_items), ConfigValue::Sequence(remote_items)) => {
                let remote_item = remote_items.get(*index)?;
                let local_item = match remote_item.get("name").and_then(ConfigValue::as_str) {
                    Some(name) => local_items
                        .iter()
                        .find(|item| item.get("name").and_then(ConfigValue::as_str) == Some(name))?,
                    None => local_items.get(*index)?,
                };
                (local_item, remote_item)
            }
            _ => return None,
        };
    }

    Some(local)
}

fn is_placeholder(value: &ConfigValue, rule: &SensitiveField) -> bool {
    value.as_str() == Some(rule.placeholder)
}

/// Only non-empty strings and numbers can hold a credential. `null` and
/// `""` mean "not configured" and are packaged as they are.
fn holds_secret(value: &ConfigValue) -> bool {
    match value {
        ConfigValue::String(text) => !text.is_empty(),
        ConfigValue::Integer(_) | ConfigValue::Unsigned(_) | ConfigValue::Float(_) => true,
        _ => false,
    }
}

/// Result of redacting a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Redaction {
    pub value: ConfigValue,
    /// Locations (dot paths) that were replaced by a placeholder.
    pub redacted: Vec<String>,
}

/// Replace every rule-matched value with its placeholder, reporting where.
pub fn redact(tree: &ConfigValue) -> Redaction {
    let mut value = tree.clone();
    let mut redacted = Vec::new();

    for rule in SENSITIVE_FIELDS {
        for steps in matches(tree, rule) {
            if let Some(slot) = lookup_mut(&mut value, &steps) {
                if holds_secret(slot) && !is_placeholder(slot, rule) {
                    *slot = ConfigValue::from(rule.placeholder);
                    redacted.push(render_location(&steps));
                }
            }
        }
    }

    Redaction { value, redacted }
}

/// Deep copy of `tree` with every sensitive value replaced by its placeholder.
pub fn sanitize(tree: &ConfigValue) -> ConfigValue {
    redact(tree).value
}

/// Whether any rule-matched value is present and not yet redacted.
pub fn detect(tree: &ConfigValue) -> bool {
    SENSITIVE_FIELDS.iter().any(|rule| {
        matches(tree, rule)
            .iter()
            .filter_map(|steps| lookup(tree, steps))
            .any(|value| holds_secret(value) && !is_placeholder(value, rule))
    })
}

/// Incoming tree with placeholders swapped back for the local machine's values.
#[derive(Debug, Clone, PartialEq)]
pub struct Reinstated {
    pub value: ConfigValue,
    /// Placeholders with no local value to restore.
    pub unresolved: Vec<String>,
}

/// Put real credentials from `existing` back wherever `incoming` still
/// carries a placeholder, so importing a sanitized package never overwrites
/// a live secret.
pub fn reinstate(incoming: &ConfigValue, existing: Option<&ConfigValue>) -> Reinstated {
    let mut value = incoming.clone();
    let mut unresolved = Vec::new();

    for rule in SENSITIVE_FIELDS {
        for steps in matches(incoming, rule) {
            let Some(slot) = lookup_mut(&mut value, &steps) else {
                continue;
            };
            if !is_placeholder(slot, rule) {
                continue;
            }

            match existing.and_then(|tree| counterpart(tree, incoming, &steps)) {
                Some(local) if holds_secret(local) && !is_placeholder(local, rule) => *slot = local.clone(),
                Some(local @ (ConfigValue::Null | ConfigValue::String(_))) if !holds_secret(local) => {
                    *slot = local.clone()
                }
                _ => unresolved.push(render_location(&steps)),
            }
        }
    }

    Reinstated { value, unresolved }
}

static CONFIG_FILE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(^|/)(settings(\.local)?\.json|\.claude\.json|profiles\.json|config\.toml|auth\.json|[^/]*\.env|\.env)$",
    )
    .expect("config file pattern compiles")
});

/// Whether a packaged path is one of the config files the sanitizer inspects.
pub fn is_config_file(path: &str) -> bool {
    CONFIG_FILE_PATTERN.is_match(path)
}

static SECRET_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?im)^(?P<prefix>\s*(?:export\s+)?["']?(?P<key>[a-z0-9_.-]*(?:api[_-]?key|auth[_-]?token|access[_-]?token|secret[_-]?key)[a-z0-9_.-]*)["']?\s*[=:]\s*)(?P<value>.*?)(?P<comma>,?)[ \t]*$"#,
    )
    .expect("secret assignment pattern compiles")
});

fn placeholder_for_key(key: &str) -> &'static str {
    if key.to_ascii_lowercase().contains("key") {
        API_KEY_PLACEHOLDER
    } else {
        AUTH_TOKEN_PLACEHOLDER
    }
}

/// Best-effort redaction of `key=value` / `key: value` lines.
pub fn sanitize_text(text: &str) -> (String, bool) {
    let mut changed = false;

    let output = SECRET_ASSIGNMENT.replace_all(text, |caps: &Captures<'_>| {
        let raw = &caps["value"];
        let quote = raw
            .chars()
            .next()
            .filter(|c| *c == '"' || *c == '\'')
            .map(String::from)
            .unwrap_or_default();
        let inner = raw.trim_matches(|c| c == '"' || c == '\'');
        let placeholder = placeholder_for_key(&caps["key"]);

        if inner.is_empty() || inner == API_KEY_PLACEHOLDER || inner == AUTH_TOKEN_PLACEHOLDER {
            return caps[0].to_string();
        }

        changed = true;
        format!("{}{quote}{placeholder}{quote}{}", &caps["prefix"], &caps["comma"])
    });

    (output.into_owned(), changed)
}

/// Packaged bytes for one file after sanitization.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedFile {
    pub data: Vec<u8>,
    pub redacted: bool,
}

/// Sanitize the contents of a packaged file.
///
/// Files that are not config files, or in which nothing is redacted, are
/// returned byte-for-byte unchanged.
pub fn sanitize_file(archive_path: &str, data: &[u8]) -> SanitizedFile {
    let unchanged = || SanitizedFile {
        data: data.to_vec(),
        redacted: false,
    };

    if !is_config_file(archive_path) {
        return unchanged();
    }
    let Ok(text) = std::str::from_utf8(data) else {
        return unchanged();
    };

    if let Some(format) = DocumentFormat::for_path(archive_path) {
        match format.parse(text) {
            Ok(tree) => {
                let redaction = redact(&tree);
                if redaction.redacted.is_empty() {
                    return unchanged();
                }
                match format.render(&redaction.value) {
                    Ok(rendered) => {
                        debug!(path = archive_path, fields = ?redaction.redacted, "Redacted sensitive fields");
                        return SanitizedFile {
                            data: rendered.into_bytes(),
                            redacted: true,
                        };
                    }
                    Err(err) => debug!(path = archive_path, %err, "Falling back to text redaction"),
                }
            }
            Err(err) => debug!(path = archive_path, %err, "Falling back to text redaction"),
        }
    }

    let (output, redacted) = sanitize_text(text);
    SanitizedFile {
        data: output.into_bytes(),
        redacted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tree(json: serde_json::Value) -> ConfigValue {
        ConfigValue::from_json(json)
    }

    fn sample() -> ConfigValue {
        tree(serde_json::json!({
            "env": {
                "ANTHROPIC_API_KEY": "sk-ant-123",
                "ANTHROPIC_BASE_URL": "https://api.example.com"
            },
            "profiles": [
                { "name": "default", "apiKey": "sk-1", "baseUrl": "https://a" },
                { "name": "work", "authToken": "tok-2" }
            ],
            "model": "opus"
        }))
    }

    #[test]
    fn sanitize_replaces_rule_matches_only() {
        let sanitized = sanitize(&sample());

        assert_eq!(
            sanitized.pointer("env.ANTHROPIC_API_KEY"),
            Some(&ConfigValue::from(API_KEY_PLACEHOLDER))
        );
        assert_eq!(
            sanitized.pointer("env.ANTHROPIC_BASE_URL"),
            Some(&ConfigValue::from("https://api.example.com"))
        );
        let profiles = sanitized.get("profiles").unwrap().as_sequence().unwrap();
        assert_eq!(profiles[0].get("apiKey"), Some(&ConfigValue::from(API_KEY_PLACEHOLDER)));
        assert_eq!(profiles[0].get("baseUrl"), Some(&ConfigValue::from("https://a")));
        assert_eq!(profiles[1].get("authToken"), Some(&ConfigValue::from(AUTH_TOKEN_PLACEHOLDER)));
        assert_eq!(profiles[1].get("apiKey"), None);
    }

    #[test]
    fn sanitize_does_not_mutate_input() {
        let original = sample();
        let copy = original.clone();
        let _ = sanitize(&original);
        assert_eq!(original, copy);
    }

    #[test]
    fn sanitize_is_idempotent_and_detect_clears() {
        let once = sanitize(&sample());
        let twice = sanitize(&once);
        assert_eq!(once, twice);
        assert!(detect(&sample()));
        assert!(!detect(&once));
        assert!(redact(&once).redacted.is_empty());
    }

    #[test]
    fn wildcard_fans_out_over_map_keys() {
        let auth = tree(serde_json::json!({
            "OPENAI_API_KEY": null,
            "tokens": { "access_token": "a", "refresh_token": "r" }
        }));
        let redaction = redact(&auth);
        let mut locations = redaction.redacted.clone();
        locations.sort();
        assert_eq!(locations, vec!["tokens.access_token", "tokens.refresh_token"]);
        assert_eq!(redaction.value.get("OPENAI_API_KEY"), Some(&ConfigValue::Null));
    }

    #[rstest]
    #[case(serde_json::Value::Null)]
    #[case(serde_json::json!(""))]
    fn unset_credentials_are_left_alone(#[case] unset: serde_json::Value) {
        let auth = tree(serde_json::json!({ "OPENAI_API_KEY": unset.clone() }));

        let redaction = redact(&auth);

        assert!(redaction.redacted.is_empty());
        assert_eq!(redaction.value, auth);
        assert!(!detect(&auth));

        let file = sanitize_file("codex/auth.json", &serde_json::to_vec(&auth.to_json()).unwrap());
        assert!(!file.redacted);
        let packaged: serde_json::Value = serde_json::from_slice(&file.data).unwrap();
        assert_eq!(packaged["OPENAI_API_KEY"], unset);
    }

    #[test]
    fn sanitized_file_keeps_key_order() {
        let raw = br#"{"model":"opus","env":{"ANTHROPIC_API_KEY":"sk-ant-1","DISABLE_TELEMETRY":"1"},"alwaysThinkingEnabled":true}"#;

        let result = sanitize_file("claude/settings.json", raw);

        assert!(result.redacted);
        let text = String::from_utf8(result.data).unwrap();
        let positions: Vec<usize> = ["\"model\"", "\"env\"", "\"ANTHROPIC_API_KEY\"", "\"DISABLE_TELEMETRY\"", "\"alwaysThinkingEnabled\""]
            .iter()
            .map(|key| text.find(key).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]), "{text}");
    }

    #[test]
    fn placeholder_over_unset_local_credential_restores_unset() {
        let incoming = tree(serde_json::json!({ "OPENAI_API_KEY": API_KEY_PLACEHOLDER }));
        let existing = tree(serde_json::json!({ "OPENAI_API_KEY": null }));

        let reinstated = reinstate(&incoming, Some(&existing));

        assert_eq!(reinstated.value.get("OPENAI_API_KEY"), Some(&ConfigValue::Null));
        assert!(reinstated.unresolved.is_empty());
    }

    #[test]
    fn detect_is_false_without_sensitive_values() {
        assert!(!detect(&tree(serde_json::json!({ "model": "opus", "env": {} }))));
    }

    #[test]
    fn reinstate_restores_local_credentials() {
        let incoming = sanitize(&sample());
        let existing = tree(serde_json::json!({
            "env": { "ANTHROPIC_API_KEY": "sk-local" },
            "profiles": [{ "name": "default", "apiKey": "sk-local-profile" }]
        }));

        let reinstated = reinstate(&incoming, Some(&existing));
        assert_eq!(
            reinstated.value.pointer("env.ANTHROPIC_API_KEY"),
            Some(&ConfigValue::from("sk-local"))
        );
        let profiles = reinstated.value.get("profiles").unwrap().as_sequence().unwrap();
        assert_eq!(profiles[0].get("apiKey"), Some(&ConfigValue::from("sk-local-profile")));
        assert_eq!(reinstated.unresolved, vec!["profiles.1.authToken".to_string()]);
    }

    #[test]
    fn reinstate_pairs_profiles_by_name() {
        let incoming = sanitize(&tree(serde_json::json!({
            "profiles": [
                { "name": "work", "apiKey": "remote-work" },
                { "name": "default", "apiKey": "remote-default" }
            ]
        })));
        let existing = tree(serde_json::json!({
            "profiles": [
                { "name": "default", "apiKey": "local-default" },
                { "name": "work", "apiKey": "local-work" }
            ]
        }));

        let reinstated = reinstate(&incoming, Some(&existing));
        let profiles = reinstated.value.get("profiles").unwrap().as_sequence().unwrap();
        assert_eq!(profiles[0].get("apiKey"), Some(&ConfigValue::from("local-work")));
        assert_eq!(profiles[1].get("apiKey"), Some(&ConfigValue::from("local-default")));
        assert!(reinstated.unresolved.is_empty());
    }

    #[test]
    fn reinstate_without_existing_reports_every_placeholder() {
        let incoming = sanitize(&sample());
        let reinstated = reinstate(&incoming, None);
        assert_eq!(reinstated.value, incoming);
        assert_eq!(reinstated.unresolved.len(), 3);
    }

    #[rstest]
    #[case("claude/settings.json", true)]
    #[case("claude/settings.local.json", true)]
    #[case("mcp/.claude.json", true)]
    #[case("claude/profiles.json", true)]
    #[case("codex/config.toml", true)]
    #[case("codex/auth.json", true)]
    #[case("claude/hooks/.env", true)]
    #[case("claude/hooks/prod.env", true)]
    #[case("claude/CLAUDE.md", false)]
    #[case("workflows/claude/settings.json.md", false)]
    #[case("claude/agents/planner.md", false)]
    fn config_file_patterns(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(is_config_file(path), expected);
    }

    #[test]
    fn text_redaction_handles_aliases() {
        let input = "ANTHROPIC_API_KEY=sk-1\nexport OPENAI_AUTH_TOKEN=\"tok\"\napiKey: 'k',\nMODEL=opus\n";
        let (output, changed) = sanitize_text(input);

        assert!(changed);
        assert!(output.contains(&format!("ANTHROPIC_API_KEY={API_KEY_PLACEHOLDER}")));
        assert!(output.contains(&format!("export OPENAI_AUTH_TOKEN=\"{AUTH_TOKEN_PLACEHOLDER}\"")));
        assert!(output.contains(&format!("apiKey: '{API_KEY_PLACEHOLDER}',")));
        assert!(output.contains("MODEL=opus"));

        let (again, changed_again) = sanitize_text(&output);
        assert!(!changed_again);
        assert_eq!(again, output);
    }

    #[test]
    fn sanitize_file_leaves_clean_files_untouched() {
        let raw = b"{\n  \"model\": \"opus\"\n}";
        let result = sanitize_file("claude/settings.json", raw);
        assert!(!result.redacted);
        assert_eq!(result.data, raw.to_vec());
    }

    #[test]
    fn sanitize_file_redacts_toml_structurally() {
        let raw = b"model = \"o3\"\n[model_providers.proxy]\nexperimental_bearer_token = \"abc\"\n";
        let result = sanitize_file("codex/config.toml", raw);
        assert!(result.redacted);
        let text = String::from_utf8(result.data).unwrap();
        assert!(text.contains(AUTH_TOKEN_PLACEHOLDER));
        assert!(!text.contains("abc"));
    }

    #[test]
    fn sanitize_file_falls_back_to_text_for_broken_json() {
        let raw = b"{\n  \"apiKey\": \"sk-1\",\n  oops\n}";
        let result = sanitize_file("claude/profiles.json", raw);
        assert!(result.redacted);
        assert!(!String::from_utf8(result.data).unwrap().contains("sk-1"));
    }

    #[test]
    fn non_config_files_pass_through() {
        let raw = b"API_KEY=secret";
        let result = sanitize_file("workflows/claude/notes.md", raw);
        assert!(!result.redacted);
        assert_eq!(result.data, raw.to_vec());
    }
}
