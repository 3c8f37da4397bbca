//! Conflict-aware merging of existing and incoming configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::package::checksum;
use crate::value::{ConfigMap, ConfigValue};

const SERVICE_KEYS: &[&str] = &["mcpServers", "mcp_servers"];
const PROFILES_KEY: &str = "profiles";
const CURRENT_PROFILE_KEY: &str = "currentProfile";

/// How incoming values interact with existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Incoming wins entirely
    Replace,
    /// Deep merge, incoming wins conflicting values
    #[default]
    Merge,
    /// Existing wins; incoming only fills absent keys
    SkipExisting,
}

impl MergeStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeStrategy::Replace => "replace",
            MergeStrategy::Merge => "merge",
            MergeStrategy::SkipExisting => "skip-existing",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resolution {
    KeepExisting,
    UseIncoming,
    NeedsManualReview,
}

/// Which merge variant produced a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictCategory {
    Settings,
    McpService,
    Profile,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigConflict {
    pub category: ConflictCategory,
    /// Dot path, service id, profile name or archive path
    pub name: String,
    pub existing: ConfigValue,
    pub incoming: ConfigValue,
    pub suggested: Resolution,
}

impl ConfigConflict {
    fn new(
        category: ConflictCategory,
        name: impl Into<String>,
        existing: &ConfigValue,
        incoming: &ConfigValue,
        suggested: Resolution,
    ) -> Self {
        Self {
            category,
            name: name.into(),
            existing: existing.clone(),
            incoming: incoming.clone(),
            suggested,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub merged: ConfigValue,
    pub conflicts: Vec<ConfigConflict>,
    pub warnings: Vec<String>,
}

impl MergeOutcome {
    fn clean(merged: ConfigValue) -> Self {
        Self {
            merged,
            conflicts: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Merge general settings: object-valued keys recurse, every other
/// differing value is a single conflict.
pub fn merge(existing: &ConfigValue, incoming: &ConfigValue, strategy: MergeStrategy) -> MergeOutcome {
    let mut conflicts = Vec::new();
    let merged = merge_tree(existing, incoming, strategy, "", &mut conflicts);
    MergeOutcome {
        merged,
        conflicts,
        warnings: Vec::new(),
    }
}

fn merge_tree(
    existing: &ConfigValue,
    incoming: &ConfigValue,
    strategy: MergeStrategy,
    path: &str,
    conflicts: &mut Vec<ConfigConflict>,
) -> ConfigValue {
    if strategy == MergeStrategy::Replace {
        return incoming.clone();
    }

    match (existing, incoming) {
        (ConfigValue::Map(current), ConfigValue::Map(other)) => {
            let mut merged = current.clone();
            for (key, value) in other {
                let child = match current.get(key) {
                    Some(present) => merge_tree(present, value, strategy, &join(path, key), conflicts),
                    None => value.clone(),
                };
                merged.insert(key.clone(), child);
            }
            ConfigValue::Map(merged)
        }
        _ if existing == incoming => existing.clone(),
        _ if strategy == MergeStrategy::SkipExisting => existing.clone(),
        _ => {
            let shape_changed = matches!(existing, ConfigValue::Map(_)) != matches!(incoming, ConfigValue::Map(_));
            let suggested = if shape_changed {
                Resolution::NeedsManualReview
            } else {
                Resolution::UseIncoming
            };
            debug!(path, existing = %existing.summary(), incoming = %incoming.summary(), "Setting conflict");
            conflicts.push(ConfigConflict::new(
                ConflictCategory::Settings,
                path,
                existing,
                incoming,
                suggested,
            ));
            incoming.clone()
        }
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Merge a map of named service definitions keyed by service id. A
/// service that differs in any way is one conflict.
pub fn merge_services(existing: &ConfigValue, incoming: &ConfigValue, strategy: MergeStrategy) -> MergeOutcome {
    let (Some(current), Some(other)) = (existing.as_map(), incoming.as_map()) else {
        return merge(existing, incoming, strategy);
    };
    if strategy == MergeStrategy::Replace {
        return MergeOutcome::clean(incoming.clone());
    }

    let mut merged = current.clone();
    let mut conflicts = Vec::new();
    for (name, definition) in other {
        match current.get(name) {
            None => {
                merged.insert(name.clone(), definition.clone());
            }
            Some(present) if present == definition => {}
            Some(_) if strategy == MergeStrategy::SkipExisting => {}
            Some(present) => {
                conflicts.push(ConfigConflict::new(
                    ConflictCategory::McpService,
                    name,
                    present,
                    definition,
                    Resolution::UseIncoming,
                ));
                merged.insert(name.clone(), definition.clone());
            }
        }
    }

    MergeOutcome {
        merged: ConfigValue::Map(merged),
        conflicts,
        warnings: Vec::new(),
    }
}

/// Profiles as a list of `{ "name": ... }` objects or a map keyed by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProfileShape {
    List,
    Map,
}

fn profile_entries(profiles: &ConfigValue) -> Option<(ProfileShape, Vec<(String, ConfigValue)>)> {
    match profiles {
        ConfigValue::Map(map) => Some((
            ProfileShape::Map,
            map.iter().map(|(name, profile)| (name.clone(), profile.clone())).collect(),
        )),
        ConfigValue::Sequence(items) => Some((
            ProfileShape::List,
            items
                .iter()
                .enumerate()
                .map(|(index, profile)| {
                    let name = profile
                        .get("name")
                        .and_then(ConfigValue::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("#{index}"));
                    (name, profile.clone())
                })
                .collect(),
        )),
        _ => None,
    }
}

fn rebuild_profiles(shape: ProfileShape, entries: Vec<(String, ConfigValue)>) -> ConfigValue {
    match shape {
        ProfileShape::List => ConfigValue::Sequence(entries.into_iter().map(|(_, profile)| profile).collect()),
        ProfileShape::Map => ConfigValue::Map(entries.into_iter().collect::<ConfigMap>()),
    }
}

/// Merge credential profiles keyed by name. The profile named by
/// `default_profile` is never dropped, whatever the strategy.
pub fn merge_profiles(
    existing: Option<&ConfigValue>,
    incoming: Option<&ConfigValue>,
    strategy: MergeStrategy,
    default_profile: Option<&str>,
) -> MergeOutcome {
    let current = existing.and_then(profile_entries);
    let other = incoming.and_then(profile_entries);

    let (shape, current, other) = match (current, other) {
        (Some((_, current)), Some((shape, other))) => (shape, current, other),
        (None, Some((shape, other))) => (shape, Vec::new(), other),
        (Some((shape, current)), None) => (shape, current, Vec::new()),
        (None, None) => {
            let fallback = incoming.or(existing).cloned().unwrap_or(ConfigValue::Null);
            return MergeOutcome::clean(fallback);
        }
    };

    let mut conflicts = Vec::new();
    let mut warnings = Vec::new();
    let mut merged: Vec<(String, ConfigValue)>;

    match strategy {
        MergeStrategy::Replace => {
            merged = other;
            let retained = default_profile.and_then(|default| {
                let missing = !merged.iter().any(|(name, _)| name == default);
                current.iter().find(|(name, _)| missing && name == default).cloned()
            });
            if let Some((name, profile)) = retained {
                warnings.push(format!(
                    "default profile '{name}' is not in the package; kept the existing one"
                ));
                merged.push((name, profile));
            }
        }
        MergeStrategy::SkipExisting | MergeStrategy::Merge => {
            merged = current.clone();
            for (name, profile) in other {
                match merged.iter_mut().find(|(present, _)| *present == name) {
                    None => merged.push((name, profile)),
                    Some((_, present)) if *present == profile => {}
                    Some(_) if strategy == MergeStrategy::SkipExisting => {}
                    Some((_, present)) => {
                        let suggested = if default_profile == Some(name.as_str()) {
                            Resolution::NeedsManualReview
                        } else {
                            Resolution::UseIncoming
                        };
                        conflicts.push(ConfigConflict::new(
                            ConflictCategory::Profile,
                            &name,
                            present,
                            &profile,
                            suggested,
                        ));
                        *present = profile;
                    }
                }
            }
        }
    }

    MergeOutcome {
        merged: rebuild_profiles(shape, merged),
        conflicts,
        warnings,
    }
}

/// Merge one whole config document: service maps and profiles use their
/// keyed variants, everything else the general settings merge.
pub fn merge_document(existing: &ConfigValue, incoming: &ConfigValue, strategy: MergeStrategy) -> MergeOutcome {
    let (Some(current), Some(other)) = (existing.as_map(), incoming.as_map()) else {
        return merge(existing, incoming, strategy);
    };

    let is_keyed = |key: &str| SERVICE_KEYS.contains(&key) || key == PROFILES_KEY;
    let split = |map: &ConfigMap| {
        ConfigValue::Map(
            map.iter()
                .filter(|(key, _)| !is_keyed(key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    };

    let mut outcome = merge(&split(current), &split(other), strategy);

    for key in SERVICE_KEYS {
        let services = match (current.get(*key), other.get(*key)) {
            (Some(present), Some(services)) => {
                let merged = merge_services(present, services, strategy);
                outcome.conflicts.extend(merged.conflicts);
                Some(merged.merged)
            }
            (Some(present), None) if strategy != MergeStrategy::Replace => Some(present.clone()),
            (_, services) => services.cloned(),
        };
        if let (Some(services), Some(map)) = (services, outcome.merged.as_map_mut()) {
            map.insert(key.to_string(), services);
        }
    }

    if current.contains_key(PROFILES_KEY) || other.contains_key(PROFILES_KEY) {
        let default_profile = current.get(CURRENT_PROFILE_KEY).and_then(ConfigValue::as_str);
        let profiles = merge_profiles(current.get(PROFILES_KEY), other.get(PROFILES_KEY), strategy, default_profile);
        let retained_default = !profiles.warnings.is_empty();
        outcome.conflicts.extend(profiles.conflicts);
        outcome.warnings.extend(profiles.warnings);
        if let Some(map) = outcome.merged.as_map_mut() {
            map.insert(PROFILES_KEY.to_string(), profiles.merged);
            if let (true, Some(default)) = (retained_default, default_profile) {
                map.entry(CURRENT_PROFILE_KEY.to_string())
                    .or_insert_with(|| ConfigValue::from(default));
            }
        }
    }

    let sources = match strategy {
        MergeStrategy::Replace => [other, current],
        MergeStrategy::Merge | MergeStrategy::SkipExisting => [current, other],
    };
    if let Some(map) = outcome.merged.as_map_mut() {
        restore_key_order(map, sources);
    }

    outcome
}

/// Keyed sections are merged apart from the rest and re-inserted at the
/// end; put every top-level key back where the first source had it, with
/// keys only the second source has after those.
fn restore_key_order(map: &mut ConfigMap, sources: [&ConfigMap; 2]) {
    let [first, second] = sources;
    let rank = |key: &str| {
        first
            .get_index_of(key)
            .or_else(|| second.get_index_of(key).map(|index| first.len() + index))
            .unwrap_or(usize::MAX)
    };
    map.sort_by(|a, _, b, _| rank(a).cmp(&rank(b)));
}

/// What to do with a non-structured file on import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDecision {
    Write,
    Keep,
}

/// Decide how an opaque file (markdown workflow, agent definition) lands on
/// top of an existing copy. Merge reports differing content as a conflict.
pub fn merge_file(
    name: &str,
    existing: Option<&[u8]>,
    incoming: &[u8],
    strategy: MergeStrategy,
) -> (FileDecision, Option<ConfigConflict>) {
    let Some(existing) = existing else {
        return (FileDecision::Write, None);
    };
    if existing == incoming {
        return (FileDecision::Keep, None);
    }

    match strategy {
        MergeStrategy::SkipExisting => (FileDecision::Keep, None),
        MergeStrategy::Replace => (FileDecision::Write, None),
        MergeStrategy::Merge => {
            let conflict = ConfigConflict::new(
                ConflictCategory::File,
                name,
                &ConfigValue::from(checksum(existing)),
                &ConfigValue::from(checksum(incoming)),
                Resolution::UseIncoming,
            );
            (FileDecision::Write, Some(conflict))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn tree(json: serde_json::Value) -> ConfigValue {
        ConfigValue::from_json(json)
    }

    fn settings_pair() -> (ConfigValue, ConfigValue) {
        (
            tree(json!({ "a": 1, "b": { "c": 2, "d": 3 }, "e": [1], "keep": true })),
            tree(json!({ "a": 2, "b": { "c": 2, "d": 4, "f": 5 }, "e": [2], "g": 1 })),
        )
    }

    #[test]
    fn replace_never_reports_conflicts() {
        let (existing, incoming) = settings_pair();
        let outcome = merge(&existing, &incoming, MergeStrategy::Replace);
        assert_eq!(outcome.merged, incoming);
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn merge_reports_each_differing_value_once() {
        let (existing, incoming) = settings_pair();
        let outcome = merge(&existing, &incoming, MergeStrategy::Merge);

        let mut names: Vec<_> = outcome.conflicts.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, ["a", "b.d", "e"]);
        assert!(outcome
            .conflicts
            .iter()
            .all(|conflict| conflict.suggested == Resolution::UseIncoming));

        assert_eq!(outcome.merged.pointer("a"), Some(&ConfigValue::Integer(2)));
        assert_eq!(outcome.merged.pointer("b.d"), Some(&ConfigValue::Integer(4)));
        assert_eq!(outcome.merged.pointer("b.f"), Some(&ConfigValue::Integer(5)));
        assert_eq!(outcome.merged.pointer("keep"), Some(&ConfigValue::Bool(true)));
        assert_eq!(outcome.merged.pointer("g"), Some(&ConfigValue::Integer(1)));
    }

    #[test]
    fn skip_existing_only_fills_absent_keys() {
        let (existing, incoming) = settings_pair();
        let outcome = merge(&existing, &incoming, MergeStrategy::SkipExisting);

        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.merged.pointer("a"), Some(&ConfigValue::Integer(1)));
        assert_eq!(outcome.merged.pointer("b.d"), Some(&ConfigValue::Integer(3)));
        assert_eq!(outcome.merged.pointer("b.f"), Some(&ConfigValue::Integer(5)));
        assert_eq!(outcome.merged.pointer("g"), Some(&ConfigValue::Integer(1)));
    }

    #[test]
    fn shape_change_needs_review() {
        let existing = tree(json!({ "hooks": { "pre": "x" } }));
        let incoming = tree(json!({ "hooks": "none" }));
        let outcome = merge(&existing, &incoming, MergeStrategy::Merge);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].suggested, Resolution::NeedsManualReview);
    }

    #[test]
    fn merge_is_idempotent() {
        let (existing, incoming) = settings_pair();
        let once = merge(&existing, &incoming, MergeStrategy::Merge).merged;
        let twice = merge(&once, &incoming, MergeStrategy::Merge);
        assert_eq!(twice.merged, once);
        assert!(twice.conflicts.is_empty());
    }

    #[test]
    fn one_conflict_per_differing_service() {
        let existing = tree(json!({
            "fs": { "command": "node", "args": ["a"], "env": { "X": "1" } },
            "git": { "command": "uvx" }
        }));
        let incoming = tree(json!({
            "fs": { "command": "bun", "args": ["b"], "env": { "X": "2" } },
            "git": { "command": "uvx" },
            "new": { "command": "npx" }
        }));

        let outcome = merge_services(&existing, &incoming, MergeStrategy::Merge);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].name, "fs");
        assert_eq!(outcome.conflicts[0].category, ConflictCategory::McpService);
        assert_eq!(outcome.merged.get("fs"), incoming.get("fs"));
        assert!(outcome.merged.get("new").is_some());
    }

    #[test]
    fn skip_existing_keeps_default_profile_untouched() {
        let existing = tree(json!([
            { "name": "default", "apiKey": "sk-live", "baseUrl": "https://a" }
        ]));
        let incoming = tree(json!([
            { "name": "default", "apiKey": "sk-other", "baseUrl": "https://b" },
            { "name": "work", "apiKey": "sk-work" }
        ]));

        let outcome = merge_profiles(Some(&existing), Some(&incoming), MergeStrategy::SkipExisting, Some("default"));

        assert!(outcome.conflicts.is_empty());
        let profiles = outcome.merged.as_sequence().unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0], existing.as_sequence().unwrap()[0]);
        assert_eq!(profiles[1].get("name"), Some(&ConfigValue::from("work")));
    }

    #[test]
    fn merge_flags_changed_default_profile_for_review() {
        let existing = tree(json!({ "default": { "apiKey": "a" }, "work": { "apiKey": "w" } }));
        let incoming = tree(json!({ "default": { "apiKey": "b" }, "work": { "apiKey": "v" } }));

        let outcome = merge_profiles(Some(&existing), Some(&incoming), MergeStrategy::Merge, Some("default"));

        assert_eq!(outcome.conflicts.len(), 2);
        let default = outcome.conflicts.iter().find(|c| c.name == "default").unwrap();
        assert_eq!(default.suggested, Resolution::NeedsManualReview);
        assert_eq!(outcome.merged.pointer("default.apiKey"), Some(&ConfigValue::from("b")));
    }

    #[rstest]
    #[case(MergeStrategy::Replace)]
    #[case(MergeStrategy::Merge)]
    #[case(MergeStrategy::SkipExisting)]
    fn default_profile_is_never_dropped(#[case] strategy: MergeStrategy) {
        let existing = tree(json!([{ "name": "home", "apiKey": "sk-home" }]));
        let incoming = tree(json!([{ "name": "work", "apiKey": "sk-work" }]));

        let outcome = merge_profiles(Some(&existing), Some(&incoming), strategy, Some("home"));

        let names: Vec<_> = outcome
            .merged
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(|profile| profile.get("name").and_then(ConfigValue::as_str))
            .collect();
        assert!(names.contains(&"home"));
        assert!(names.contains(&"work"));
        if strategy == MergeStrategy::Replace {
            assert_eq!(outcome.warnings.len(), 1);
        }
    }

    #[test]
    fn document_merge_aggregates_categories() {
        let existing = tree(json!({
            "theme": "dark",
            "currentProfile": "default",
            "profiles": [{ "name": "default", "apiKey": "a" }],
            "mcpServers": { "fs": { "command": "node" } }
        }));
        let incoming = tree(json!({
            "theme": "light",
            "profiles": [{ "name": "default", "apiKey": "b" }],
            "mcpServers": { "fs": { "command": "bun" }, "git": { "command": "uvx" } }
        }));

        let outcome = merge_document(&existing, &incoming, MergeStrategy::Merge);

        let categories: Vec<_> = outcome.conflicts.iter().map(|c| c.category).collect();
        assert_eq!(outcome.conflicts.len(), 3);
        assert!(categories.contains(&ConflictCategory::Settings));
        assert!(categories.contains(&ConflictCategory::McpService));
        assert!(categories.contains(&ConflictCategory::Profile));
        assert_eq!(outcome.merged.pointer("currentProfile"), Some(&ConfigValue::from("default")));
        assert!(outcome.merged.pointer("mcpServers.git").is_some());
    }

    #[test]
    fn document_replace_keeps_existing_default_profile() {
        let existing = tree(json!({
            "currentProfile": "default",
            "profiles": [{ "name": "default", "apiKey": "a" }],
            "mcpServers": { "fs": { "command": "node" } }
        }));
        let incoming = tree(json!({ "theme": "light" }));

        let outcome = merge_document(&existing, &incoming, MergeStrategy::Replace);

        assert!(outcome.conflicts.is_empty());
        assert!(outcome.merged.get("mcpServers").is_none());
        assert_eq!(outcome.merged.get("currentProfile"), Some(&ConfigValue::from("default")));
        assert_eq!(outcome.merged.pointer("profiles.0.name"), Some(&ConfigValue::from("default")));
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn document_merge_keeps_existing_key_order() {
        let existing = tree(json!({
            "model": "opus",
            "mcpServers": { "fs": { "command": "node" } },
            "theme": "dark"
        }));
        let incoming = tree(json!({
            "theme": "light",
            "mcpServers": { "git": { "command": "uvx" } },
            "alwaysThinkingEnabled": true
        }));

        let outcome = merge_document(&existing, &incoming, MergeStrategy::Merge);

        let keys: Vec<&str> = outcome.merged.as_map().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["model", "mcpServers", "theme", "alwaysThinkingEnabled"]);
        let services: Vec<&str> = outcome
            .merged
            .get("mcpServers")
            .and_then(ConfigValue::as_map)
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(services, vec!["fs", "git"]);
    }

    #[rstest]
    #[case(MergeStrategy::SkipExisting, FileDecision::Keep, false)]
    #[case(MergeStrategy::Replace, FileDecision::Write, false)]
    #[case(MergeStrategy::Merge, FileDecision::Write, true)]
    fn opaque_files(#[case] strategy: MergeStrategy, #[case] decision: FileDecision, #[case] conflict: bool) {
        let (got, found) = merge_file("workflows/claude/fix.md", Some(b"old".as_slice()), b"new", strategy);
        assert_eq!(got, decision);
        assert_eq!(found.is_some(), conflict);

        let (got, found) = merge_file("workflows/claude/fix.md", None, b"new", strategy);
        assert_eq!(got, FileDecision::Write);
        assert!(found.is_none());

        let (got, found) = merge_file("workflows/claude/fix.md", Some(b"same".as_slice()), b"same", strategy);
        assert_eq!(got, FileDecision::Keep);
        assert!(found.is_none());
    }
}
