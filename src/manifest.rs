use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PortError, Result};
use crate::layout::{ExportScope, FileCategory, ToolType};
use crate::platform::Platform;

/// Name of the manifest entry; always the first entry in a package.
pub const MANIFEST_NAME: &str = "manifest.json";

/// Manifest schema written by this engine.
pub const MANIFEST_VERSION: u32 = 1;

/// Oldest manifest schema this engine can import.
pub const MIN_SUPPORTED_VERSION: u32 = 1;

/// Package table of contents (`manifest.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    /// Manifest schema version
    pub version: u32,
    /// Version of the engine that produced the package
    #[serde(default)]
    pub engine_version: String,
    pub exported_at: DateTime<Utc>,
    /// Platform the package was exported from
    pub platform: Platform,
    pub tool_types: Vec<ToolType>,
    #[serde(default)]
    pub scope: ExportScope,
    /// True when the package carries unredacted credentials
    #[serde(default)]
    pub has_sensitive_data: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub files: Vec<ExportFileInfo>,
}

/// One packaged file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFileInfo {
    /// Archive-internal, forward-slash separated path
    pub path: String,
    pub category: FileCategory,
    pub size: u64,
    /// `sha256:<hex>` digest of the packaged bytes
    pub checksum: String,
    /// Whether sanitization redacted anything in this file
    #[serde(default)]
    pub sanitized: bool,
}

impl ExportMetadata {
    pub fn new(platform: Platform, tool_types: Vec<ToolType>, scope: ExportScope) -> Self {
        Self {
            version: MANIFEST_VERSION,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            platform,
            tool_types,
            scope,
            has_sensitive_data: false,
            description: None,
            files: Vec::new(),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|err| PortError::Parse(err.to_string()))
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn is_supported_version(&self) -> bool {
        (MIN_SUPPORTED_VERSION..=MANIFEST_VERSION).contains(&self.version)
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|file| file.size).sum()
    }

    pub fn file(&self, path: &str) -> Option<&ExportFileInfo> {
        self.files.iter().find(|file| file.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExportMetadata {
        let mut metadata =
            ExportMetadata::new(Platform::Windows, vec![ToolType::ClaudeCode], ExportScope::Settings);
        metadata.files.push(ExportFileInfo {
            path: "claude/settings.json".to_string(),
            category: FileCategory::Settings,
            size: 42,
            checksum: "sha256:00".to_string(),
            sanitized: true,
        });
        metadata
    }

    #[test]
    fn manifest_uses_camel_case_keys() {
        let json = String::from_utf8(sample().to_vec().unwrap()).unwrap();
        assert!(json.contains("\"toolTypes\""));
        assert!(json.contains("\"exportedAt\""));
        assert!(json.contains("\"claude-code\""));
        assert!(json.contains("\"category\": \"settings\""));
        assert!(!json.contains("description"));
    }

    #[test]
    fn manifest_parses_back() {
        let metadata = sample();
        let parsed = ExportMetadata::from_slice(&metadata.to_vec().unwrap()).unwrap();
        assert_eq!(parsed, metadata);
        assert_eq!(parsed.total_size(), 42);
        assert!(parsed.file("claude/settings.json").unwrap().sanitized);
    }

    #[test]
    fn malformed_manifest_is_parse_error() {
        let err = ExportMetadata::from_slice(b"{ not json").unwrap_err();
        assert!(matches!(err, PortError::Parse(_)));
    }

    #[test]
    fn version_range() {
        let mut metadata = sample();
        assert!(metadata.is_supported_version());
        metadata.version = MANIFEST_VERSION + 1;
        assert!(!metadata.is_supported_version());
        metadata.version = 0;
        assert!(!metadata.is_supported_version());
    }
}
