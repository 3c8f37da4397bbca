// Command-line surface
pub mod cli;
pub mod commands;
pub mod ui;

// Engine
pub mod backup;
pub mod error;
pub mod exporter;
pub mod importer;
pub mod layout;
pub mod manifest;
pub mod merge;
pub mod package;
pub mod paths;
pub mod platform;
pub mod sanitize;
pub mod validator;
pub mod value;

// Local state
mod config;
mod util;
mod workspace;

pub use backup::{BackupProvider, TimestampedBackups};
pub use config::Config;
pub use error::PortError;
pub use exporter::{ExportOptions, ExportResult};
pub use importer::{ImportOptions, ImportResult, Importer};
pub use manifest::ExportMetadata;
pub use merge::MergeStrategy;
pub use platform::{Platform, PlatformContext};
pub use validator::ValidationReport;
pub use value::ConfigValue;
pub use workspace::{Workspace, WorkspacePath};
