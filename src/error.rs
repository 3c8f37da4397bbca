use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the export/import engine.
///
/// Validation-stage variants (`Format`, `Integrity`, `Version`) are collected
/// into a [`crate::ValidationReport`] rather than propagated, so callers see
/// every problem with a package at once.
#[derive(Debug, Error)]
pub enum PortError {
    /// Archive unreadable, empty, or missing its manifest.
    #[error("invalid package {path:?}: {reason}")]
    Format { path: PathBuf, reason: String },

    /// Manifest present but not well-formed.
    #[error("failed to parse manifest: {0}")]
    Parse(String),

    /// Manifest lists a file that is absent from the archive.
    #[error("file listed in manifest is missing from archive: {path}")]
    Integrity { path: String },

    /// Manifest schema outside the supported range.
    #[error("unsupported manifest version {found} (supported {min}..={max})")]
    Version { found: u32, min: u32, max: u32 },

    /// A config file could not be merged while applying an import.
    #[error("failed to merge {path:?}: {reason}")]
    Merge { path: PathBuf, reason: String },

    #[error("{context} {path:?}: {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("unsafe archive path '{0}'")]
    InvalidPath(String),
}

pub type Result<T> = std::result::Result<T, PortError>;

impl PortError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        PortError::Io {
            context,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PortError::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Attach a path and a short description to `std::io` failures.
pub(crate) trait IoContext<T> {
    fn io_context(self, context: &'static str, path: &std::path::Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context(self, context: &'static str, path: &std::path::Path) -> Result<T> {
        self.map_err(|err| PortError::io(context, path, err))
    }
}
