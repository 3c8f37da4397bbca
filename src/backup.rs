//! Pre-import backups and rollback.
//!
//! A backup directory mirrors the home-relative layout of every file the
//! import is about to touch. `backup.toml` records two lists: files that
//! existed and were copied, and files that did not exist yet. Rollback is
//! the diff of the two: copy the first list back, delete the second.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{IoContext, PortError, Result};
use crate::layout::HomeLayout;

pub const BACKUP_MANIFEST: &str = "backup.toml";

/// Supplies a fresh backup directory, or `None` when there is nothing to back up.
pub trait BackupProvider {
    fn prepare(&self) -> Result<Option<PathBuf>>;
}

/// Creates `backup_<YYYY-MM-DD_HH-MM-SS>` directories under a root.
#[derive(Debug, Clone)]
pub struct TimestampedBackups {
    root: PathBuf,
    layout: HomeLayout,
}

impl TimestampedBackups {
    pub fn new(root: impl Into<PathBuf>, layout: HomeLayout) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }
}

impl BackupProvider for TimestampedBackups {
    fn prepare(&self) -> Result<Option<PathBuf>> {
        if !self.layout.has_any_config() {
            debug!("No existing configuration, skipping backup");
            return Ok(None);
        }

        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let mut dir = self.root.join(format!("backup_{stamp}"));
        let mut attempt = 1;
        while dir.exists() {
            dir = self.root.join(format!("backup_{stamp}_{attempt}"));
            attempt += 1;
        }

        fs::create_dir_all(&dir).io_context("Failed to create backup directory", &dir)?;
        info!("Created backup directory {}", dir.display());
        Ok(Some(dir))
    }
}

/// Contents of `backup.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub created_at: DateTime<Utc>,
    /// Home-relative files copied into the backup
    #[serde(default)]
    pub backed_up: Vec<String>,
    /// Home-relative files that did not exist before the import
    #[serde(default)]
    pub created: Vec<String>,
}

impl Default for BackupManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupManifest {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            backed_up: Vec::new(),
            created: Vec::new(),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(BACKUP_MANIFEST);
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents).io_context("Failed to write backup manifest", &path)
    }

    fn contains(&self, relative: &str) -> bool {
        self.backed_up.iter().chain(&self.created).any(|file| file == relative)
    }
}

/// Files put back by a rollback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub removed: usize,
}

/// A backup being filled before an import applies its files.
#[derive(Debug)]
pub struct Snapshot {
    dir: PathBuf,
    home: PathBuf,
    manifest: BackupManifest,
}

impl Snapshot {
    pub fn new(dir: impl Into<PathBuf>, home: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            home: home.into(),
            manifest: BackupManifest::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &BackupManifest {
        &self.manifest
    }

    /// Remember a home-relative file before it is written. Existing files
    /// are copied into the backup; absent ones are noted for deletion.
    pub fn record(&mut self, relative: &str) -> Result<()> {
        if self.manifest.contains(relative) {
            return Ok(());
        }

        let live = self.home.join(relative);
        if live.is_file() {
            copy_file(&live, &self.dir.join(relative))?;
            self.manifest.backed_up.push(relative.to_string());
            debug!("Backed up {}", relative);
        } else {
            self.manifest.created.push(relative.to_string());
        }

        self.manifest.save(&self.dir)
    }

    /// Put the home directory back the way it was before [`Snapshot::record`].
    ///
    /// Every file is attempted; the first error is returned after the rest
    /// have been tried.
    pub fn rollback(&self) -> Result<RestoreReport> {
        let mut report = RestoreReport::default();
        let mut first_error = None;

        for relative in &self.manifest.backed_up {
            match copy_file(&self.dir.join(relative), &self.home.join(relative)) {
                Ok(()) => report.restored += 1,
                Err(err) => {
                    warn!("Failed to restore {}: {}", relative, err);
                    first_error.get_or_insert(err);
                }
            }
        }

        for relative in &self.manifest.created {
            let live = self.home.join(relative);
            if !live.is_file() {
                continue;
            }
            match fs::remove_file(&live) {
                Ok(()) => report.removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!("Failed to remove {}: {}", relative, err);
                    first_error.get_or_insert(PortError::io("Failed to remove file", &live, err));
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                info!(
                    "Rolled back {} restored, {} removed",
                    report.restored, report.removed
                );
                Ok(report)
            }
        }
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).io_context("Failed to create directory", parent)?;
    }
    fs::copy(from, to).io_context("Failed to copy file", from)?;
    Ok(())
}
