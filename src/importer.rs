//! Package import pipeline.
//!
//! Stages run strictly in order and none is re-entered:
//! `Validating -> BackingUp -> Extracting -> Adapting -> DetectingConflicts
//! -> Applying -> Complete`, with `Failed` reachable from any of them.
//! Nothing under the home directory changes before `Applying`; a failure
//! after a backup exists restores it before the result is returned.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::backup::{BackupProvider, Snapshot};
use crate::error::{IoContext, PortError, Result};
use crate::layout::{home_relative_target, source_for_archive_path, ExportScope, HomeLayout, ToolSelection};
use crate::manifest::ExportMetadata;
use crate::merge::{merge_document, merge_file, ConfigConflict, FileDecision, MergeStrategy};
use crate::package::extract_archive;
use crate::paths::{adapt, PathMapping};
use crate::platform::PlatformContext;
use crate::sanitize::reinstate;
use crate::validator::validate;
use crate::value::{ConfigValue, DocumentFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ImportState {
    Validating,
    BackingUp,
    Extracting,
    Adapting,
    DetectingConflicts,
    Applying,
    Complete,
    Failed,
}

impl ImportState {
    pub fn label(self) -> &'static str {
        match self {
            ImportState::Validating => "Validating package",
            ImportState::BackingUp => "Backing up existing configuration",
            ImportState::Extracting => "Extracting package",
            ImportState::Adapting => "Adapting paths",
            ImportState::DetectingConflicts => "Detecting conflicts",
            ImportState::Applying => "Applying configuration",
            ImportState::Complete => "Import complete",
            ImportState::Failed => "Import failed",
        }
    }

    fn percent(self) -> u8 {
        match self {
            ImportState::Validating => 5,
            ImportState::BackingUp => 20,
            ImportState::Extracting => 35,
            ImportState::Adapting => 50,
            ImportState::DetectingConflicts => 65,
            ImportState::Applying => 80,
            ImportState::Complete | ImportState::Failed => 100,
        }
    }
}

/// Reported at every stage boundary; for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub percent: u8,
    pub state: ImportState,
}

impl ProgressEvent {
    pub fn label(&self) -> &'static str {
        self.state.label()
    }
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub package: PathBuf,
    pub strategy: MergeStrategy,
    /// Take a backup before applying; without one rollback is unavailable
    pub backup: bool,
    /// Translate paths when the package came from another platform
    pub adapt_paths: bool,
    pub tool: ToolSelection,
    pub scope: ExportScope,
}

impl ImportOptions {
    pub fn new(package: impl Into<PathBuf>) -> Self {
        Self {
            package: package.into(),
            strategy: MergeStrategy::default(),
            backup: true,
            adapt_paths: true,
            tool: ToolSelection::All,
            scope: ExportScope::All,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RollbackOutcome {
    #[default]
    NotAttempted,
    Restored,
    Failed(String),
}

#[derive(Debug)]
pub struct ImportResult {
    pub success: bool,
    /// `Complete` or `Failed`
    pub state: ImportState,
    pub applied_files: usize,
    pub backup_path: Option<PathBuf>,
    pub conflicts: Vec<ConfigConflict>,
    pub mappings: Vec<PathMapping>,
    /// Whether a backup of the pre-import state can still be restored
    pub rollback_available: bool,
    pub rollback: RollbackOutcome,
    pub warnings: Vec<String>,
    pub errors: Vec<PortError>,
}

impl Default for ImportResult {
    fn default() -> Self {
        Self {
            success: false,
            state: ImportState::Validating,
            applied_files: 0,
            backup_path: None,
            conflicts: Vec::new(),
            mappings: Vec::new(),
            rollback_available: false,
            rollback: RollbackOutcome::default(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Why the pipeline stopped early.
enum Halt {
    Invalid(Vec<PortError>),
    Error(PortError),
}

impl From<PortError> for Halt {
    fn from(err: PortError) -> Self {
        Halt::Error(err)
    }
}

/// One packaged file selected for import.
struct Planned {
    archive_path: String,
    relative: String,
    target: PathBuf,
    format: Option<DocumentFormat>,
}

/// Parsed structured file: as packaged, and after path adaptation.
struct Document {
    packaged: ConfigValue,
    adapted: ConfigValue,
}

enum Action {
    Write(Vec<u8>),
    Copy(PathBuf),
    Keep,
}

struct Run<'p> {
    progress: &'p mut dyn FnMut(&ProgressEvent),
    state: ImportState,
    result: ImportResult,
    snapshot: Option<Snapshot>,
}

impl<'p> Run<'p> {
    fn new(progress: &'p mut dyn FnMut(&ProgressEvent)) -> Self {
        Self {
            progress,
            state: ImportState::Validating,
            result: ImportResult::default(),
            snapshot: None,
        }
    }

    fn enter(&mut self, state: ImportState) {
        self.state = state;
        info!("{}", state.label());
        (self.progress)(&ProgressEvent {
            percent: state.percent(),
            state,
        });
    }

    fn finish(mut self, outcome: std::result::Result<(), Halt>) -> ImportResult {
        match outcome {
            Ok(()) => {
                self.result.success = true;
                self.result.rollback_available = self.snapshot.is_some();
                self.enter(ImportState::Complete);
            }
            Err(Halt::Invalid(errors)) => {
                warn!("Package failed validation with {} errors", errors.len());
                self.result.errors = errors;
                self.enter(ImportState::Failed);
            }
            Err(Halt::Error(err)) => {
                error!("{} failed: {}", self.state.label(), err);
                self.result.errors.push(err);
                self.roll_back();
                self.enter(ImportState::Failed);
            }
        }

        self.result.state = self.state;
        self.result
    }

    fn roll_back(&mut self) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };

        match snapshot.rollback() {
            Ok(report) => {
                self.result.rollback = RollbackOutcome::Restored;
                self.result.rollback_available = false;
                self.result.warnings.push(format!(
                    "import failed; previous configuration restored automatically ({} restored, {} removed)",
                    report.restored, report.removed
                ));
            }
            Err(err) => {
                self.result.rollback = RollbackOutcome::Failed(err.to_string());
                self.result.rollback_available = true;
                self.result.warnings.push(format!(
                    "import failed and rollback failed; backup retained at {}, manual recovery required",
                    snapshot.path().display()
                ));
            }
        }
    }
}

/// Applies packages onto one home directory.
pub struct Importer<'a> {
    target: &'a PlatformContext,
    layout: HomeLayout,
    backups: &'a dyn BackupProvider,
}

impl<'a> Importer<'a> {
    pub fn new(target: &'a PlatformContext, backups: &'a dyn BackupProvider) -> Self {
        Self {
            target,
            layout: HomeLayout::new(&target.home),
            backups,
        }
    }

    /// Run the whole pipeline. Failures are reported in the result, never
    /// returned as errors.
    pub fn run(&self, options: &ImportOptions, progress: &mut dyn FnMut(&ProgressEvent)) -> ImportResult {
        let mut run = Run::new(progress);
        let outcome = self.execute(options, &mut run);
        run.finish(outcome)
    }

    fn execute(&self, options: &ImportOptions, run: &mut Run<'_>) -> std::result::Result<(), Halt> {
        run.enter(ImportState::Validating);
        let report = validate(&options.package);
        run.result.warnings.extend(report.warnings);
        if !report.valid {
            return Err(Halt::Invalid(report.errors));
        }
        let Some(metadata) = report.metadata else {
            return Err(Halt::Invalid(report.errors));
        };

        let planned = self.plan(&metadata, options, &mut run.result.warnings);

        if options.backup {
            run.enter(ImportState::BackingUp);
            match self.backups.prepare()? {
                Some(dir) => {
                    let snapshot = run.snapshot.insert(Snapshot::new(dir, self.target.home.clone()));
                    run.result.backup_path = Some(snapshot.path().to_path_buf());
                    for file in &planned {
                        snapshot.record(&file.relative)?;
                    }
                }
                None => run
                    .result
                    .warnings
                    .push("no existing configuration to back up".to_string()),
            }
        } else {
            run.result
                .warnings
                .push("backup disabled; rollback unavailable".to_string());
        }

        run.enter(ImportState::Extracting);
        let staging = tempfile::TempDir::new()
            .map_err(|err| PortError::io("Failed to create extraction directory", std::env::temp_dir(), err))?;
        extract_archive(&options.package, staging.path())?;

        run.enter(ImportState::Adapting);
        let mut documents = Vec::with_capacity(planned.len());
        for file in planned {
            let extracted = staging.path().join(&file.archive_path);
            let document = match file.format {
                Some(format) => Some(self.load_document(&file, format, &extracted, &metadata, options, &mut run.result)?),
                None => None,
            };
            documents.push((file, extracted, document));
        }

        run.enter(ImportState::DetectingConflicts);
        let mut actions = Vec::with_capacity(documents.len());
        for (file, extracted, document) in documents {
            let existing = if file.target.is_file() {
                Some(fs::read(&file.target).io_context("Failed to read existing config", &file.target)?)
            } else {
                None
            };

            let action = match (file.format, document) {
                (Some(format), Some(document)) => {
                    self.resolve_document(&file, format, document, existing.as_deref(), &extracted, options, &mut run.result)?
                }
                _ => {
                    let incoming = fs::read(&extracted).io_context("Failed to read extracted file", &extracted)?;
                    let (decision, conflict) =
                        merge_file(&file.archive_path, existing.as_deref(), &incoming, options.strategy);
                    run.result.conflicts.extend(conflict);
                    match decision {
                        FileDecision::Write => Action::Copy(extracted),
                        FileDecision::Keep => Action::Keep,
                    }
                }
            };
            actions.push((file, action));
        }

        run.enter(ImportState::Applying);
        for (file, action) in actions {
            match action {
                Action::Keep => {
                    debug!("Leaving {} unchanged", file.relative);
                    continue;
                }
                Action::Write(data) => {
                    ensure_parent(&file.target)?;
                    fs::write(&file.target, data).io_context("Failed to write config", &file.target)?;
                }
                Action::Copy(from) => {
                    ensure_parent(&file.target)?;
                    fs::copy(&from, &file.target).io_context("Failed to write config", &file.target)?;
                }
            }
            debug!("Applied {}", file.relative);
            run.result.applied_files += 1;
        }

        Ok(())
    }

    /// Select manifest entries matching the requested tool and scope.
    fn plan(&self, metadata: &ExportMetadata, options: &ImportOptions, warnings: &mut Vec<String>) -> Vec<Planned> {
        let mut planned = Vec::new();

        for info in &metadata.files {
            let Some(source) = source_for_archive_path(&info.path) else {
                warnings.push(format!("skipping {}: no known restore location", info.path));
                continue;
            };
            if !options.tool.includes(source.tool) || !source.in_scope(options.scope) {
                debug!("Skipping {} (outside selection)", info.path);
                continue;
            }

            let resolved = home_relative_target(&info.path)
                .and_then(|relative| Ok((relative, self.layout.target_path(&info.path)?)));
            match resolved {
                Ok((relative, target)) => planned.push(Planned {
                    archive_path: info.path.clone(),
                    relative,
                    target,
                    format: DocumentFormat::for_path(&info.path),
                }),
                Err(err) => warnings.push(format!("skipping {}: {}", info.path, err)),
            }
        }

        planned
    }

    fn load_document(
        &self,
        file: &Planned,
        format: DocumentFormat,
        extracted: &Path,
        metadata: &ExportMetadata,
        options: &ImportOptions,
        result: &mut ImportResult,
    ) -> Result<Document> {
        let text = fs::read_to_string(extracted).io_context("Failed to read extracted file", extracted)?;
        let packaged = format.parse(&text).map_err(|err| PortError::Merge {
            path: PathBuf::from(&file.archive_path),
            reason: err.to_string(),
        })?;

        if !options.adapt_paths {
            let adapted = packaged.clone();
            return Ok(Document { packaged, adapted });
        }

        let adaptation = adapt(&packaged, metadata.platform, self.target);
        result.warnings.extend(
            adaptation
                .warnings
                .iter()
                .map(|warning| format!("{}: {}", file.archive_path, warning)),
        );
        result.mappings.extend(adaptation.mappings.into_iter().map(|mut mapping| {
            mapping.location = format!("{}:{}", file.archive_path, mapping.location);
            mapping
        }));

        Ok(Document {
            packaged,
            adapted: adaptation.value,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_document(
        &self,
        file: &Planned,
        format: DocumentFormat,
        document: Document,
        existing: Option<&[u8]>,
        extracted: &Path,
        options: &ImportOptions,
        result: &mut ImportResult,
    ) -> Result<Action> {
        let existing = existing
            .map(|bytes| {
                let text = String::from_utf8_lossy(bytes);
                format.parse(&text).map_err(|err| PortError::Merge {
                    path: file.target.clone(),
                    reason: err.to_string(),
                })
            })
            .transpose()?;

        let reinstated = reinstate(&document.adapted, existing.as_ref());
        result.warnings.extend(
            reinstated
                .unresolved
                .iter()
                .map(|location| format!("{}: {} is still redacted; set it manually", file.archive_path, location)),
        );

        let merged = match &existing {
            Some(current) => {
                let outcome = merge_document(current, &reinstated.value, options.strategy);
                result.conflicts.extend(outcome.conflicts);
                result.warnings.extend(
                    outcome
                        .warnings
                        .iter()
                        .map(|warning| format!("{}: {}", file.archive_path, warning)),
                );
                outcome.merged
            }
            None => reinstated.value,
        };

        if existing.as_ref() == Some(&merged) {
            return Ok(Action::Keep);
        }
        if existing.is_none() && merged == document.packaged {
            return Ok(Action::Copy(extracted.to_path_buf()));
        }
        Ok(Action::Write(format.render(&merged)?.into_bytes()))
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent).io_context("Failed to create directory", parent),
        None => Ok(()),
    }
}
