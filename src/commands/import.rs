use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::backup::TimestampedBackups;
use crate::importer::{ImportOptions, ImportResult, Importer, ProgressEvent, RollbackOutcome};
use crate::layout::{ExportScope, ToolSelection};
use crate::merge::{MergeStrategy, Resolution};
use crate::workspace::WorkspacePath;
use crate::{ui, Workspace};

pub struct Args {
    pub package: PathBuf,
    pub strategy: Option<MergeStrategy>,
    pub no_backup: bool,
    pub no_adapt: bool,
    pub tool: ToolSelection,
    pub scope: ExportScope,
}

pub fn execute(workspace: &Workspace, args: Args) -> Result<()> {
    let config = workspace.config();
    let options = ImportOptions {
        package: args.package,
        strategy: args.strategy.unwrap_or(config.default_strategy),
        backup: config.backup && !args.no_backup,
        adapt_paths: config.adapt_paths && !args.no_adapt,
        tool: args.tool,
        scope: args.scope,
    };

    let backups = TimestampedBackups::new(workspace.path(WorkspacePath::Backups), workspace.layout());
    let importer = Importer::new(workspace.context(), &backups);

    ui::status(
        "Importing",
        format!("{} ({})", options.package.display(), options.strategy),
    );
    let mut report = |event: &ProgressEvent| ui::status(&format!("{:>3}%", event.percent), event.label());
    let result = importer.run(&options, &mut report);

    summarize(&result);

    if !result.success {
        bail!("Import of {} failed", options.package.display());
    }
    Ok(())
}

fn summarize(result: &ImportResult) {
    for mapping in &result.mappings {
        ui::info(format!(
            "{}: {} -> {}",
            mapping.location, mapping.original, mapping.adapted
        ));
    }

    for conflict in &result.conflicts {
        let note = match conflict.suggested {
            Resolution::KeepExisting => "kept existing",
            Resolution::UseIncoming => "took incoming",
            Resolution::NeedsManualReview => "review manually",
        };
        ui::info(format!("Conflict in {}: {}", conflict.name, note));
    }

    for warning in &result.warnings {
        ui::warn(warning);
    }
    for error in &result.errors {
        ui::error(error);
    }

    if let RollbackOutcome::Failed(reason) = &result.rollback {
        ui::error(format!("Rollback failed: {reason}"));
    }

    if result.success {
        ui::success("Imported", format!("{} files applied", result.applied_files));
        if let Some(path) = &result.backup_path {
            ui::info(format!("Backup saved to {}", path.display()));
        }
    }
}
