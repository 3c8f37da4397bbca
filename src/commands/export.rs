use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use crate::exporter::{self, ExportOptions};
use crate::layout::{ExportScope, ToolSelection};
use crate::{ui, Workspace};

pub struct Args {
    pub tool: ToolSelection,
    pub scope: ExportScope,
    pub include_sensitive: bool,
    pub output: Option<PathBuf>,
    pub description: Option<String>,
}

pub fn execute(workspace: &Workspace, args: Args) -> Result<()> {
    let layout = workspace.layout();
    let options = ExportOptions {
        tool: args.tool,
        scope: args.scope,
        include_sensitive: args.include_sensitive,
        output: args.output.or_else(|| workspace.config().output_dir.clone()),
        description: args.description,
    };

    let files = exporter::collect(&layout, options.scope, options.tool).context("Failed to collect configuration")?;
    if files.is_empty() {
        ui::warn(format!(
            "No {} configuration found for {}",
            options.scope.as_str(),
            options.tool.as_str()
        ));
        return Ok(());
    }

    for file in &files {
        ui::status("Adding", exporter::display_path(&layout, file));
    }

    let progress = ui::Progress::new("Packaging", format!("{} files", files.len()));
    let result = match exporter::build_package(&files, &options, workspace.context().platform) {
        Ok(result) => result,
        Err(err) => {
            progress.fail("Failed", &err);
            return Err(err).context("Export failed");
        }
    };
    progress.success("Packaged", format!("({})", ui::format_size(result.total_size)));

    for warning in &result.warnings {
        ui::warn(warning);
    }

    let Some(path) = result.package_path.filter(|_| result.success) else {
        bail!("Export did not produce a package");
    };

    ui::success("Exported", path.display());
    Ok(())
}
