use anyhow::{bail, Result};
use std::path::Path;

use crate::ui;
use crate::validator::validate;

pub fn execute(package: &Path) -> Result<()> {
    let report = validate(package);

    for warning in &report.warnings {
        ui::warn(warning);
    }
    for error in &report.errors {
        ui::error(error);
    }

    if !report.valid {
        bail!("{} is not a valid package ({} errors)", package.display(), report.errors.len());
    }

    if let Some(metadata) = &report.metadata {
        ui::info(format!(
            "Exported from {} at {} (manifest v{}, scope {})",
            metadata.platform.as_str(),
            metadata.exported_at.format("%Y-%m-%d %H:%M:%S UTC"),
            metadata.version,
            metadata.scope.as_str()
        ));
        if let Some(description) = &metadata.description {
            ui::info(description);
        }
        ui::info(format!(
            "{} files, {}",
            metadata.files.len(),
            ui::format_size(metadata.total_size())
        ));
    }

    ui::success("Valid", package.display());
    Ok(())
}
