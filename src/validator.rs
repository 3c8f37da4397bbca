use std::path::Path;
use tracing::{debug, warn};

use crate::error::PortError;
use crate::layout::{check_archive_path, home_relative_target};
use crate::manifest::{ExportMetadata, MANIFEST_NAME, MANIFEST_VERSION, MIN_SUPPORTED_VERSION};
use crate::package::{read_archive, verify_checksum};

/// Everything known about a package after inspection.
///
/// Populated as far as the checks got, so callers can show the full list
/// of problems rather than the first one.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<PortError>,
    pub warnings: Vec<String>,
    pub metadata: Option<ExportMetadata>,
}

impl ValidationReport {
    fn fail(mut self, error: PortError) -> Self {
        self.errors.push(error);
        self.valid = false;
        self
    }
}

/// Inspect a package without extracting it.
pub fn validate(package: &Path) -> ValidationReport {
    let report = ValidationReport::default();

    let contents = match read_archive(package) {
        Ok(contents) if !contents.is_empty() => contents,
        Ok(_) => return report.fail(PortError::format(package, "corrupt archive: no entries")),
        Err(err) => return report.fail(PortError::format(package, format!("corrupt archive: {err}"))),
    };

    let Some(manifest) = contents.get(MANIFEST_NAME) else {
        return report.fail(PortError::format(package, format!("{MANIFEST_NAME} not found")));
    };
    let metadata = match ExportMetadata::from_slice(manifest) {
        Ok(metadata) => metadata,
        Err(err) => return report.fail(PortError::format(package, format!("{MANIFEST_NAME}: {err}"))),
    };

    let mut report = report;
    if contents.names().next() != Some(MANIFEST_NAME) {
        report
            .warnings
            .push(format!("{MANIFEST_NAME} is not the first entry"));
    }

    for file in &metadata.files {
        if let Err(err) = check_archive_path(&file.path) {
            report.errors.push(err);
            continue;
        }

        let Some(data) = contents.get(&file.path) else {
            warn!("Missing from package: {}", file.path);
            report.errors.push(PortError::Integrity {
                path: file.path.clone(),
            });
            continue;
        };

        match verify_checksum(data, &file.checksum) {
            Ok(true) => {}
            Ok(false) => report
                .warnings
                .push(format!("checksum mismatch for {}", file.path)),
            Err(err) => report.warnings.push(format!("{}: {err}", file.path)),
        }
        if home_relative_target(&file.path).is_err() {
            report
                .warnings
                .push(format!("{} has no restore location and will be skipped", file.path));
        }
    }

    for name in contents.names() {
        if name != MANIFEST_NAME && metadata.file(name).is_none() {
            report
                .warnings
                .push(format!("{name} is not listed in the manifest"));
        }
    }

    if !metadata.is_supported_version() {
        report.errors.push(PortError::Version {
            found: metadata.version,
            min: MIN_SUPPORTED_VERSION,
            max: MANIFEST_VERSION,
        });
    }

    if metadata.has_sensitive_data {
        report
            .warnings
            .push("package contains unredacted credentials".to_string());
    }

    report.valid = report.errors.is_empty();
    report.metadata = Some(metadata);
    debug!(
        valid = report.valid,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "Validated {}",
        package.display()
    );
    report
}
