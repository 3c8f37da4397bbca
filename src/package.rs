use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{IoContext, PortError, Result};
use crate::layout::check_archive_path;
use crate::manifest::{ExportMetadata, MANIFEST_NAME};

const CHECKSUM_PREFIX: &str = "sha256:";

fn sha256(content: &[u8]) -> [u8; 32] {
    Sha256::digest(content).into()
}

/// Content fingerprint in `sha256:<hex>` form.
pub fn checksum(content: &[u8]) -> String {
    format!("{CHECKSUM_PREFIX}{}", hex::encode(sha256(content)))
}

/// Compare `content` against a manifest checksum. Hex case and surrounding
/// whitespace are ignored; anything that is not `sha256:` followed by 64
/// hex digits is a `Parse` error.
pub fn verify_checksum(content: &[u8], expected: &str) -> Result<bool> {
    let malformed = |reason: &str| PortError::Parse(format!("checksum '{expected}': {reason}"));

    let encoded = expected
        .trim()
        .strip_prefix(CHECKSUM_PREFIX)
        .ok_or_else(|| malformed("expected `sha256:<hex>`"))?;
    let mut wanted = [0u8; 32];
    hex::decode_to_slice(encoded, &mut wanted).map_err(|err| malformed(&err.to_string()))?;

    Ok(wanted == sha256(content))
}

/// Container formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub fn for_path(path: &Path) -> Self {
        let filename = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if filename.ends_with(".tar.gz") || filename.ends_with(".tgz") {
            ArchiveFormat::TarGz
        } else {
            ArchiveFormat::Zip
        }
    }
}

/// Where the bytes of a packaged entry come from.
#[derive(Debug, Clone)]
pub enum PackageSource {
    Bytes(Vec<u8>),
    File(PathBuf),
    /// Added recursively; each file lands under the entry's archive path.
    Directory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct PackageEntry {
    pub archive_path: String,
    pub source: PackageSource,
    /// Unix permission bits to record; read from disk for file sources when unset.
    pub unix_mode: Option<u32>,
}

impl PackageEntry {
    pub fn bytes(archive_path: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            archive_path: archive_path.into(),
            source: PackageSource::Bytes(data),
            unix_mode: None,
        }
    }

    pub fn file(archive_path: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: archive_path.into(),
            source: PackageSource::File(path.into()),
            unix_mode: None,
        }
    }

    pub fn directory(archive_path: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: archive_path.into(),
            source: PackageSource::Directory(path.into()),
            unix_mode: None,
        }
    }

    pub fn with_mode(mut self, mode: Option<u32>) -> Self {
        self.unix_mode = mode;
        self
    }
}

/// A single resolved file ready to be written into a container.
struct PendingFile {
    path: String,
    data: Vec<u8>,
    mode: u32,
}

#[cfg(unix)]
pub(crate) fn unix_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .ok()
        .map(|metadata| metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
pub(crate) fn unix_mode(_path: &Path) -> Option<u32> {
    None
}

fn read_source_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).io_context("Failed to read package source", path)
}

fn resolve_entries(entries: &[PackageEntry]) -> Result<Vec<PendingFile>> {
    let mut pending = Vec::new();

    for entry in entries {
        check_archive_path(&entry.archive_path)?;

        match &entry.source {
            PackageSource::Bytes(data) => pending.push(PendingFile {
                path: entry.archive_path.clone(),
                data: data.clone(),
                mode: entry.unix_mode.unwrap_or(0o644),
            }),
            PackageSource::File(path) => pending.push(PendingFile {
                path: entry.archive_path.clone(),
                data: read_source_file(path)?,
                mode: entry.unix_mode.or_else(|| unix_mode(path)).unwrap_or(0o644),
            }),
            PackageSource::Directory(root) => {
                for item in WalkDir::new(root).sort_by_file_name() {
                    let item = item.map_err(|err| {
                        let path = err.path().unwrap_or(root).to_path_buf();
                        PortError::io("Failed to walk directory", path, io::Error::other(err))
                    })?;
                    if !item.file_type().is_file() {
                        continue;
                    }
                    let relative = archive_relative(root, item.path());
                    let path = format!("{}/{}", entry.archive_path, relative);
                    check_archive_path(&path)?;
                    pending.push(PendingFile {
                        path,
                        data: read_source_file(item.path())?,
                        mode: unix_mode(item.path()).unwrap_or(0o644),
                    });
                }
            }
        }
    }

    Ok(pending)
}

/// Forward-slash path of `path` relative to `root`.
pub(crate) fn archive_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Write the manifest followed by every entry into a single container.
///
/// The archive is written next to `output` and renamed into place, so a
/// failed build never leaves a truncated package behind.
pub fn build_archive(
    entries: &[PackageEntry],
    metadata: &ExportMetadata,
    output: &Path,
) -> Result<PathBuf> {
    let files = resolve_entries(entries)?;
    let manifest = metadata.to_vec()?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).io_context("Failed to create output directory", parent)?;
    }

    let partial = output.with_extension("partial");
    let format = ArchiveFormat::for_path(output);
    let written = match format {
        ArchiveFormat::Zip => write_zip(&partial, &manifest, &files),
        ArchiveFormat::TarGz => write_tar_gz(&partial, &manifest, &files),
    };

    if let Err(err) = written {
        let _ = fs::remove_file(&partial);
        return Err(err);
    }

    fs::rename(&partial, output).io_context("Failed to move package into place", output)?;
    debug!(path = ?output, files = files.len(), ?format, "Wrote package");
    Ok(output.to_path_buf())
}

fn write_zip(path: &Path, manifest: &[u8], files: &[PendingFile]) -> Result<()> {
    let file = File::create(path).io_context("Failed to create package", path)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(MANIFEST_NAME, options)?;
    zip.write_all(manifest)
        .io_context("Failed to write manifest into", path)?;

    for pending in files {
        zip.start_file(pending.path.as_str(), options.unix_permissions(pending.mode))?;
        zip.write_all(&pending.data)
            .io_context("Failed to write package entry into", path)?;
    }

    zip.finish()?;
    Ok(())
}

fn write_tar_gz(path: &Path, manifest: &[u8], files: &[PendingFile]) -> Result<()> {
    let file = File::create(path).io_context("Failed to create package", path)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    let mtime = chrono::Utc::now().timestamp().max(0) as u64;

    let mut append = |name: &str, data: &[u8], mode: u32| -> Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_mtime(mtime);
        header.set_cksum();
        builder
            .append_data(&mut header, name, data)
            .io_context("Failed to append package entry into", path)
    };

    append(MANIFEST_NAME, manifest, 0o644)?;
    for pending in files {
        append(&pending.path, &pending.data, pending.mode)?;
    }

    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .io_context("Failed to finalize package", path)?;
    Ok(())
}

/// Decompress a package into `target_dir` and parse its manifest.
pub fn extract_archive(archive_path: &Path, target_dir: &Path) -> Result<ExportMetadata> {
    fs::create_dir_all(target_dir).io_context("Failed to create extraction directory", target_dir)?;

    match ArchiveFormat::for_path(archive_path) {
        ArchiveFormat::Zip => extract_zip(archive_path, target_dir)?,
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, target_dir)?,
    }

    let manifest_path = target_dir.join(MANIFEST_NAME);
    if !manifest_path.is_file() {
        return Err(PortError::format(archive_path, "no manifest.json in package"));
    }

    let bytes = fs::read(&manifest_path).io_context("Failed to read manifest", &manifest_path)?;
    ExportMetadata::from_slice(&bytes)
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path).io_context("Failed to open package", archive_path)?;
    let mut archive = ZipArchive::new(file)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;

        let Some(enclosed) = entry.enclosed_name().map(|path| dest.join(path)) else {
            return Err(PortError::InvalidPath(entry.name().to_string()));
        };

        if entry.name().ends_with('/') {
            fs::create_dir_all(&enclosed).io_context("Failed to create directory", &enclosed)?;
            continue;
        }

        if let Some(parent) = enclosed.parent() {
            fs::create_dir_all(parent).io_context("Failed to create directory", parent)?;
        }

        let mut outfile = File::create(&enclosed).io_context("Failed to create file", &enclosed)?;
        io::copy(&mut entry, &mut outfile).io_context("Failed to extract entry", &enclosed)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&enclosed, fs::Permissions::from_mode(mode & 0o777))
                    .io_context("Failed to set permissions on", &enclosed)?;
            }
        }
    }

    Ok(())
}

fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path).io_context("Failed to open package", archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let entries = archive
        .entries()
        .io_context("Failed to read package", archive_path)?;

    for entry in entries {
        let mut entry = entry.io_context("Failed to read package entry from", archive_path)?;
        let name = entry
            .path()
            .io_context("Invalid entry path in", archive_path)?
            .to_string_lossy()
            .into_owned();

        let unpacked = entry
            .unpack_in(dest)
            .io_context("Failed to extract entry into", dest)?;
        if !unpacked {
            return Err(PortError::InvalidPath(name));
        }
    }

    Ok(())
}

/// Every file entry of a package, in archive order, held in memory.
///
/// Used by the validator, which must inspect a package without writing it
/// anywhere.
#[derive(Debug, Default)]
pub struct ArchiveContents {
    entries: Vec<(String, Vec<u8>)>,
}

impl ArchiveContents {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, data)| data.as_slice())
    }
}

pub fn read_archive(archive_path: &Path) -> Result<ArchiveContents> {
    let mut entries = Vec::new();

    match ArchiveFormat::for_path(archive_path) {
        ArchiveFormat::Zip => {
            let file = File::open(archive_path).io_context("Failed to open package", archive_path)?;
            let mut archive = ZipArchive::new(file)?;
            for index in 0..archive.len() {
                let mut entry = archive.by_index(index)?;
                if entry.is_dir() {
                    continue;
                }
                let name = entry.name().to_string();
                let mut data = Vec::with_capacity(entry.size() as usize);
                entry
                    .read_to_end(&mut data)
                    .io_context("Failed to read package entry from", archive_path)?;
                entries.push((name, data));
            }
        }
        ArchiveFormat::TarGz => {
            let file = File::open(archive_path).io_context("Failed to open package", archive_path)?;
            let mut archive = Archive::new(GzDecoder::new(file));
            for entry in archive
                .entries()
                .io_context("Failed to read package", archive_path)?
            {
                let mut entry = entry.io_context("Failed to read package entry from", archive_path)?;
                if !entry.header().entry_type().is_file() {
                    continue;
                }
                let name = entry
                    .path()
                    .io_context("Invalid entry path in", archive_path)?
                    .to_string_lossy()
                    .replace('\\', "/");
                let mut data = Vec::new();
                entry
                    .read_to_end(&mut data)
                    .io_context("Failed to read package entry from", archive_path)?;
                entries.push((name, data));
            }
        }
    }

    Ok(ArchiveContents { entries })
}
