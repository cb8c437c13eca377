//! Inbox / processed / backup bookkeeping
//!
//! Files are never deleted unless a copy at the destination has been confirmed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::DirConfig;
use crate::sheet::is_workbook_path;

/// Prefix of macOS resource-fork entries inside archives
const MACOS_METADATA_PREFIX: &str = "__MACOSX";

/// Resolved working directories
#[derive(Debug, Clone)]
pub struct DirLayout {
    pub root: PathBuf,
    pub inbox: PathBuf,
    pub processed: PathBuf,
    pub backup: PathBuf,
}

impl DirLayout {
    pub fn from_config(config: &DirConfig) -> Self {
        Self {
            root: config.root.clone(),
            inbox: config.inbox_dir(),
            processed: config.processed_dir(),
            backup: config.backup_dir(),
        }
    }

    /// Create every directory that does not exist yet
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [&self.root, &self.inbox, &self.processed, &self.backup] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn list_files(dir: &Path, keep: impl Fn(&Path) -> bool) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && keep(&path) {
            files.push(path);
        }
    }
    // read_dir order is platform dependent
    files.sort();
    Ok(files)
}

/// Workbook files waiting in the inbox, sorted by name
pub fn discover_workbooks(inbox: &Path) -> io::Result<Vec<PathBuf>> {
    list_files(inbox, is_workbook_path)
}

/// Zip archives waiting in the inbox, sorted by name
pub fn discover_archives(inbox: &Path) -> io::Result<Vec<PathBuf>> {
    list_files(inbox, |p| has_extension(p, "zip"))
}

/// Write every workbook entry of an archive into `output_dir`, flattened to
/// its base name. Directory entries, non-workbook entries and `__MACOSX`
/// metadata are skipped. Returns the extracted paths.
pub fn extract_archive(zip_path: &Path, output_dir: &Path) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)?;

    let file = fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(io::Error::other)?;
    let mut extracted = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(io::Error::other)?;
        let name = entry.name().to_string();

        if entry.is_dir() || name.starts_with(MACOS_METADATA_PREFIX) {
            continue;
        }
        // Entry names may carry directories in a foreign encoding; keep only the base name
        let Some(base) = Path::new(&name).file_name().map(PathBuf::from) else {
            continue;
        };
        if !is_workbook_path(&base) {
            debug!(entry = %name, "Skipping non-workbook archive entry");
            continue;
        }

        let output_path = output_dir.join(&base);
        let mut out = fs::File::create(&output_path)?;
        io::copy(&mut entry, &mut out)?;
        extracted.push(output_path);
    }

    Ok(extracted)
}

/// Clear the read-only flag so the file can be moved on every platform
fn make_writable(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    if perms.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

/// Move a file into `dest_dir`, keeping its name. Falls back to copy + remove
/// when a rename is not possible; the source is only removed after the copy
/// has been verified by size.
pub fn move_file(src: &Path, dest_dir: &Path) -> io::Result<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let dest = dest_dir.join(name);

    if fs::rename(src, &dest).is_ok() {
        return Ok(dest);
    }

    let copied = fs::copy(src, &dest)?;
    let expected = fs::metadata(src)?.len();
    if copied != expected {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!(
                "copy of {} is incomplete ({} of {} bytes)",
                src.display(),
                copied,
                expected
            ),
        ));
    }
    fs::remove_file(src)?;
    Ok(dest)
}

/// Outcome of expanding the inbox archives
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnzipSummary {
    pub archives: usize,
    pub backed_up: usize,
    pub extracted: Vec<PathBuf>,
}

/// Expand every archive in the inbox into the inbox, then move each
/// successfully expanded archive to the backup directory.
pub fn unzip_all_and_backup(layout: &DirLayout) -> io::Result<UnzipSummary> {
    fs::create_dir_all(&layout.backup)?;
    let archives = discover_archives(&layout.inbox)?;

    let mut summary = UnzipSummary {
        archives: archives.len(),
        ..Default::default()
    };
    if archives.is_empty() {
        debug!("No archives to expand");
        return Ok(summary);
    }

    for archive in archives {
        info!(archive = %archive.display(), "Expanding archive");
        match extract_archive(&archive, &layout.inbox) {
            Ok(files) => {
                info!(archive = %archive.display(), files = files.len(), "Archive expanded");
                summary.extracted.extend(files);
            }
            Err(e) => {
                warn!(archive = %archive.display(), "Failed to expand archive: {}", e);
                continue;
            }
        }

        let backed_up = make_writable(&archive).and_then(|_| move_file(&archive, &layout.backup));
        match backed_up {
            Ok(dest) => {
                debug!(dest = %dest.display(), "Archive backed up");
                summary.backed_up += 1;
            }
            Err(e) => warn!(archive = %archive.display(), "Failed to back up archive: {}", e),
        }
    }

    Ok(summary)
}
