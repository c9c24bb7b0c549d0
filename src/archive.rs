//! Archive discovery and extraction
//!
//! Extraction failures never propagate: they are logged and reported in the
//! returned [`ExtractionReport`], and the candidate simply ends up with an
//! empty workspace.

use crate::config::types::{GradeError, Result};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Supported archive encodings
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
}

impl ArchiveFormat {
    /// Detect format from the file name; `None` for non-archives
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

/// One candidate submission bundle
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Archive {
    pub path: PathBuf,
    pub candidate_id: String,
    pub format: ArchiveFormat,
}

impl Archive {
    pub fn new(path: PathBuf) -> Option<Self> {
        let format = ArchiveFormat::from_path(&path)?;
        let candidate_id = candidate_id_from_path(&path);
        Some(Self {
            path,
            candidate_id,
            format,
        })
    }

    /// File name of the archive, used to name its workspace
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.candidate_id.clone())
    }
}

/// `candidate_alice.tar` -> `alice`; `alice.tar` -> `alice`
pub fn candidate_id_from_path(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = name.split('.').next().unwrap_or_default();
    match stem.split('_').nth(1) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => stem.to_string(),
    }
}

/// Recursively collect archives under `directory`, sorted by path
pub fn find_archives(directory: &Path) -> Result<Vec<Archive>> {
    // Surface an unreadable input directory as a batch-level error.
    fs::read_dir(directory).map_err(|e| {
        GradeError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot read exams folder {}: {}", directory.display(), e),
        ))
    })?;

    let mut archives = Vec::new();
    for entry in WalkDir::new(directory).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry under {}: {}", directory.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(archive) = Archive::new(entry.into_path()) {
            archives.push(archive);
        }
    }

    log::info!("Found {} archive(s) in {}", archives.len(), directory.display());
    Ok(archives)
}

/// Outcome of one extraction
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionReport {
    pub archive: PathBuf,
    pub destination: PathBuf,
    /// Entries written to the destination
    pub entries: usize,
    /// Entries refused because they would escape the destination
    pub skipped: usize,
    pub error: Option<String>,
}

impl ExtractionReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Extract `archive` into `destination`, creating it if needed
pub fn extract(archive: &Archive, destination: &Path) -> ExtractionReport {
    let mut report = ExtractionReport {
        archive: archive.path.clone(),
        destination: destination.to_path_buf(),
        entries: 0,
        skipped: 0,
        error: None,
    };

    if let Err(e) = unpack_into(archive, destination, &mut report) {
        log::warn!(
            "Extraction of {} failed after {} entries: {}",
            archive.path.display(),
            report.entries,
            e
        );
        report.error = Some(e.to_string());
    } else {
        log::debug!(
            "Extracted {} entries from {} into {}",
            report.entries,
            archive.path.display(),
            destination.display()
        );
    }

    report
}

fn unpack_into(archive: &Archive, destination: &Path, report: &mut ExtractionReport) -> Result<()> {
    fs::create_dir_all(destination)?;

    let file = File::open(&archive.path).map_err(|e| {
        GradeError::Archive(format!("cannot open {}: {}", archive.path.display(), e))
    })?;
    let reader: Box<dyn Read> = match archive.format {
        ArchiveFormat::Tar => Box::new(file),
        ArchiveFormat::TarGz => Box::new(GzDecoder::new(file)),
    };

    let mut tar = tar::Archive::new(reader);
    let entries = tar
        .entries()
        .map_err(|e| GradeError::Archive(format!("not a valid tar archive: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| GradeError::Archive(format!("corrupted tar entry: {}", e)))?;
        let unpacked = entry
            .unpack_in(destination)
            .map_err(|e| GradeError::Archive(format!("cannot unpack entry: {}", e)))?;
        if unpacked {
            report.entries += 1;
        } else {
            report.skipped += 1;
            log::warn!(
                "Refused archive entry escaping the workspace in {}",
                archive.path.display()
            );
        }
    }

    Ok(())
}
