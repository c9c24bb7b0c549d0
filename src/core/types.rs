use crate::config::profiles::{CorrectorProfile, ExpectedFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory a single candidate's archive is extracted into
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateWorkspace {
    pub root: PathBuf,
    pub candidate_id: String,
}

impl CandidateWorkspace {
    pub fn new(root: impl Into<PathBuf>, candidate_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            candidate_id: candidate_id.into(),
        }
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }
}

/// Where each expected file was found, in profile declaration order
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileLocationMap {
    entries: Vec<LocatedFile>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocatedFile {
    pub expected: ExpectedFile,
    pub path: Option<PathBuf>,
}

impl FileLocationMap {
    /// Every expected file of `profile`, none located yet
    pub fn unlocated(profile: &CorrectorProfile) -> Self {
        Self {
            entries: profile
                .files
                .iter()
                .cloned()
                .map(|expected| LocatedFile {
                    expected,
                    path: None,
                })
                .collect(),
        }
    }

    /// Record `path` for the entry named `file_name` unless one is already set
    ///
    /// Returns `false` when the file was already located (or is not expected).
    pub fn set_if_absent(&mut self, file_name: &str, path: &Path) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| e.expected.file_name == file_name)
        {
            Some(entry) if entry.path.is_none() => {
                entry.path = Some(path.to_path_buf());
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Path> {
        self.entries
            .iter()
            .find(|e| e.expected.key == key)
            .and_then(|e| e.path.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocatedFile> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all_located(&self) -> bool {
        self.entries.iter().all(|e| e.path.is_some())
    }
}
