/// Run-scoped extraction root
///
/// Every run extracts into `<parent>/examgrade-<uuid>/`, one sub-directory per
/// archive. Nothing outside that root is ever written by extraction, so
/// removing it restores the host to its pre-run state.
use crate::archive::Archive;
use crate::config::types::{GradeError, Result};
use crate::core::types::CandidateWorkspace;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Directory prefix of every run root
pub const RUN_DIR_PREFIX: &str = "examgrade-";

pub struct WorkRoot {
    run_id: String,
    root: PathBuf,
    used_names: HashSet<String>,
    used_ids: HashSet<String>,
}

impl WorkRoot {
    /// Create a fresh run root under `parent`
    pub fn create(parent: &Path) -> Result<Self> {
        let run_id = Uuid::new_v4().to_string();
        let root = parent.join(format!("{}{}", RUN_DIR_PREFIX, run_id));

        fs::create_dir_all(&root).map_err(|e| {
            GradeError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create work root {}: {}", root.display(), e),
            ))
        })?;
        log::debug!("Created work root {}", root.display());

        Ok(Self {
            run_id,
            root,
            used_names: HashSet::new(),
            used_ids: HashSet::new(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Reserve a unique workspace directory for `archive`
    ///
    /// The directory is named after the archive file. Directory names and
    /// candidate ids both get a numeric suffix when they collide, so ids stay
    /// unique within a run. The directory is not created here.
    pub fn allocate(&mut self, archive: &Archive) -> CandidateWorkspace {
        let name = unique(&mut self.used_names, &archive.file_name());
        let candidate_id = unique(&mut self.used_ids, &archive.candidate_id);
        if candidate_id != archive.candidate_id {
            log::warn!(
                "Candidate id '{}' already used in this run; {} graded as '{}'",
                archive.candidate_id,
                archive.path.display(),
                candidate_id
            );
        }

        CandidateWorkspace {
            root: self.root.join(name),
            candidate_id,
        }
    }
}

fn unique(used: &mut HashSet<String>, base: &str) -> String {
    let mut candidate = base.to_string();
    let mut n = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{}-{}", base, n);
        n += 1;
    }
    candidate
}
