/// Expected-file discovery inside a candidate workspace
///
/// Traversal is depth-first with entries sorted by file name, so the same
/// tree always yields the same map. When an expected name occurs more than
/// once, the first file visited wins.
use crate::config::profiles::CorrectorProfile;
use crate::config::types::{GradeError, Result};
use crate::core::types::{CandidateWorkspace, FileLocationMap};
use walkdir::WalkDir;

pub fn locate(workspace: &CandidateWorkspace, profile: &CorrectorProfile) -> Result<FileLocationMap> {
    let mut map = FileLocationMap::unlocated(profile);

    if !workspace.exists() {
        log::debug!(
            "Workspace {} does not exist; no files located",
            workspace.root.display()
        );
        return Ok(map);
    }

    let walker = WalkDir::new(&workspace.root)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if is_vanished(&e) => {
                log::debug!("Entry vanished during walk: {}", e);
                continue;
            }
            Err(e) => {
                return Err(GradeError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("walk {}: {}", workspace.root.display(), e),
                )))
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !profile.file_names().any(|n| n == name) {
            continue;
        }

        if !map.set_if_absent(name, entry.path()) {
            log::warn!(
                "Candidate {}: ignoring duplicate {} at {}",
                workspace.candidate_id,
                name,
                entry.path().display()
            );
        }
    }

    Ok(map)
}

fn is_vanished(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound)
}
