/// Batch orchestration
///
/// Archives are discovered and extracted under a fresh run root, then graded
/// by a fixed pool of scoped worker threads fed through a bounded channel.
/// A cleanup guard owns the run root and the ports the profile's checkers
/// bind, so both are released however `run` exits.
use crate::archive::{extract, find_archives};
use crate::checkers::registry::CheckerRegistry;
use crate::config::profiles::{CheckerKind, CorrectorProfile};
use crate::config::settings::GraderSettings;
use crate::config::types::{CandidateResult, CandidateStatus, GradeError, Result};
use crate::core::processor::process_candidate;
use crate::core::types::CandidateWorkspace;
use crate::safety::cleanup::{CleanupGuard, CleanupManager, ResourceType};
use crate::safety::interrupt;
use crate::safety::workspace::WorkRoot;
use crossbeam_channel::{bounded, unbounded};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Everything one run produced
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: String,
    /// Sorted by candidate id
    pub results: Vec<CandidateResult>,
    pub archives: usize,
    pub extraction_failures: usize,
}

impl BatchReport {
    pub fn count(&self, status: CandidateStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn errored(&self) -> impl Iterator<Item = &CandidateResult> {
        self.results
            .iter()
            .filter(|r| r.status == CandidateStatus::Errored)
    }
}

pub struct BatchRunner {
    profile: CorrectorProfile,
    registry: Arc<CheckerRegistry>,
    settings: GraderSettings,
    cancel: Arc<AtomicBool>,
}

impl BatchRunner {
    pub fn new(
        profile: CorrectorProfile,
        registry: Arc<CheckerRegistry>,
        settings: GraderSettings,
    ) -> Self {
        Self {
            profile,
            registry,
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use `flag` to stop the batch instead of a private one
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst) || interrupt::interrupted()
    }

    /// Ports the profile's checkers may leave bound
    fn ports_in_use(&self) -> Vec<u16> {
        let mut ports = Vec::new();
        if self.profile.uses(CheckerKind::ScriptOutput) && self.settings.api_command.is_some() {
            ports.push(self.settings.api_port);
        }
        if self.profile.uses(CheckerKind::ServiceHealth) {
            ports.push(self.settings.service_port);
        }
        ports
    }

    pub fn run(&self, input_dir: &Path) -> Result<BatchReport> {
        let archives = find_archives(input_dir)?;
        if archives.is_empty() {
            log::info!("No archives found in {}", input_dir.display());
            return Ok(BatchReport::default());
        }

        let mut guard = CleanupGuard::new(CleanupManager::new(self.settings.reclaim_ports));
        for port in self.ports_in_use() {
            guard.record(ResourceType::Port(port));
        }

        let mut work_root = WorkRoot::create(&self.settings.work_parent())?;
        guard.record(ResourceType::Workspace(work_root.path().to_path_buf()));
        log::info!(
            "Run {}: {} archives, profile {}",
            work_root.run_id(),
            archives.len(),
            self.profile
        );

        let mut extraction_failures = 0;
        let mut workspaces = Vec::with_capacity(archives.len());
        for archive in &archives {
            if self.cancelled() {
                return Err(GradeError::Interrupted);
            }
            let workspace = work_root.allocate(archive);
            if !extract(archive, &workspace.root).succeeded() {
                extraction_failures += 1;
            }
            workspaces.push(workspace);
        }

        let mut results = self.grade_all(workspaces);
        if self.cancelled() {
            log::warn!(
                "Interrupted after grading {} of {} candidates",
                results.len(),
                archives.len()
            );
            return Err(GradeError::Interrupted);
        }
        results.sort_by(|a, b| a.candidate_id.cmp(&b.candidate_id));

        let report = BatchReport {
            run_id: work_root.run_id().to_string(),
            results,
            archives: archives.len(),
            extraction_failures,
        };

        if let Err(e) = guard.finish() {
            log::warn!("{}", e);
        }
        Ok(report)
    }

    /// Results arrive in completion order
    fn grade_all(&self, workspaces: Vec<CandidateWorkspace>) -> Vec<CandidateResult> {
        let total = workspaces.len();
        let workers = self.settings.jobs.clamp(1, total.max(1));
        let (job_tx, job_rx) = bounded::<CandidateWorkspace>(workers);
        let (result_tx, result_rx) = unbounded::<CandidateResult>();
        let mut results = Vec::with_capacity(total);

        thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for workspace in job_rx.iter() {
                        if self.cancelled() {
                            break;
                        }
                        let result = process_candidate(&workspace, &self.profile, &self.registry);
                        if result_tx.send(result).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(result_tx);

            scope.spawn(move || {
                for workspace in workspaces {
                    if self.cancelled() || job_tx.send(workspace).is_err() {
                        break;
                    }
                }
            });

            for result in result_rx.iter() {
                log::info!(
                    "[{}/{}] {}: {}",
                    results.len() + 1,
                    total,
                    result.candidate_id,
                    result.status
                );
                results.push(result);
            }
        });

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::registry::CheckerContext;

    fn runner(work_dir: &Path) -> BatchRunner {
        let settings = GraderSettings {
            jobs: 2,
            reclaim_ports: false,
            work_dir: Some(work_dir.to_path_buf()),
            ..GraderSettings::default()
        };
        let profile = CorrectorProfile::bash();
        let registry = CheckerRegistry::from_profile(&profile, &CheckerContext::new(settings.clone()));
        BatchRunner::new(profile, Arc::new(registry), settings)
    }

    #[test]
    fn empty_input_yields_empty_report() {
        let input = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let report = runner(work.path()).run(input.path()).unwrap();
        assert!(report.results.is_empty());
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[test]
    fn unreadable_input_is_an_error() {
        let work = tempfile::tempdir().unwrap();
        let err = runner(work.path())
            .run(&work.path().join("does-not-exist"))
            .unwrap_err();
        assert!(matches!(err, GradeError::Io(_)));
    }

    #[test]
    fn cancelled_batch_cleans_up() {
        let input = tempfile::tempdir().unwrap();
        std::fs::write(input.path().join("candidate_amy.tar"), b"not a tar").unwrap();
        let work = tempfile::tempdir().unwrap();

        let flag = Arc::new(AtomicBool::new(true));
        let runner = runner(work.path()).with_cancel_flag(Arc::clone(&flag));
        assert!(runner.cancel_flag().load(Ordering::SeqCst));
        let err = runner.run(input.path()).unwrap_err();
        assert!(matches!(err, GradeError::Interrupted));
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[test]
    fn ports_follow_profile_and_settings() {
        let work = tempfile::tempdir().unwrap();
        assert!(runner(work.path()).ports_in_use().is_empty());

        let settings = GraderSettings {
            api_command: Some(vec!["api".to_string()]),
            ..GraderSettings::default()
        };
        let registry = Arc::new(CheckerRegistry::builder().build());
        let bash = BatchRunner::new(CorrectorProfile::bash(), Arc::clone(&registry), settings.clone());
        assert_eq!(bash.ports_in_use(), vec![5000]);
        let api = BatchRunner::new(CorrectorProfile::fastapi(), registry, settings);
        assert_eq!(api.ports_in_use(), vec![8000]);
    }
}
