//! Per-candidate grading pipeline
//!
//! Type-state tracking keeps the stages in order:
//! 1. `Candidate<Located>`: expected files looked up in the workspace
//! 2. `Candidate<Checked>`: every located file run through its checker
//! 3. `CandidateResult`: classification and remarks
//!
//! Classification is only available once checking has happened:
//!
//! ```compile_fail
//! use examgrade::config::profiles::CorrectorProfile;
//! use examgrade::core::processor::Candidate;
//! use examgrade::core::types::CandidateWorkspace;
//!
//! let ws = CandidateWorkspace::new("/tmp/none", "amy");
//! let candidate = Candidate::locate(&ws, &CorrectorProfile::bash()).unwrap();
//! let _ = candidate.classify();
//! ```
//!
//! and a consumed stage cannot be reused:
//!
//! ```compile_fail
//! use examgrade::checkers::registry::CheckerRegistry;
//! use examgrade::config::profiles::CorrectorProfile;
//! use examgrade::core::processor::Candidate;
//! use examgrade::core::types::CandidateWorkspace;
//!
//! let ws = CandidateWorkspace::new("/tmp/none", "amy");
//! let registry = CheckerRegistry::builder().build();
//! let candidate = Candidate::locate(&ws, &CorrectorProfile::bash()).unwrap();
//! let checked = candidate.check(&registry);
//! let again = candidate.check(&registry);
//! ```

use crate::checkers::registry::CheckerRegistry;
use crate::config::profiles::CorrectorProfile;
use crate::config::types::{CandidateResult, CandidateStatus, CheckOutcome, FileVerdict, Result};
use crate::core::locator;
use crate::core::types::{CandidateWorkspace, FileLocationMap};
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};

/// Type-state marker: expected files located, nothing checked yet
pub struct Located;

/// Type-state marker: every file has an outcome
pub struct Checked;

/// One candidate moving through the pipeline
pub struct Candidate<S> {
    candidate_id: String,
    locations: FileLocationMap,
    verdicts: Vec<FileVerdict>,
    _state: PhantomData<S>,
}

impl Candidate<Located> {
    pub fn locate(workspace: &CandidateWorkspace, profile: &CorrectorProfile) -> Result<Self> {
        let locations = locator::locate(workspace, profile)?;
        Ok(Self {
            candidate_id: workspace.candidate_id.clone(),
            locations,
            verdicts: Vec::new(),
            _state: PhantomData,
        })
    }

    pub fn locations(&self) -> &FileLocationMap {
        &self.locations
    }

    /// Run each located file through its checker
    ///
    /// Absent files are recorded as missing without invoking anything.
    /// Checker errors and panics become faults.
    pub fn check(self, registry: &CheckerRegistry) -> Candidate<Checked> {
        let verdicts = self
            .locations
            .iter()
            .map(|located| {
                let key = &located.expected.key;
                let outcome = match &located.path {
                    None => CheckOutcome::Missing,
                    Some(path) => match registry.get(key) {
                        None => CheckOutcome::Fault(format!("no checker registered for {}", key)),
                        Some(checker) => {
                            log::debug!(
                                "{}: checking {} with {}",
                                self.candidate_id,
                                path.display(),
                                checker.name()
                            );
                            match panic::catch_unwind(AssertUnwindSafe(|| checker.check(path))) {
                                Ok(Ok(true)) => CheckOutcome::Valid,
                                Ok(Ok(false)) => CheckOutcome::Invalid,
                                Ok(Err(e)) => CheckOutcome::Fault(e.to_string()),
                                Err(payload) => {
                                    CheckOutcome::Fault(format!("checker panicked: {}", panic_message(&*payload)))
                                }
                            }
                        }
                    },
                };
                if let CheckOutcome::Fault(reason) = &outcome {
                    log::error!("{}: {} could not be checked: {}", self.candidate_id, key, reason);
                }
                FileVerdict {
                    key: key.clone(),
                    file_name: located.expected.file_name.clone(),
                    outcome,
                }
            })
            .collect();

        Candidate {
            candidate_id: self.candidate_id,
            locations: self.locations,
            verdicts,
            _state: PhantomData,
        }
    }
}

impl Candidate<Checked> {
    pub fn verdicts(&self) -> &[FileVerdict] {
        &self.verdicts
    }

    /// Errored on any fault, else Failed on any missing or invalid file
    pub fn classify(self) -> CandidateResult {
        let status = if self.verdicts.iter().any(|v| v.outcome.is_fault()) {
            CandidateStatus::Errored
        } else if self.verdicts.iter().all(|v| v.outcome.is_valid()) {
            CandidateStatus::Passed
        } else {
            CandidateStatus::Failed
        };

        let remarks = self
            .verdicts
            .iter()
            .filter_map(|v| v.outcome.remark(&v.key))
            .collect::<Vec<_>>()
            .join("\n");

        CandidateResult {
            candidate_id: self.candidate_id,
            status,
            remarks,
            files: self.verdicts,
        }
    }
}

/// Locate, check and classify one candidate; never fails
pub fn process_candidate(
    workspace: &CandidateWorkspace,
    profile: &CorrectorProfile,
    registry: &CheckerRegistry,
) -> CandidateResult {
    match Candidate::locate(workspace, profile) {
        Ok(candidate) => candidate.check(registry).classify(),
        Err(e) => {
            log::error!("{}: cannot locate files: {}", workspace.candidate_id, e);
            CandidateResult::errored(workspace.candidate_id.clone(), e)
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::checker::Checker;
    use crate::config::types::GradeError;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Behaviour {
        Accept,
        Reject,
        Fail,
        Panic,
    }

    struct FakeChecker {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl FakeChecker {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Checker for FakeChecker {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn check(&self, _path: &Path) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Accept => Ok(true),
                Behaviour::Reject => Ok(false),
                Behaviour::Fail => Err(GradeError::Process("bash not found".into())),
                Behaviour::Panic => panic!("checker bug"),
            }
        }
    }

    fn workspace_with(files: &[&str]) -> (tempfile::TempDir, CandidateWorkspace) {
        let dir = tempfile::tempdir().unwrap();
        for name in files {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        let ws = CandidateWorkspace::new(dir.path(), "amy");
        (dir, ws)
    }

    fn registry(
        cron: Arc<FakeChecker>,
        log: Arc<FakeChecker>,
        script: Arc<FakeChecker>,
    ) -> CheckerRegistry {
        CheckerRegistry::builder()
            .with("cron", cron)
            .with("log", log)
            .with("script", script)
            .build()
    }

    #[test]
    fn all_valid_passes_with_empty_remarks() {
        let (_dir, ws) = workspace_with(&["cron.txt", "sales.txt", "exam.sh"]);
        let reg = registry(
            FakeChecker::new(Behaviour::Accept),
            FakeChecker::new(Behaviour::Accept),
            FakeChecker::new(Behaviour::Accept),
        );
        let result = process_candidate(&ws, &CorrectorProfile::bash(), &reg);
        assert_eq!(result.status, CandidateStatus::Passed);
        assert_eq!(result.remarks, "");
        assert_eq!(result.files.len(), 3);
    }

    #[test]
    fn missing_file_is_not_checked() {
        let (_dir, ws) = workspace_with(&["cron.txt", "exam.sh"]);
        let log = FakeChecker::new(Behaviour::Accept);
        let reg = registry(
            FakeChecker::new(Behaviour::Accept),
            Arc::clone(&log),
            FakeChecker::new(Behaviour::Accept),
        );
        let result = process_candidate(&ws, &CorrectorProfile::bash(), &reg);
        assert_eq!(result.status, CandidateStatus::Failed);
        assert_eq!(result.remarks, "- log file not found");
        assert_eq!(log.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remarks_follow_declaration_order() {
        let (_dir, ws) = workspace_with(&["cron.txt", "exam.sh"]);
        let cron = FakeChecker::new(Behaviour::Reject);
        let script = FakeChecker::new(Behaviour::Reject);
        let reg = registry(
            Arc::clone(&cron),
            FakeChecker::new(Behaviour::Accept),
            Arc::clone(&script),
        );
        let result = process_candidate(&ws, &CorrectorProfile::bash(), &reg);
        assert_eq!(result.status, CandidateStatus::Failed);
        assert_eq!(
            result.remarks,
            "- cron file is not correct\n- log file not found\n- script file is not correct"
        );
        assert_eq!(cron.calls.load(Ordering::SeqCst), 1);
        assert_eq!(script.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn checker_error_is_errored_not_failed() {
        let (_dir, ws) = workspace_with(&["cron.txt", "sales.txt", "exam.sh"]);
        let reg = registry(
            FakeChecker::new(Behaviour::Reject),
            FakeChecker::new(Behaviour::Accept),
            FakeChecker::new(Behaviour::Fail),
        );
        let result = process_candidate(&ws, &CorrectorProfile::bash(), &reg);
        assert_eq!(result.status, CandidateStatus::Errored);
        assert!(result.remarks.contains("- cron file is not correct"));
        assert!(result
            .remarks
            .contains("- script file could not be checked: Process error: bash not found"));
    }

    #[test]
    fn checker_panic_is_contained() {
        let (_dir, ws) = workspace_with(&["cron.txt", "sales.txt", "exam.sh"]);
        let reg = registry(
            FakeChecker::new(Behaviour::Panic),
            FakeChecker::new(Behaviour::Accept),
            FakeChecker::new(Behaviour::Accept),
        );
        let result = process_candidate(&ws, &CorrectorProfile::bash(), &reg);
        assert_eq!(result.status, CandidateStatus::Errored);
        assert!(result.remarks.contains("checker panicked: checker bug"));
    }

    #[test]
    fn unregistered_key_is_a_fault() {
        let (_dir, ws) = workspace_with(&["cron.txt"]);
        let reg = CheckerRegistry::builder().build();
        let checked = Candidate::locate(&ws, &CorrectorProfile::bash())
            .unwrap()
            .check(&reg);
        assert!(checked.verdicts()[0].outcome.is_fault());
        assert_eq!(checked.verdicts()[1].outcome, CheckOutcome::Missing);
    }

    #[test]
    fn empty_workspace_reports_every_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let ws = CandidateWorkspace::new(dir.path().join("corrupted.tar"), "zed");
        let reg = registry(
            FakeChecker::new(Behaviour::Accept),
            FakeChecker::new(Behaviour::Accept),
            FakeChecker::new(Behaviour::Accept),
        );
        let result = process_candidate(&ws, &CorrectorProfile::bash(), &reg);
        assert_eq!(result.status, CandidateStatus::Failed);
        assert_eq!(
            result.remarks,
            "- cron file not found\n- log file not found\n- script file not found"
        );
    }

    #[test]
    fn non_utf8_cron_comment_still_passes() {
        use crate::checkers::schedule::ScheduleChecker;

        let (dir, ws) = workspace_with(&["sales.txt", "exam.sh"]);
        fs::write(
            dir.path().join("cron.txt"),
            b"# t\xe2che\n* * * * * /home/ubuntu/exam.sh\n",
        )
        .unwrap();
        let reg = CheckerRegistry::builder()
            .with("cron", Arc::new(ScheduleChecker))
            .with("log", FakeChecker::new(Behaviour::Accept))
            .with("script", FakeChecker::new(Behaviour::Accept))
            .build();

        let result = process_candidate(&ws, &CorrectorProfile::bash(), &reg);
        assert_eq!(result.status, CandidateStatus::Passed);
        assert_eq!(result.remarks, "");
    }
}
