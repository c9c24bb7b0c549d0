/// End-to-end batch runs over real tar fixtures
use examgrade::checkers::checker::Checker;
use examgrade::checkers::registry::{CheckerContext, CheckerRegistry};
use examgrade::config::profiles::CorrectorProfile;
use examgrade::config::settings::GraderSettings;
use examgrade::core::batch::{BatchRunner, BatchReport};
use examgrade::safety::workspace::RUN_DIR_PREFIX;
use examgrade::{CandidateStatus, GradeError};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

const CRON: &str = "# collect every minute\n* * * * * /home/ubuntu/exam_alice/exam.sh\n";
const SCRIPT: &str = "#!/bin/bash\n# query the sales API\necho \"$(date)\" >> /home/ubuntu/exam_alice/sales.txt\necho collected\n";
const SALES: &str = "Mon Mar  4 10:15:01 UTC 2024\nrtx3060: 12\nrtx3070: 4\nrtx3080: 7\nrtx3090: 1\nrx6700: 30\n\nMon Mar  4 10:16:01 UTC 2024\nrtx3060: 13\nrtx3070: 4\nrtx3080: 8\nrtx3090: 1\nrx6700: 31\n";

fn append<W: Write>(builder: &mut tar::Builder<W>, files: &[(&str, &str)]) {
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, name, content.as_bytes()).unwrap();
    }
}

fn write_tar(path: &Path, files: &[(&str, &str)]) {
    let mut builder = tar::Builder::new(File::create(path).unwrap());
    append(&mut builder, files);
    builder.finish().unwrap();
}

fn write_tar_gz(path: &Path, files: &[(&str, &str)]) {
    let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    append(&mut builder, files);
    builder.into_inner().unwrap().finish().unwrap();
}

fn settings(work_dir: &Path) -> GraderSettings {
    GraderSettings {
        jobs: 2,
        reclaim_ports: false,
        work_dir: Some(work_dir.to_path_buf()),
        ..GraderSettings::default()
    }
}

fn bash_runner(work_dir: &Path) -> BatchRunner {
    let settings = settings(work_dir);
    let profile = CorrectorProfile::bash();
    let registry = CheckerRegistry::from_profile(&profile, &CheckerContext::new(settings.clone()));
    BatchRunner::new(profile, Arc::new(registry), settings)
}

fn leftover_run_dirs(work_dir: &Path) -> usize {
    fs::read_dir(work_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(RUN_DIR_PREFIX))
        .count()
}

fn status_of(report: &BatchReport, id: &str) -> (CandidateStatus, String) {
    let result = report
        .results
        .iter()
        .find(|r| r.candidate_id == id)
        .unwrap_or_else(|| panic!("no result for {}", id));
    (result.status, result.remarks.clone())
}

#[test]
fn alice_passes_and_bob_misses_his_log() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();

    write_tar(
        &input.path().join("candidate_alice.tar"),
        &[
            ("exam_alice/cron.txt", CRON),
            ("exam_alice/exam.sh", SCRIPT),
            ("exam_alice/sales.txt", SALES),
        ],
    );
    write_tar(
        &input.path().join("candidate_bob.tar"),
        &[("exam_bob/cron.txt", CRON), ("exam_bob/exam.sh", SCRIPT)],
    );

    let report = bash_runner(work.path()).run(input.path()).unwrap();
    assert_eq!(report.archives, 2);
    assert_eq!(report.count(CandidateStatus::Passed), 1);
    assert_eq!(report.count(CandidateStatus::Failed), 1);
    let ids: Vec<&str> = report.results.iter().map(|r| r.candidate_id.as_str()).collect();
    assert_eq!(ids, vec!["alice", "bob"]);

    assert_eq!(status_of(&report, "alice"), (CandidateStatus::Passed, String::new()));
    assert_eq!(
        status_of(&report, "bob"),
        (CandidateStatus::Failed, "- log file not found".to_string())
    );
    assert_eq!(leftover_run_dirs(work.path()), 0);
}

#[test]
fn invalid_files_are_reported_in_declaration_order() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();

    write_tar_gz(
        &input.path().join("candidate_carol.tar.gz"),
        &[
            ("carol/cron.txt", "* * * *\n"),
            ("carol/sales.txt", "Mon Mar  4 10:15:01 UTC 2024\nrtx3060: 12\n"),
            ("carol/exam.sh", "echo 'Error: API unreachable'\n"),
        ],
    );

    let report = bash_runner(work.path()).run(input.path()).unwrap();
    assert_eq!(
        status_of(&report, "carol"),
        (
            CandidateStatus::Failed,
            "- cron file is not correct\n- log file is not correct\n- script file is not correct"
                .to_string()
        )
    );
}

#[test]
fn corrupted_archive_means_every_file_missing() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    fs::write(input.path().join("candidate_dan.tar"), vec![0x42u8; 1024]).unwrap();

    let report = bash_runner(work.path()).run(input.path()).unwrap();
    assert_eq!(report.extraction_failures, 1);
    assert_eq!(
        status_of(&report, "dan"),
        (
            CandidateStatus::Failed,
            "- cron file not found\n- log file not found\n- script file not found".to_string()
        )
    );
    assert_eq!(leftover_run_dirs(work.path()), 0);
}

#[test]
fn repeated_runs_give_identical_results() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    for id in ["erin", "frank", "gina"] {
        write_tar(
            &input.path().join(format!("candidate_{}.tar", id)),
            &[
                (format!("{}/cron.txt", id).as_str(), CRON),
                (format!("{}/sales.txt", id).as_str(), SALES),
            ],
        );
    }

    let runner = bash_runner(work.path());
    let first = runner.run(input.path()).unwrap();
    let second = runner.run(input.path()).unwrap();
    assert_eq!(first.results, second.results);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(leftover_run_dirs(work.path()), 0);
}

struct BrokenChecker;

impl Checker for BrokenChecker {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn check(&self, _path: &Path) -> examgrade::Result<bool> {
        Err(GradeError::Process("interpreter missing".to_string()))
    }
}

#[test]
fn checker_fault_is_errored_not_failed() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    write_tar(
        &input.path().join("candidate_hana.tar"),
        &[
            ("hana/cron.txt", CRON),
            ("hana/exam.sh", SCRIPT),
            ("hana/sales.txt", SALES),
        ],
    );

    let settings = settings(work.path());
    let ctx = CheckerContext::new(settings.clone());
    let profile = CorrectorProfile::bash();
    let registry = CheckerRegistry::builder()
        .with("cron", examgrade::checkers::registry::checker_for(profile.files[0].checker, &ctx))
        .with("log", examgrade::checkers::registry::checker_for(profile.files[1].checker, &ctx))
        .with("script", Arc::new(BrokenChecker))
        .build();

    let report = BatchRunner::new(profile, Arc::new(registry), settings)
        .run(input.path())
        .unwrap();
    let (status, remarks) = status_of(&report, "hana");
    assert_eq!(status, CandidateStatus::Errored);
    assert_eq!(
        remarks,
        "- script file could not be checked: Process error: interpreter missing"
    );
    assert_eq!(report.errored().count(), 1);
}

#[test]
fn many_candidates_with_few_workers() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    for n in 0..12 {
        write_tar(
            &input.path().join(format!("candidate_c{:02}.tar", n)),
            &[("exam/cron.txt", CRON)],
        );
    }

    let report = bash_runner(work.path()).run(input.path()).unwrap();
    assert_eq!(report.results.len(), 12);
    assert!(report
        .results
        .iter()
        .all(|r| r.status == CandidateStatus::Failed
            && r.remarks == "- log file not found\n- script file not found"));
    let ids: Vec<&str> = report.results.iter().map(|r| r.candidate_id.as_str()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}
