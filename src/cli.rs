use crate::checkers::registry::{CheckerContext, CheckerRegistry};
use crate::config::profiles::CorrectorProfile;
use crate::config::settings::{GraderSettings, SettingsFile};
use crate::config::validator::validate_startup;
use crate::core::batch::BatchRunner;
use crate::report::{render_table, summary, JsonExport};
use crate::safety::interrupt::install_interrupt_handlers;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum ExamType {
    /// Linux exam: crontab, sales log and collection script
    #[default]
    Bash,
    /// FastAPI exam: question-bank web service
    Fastapi,
}

impl ExamType {
    pub fn profile(self) -> CorrectorProfile {
        match self {
            Self::Bash => CorrectorProfile::bash(),
            Self::Fastapi => CorrectorProfile::fastapi(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Folder containing the candidates' exam archives
    pub exams_folder: PathBuf,

    /// Exam type, selects which files are expected and how they are checked
    #[arg(long = "type", value_enum, default_value_t = ExamType::Bash)]
    pub exam_type: ExamType,

    /// Only list candidates that did not pass
    #[arg(long)]
    pub show_only_failed_exams: bool,

    /// Candidates graded in parallel
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Also write the results as JSON to this file
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Settings file (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Parent directory for the run's extraction root
    #[arg(long)]
    pub work_dir: Option<PathBuf>,
}

impl Cli {
    /// Defaults, then the settings file, then command-line flags
    pub fn settings(&self) -> Result<GraderSettings> {
        let mut settings = GraderSettings::default();
        if let Some(path) = &self.config {
            settings = settings.merge(SettingsFile::load(path)?);
        }
        if let Some(jobs) = self.jobs {
            settings.jobs = jobs;
        }
        if let Some(dir) = &self.work_dir {
            settings.work_dir = Some(dir.clone());
        }
        Ok(settings)
    }
}

pub fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version print to stdout and succeed.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    install_interrupt_handlers();

    let profile = cli.exam_type.profile();
    let settings = cli.settings()?;
    validate_startup(&profile, &settings)?;

    let ctx = CheckerContext::new(settings.clone());
    let registry = CheckerRegistry::from_profile(&profile, &ctx);
    registry.covers(&profile)?;

    let runner = BatchRunner::new(profile.clone(), Arc::new(registry), settings);
    let report = runner
        .run(&cli.exams_folder)
        .with_context(|| format!("grading {} failed", cli.exams_folder.display()))?;

    print!("{}", render_table(&report.results, cli.show_only_failed_exams));
    println!("{}", summary(&report.results));

    if let Some(path) = &cli.json {
        JsonExport::new(&profile.name, &report.results).write_to(path)?;
        log::info!("Results written to {}", path.display());
    }

    for result in report.errored() {
        eprintln!(
            "Warning: candidate {} could not be graded reliably (grading fault, not a candidate error)",
            result.candidate_id
        );
    }

    Ok(())
}
