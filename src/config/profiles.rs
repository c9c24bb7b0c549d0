/// Corrector profiles
///
/// A profile pairs an ordered list of expected file names with the checker
/// that validates each one. Profiles are immutable once built and are
/// validated at startup by [`crate::config::validator::validate_profile`].
use serde::{Deserialize, Serialize};
use std::fmt;

/// Checker capability attached to an expected file
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckerKind {
    /// Crontab lines: five schedule fields plus a command
    Schedule,
    /// Sales log written by the candidate's script
    SalesLog,
    /// Candidate shell script, executed against the auxiliary API
    ScriptOutput,
    /// Web service entry point, checked over HTTP
    ServiceHealth,
}

impl CheckerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::SalesLog => "sales-log",
            Self::ScriptOutput => "script-output",
            Self::ServiceHealth => "service-health",
        }
    }
}

/// One file a candidate submission must contain
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpectedFile {
    /// Label used in remarks ("cron", "log", ...)
    pub key: String,
    /// Exact file name searched for in the workspace
    pub file_name: String,
    pub checker: CheckerKind,
}

impl ExpectedFile {
    pub fn new(key: &str, file_name: &str, checker: CheckerKind) -> Self {
        Self {
            key: key.to_string(),
            file_name: file_name.to_string(),
            checker,
        }
    }
}

/// Named set of expected files
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorrectorProfile {
    pub name: String,
    pub files: Vec<ExpectedFile>,
}

impl CorrectorProfile {
    pub fn new(name: &str, files: Vec<ExpectedFile>) -> Self {
        Self {
            name: name.to_string(),
            files,
        }
    }

    /// Linux/bash exam: crontab, sales log and collection script
    pub fn bash() -> Self {
        Self::new(
            "bash",
            vec![
                ExpectedFile::new("cron", "cron.txt", CheckerKind::Schedule),
                ExpectedFile::new("log", "sales.txt", CheckerKind::SalesLog),
                ExpectedFile::new("script", "exam.sh", CheckerKind::ScriptOutput),
            ],
        )
    }

    /// FastAPI exam: a single service entry point
    pub fn fastapi() -> Self {
        Self::new(
            "fastapi",
            vec![ExpectedFile::new("main", "main.py", CheckerKind::ServiceHealth)],
        )
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "bash" | "linux" => Some(Self::bash()),
            "fastapi" | "api" => Some(Self::fastapi()),
            _ => None,
        }
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.file_name.as_str())
    }

    pub fn uses(&self, kind: CheckerKind) -> bool {
        self.files.iter().any(|f| f.checker == kind)
    }
}

impl fmt::Display for CorrectorProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.file_names().collect();
        write!(f, "{} [{}]", self.name, names.join(", "))
    }
}
