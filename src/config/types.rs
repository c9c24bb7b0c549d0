/// Core types shared across the grader
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Overall classification of one candidate
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CandidateStatus {
    /// Every expected file was found and validated
    Passed,
    /// At least one expected file was missing or invalid
    Failed,
    /// Grading tooling broke for this candidate (checker fault, locator I/O error)
    Errored,
}

impl CandidateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "Passed",
            Self::Failed => "Failed",
            Self::Errored => "Errored",
        }
    }

    pub fn is_passed(self) -> bool {
        matches!(self, Self::Passed)
    }
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one expected file for one candidate
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// File was not found in the workspace; its checker was never invoked
    Missing,
    /// Checker accepted the file
    Valid,
    /// Checker rejected the file
    Invalid,
    /// Checker could not decide (infrastructure fault)
    Fault(String),
}

impl CheckOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    /// Human-readable remark fragment for a non-valid outcome
    pub fn remark(&self, key: &str) -> Option<String> {
        match self {
            Self::Valid => None,
            Self::Missing => Some(format!("- {} file not found", key)),
            Self::Invalid => Some(format!("- {} file is not correct", key)),
            Self::Fault(reason) => Some(format!("- {} file could not be checked: {}", key, reason)),
        }
    }
}

/// Per-file record kept alongside the aggregated result
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileVerdict {
    pub key: String,
    pub file_name: String,
    #[serde(flatten)]
    pub outcome: CheckOutcome,
}

/// Final result for one candidate
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateResult {
    pub candidate_id: String,
    pub status: CandidateStatus,
    /// One fragment per failing/missing file, newline separated; empty iff passed
    pub remarks: String,
    #[serde(default)]
    pub files: Vec<FileVerdict>,
}

impl CandidateResult {
    /// Result for a candidate whose grading could not proceed at all
    pub fn errored(candidate_id: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            status: CandidateStatus::Errored,
            remarks: format!("- grading error: {}", reason),
            files: Vec::new(),
        }
    }
}

/// Error type for the grader
#[derive(Error, Debug)]
pub enum GradeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Batch interrupted by signal")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, GradeError>;
