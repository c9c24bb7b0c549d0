//! Result reporting.
//!
//! Renders results as a grid table for the terminal and exports them as
//! JSON. Rendering never fails: an empty result set still produces a table
//! with just its header.

use crate::config::types::{CandidateResult, CandidateStatus, GradeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

const HEADERS: [&str; 3] = ["candidate", "result", "remarks"];

/// Grid table of `results`; `only_failed` drops passed candidates
pub fn render_table(results: &[CandidateResult], only_failed: bool) -> String {
    let rows: Vec<[&str; 3]> = results
        .iter()
        .filter(|r| !(only_failed && r.status.is_passed()))
        .map(|r| [r.candidate_id.as_str(), r.status.as_str(), r.remarks.as_str()])
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            let widest = cell.lines().map(|l| l.chars().count()).max().unwrap_or(0);
            *width = (*width).max(widest);
        }
    }

    let mut out = String::new();
    out.push_str(&border(&widths, '-'));
    out.push_str(&row_lines(&HEADERS, &widths));
    out.push_str(&border(&widths, if rows.is_empty() { '-' } else { '=' }));
    for row in &rows {
        out.push_str(&row_lines(row, &widths));
        out.push_str(&border(&widths, '-'));
    }
    out
}

fn border(widths: &[usize; 3], fill: char) -> String {
    let mut line = String::from("+");
    for width in widths {
        line.extend(std::iter::repeat(fill).take(width + 2));
        line.push('+');
    }
    line.push('\n');
    line
}

fn row_lines(cells: &[&str; 3], widths: &[usize; 3]) -> String {
    let split: Vec<Vec<&str>> = cells.iter().map(|c| c.lines().collect()).collect();
    let height = split.iter().map(Vec::len).max().unwrap_or(0).max(1);

    let mut out = String::new();
    for i in 0..height {
        out.push('|');
        for (lines, width) in split.iter().zip(widths.iter()) {
            let text = lines.get(i).copied().unwrap_or("");
            let pad = width - text.chars().count();
            out.push(' ');
            out.push_str(text);
            out.extend(std::iter::repeat(' ').take(pad + 1));
            out.push('|');
        }
        out.push('\n');
    }
    out
}

/// One-line tally printed under the table
pub fn summary(results: &[CandidateResult]) -> String {
    let count = |status: CandidateStatus| results.iter().filter(|r| r.status == status).count();
    format!(
        "{} candidate(s): {} passed, {} failed, {} errored",
        results.len(),
        count(CandidateStatus::Passed),
        count(CandidateStatus::Failed),
        count(CandidateStatus::Errored)
    )
}

/// Machine-readable export of one run
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JsonExport {
    pub profile: String,
    pub graded_at: DateTime<Utc>,
    pub results: Vec<CandidateResult>,
}

impl JsonExport {
    pub fn new(profile: &str, results: &[CandidateResult]) -> Self {
        Self {
            profile: profile.to_string(),
            graded_at: Utc::now(),
            results: results.to_vec(),
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| GradeError::Config(format!("cannot serialize results: {}", e)))?;
        std::fs::write(path, json).map_err(|e| {
            GradeError::Io(std::io::Error::new(
                e.kind(),
                format!("cannot write {}: {}", path.display(), e),
            ))
        })
    }
}
