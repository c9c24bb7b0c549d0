use crate::checkers::checker::{read_text, Checker};
use crate::config::types::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

/// Product keys every log entry must report
pub const CATEGORIES: [&str; 5] = ["rtx3060", "rtx3070", "rtx3080", "rtx3090", "rx6700"];

// Output of `date`, e.g. "Mon Mar  4 10:15:01 UTC 2024"
static TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\w{3} \w{3}\s+\d{1,2} \d{2}:\d{2}:\d{2} \w+ \d{4}$")
        .unwrap_or_else(|e| panic!("timestamp pattern: {}", e))
});

static CATEGORY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(rtx3060|rtx3070|rtx3080|rtx3090|rx6700): ?\d+$")
        .unwrap_or_else(|e| panic!("category pattern: {}", e))
});

/// Validates the sales log appended to by the candidate's collection script.
#[derive(Debug, Clone, Default)]
pub struct SalesLogChecker;

impl Checker for SalesLogChecker {
    fn name(&self) -> &'static str {
        "sales-log"
    }

    fn check(&self, path: &Path) -> Result<bool> {
        let content = read_text(path)?;
        Ok(is_valid_sales_log(&content))
    }
}

/// One timestamp line followed by its category lines
#[derive(Debug, Default, PartialEq, Eq)]
struct Entry<'a> {
    keys: HashSet<&'a str>,
}

impl Entry<'_> {
    fn is_complete(&self) -> bool {
        CATEGORIES.iter().all(|key| self.keys.contains(key))
    }
}

fn entries(content: &str) -> Vec<Entry<'_>> {
    let mut found = Vec::new();
    let mut current: Option<Entry<'_>> = None;

    for line in content.lines().map(str::trim_end).filter(|l| !l.trim().is_empty()) {
        if TIMESTAMP.is_match(line) {
            found.extend(current.take().filter(|e| !e.keys.is_empty()));
            current = Some(Entry::default());
            continue;
        }
        let key = CATEGORY_LINE
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str());
        match (key, current.is_some()) {
            (Some(key), true) => {
                if let Some(entry) = current.as_mut() {
                    entry.keys.insert(key);
                }
            }
            // Anything else ends the entry in progress.
            _ => found.extend(current.take().filter(|e| !e.keys.is_empty())),
        }
    }
    found.extend(current.filter(|e| !e.keys.is_empty()));
    found
}

/// At least one entry, and every entry lists all five categories
pub fn is_valid_sales_log(content: &str) -> bool {
    let entries = entries(content);
    if entries.is_empty() {
        log::debug!("Sales log has no timestamped entries");
        return false;
    }
    entries.iter().all(Entry::is_complete)
}
