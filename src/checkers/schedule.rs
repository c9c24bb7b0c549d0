use crate::checkers::checker::{read_text, Checker};
use crate::config::types::Result;
use std::path::Path;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Value domain of one cron field
struct FieldDomain {
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// Value of the first entry in `names`
    name_base: u32,
}

const FIELDS: [FieldDomain; 5] = [
    FieldDomain { min: 0, max: 59, names: &[], name_base: 0 },
    FieldDomain { min: 0, max: 23, names: &[], name_base: 0 },
    FieldDomain { min: 1, max: 31, names: &[], name_base: 0 },
    FieldDomain { min: 1, max: 12, names: &MONTH_NAMES, name_base: 1 },
    FieldDomain { min: 0, max: 7, names: &WEEKDAY_NAMES, name_base: 0 },
];

/// Validates crontab files: every schedule line needs five valid cron
/// fields followed by a command.
#[derive(Debug, Clone, Default)]
pub struct ScheduleChecker;

impl Checker for ScheduleChecker {
    fn name(&self) -> &'static str {
        "schedule"
    }

    fn check(&self, path: &Path) -> Result<bool> {
        let content = read_text(path)?;
        Ok(is_valid_crontab(&content))
    }
}

/// At least one schedule line, and every schedule line valid
pub fn is_valid_crontab(content: &str) -> bool {
    let mut seen = 0usize;
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !is_valid_line(line) {
            log::debug!("Rejected crontab line: {:?}", line);
            return false;
        }
        seen += 1;
    }
    seen > 0
}

/// Five schedule fields plus a non-empty command
pub fn is_valid_line(line: &str) -> bool {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 6 {
        return false;
    }
    is_valid_expression(&fields[..5])
}

fn is_valid_expression(fields: &[&str]) -> bool {
    fields.len() == FIELDS.len()
        && fields
            .iter()
            .zip(FIELDS.iter())
            .all(|(field, domain)| is_valid_field(field, domain))
}

fn is_valid_field(field: &str, domain: &FieldDomain) -> bool {
    field.split(',').all(|item| is_valid_item(item, domain))
}

fn is_valid_item(item: &str, domain: &FieldDomain) -> bool {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };

    if let Some(step) = step {
        match step.parse::<u32>() {
            Ok(n) if n > 0 => {}
            _ => return false,
        }
    }

    if range == "*" {
        return true;
    }

    match range.split_once('-') {
        Some((start, end)) => match (value(start, domain), value(end, domain)) {
            (Some(start), Some(end)) => start <= end,
            _ => false,
        },
        None => value(range, domain).is_some(),
    }
}

fn value(token: &str, domain: &FieldDomain) -> Option<u32> {
    let parsed = if token.chars().all(|c| c.is_ascii_digit()) && !token.is_empty() {
        token.parse::<u32>().ok()?
    } else {
        let lower = token.to_ascii_lowercase();
        let index = domain.names.iter().position(|name| *name == lower)?;
        index as u32 + domain.name_base
    };
    (domain.min..=domain.max).contains(&parsed).then_some(parsed)
}
