// Startup validation
// Profiles and settings are checked once before any archive is touched.

use crate::config::profiles::{CheckerKind, CorrectorProfile};
use crate::config::settings::{GraderSettings, PORT_PLACEHOLDER};
use crate::config::types::{GradeError, Result};
use std::collections::HashSet;

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate profile and settings together; errors are fatal
pub fn validate_startup(
    profile: &CorrectorProfile,
    settings: &GraderSettings,
) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();
    validate_profile(profile, &mut result);
    validate_settings(profile, settings, &mut result);

    for warning in &result.warnings {
        log::warn!("{}", warning);
    }

    if !result.is_valid() {
        return Err(GradeError::Config(format!(
            "invalid configuration for profile '{}':\n{}",
            profile.name,
            result.errors.join("\n")
        )));
    }

    Ok(result)
}

/// Expected-file list must be non-empty with unique keys and plain names
pub fn validate_profile(profile: &CorrectorProfile, result: &mut ValidationResult) {
    if profile.name.trim().is_empty() {
        result.add_error("profile name cannot be empty".to_string());
    }

    if profile.files.is_empty() {
        result.add_error(format!(
            "profile '{}' declares no expected files",
            profile.name
        ));
    }

    let mut keys = HashSet::new();
    let mut names = HashSet::new();
    for file in &profile.files {
        if file.key.trim().is_empty() {
            result.add_error(format!("expected file {:?} has an empty key", file.file_name));
        }
        if !keys.insert(file.key.as_str()) {
            result.add_error(format!("duplicate expected file key: {}", file.key));
        }
        if file.file_name.is_empty() || file.file_name.contains('/') || file.file_name.contains('\\') {
            result.add_error(format!(
                "expected file name must be a bare file name: {:?}",
                file.file_name
            ));
        }
        if !names.insert(file.file_name.as_str()) {
            result.add_error(format!("duplicate expected file name: {}", file.file_name));
        }
    }
}

fn validate_settings(
    profile: &CorrectorProfile,
    settings: &GraderSettings,
    result: &mut ValidationResult,
) {
    if settings.jobs == 0 {
        result.add_error("jobs cannot be zero".to_string());
    }

    if settings.script_timeout.is_zero() {
        result.add_error("script_timeout cannot be zero".to_string());
    }

    if settings.service_ready_timeout.is_zero() {
        result.add_error("service_ready_timeout cannot be zero".to_string());
    }

    if profile.uses(CheckerKind::ServiceHealth) {
        if settings.server_command.is_empty() {
            result.add_error("server_command cannot be empty".to_string());
        } else if !settings.server_command.iter().any(|a| a.contains(PORT_PLACEHOLDER)) {
            result.add_warning(format!(
                "server_command has no {} placeholder; the service must listen on {} by itself",
                PORT_PLACEHOLDER, settings.service_port
            ));
        }
        if settings.service_port == 0 {
            result.add_error("service_port cannot be zero".to_string());
        }
    }

    if profile.uses(CheckerKind::ScriptOutput) {
        match &settings.api_command {
            Some(command) if command.is_empty() => {
                result.add_error("api_command cannot be an empty list".to_string());
            }
            Some(_) if settings.api_port == 0 => {
                result.add_error("api_port cannot be zero".to_string());
            }
            Some(_) => {}
            None => result.add_warning(
                "no api_command configured; candidate scripts run without the auxiliary API"
                    .to_string(),
            ),
        }
    }
}
