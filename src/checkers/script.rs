use crate::checkers::checker::{read_text, Checker};
use crate::config::types::{GradeError, Result};
use crate::exec::ports::PortRegistry;
use crate::exec::runner::{run_with_timeout, RunOutcome};
use crate::exec::service::ServiceProcess;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

/// Every append redirection in the candidate script is pointed here
pub const REDIRECT_TARGET: &str = "sales_1.txt";

/// Name of the cleaned copy written next to the candidate script
pub const SANITIZED_NAME: &str = "exam_sanitized.sh";

static APPEND_REDIRECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r">>\s*\S+").unwrap_or_else(|e| panic!("redirect pattern: {}", e))
});

/// Auxiliary API the candidate script queries
#[derive(Debug, Clone)]
pub struct ApiService {
    pub command: Vec<String>,
    pub port: u16,
    pub ready_timeout: Duration,
    pub shutdown_grace: Duration,
}

/// Runs the candidate's collection script and inspects its output.
pub struct ScriptChecker {
    timeout: Duration,
    api: Option<ApiService>,
    ports: Arc<PortRegistry>,
}

impl ScriptChecker {
    pub fn new(timeout: Duration, api: Option<ApiService>, ports: Arc<PortRegistry>) -> Self {
        Self { timeout, api, ports }
    }

    fn start_api(&self, api: &ApiService, cwd: &Path) -> Result<ServiceProcess> {
        let lease = self.ports.lease(api.port);
        let mut service =
            ServiceProcess::spawn("exam API", &api.command, cwd, api.shutdown_grace, Some(lease))?;
        if !service.wait_until_listening(api.ready_timeout) {
            return Err(GradeError::Timeout(format!(
                "exam API not listening on port {} after {:?}",
                api.port, api.ready_timeout
            )));
        }
        Ok(service)
    }
}

impl Checker for ScriptChecker {
    fn name(&self) -> &'static str {
        "script-output"
    }

    fn check(&self, path: &Path) -> Result<bool> {
        let dir = path
            .parent()
            .ok_or_else(|| GradeError::Config(format!("script has no parent: {}", path.display())))?;

        let source = read_text(path)?;
        let sanitized = dir.join(SANITIZED_NAME);
        std::fs::write(&sanitized, sanitize_script(&source))?;

        // Held until the script finishes; dropping it stops the API.
        let _api = match &self.api {
            Some(api) => Some(self.start_api(api, dir)?),
            None => None,
        };

        let mut command = Command::new("bash");
        command.arg(SANITIZED_NAME).current_dir(dir);
        let outcome = run_with_timeout(&mut command, self.timeout)?;

        let transcript = outcome.transcript();
        log::debug!("{} transcript: {:?}", path.display(), transcript);
        Ok(is_accepted(&outcome, &transcript))
    }
}

fn is_accepted(outcome: &RunOutcome, transcript: &str) -> bool {
    outcome.succeeded() && !transcript.contains("Error")
}

/// Redirect appends locally and drop comment and blank lines
///
/// A shebang on the first line is kept.
pub fn sanitize_script(source: &str) -> String {
    let redirected = APPEND_REDIRECT.replace_all(source, format!(">> {}", REDIRECT_TARGET).as_str());

    let mut out = String::with_capacity(redirected.len());
    for (index, line) in redirected.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('#') && !(index == 0 && trimmed.starts_with("#!")) {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}
