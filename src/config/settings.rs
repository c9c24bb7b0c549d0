use crate::config::types::{GradeError, Result};
/// Grader settings and settings-file loading
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder substituted with the leased port in `server_command`
pub const PORT_PLACEHOLDER: &str = "{port}";

/// Runtime settings shared read-only by every worker
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GraderSettings {
    /// Worker threads processing candidates
    pub jobs: usize,
    /// Wall-clock limit for a candidate script
    pub script_timeout: Duration,
    /// How long a spawned service may take to answer its readiness check
    pub service_ready_timeout: Duration,
    /// SIGTERM to SIGKILL grace period for spawned services
    pub service_shutdown_grace: Duration,
    /// Port of the auxiliary API queried by candidate scripts
    pub api_port: u16,
    /// Port the candidate web service is started on
    pub service_port: u16,
    /// Command starting the auxiliary API (none: scripts run without it)
    pub api_command: Option<Vec<String>>,
    /// Command starting the candidate service, run inside its staging dir
    pub server_command: Vec<String>,
    /// Kill stale listeners on leased ports before and after use
    pub reclaim_ports: bool,
    /// Parent of the run-scoped extraction root (defaults to the temp dir)
    pub work_dir: Option<PathBuf>,
}

impl Default for GraderSettings {
    fn default() -> Self {
        Self {
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            script_timeout: Duration::from_secs(3),
            service_ready_timeout: Duration::from_secs(50),
            service_shutdown_grace: Duration::from_secs(5),
            api_port: 5000,
            service_port: 8000,
            api_command: None,
            server_command: vec![
                "uvicorn".to_string(),
                "main:app".to_string(),
                "--port".to_string(),
                PORT_PLACEHOLDER.to_string(),
            ],
            reclaim_ports: true,
            work_dir: None,
        }
    }
}

/// On-disk settings; every field optional and merged over the defaults
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    pub jobs: Option<usize>,
    pub script_timeout_secs: Option<u64>,
    pub service_ready_timeout_secs: Option<u64>,
    pub service_shutdown_grace_secs: Option<u64>,
    pub api_port: Option<u16>,
    pub service_port: Option<u16>,
    pub api_command: Option<Vec<String>>,
    pub server_command: Option<Vec<String>>,
    pub reclaim_ports: Option<bool>,
    pub work_dir: Option<PathBuf>,
}

impl SettingsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GradeError::Config(format!("cannot read settings file {}: {}", path.display(), e))
        })?;
        Self::parse(&raw)
            .map_err(|e| GradeError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(raw: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl GraderSettings {
    /// Overlay the values present in `file`
    pub fn merge(mut self, file: SettingsFile) -> Self {
        if let Some(jobs) = file.jobs {
            self.jobs = jobs;
        }
        if let Some(secs) = file.script_timeout_secs {
            self.script_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.service_ready_timeout_secs {
            self.service_ready_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.service_shutdown_grace_secs {
            self.service_shutdown_grace = Duration::from_secs(secs);
        }
        if let Some(port) = file.api_port {
            self.api_port = port;
        }
        if let Some(port) = file.service_port {
            self.service_port = port;
        }
        if file.api_command.is_some() {
            self.api_command = file.api_command;
        }
        if let Some(command) = file.server_command {
            self.server_command = command;
        }
        if let Some(reclaim) = file.reclaim_ports {
            self.reclaim_ports = reclaim;
        }
        if file.work_dir.is_some() {
            self.work_dir = file.work_dir;
        }
        self
    }

    /// Server argv with the port placeholder filled in
    pub fn server_argv(&self, port: u16) -> Vec<String> {
        self.server_command
            .iter()
            .map(|arg| arg.replace(PORT_PLACEHOLDER, &port.to_string()))
            .collect()
    }

    pub fn work_parent(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
