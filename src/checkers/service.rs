use crate::checkers::checker::Checker;
use crate::config::types::{GradeError, Result};
use crate::exec::ports::PortRegistry;
use crate::exec::service::ServiceProcess;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "4dm1N";

pub const ALIVE_MESSAGE: &str = "L'API fonctionne";
pub const ADDED_MESSAGE: &str = "La question a bien été ajoutée";

/// Keys every question object must have, and no others
pub const QUESTION_KEYS: [&str; 9] = [
    "question",
    "subject",
    "use",
    "correct",
    "responseA",
    "responseB",
    "responseC",
    "responseD",
    "remark",
];

const ALIVE_POLL_INTERVAL: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RANDOMNESS_DELAY: Duration = Duration::from_secs(1);

/// Starts the candidate's web service and exercises its endpoints.
pub struct ServiceChecker {
    server_command: Vec<String>,
    port: u16,
    ready_timeout: Duration,
    shutdown_grace: Duration,
    ports: Arc<PortRegistry>,
}

impl ServiceChecker {
    /// `server_command` must already have the port substituted
    pub fn new(
        server_command: Vec<String>,
        port: u16,
        ready_timeout: Duration,
        shutdown_grace: Duration,
        ports: Arc<PortRegistry>,
    ) -> Self {
        Self {
            server_command,
            port,
            ready_timeout,
            shutdown_grace,
            ports,
        }
    }

    fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    fn wait_alive(&self, client: &Client, service: &mut ServiceProcess) -> bool {
        let url = format!("{}/alive", self.base_url());
        let started = Instant::now();
        while started.elapsed() < self.ready_timeout {
            if service.has_exited() {
                log::info!("Service exited before answering /alive");
                return false;
            }
            if let Ok(response) = client.get(&url).send() {
                if response.status() == StatusCode::OK {
                    let body = response.json::<Value>().unwrap_or(Value::Null);
                    if has_message(&body, "message", ALIVE_MESSAGE) {
                        return true;
                    }
                }
            }
            thread::sleep(ALIVE_POLL_INTERVAL);
        }
        log::info!("Service not alive within {:?}", self.ready_timeout);
        false
    }

    fn fetch_questions(&self, client: &Client) -> Option<Value> {
        let response = client
            .get(format!("{}/questions", self.base_url()))
            .basic_auth(USERNAME, Some(PASSWORD))
            .send()
            .ok()?;
        if response.status() != StatusCode::OK {
            return None;
        }
        response.json::<Value>().ok()
    }

    fn questions_valid(&self, client: &Client) -> bool {
        let first = self.fetch_questions(client);
        if !first.as_ref().is_some_and(is_question_list) {
            log::info!("GET /questions returned an unexpected shape");
            return false;
        }
        thread::sleep(RANDOMNESS_DELAY);
        let second = self.fetch_questions(client);
        if !second.as_ref().is_some_and(is_question_list) {
            log::info!("Second GET /questions returned an unexpected shape");
            return false;
        }
        if first == second {
            log::info!("GET /questions returned identical samples twice");
            return false;
        }
        true
    }

    fn add_question_valid(&self, client: &Client) -> bool {
        let response = match client
            .post(format!("{}/add-questions", self.base_url()))
            .basic_auth(USERNAME, Some(PASSWORD))
            .send()
        {
            Ok(response) => response,
            Err(e) => {
                log::info!("POST /add-questions failed: {}", e);
                return false;
            }
        };
        response.status() == StatusCode::OK
            && response
                .json::<Value>()
                .map(|body| has_message(&body, "Message", ADDED_MESSAGE))
                .unwrap_or(false)
    }
}

impl Checker for ServiceChecker {
    fn name(&self) -> &'static str {
        "service-health"
    }

    fn check(&self, path: &Path) -> Result<bool> {
        let file_name = path
            .file_name()
            .ok_or_else(|| GradeError::Config(format!("not a file: {}", path.display())))?;
        let dir = path
            .parent()
            .ok_or_else(|| GradeError::Config(format!("no parent: {}", path.display())))?;

        let staging = StagingDir::create(dir)?;
        fs::copy(path, staging.path().join(file_name))?;

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        // Declared after `staging` so the server stops before its files go.
        let mut service = ServiceProcess::spawn(
            "candidate service",
            &self.server_command,
            staging.path(),
            self.shutdown_grace,
            Some(self.ports.lease(self.port)),
        )?;

        let alive = self.wait_alive(&client, &mut service);
        let questions = alive && self.questions_valid(&client);
        let added = questions && self.add_question_valid(&client);
        log::debug!(
            "{}: alive={} questions={} add={}",
            path.display(),
            alive,
            questions,
            added
        );
        Ok(alive && questions && added)
    }
}

/// Private copy of the entry point; removed on drop
struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    fn create(parent: &Path) -> Result<Self> {
        let path = parent.join(format!(".examgrade-service-{}", uuid::Uuid::new_v4()));
        fs::create_dir(&path)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            log::warn!("Failed to remove staging dir {}: {}", self.path.display(), e);
        }
    }
}

/// `{key: expected}` with nothing else in the object
pub fn has_message(body: &Value, key: &str, expected: &str) -> bool {
    body.as_object()
        .is_some_and(|obj| obj.len() == 1 && obj.get(key).and_then(Value::as_str) == Some(expected))
}

/// Non-empty array of objects whose key set is exactly [`QUESTION_KEYS`]
pub fn is_question_list(body: &Value) -> bool {
    let expected: BTreeSet<&str> = QUESTION_KEYS.iter().copied().collect();
    match body.as_array() {
        Some(items) if !items.is_empty() => items.iter().all(|item| {
            item.as_object().is_some_and(|obj| {
                obj.keys().map(String::as_str).collect::<BTreeSet<_>>() == expected
            })
        }),
        _ => false,
    }
}
