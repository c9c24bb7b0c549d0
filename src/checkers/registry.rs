use crate::checkers::checker::Checker;
use crate::checkers::sales_log::SalesLogChecker;
use crate::checkers::schedule::ScheduleChecker;
use crate::checkers::script::{ApiService, ScriptChecker};
use crate::checkers::service::ServiceChecker;
use crate::config::profiles::{CheckerKind, CorrectorProfile};
use crate::config::settings::GraderSettings;
use crate::config::types::{GradeError, Result};
use crate::exec::ports::PortRegistry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Shared resources checkers are built with
#[derive(Clone, Debug)]
pub struct CheckerContext {
    pub settings: GraderSettings,
    pub ports: Arc<PortRegistry>,
}

impl CheckerContext {
    pub fn new(settings: GraderSettings) -> Self {
        let ports = PortRegistry::new(settings.reclaim_ports);
        Self { settings, ports }
    }
}

pub fn checker_for(kind: CheckerKind, ctx: &CheckerContext) -> Arc<dyn Checker> {
    let settings = &ctx.settings;
    match kind {
        CheckerKind::Schedule => Arc::new(ScheduleChecker),
        CheckerKind::SalesLog => Arc::new(SalesLogChecker),
        CheckerKind::ScriptOutput => {
            let api = settings.api_command.clone().map(|command| ApiService {
                command,
                port: settings.api_port,
                ready_timeout: settings.service_ready_timeout,
                shutdown_grace: settings.service_shutdown_grace,
            });
            Arc::new(ScriptChecker::new(
                settings.script_timeout,
                api,
                Arc::clone(&ctx.ports),
            ))
        }
        CheckerKind::ServiceHealth => Arc::new(ServiceChecker::new(
            settings.server_argv(settings.service_port),
            settings.service_port,
            settings.service_ready_timeout,
            settings.service_shutdown_grace,
            Arc::clone(&ctx.ports),
        )),
    }
}

/// Expected-file key to checker
#[derive(Clone, Default)]
pub struct CheckerRegistry {
    checkers: HashMap<String, Arc<dyn Checker>>,
}

impl CheckerRegistry {
    /// One checker per expected file of `profile`
    pub fn from_profile(profile: &CorrectorProfile, ctx: &CheckerContext) -> Self {
        let mut builder = Self::builder();
        for file in &profile.files {
            builder = builder.with(&file.key, checker_for(file.checker, ctx));
        }
        builder.build()
    }

    pub fn builder() -> CheckerRegistryBuilder {
        CheckerRegistryBuilder::default()
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn Checker>> {
        self.checkers.get(key)
    }

    /// Every expected file of `profile` has a checker
    pub fn covers(&self, profile: &CorrectorProfile) -> Result<()> {
        let missing: Vec<&str> = profile
            .files
            .iter()
            .filter(|f| !self.checkers.contains_key(&f.key))
            .map(|f| f.key.as_str())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(GradeError::Config(format!(
                "no checker registered for: {}",
                missing.join(", ")
            )))
        }
    }
}

impl fmt::Debug for CheckerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<(&str, &str)> = self
            .checkers
            .iter()
            .map(|(key, checker)| (key.as_str(), checker.name()))
            .collect();
        entries.sort();
        f.debug_map().entries(entries).finish()
    }
}

#[derive(Default)]
pub struct CheckerRegistryBuilder {
    checkers: HashMap<String, Arc<dyn Checker>>,
}

impl CheckerRegistryBuilder {
    /// Register `checker` for `key`, replacing any earlier one
    pub fn with(mut self, key: &str, checker: Arc<dyn Checker>) -> Self {
        self.checkers.insert(key.to_string(), checker);
        self
    }

    pub fn build(self) -> CheckerRegistry {
        CheckerRegistry {
            checkers: self.checkers,
        }
    }
}
