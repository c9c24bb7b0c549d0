/// Cleanup and resource management
///
/// Resources are recorded right after they are created and released in
/// reverse creation order. Every release is idempotent, so cleanup can run
/// again after a partial failure.
use crate::config::types::{GradeError, Result};
use crate::exec::ports::reclaim_port;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Resource types that need cleanup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// Extraction root or any directory tree owned by the run
    Workspace(PathBuf),
    /// Port that auxiliary services may have left bound
    Port(u16),
}

/// Resource ledger entry
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    pub resource: ResourceType,
    pub created_at: std::time::SystemTime,
}

/// Ledger of created resources
#[derive(Debug, Default)]
pub struct ResourceLedger {
    entries: Vec<ResourceEntry>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resource; duplicates are ignored
    pub fn record(&mut self, resource: ResourceType) {
        if self.entries.iter().any(|e| e.resource == resource) {
            return;
        }
        debug!("Recording resource: {:?}", resource);
        self.entries.push(ResourceEntry {
            resource,
            created_at: std::time::SystemTime::now(),
        });
    }

    pub fn remove(&mut self, resource: &ResourceType) {
        self.entries.retain(|e| &e.resource != resource);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    fn reverse_order(&self) -> Vec<ResourceType> {
        self.entries.iter().rev().map(|e| e.resource.clone()).collect()
    }
}

/// Cleanup manager with idempotent operations
#[derive(Debug, Default)]
pub struct CleanupManager {
    ledger: ResourceLedger,
    reclaim_ports: bool,
    cleanup_errors: Vec<String>,
}

impl CleanupManager {
    /// `reclaim_ports`: whether recorded ports get stale listeners killed
    pub fn new(reclaim_ports: bool) -> Self {
        Self {
            ledger: ResourceLedger::new(),
            reclaim_ports,
            cleanup_errors: Vec::new(),
        }
    }

    pub fn record(&mut self, resource: ResourceType) {
        self.ledger.record(resource);
    }

    pub fn pending(&self) -> usize {
        self.ledger.count()
    }

    pub fn errors(&self) -> &[String] {
        &self.cleanup_errors
    }

    /// Release all resources in reverse creation order
    ///
    /// Successfully released resources leave the ledger; failed ones stay
    /// so a later call can retry them.
    pub fn cleanup_all(&mut self) -> Result<()> {
        if self.ledger.is_empty() {
            return Ok(());
        }
        info!("Starting cleanup of {} resources", self.ledger.count());

        let mut failed = Vec::new();
        for resource in self.ledger.reverse_order() {
            match self.cleanup_resource(&resource) {
                Ok(()) => self.ledger.remove(&resource),
                Err(e) => {
                    let msg = format!("Failed to clean up {:?}: {}", resource, e);
                    warn!("{}", msg);
                    self.cleanup_errors.push(msg);
                    failed.push(resource);
                }
            }
        }

        if !failed.is_empty() {
            return Err(GradeError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("cleanup failed for {} resources: {:?}", failed.len(), failed),
            )));
        }

        info!("Cleanup complete");
        Ok(())
    }

    fn cleanup_resource(&self, resource: &ResourceType) -> Result<()> {
        match resource {
            ResourceType::Workspace(path) => Self::cleanup_workspace(path),
            ResourceType::Port(port) => {
                if self.reclaim_ports {
                    let released = reclaim_port(*port);
                    debug!("Port {} reclaimed ({} listeners signalled)", port, released);
                }
                Ok(())
            }
        }
    }

    fn cleanup_workspace(path: &Path) -> Result<()> {
        match fs::symlink_metadata(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Workspace already cleaned: {}", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
            Ok(meta) if meta.is_dir() => {
                debug!("Removing workspace: {}", path.display());
                // remove_dir_all never follows symlinks planted by archives.
                fs::remove_dir_all(path).map_err(|e| {
                    GradeError::Io(std::io::Error::new(
                        e.kind(),
                        format!("Failed to remove workspace {}: {}", path.display(), e),
                    ))
                })
            }
            Ok(_) => fs::remove_file(path).map_err(Into::into),
        }
    }
}

/// Runs [`CleanupManager::cleanup_all`] when dropped
///
/// Holding one of these across a batch guarantees cleanup on early return,
/// `?` propagation and unwinding panics alike.
#[derive(Debug)]
pub struct CleanupGuard {
    manager: CleanupManager,
}

impl CleanupGuard {
    pub fn new(manager: CleanupManager) -> Self {
        Self { manager }
    }

    pub fn record(&mut self, resource: ResourceType) {
        self.manager.record(resource);
    }

    pub fn manager(&self) -> &CleanupManager {
        &self.manager
    }

    /// Clean up now instead of at drop, surfacing any failure
    pub fn finish(mut self) -> Result<()> {
        self.manager.cleanup_all()
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Err(e) = self.manager.cleanup_all() {
            log::error!("Cleanup incomplete: {}", e);
        }
    }
}
