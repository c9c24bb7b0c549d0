/// Port leases
///
/// Auxiliary services bind fixed ports, so only one candidate may use a
/// given port at a time. Checkers take a [`PortLease`] from the shared
/// [`PortRegistry`] before spawning anything that binds; a second worker
/// asking for the same port blocks until the first lease is dropped.
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::process::{Command, Stdio};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub struct PortRegistry {
    leased: Mutex<HashSet<u16>>,
    released: Condvar,
    reclaim: bool,
}

impl PortRegistry {
    /// `reclaim`: kill stale listeners when a lease is taken and when it ends
    pub fn new(reclaim: bool) -> Arc<Self> {
        Arc::new(Self {
            leased: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            reclaim,
        })
    }

    fn leased(&self) -> MutexGuard<'_, HashSet<u16>> {
        self.leased.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until `port` is free, then hold it exclusively
    pub fn lease(self: &Arc<Self>, port: u16) -> PortLease {
        let started = Instant::now();
        let mut leased = self.leased();
        while leased.contains(&port) {
            leased = self
                .released
                .wait(leased)
                .unwrap_or_else(|e| e.into_inner());
        }
        leased.insert(port);
        drop(leased);

        let waited = started.elapsed();
        if waited > Duration::from_millis(100) {
            log::debug!("Waited {:?} for port {}", waited, port);
        }
        if self.reclaim {
            reclaim_port(port);
        }

        PortLease {
            registry: Arc::clone(self),
            port,
        }
    }

    /// Non-blocking variant of [`PortRegistry::lease`]
    pub fn try_lease(self: &Arc<Self>, port: u16) -> Option<PortLease> {
        let mut leased = self.leased();
        if !leased.insert(port) {
            return None;
        }
        drop(leased);

        if self.reclaim {
            reclaim_port(port);
        }
        Some(PortLease {
            registry: Arc::clone(self),
            port,
        })
    }

    pub fn is_leased(&self, port: u16) -> bool {
        self.leased().contains(&port)
    }

    pub fn reclaims(&self) -> bool {
        self.reclaim
    }

    fn release(&self, port: u16) {
        if self.reclaim {
            reclaim_port(port);
        }
        self.leased().remove(&port);
        self.released.notify_all();
    }
}

/// Exclusive use of one port; released on drop
#[derive(Debug)]
pub struct PortLease {
    registry: Arc<PortRegistry>,
    port: u16,
}

impl PortLease {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.registry.release(self.port);
    }
}

impl std::fmt::Debug for PortRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortRegistry")
            .field("leased", &*self.leased())
            .field("reclaim", &self.reclaim)
            .finish()
    }
}

/// Best-effort: SIGTERM every process listening on `port`
///
/// Uses `lsof`; a missing `lsof` or no listener is not an error. Returns the
/// number of processes signalled.
pub fn reclaim_port(port: u16) -> usize {
    let output = match Command::new("lsof")
        .args(["-t", "-i", &format!("TCP:{}", port), "-s", "TCP:LISTEN"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            log::debug!("lsof unavailable, cannot reclaim port {}: {}", port, e);
            return 0;
        }
    };

    let own_pid = std::process::id() as i32;
    let mut signalled = 0;
    for pid in String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .filter_map(|p| p.parse::<i32>().ok())
        .filter(|pid| *pid != own_pid && *pid > 1)
    {
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => {
                log::info!("Released port {} held by pid {}", port, pid);
                signalled += 1;
            }
            Err(e) => log::warn!("Cannot signal pid {} holding port {}: {}", pid, port, e),
        }
    }
    signalled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn lease_is_exclusive_and_released_on_drop() {
        let registry = PortRegistry::new(false);
        let lease = registry.lease(41_001);
        assert!(registry.is_leased(41_001));
        assert!(registry.try_lease(41_001).is_none());
        assert!(registry.try_lease(41_002).is_some());
        drop(lease);
        assert!(!registry.is_leased(41_001));
        assert!(registry.try_lease(41_001).is_some());
    }

    #[test]
    fn concurrent_leases_never_overlap() {
        let registry = PortRegistry::new(false);
        let holders = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        thread::scope(|scope| {
            for _ in 0..8 {
                let registry = Arc::clone(&registry);
                let holders = Arc::clone(&holders);
                let max_seen = Arc::clone(&max_seen);
                scope.spawn(move || {
                    for _ in 0..5 {
                        let _lease = registry.lease(41_010);
                        let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(2));
                        holders.fetch_sub(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(!registry.is_leased(41_010));
    }

    #[test]
    fn distinct_ports_do_not_block_each_other() {
        let registry = PortRegistry::new(false);
        let _a = registry.lease(41_020);
        let b = registry.try_lease(41_021);
        assert!(b.is_some());
    }
}
