/// Long-lived auxiliary processes (candidate web services, exam API)
///
/// A [`ServiceProcess`] owns its child and the port lease it was started
/// under. Dropping it terminates the whole process group (SIGTERM, bounded
/// wait, SIGKILL) and only then releases the port.
use crate::config::types::{GradeError, Result};
use crate::exec::ports::PortLease;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Report of a service shutdown
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub term_sent: bool,
    pub kill_sent: bool,
    pub waited: Duration,
}

pub struct ServiceProcess {
    name: String,
    child: Option<Child>,
    grace: Duration,
    // Declared last: released after the child is gone.
    lease: Option<PortLease>,
}

impl ServiceProcess {
    /// Spawn `argv` in `cwd` as the leader of a new process group
    pub fn spawn(
        name: &str,
        argv: &[String],
        cwd: &Path,
        grace: Duration,
        lease: Option<PortLease>,
    ) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| GradeError::Config(format!("empty command for {}", name)))?;

        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|e| GradeError::Process(format!("spawn {} ({}): {}", name, program, e)))?;

        log::debug!("Started {} as pid {} in {}", name, child.id(), cwd.display());
        Ok(Self {
            name: name.to_string(),
            child: Some(child),
            grace,
            lease,
        })
    }

    pub fn port(&self) -> Option<u16> {
        self.lease.as_ref().map(PortLease::port)
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Whether the process already exited
    pub fn has_exited(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => !matches!(child.try_wait(), Ok(None)),
            None => true,
        }
    }

    /// Poll until the leased port accepts TCP connections
    ///
    /// Returns `false` on timeout or if the process dies first.
    pub fn wait_until_listening(&mut self, timeout: Duration) -> bool {
        let Some(port) = self.port() else {
            return !self.has_exited();
        };
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let started = Instant::now();

        while started.elapsed() < timeout {
            if self.has_exited() {
                log::warn!("{} exited before listening on port {}", self.name, port);
                return false;
            }
            if TcpStream::connect_timeout(&addr, READY_POLL_INTERVAL).is_ok() {
                log::debug!("{} listening on port {} after {:?}", self.name, port, started.elapsed());
                return true;
            }
            thread::sleep(READY_POLL_INTERVAL);
        }

        log::warn!("{} did not listen on port {} within {:?}", self.name, port, timeout);
        false
    }

    /// Terminate the process group; idempotent
    pub fn shutdown(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let Some(mut child) = self.child.take() else {
            return report;
        };
        let started = Instant::now();
        let pgid = Pid::from_raw(child.id() as i32);

        if matches!(child.try_wait(), Ok(None)) {
            report.term_sent = killpg(pgid, Signal::SIGTERM).is_ok();
            while started.elapsed() < self.grace {
                if !matches!(child.try_wait(), Ok(None)) {
                    break;
                }
                thread::sleep(EXIT_POLL_INTERVAL);
            }
        }

        if matches!(child.try_wait(), Ok(None)) {
            log::warn!("{} ignored SIGTERM for {:?}, sending SIGKILL", self.name, self.grace);
            if killpg(pgid, Signal::SIGKILL).is_err() {
                let _ = child.kill();
            }
            report.kill_sent = true;
        } else {
            // Leader is gone; make sure stragglers in its group are too.
            let _ = killpg(pgid, Signal::SIGKILL);
        }
        let _ = child.wait();

        report.waited = started.elapsed();
        log::debug!("Stopped {} ({:?})", self.name, report);
        report
    }
}

impl Drop for ServiceProcess {
    fn drop(&mut self) {
        self.shutdown();
    }
}
