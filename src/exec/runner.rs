/// Bounded subprocess execution
///
/// Children are started in their own process group. The group is killed
/// once the child is reaped or times out, so nothing the script put in the
/// background outlives the run.
use crate::config::types::{GradeError, Result};
use crossbeam_channel::{bounded, Receiver};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// How long to wait for pipe readers after the child has been reaped
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Exited with status 0
    Completed { stdout: String, stderr: String },
    /// Exited non-zero or was killed by a signal
    Failed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// Wall-clock limit hit; the process group was killed
    TimedOut { after: Duration },
}

impl RunOutcome {
    /// Text a checker inspects: stdout on success, an error line otherwise
    pub fn transcript(&self) -> String {
        match self {
            Self::Completed { stdout, .. } => stdout.clone(),
            Self::Failed { stderr, .. } => format!("Error: {}", stderr),
            Self::TimedOut { after } => {
                format!("Execution timed out after {} seconds.", after.as_secs())
            }
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Run `command` to completion or until `timeout` elapses
///
/// Spawn failures are returned as errors; everything the child does
/// (non-zero exit, hang) is reported through [`RunOutcome`].
pub fn run_with_timeout(command: &mut Command, timeout: Duration) -> Result<RunOutcome> {
    let program = format!("{:?}", command.get_program());
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(|e| GradeError::Process(format!("spawn {}: {}", program, e)))?;

    let pgid = Pid::from_raw(child.id() as i32);
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                kill_stragglers(pgid);
                break Some(status);
            }
            Ok(None) => {
                if started.elapsed() > timeout {
                    log::debug!("{} exceeded {:?}, killing its process group", program, timeout);
                    kill_group(&mut child);
                    break None;
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                kill_group(&mut child);
                return Err(GradeError::Process(format!("wait {}: {}", program, e)));
            }
        }
    };

    let stdout = stdout.collect();
    let stderr = stderr.collect();

    Ok(match status {
        None => RunOutcome::TimedOut { after: timeout },
        Some(status) if status.success() => RunOutcome::Completed { stdout, stderr },
        Some(status) => RunOutcome::Failed {
            code: status.code(),
            stdout,
            stderr,
        },
    })
}

/// SIGKILL the child's process group and reap the child
pub(crate) fn kill_group(child: &mut Child) {
    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        log::debug!("killpg({}) failed: {}; killing direct child", pgid, e);
        let _ = child.kill();
    }
    let _ = child.wait();
}

/// SIGKILL whatever is left in a group whose leader was already reaped
fn kill_stragglers(pgid: Pid) {
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) => log::debug!("Killed leftover processes in group {}", pgid),
        Err(Errno::ESRCH) => {}
        Err(e) => log::debug!("killpg({}) failed: {}", pgid, e),
    }
}

/// Output read so far from one pipe
struct PipeReader {
    buf: Arc<Mutex<Vec<u8>>>,
    done: Option<Receiver<()>>,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> PipeReader {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let done = pipe.map(|mut pipe| {
        let (tx, rx) = bounded(1);
        let shared = Arc::clone(&buf);
        thread::spawn(move || {
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => match shared.lock() {
                        Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                        Err(_) => break,
                    },
                }
            }
            let _ = tx.send(());
        });
        rx
    });
    PipeReader { buf, done }
}

impl PipeReader {
    /// Whatever arrived before EOF or [`PIPE_DRAIN_TIMEOUT`], whichever is first
    fn collect(self) -> String {
        if let Some(done) = &self.done {
            if done.recv_timeout(PIPE_DRAIN_TIMEOUT).is_err() {
                log::debug!("Pipe still open after {:?}; keeping partial output", PIPE_DRAIN_TIMEOUT);
            }
        }
        match self.buf.lock() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn completed_run_captures_stdout() {
        let outcome = run_with_timeout(&mut sh("echo hello"), Duration::from_secs(5)).unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed {
                stdout: "hello\n".into(),
                stderr: String::new()
            }
        );
        assert_eq!(outcome.transcript(), "hello\n");
    }

    #[test]
    fn nonzero_exit_is_reported_as_error_text() {
        let outcome =
            run_with_timeout(&mut sh("echo oops >&2; exit 3"), Duration::from_secs(5)).unwrap();
        match &outcome {
            RunOutcome::Failed { code, stderr, .. } => {
                assert_eq!(*code, Some(3));
                assert_eq!(stderr, "oops\n");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(outcome.transcript().starts_with("Error: "));
    }

    #[test]
    fn timeout_kills_the_process_group() {
        let started = Instant::now();
        let outcome =
            run_with_timeout(&mut sh("sleep 30 & sleep 30"), Duration::from_millis(200)).unwrap();
        assert_eq!(
            outcome,
            RunOutcome::TimedOut {
                after: Duration::from_millis(200)
            }
        );
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(outcome.transcript().contains("timed out"));
    }

    #[test]
    fn background_jobs_die_with_the_script() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("leaked");
        let script = format!("echo out; (sleep 1; touch {}) &", marker.display());

        let started = Instant::now();
        let outcome = run_with_timeout(&mut sh(&script), Duration::from_secs(5)).unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed {
                stdout: "out\n".into(),
                stderr: String::new()
            }
        );
        assert!(started.elapsed() < Duration::from_secs(1));

        thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists());
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let mut cmd = Command::new("/nonexistent/definitely-not-here");
        assert!(run_with_timeout(&mut cmd, Duration::from_secs(1)).is_err());
    }
}
