//! Retrying executor for external registry commands
//!
//! Every interaction with the remote registry goes through its command-line
//! client, so network flakiness surfaces as non-zero exits and hangs. Each
//! attempt is a fresh process; ordinary command failure is a value, not an
//! error.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::Rng;

/// How often the timeout loop polls a running child.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of the last attempt of a command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmdOutcome {
    /// Exit status zero. `stdout` is empty when capture was suppressed.
    Success { stdout: String },
    /// Non-zero exit. `status` is `None` when the child died to a signal.
    Failed { status: Option<i32>, stderr: String },
    /// The attempt exceeded the configured timeout and was killed.
    TimedOut,
}

impl CmdOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Captured stdout, if the command succeeded.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            Self::Success { stdout } => Some(stdout),
            _ => None,
        }
    }
}

impl std::fmt::Display for CmdOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success { .. } => write!(f, "succeeded"),
            Self::Failed {
                status: Some(code), ..
            } => write!(f, "exited with status {code}"),
            Self::Failed { status: None, .. } => write!(f, "killed by signal"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Linear backoff with uniform jitter: `base * attempt + uniform(0, jitter)`.
pub fn backoff_delay(base: Duration, jitter: Duration, attempt: u32) -> Duration {
    let jitter = if jitter.is_zero() {
        Duration::ZERO
    } else {
        rand::thread_rng().gen_range(Duration::ZERO..jitter)
    };
    base * attempt + jitter
}

/// Retry and timeout policy for one external command.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    /// Total attempts, including the first.
    pub retries: u32,
    pub base_delay: Duration,
    pub jitter: Duration,
    /// Per-attempt wall-clock limit. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Discard stdout instead of capturing it (bulk downloads).
    pub suppress_stdout: bool,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_secs(2),
            jitter: Duration::from_secs(1),
            timeout: None,
            suppress_stdout: false,
        }
    }
}

impl CommandRunner {
    /// Run `program` with `args`, retrying failed or timed-out attempts.
    ///
    /// Returns the last attempt's outcome. `Err` means the command could not
    /// be spawned at all (missing binary, bad invocation); command failure
    /// itself is reported through [`CmdOutcome`].
    pub fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutcome> {
        let attempts = self.retries.max(1);
        let mut attempt = 1;
        loop {
            let outcome = self
                .run_once(program, args)
                .with_context(|| format!("failed to spawn {program}"))?;
            if outcome.is_success() || attempt >= attempts {
                return Ok(outcome);
            }
            let delay = backoff_delay(self.base_delay, self.jitter, attempt);
            log::warn!(
                "{program}: attempt {attempt}/{attempts} {outcome}, retrying in {:.1}s",
                delay.as_secs_f64()
            );
            thread::sleep(delay);
            attempt += 1;
        }
    }

    fn run_once(&self, program: &str, args: &[&str]) -> std::io::Result<CmdOutcome> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(if self.suppress_stdout {
                Stdio::null()
            } else {
                Stdio::piped()
            })
            .stderr(Stdio::piped());
        let mut child = cmd.spawn()?;

        // Drain both pipes on their own threads so a chatty child never
        // blocks on a full pipe while we wait on it.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match self.timeout {
            None => child.wait()?,
            Some(limit) => match wait_with_deadline(&mut child, limit)? {
                Some(status) => status,
                None => return Ok(CmdOutcome::TimedOut),
            },
        };

        let stdout = stdout.map(join_drained).unwrap_or_default();
        let stderr = stderr.map(join_drained).unwrap_or_default();

        if status.success() {
            Ok(CmdOutcome::Success { stdout })
        } else {
            Ok(CmdOutcome::Failed {
                status: status.code(),
                stderr,
            })
        }
    }
}

/// Read a pipe to the end on a dedicated thread.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_drained(handle: thread::JoinHandle<Vec<u8>>) -> String {
    handle
        .join()
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

/// Poll the child until it exits or the deadline passes. On timeout the
/// child is killed and reaped, and `None` is returned.
fn wait_with_deadline(child: &mut Child, limit: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> CommandRunner {
        CommandRunner {
            retries: 3,
            base_delay: Duration::ZERO,
            jitter: Duration::ZERO,
            timeout: None,
            suppress_stdout: false,
        }
    }

    #[test]
    fn success_captures_stdout() {
        let out = runner().run("sh", &["-c", "printf hello"]).unwrap();
        assert_eq!(out.stdout(), Some("hello"));
    }

    #[test]
    fn failure_reports_status_and_stderr() {
        let out = runner().run("sh", &["-c", "echo oops >&2; exit 3"]).unwrap();
        match out {
            CmdOutcome::Failed { status, stderr } => {
                assert_eq!(status, Some(3));
                assert!(stderr.contains("oops"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn succeeds_on_third_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("attempts");
        let script = format!(
            "echo x >> {m}; [ $(wc -l < {m}) -ge 3 ] || exit 1",
            m = marker.display()
        );
        let out = runner().run("sh", &["-c", &script]).unwrap();
        assert!(out.is_success());
        let attempts = std::fs::read_to_string(&marker).unwrap().lines().count();
        assert_eq!(attempts, 3);
    }

    #[test]
    fn gives_up_after_all_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("attempts");
        let script = format!("echo x >> {}; exit 1", marker.display());
        let out = runner().run("sh", &["-c", &script]).unwrap();
        assert!(!out.is_success());
        let attempts = std::fs::read_to_string(&marker).unwrap().lines().count();
        assert_eq!(attempts, 3);
    }

    #[test]
    fn timeout_kills_the_child() {
        let policy = CommandRunner {
            retries: 1,
            timeout: Some(Duration::from_millis(100)),
            ..runner()
        };
        let start = Instant::now();
        let out = policy.run("sh", &["-c", "sleep 5"]).unwrap();
        assert_eq!(out, CmdOutcome::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn suppressed_stdout_is_empty() {
        let policy = CommandRunner {
            suppress_stdout: true,
            ..runner()
        };
        let out = policy.run("sh", &["-c", "echo noisy"]).unwrap();
        assert_eq!(out.stdout(), Some(""));
    }

    #[test]
    fn spawn_error_is_fatal() {
        let result = runner().run("definitely-not-a-real-binary-3141", &[]);
        assert!(result.is_err());
    }

    #[test]
    fn backoff_linear_without_jitter() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, Duration::ZERO, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, Duration::ZERO, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, Duration::ZERO, 3), Duration::from_secs(6));
    }

    #[test]
    fn backoff_jitter_within_bounds() {
        let base = Duration::from_millis(10);
        let jitter = Duration::from_millis(50);
        for _ in 0..100 {
            let delay = backoff_delay(base, jitter, 1);
            assert!(delay >= base);
            assert!(delay < base + jitter);
        }
    }
}
