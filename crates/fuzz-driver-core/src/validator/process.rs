//! Blocking subprocess execution with an optional wall-clock budget.
//!
//! On Unix a budgeted process runs in its own process group and the whole
//! group is killed on timeout, so forked workers (`-fork=N`) cannot hold the
//! output pipes open. Output still pending after a kill is collected for at
//! most [`DRAIN_AFTER_KILL`].

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to keep reading pipes after a timeout kill.
pub const DRAIN_AFTER_KILL: Duration = Duration::from_secs(1);

/// Captured result of one external process.
#[derive(Debug)]
pub struct ProcessOutput {
    /// `None` when the process was killed after exceeding its budget.
    pub status: Option<ExitStatus>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.map(|s| s.success()).unwrap_or(false)
    }

    pub fn timed_out(&self) -> bool {
        self.status.is_none()
    }

    /// stdout followed by stderr, lossily decoded.
    pub fn combined(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&String::from_utf8_lossy(&self.stderr));
        }
        text
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Short description of how the process ended.
    pub fn describe_exit(&self) -> String {
        match self.status {
            Some(status) => match status.code() {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_string(),
            },
            None => format!("killed after {:.1}s timeout", self.elapsed.as_secs_f64()),
        }
    }
}

/// One external command: program, arguments and extra environment.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpec {
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl ProcessSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl AsRef<Path>) -> Self {
        self.env.push((
            key.into(),
            value.as_ref().to_string_lossy().into_owned(),
        ));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Program and arguments joined for log messages.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }

    /// Run to completion (or until the budget expires), capturing both streams.
    pub fn run(&self) -> io::Result<ProcessOutput> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        #[cfg(unix)]
        if self.timeout.is_some() {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let start = Instant::now();
        let mut child = cmd.spawn()?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout pipe"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr pipe"))?;

        let stdout_rx = spawn_reader(move |buf| stdout.read_to_end(buf));
        let stderr_rx = spawn_reader(move |buf| stderr.read_to_end(buf));

        let status = match self.timeout {
            None => Some(child.wait()?),
            Some(budget) => loop {
                if let Some(status) = child.try_wait()? {
                    break Some(status);
                }
                if start.elapsed() >= budget {
                    kill_tree(&mut child);
                    break None;
                }
                thread::sleep(POLL_INTERVAL);
            },
        };

        let collect = |rx: Receiver<Vec<u8>>| match status {
            Some(_) => rx.recv().unwrap_or_default(),
            None => rx.recv_timeout(DRAIN_AFTER_KILL).unwrap_or_default(),
        };
        Ok(ProcessOutput {
            status,
            stdout: collect(stdout_rx),
            stderr: collect(stderr_rx),
            elapsed: start.elapsed(),
        })
    }
}

/// Read one pipe to its end on a background thread.
fn spawn_reader<F>(read: F) -> Receiver<Vec<u8>>
where
    F: FnOnce(&mut Vec<u8>) -> io::Result<usize> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = read(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

/// Kill the child and, on Unix, every process in its group.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let _ = Command::new("sh")
            .arg("-c")
            .arg(format!("kill -KILL -{}", child.id()))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_both_streams() {
        let out = ProcessSpec::new(["sh", "-c", "echo out; echo err >&2; exit 3"])
            .run()
            .unwrap();
        assert!(!out.success());
        assert_eq!(out.status.and_then(|s| s.code()), Some(3));
        assert_eq!(out.combined(), "out\nerr\n");
        assert_eq!(out.describe_exit(), "exit code 3");
    }

    #[test]
    fn test_timeout_kills_process() {
        let out = ProcessSpec::new(["sh", "-c", "exec sleep 5"])
            .timeout(Duration::from_millis(200))
            .run()
            .unwrap();
        assert!(out.timed_out());
        assert!(out.elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_timeout_kills_forked_workers() {
        // The background worker inherits both pipes and outlives its parent
        // unless the whole group is killed.
        let out = ProcessSpec::new(["sh", "-c", "sleep 30 & echo started; wait"])
            .timeout(Duration::from_millis(300))
            .run()
            .unwrap();
        assert!(out.timed_out());
        assert!(out.elapsed < Duration::from_secs(10));
        assert_eq!(out.stdout_text(), "started\n");
    }

    #[test]
    fn test_env_is_passed() {
        let out = ProcessSpec::new(["sh", "-c", "printf %s \"$PROFILE_TARGET\""])
            .env("PROFILE_TARGET", "/tmp/x.profraw")
            .run()
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout_text(), "/tmp/x.profraw");
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let err = ProcessSpec::new(Vec::<String>::new()).run().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
