//! Child-process controller (spec §4.1): bounded-latency line-oriented
//! read/write over pipes, with timeout semantics and cooperative
//! cancellation against the global stop flag.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use derivative::Derivative;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::stop::StopFlag;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to launch '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("child process exposed no stdin/stdout pipe")]
    MissingPipe,
}

#[derive(Debug, Error)]
pub enum IoError {
    #[error("write to child stdin failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("read from child stdout failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("child stdout closed unexpectedly")]
    Eof,
}

/// Outcome of a [`ProcessController::read_until`] call.
#[derive(Debug)]
pub enum ReadStatus {
    /// A line starting with the requested prefix was read.
    Ok,
    /// The deadline elapsed first. Any partial data read so far is still
    /// in `out` (open question in spec §9: partial data is observable).
    Timeout,
    /// A pipe error or unexpected EOF.
    Err(IoError),
    /// The global stop flag was observed before the sentinel arrived.
    Interrupted,
}

/// Registry of every live child process, so a shutdown path can account
/// for (and force-kill) anything a dropped controller failed to reap.
#[derive(Clone, Default)]
pub struct ProcessRegistry(Arc<Mutex<Vec<u32>>>);

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn register(&self, pid: u32) {
        self.0.lock().await.push(pid);
    }

    async fn deregister(&self, pid: u32) {
        self.0.lock().await.retain(|&p| p != pid);
    }

    pub async fn live_count(&self) -> usize {
        self.0.lock().await.len()
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct ProcessController {
    #[derivative(Debug = "ignore")]
    child: Child,
    pid: u32,
    #[derivative(Debug = "ignore")]
    stdin: ChildStdin,
    #[derivative(Debug = "ignore")]
    stdout: Lines<BufReader<ChildStdout>>,
    alive: AtomicBool,
    #[derivative(Debug = "ignore")]
    registry: ProcessRegistry,
    name: String,
}

impl ProcessController {
    /// Spawns `command args...` in its own process group (so a stop signal
    /// delivered to us does not reach the child), redirecting stdio to
    /// pipes this controller owns.
    #[instrument(skip(registry), fields(%log_name))]
    pub async fn spawn(
        command: &Path,
        args: &[String],
        working_dir: Option<&Path>,
        log_name: &str,
        registry: ProcessRegistry,
    ) -> Result<Self, SpawnError> {
        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        new_process_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|source| SpawnError::Launch {
            command: command.display().to_string(),
            source,
        })?;

        let pid = child.id().ok_or(SpawnError::MissingPipe)?;
        let stdin = child.stdin.take().ok_or(SpawnError::MissingPipe)?;
        let stdout = child.stdout.take().ok_or(SpawnError::MissingPipe)?;

        registry.register(pid).await;

        Ok(Self {
            child,
            pid,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            alive: AtomicBool::new(true),
            registry,
            name: log_name.to_owned(),
        })
    }

    /// Appends a trailing newline if absent and writes to the child's
    /// stdin.
    #[instrument(skip(self, line), fields(name = %self.name))]
    pub async fn write_line(&mut self, line: &str) -> Result<(), IoError> {
        let mut buf = line.to_owned();
        if !buf.ends_with('\n') {
            buf.push('\n');
        }
        debug!(sent = line, "engine <-");
        if let Err(err) = self.stdin.write_all(buf.as_bytes()).await {
            self.kill().await;
            return Err(IoError::Write(err));
        }
        Ok(())
    }

    /// Accumulates lines from stdout until one begins with `prefix`,
    /// appending every non-empty line read along the way to `out`.
    /// `timeout` of zero waits indefinitely; any other value bounds the
    /// wait and returns [`ReadStatus::Timeout`] if it elapses first.
    #[instrument(skip(self, out, stop), fields(name = %self.name, prefix))]
    pub async fn read_until(
        &mut self,
        prefix: &str,
        timeout: Duration,
        out: &mut Vec<String>,
        stop: &StopFlag,
    ) -> ReadStatus {
        let body = async {
            loop {
                match self.stdout.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim_end_matches(['\r', '\n']);
                        if line.is_empty() {
                            continue;
                        }
                        debug!(recv = line, "engine ->");
                        out.push(line.to_owned());
                        if line.starts_with(prefix) {
                            return ReadStatus::Ok;
                        }
                    }
                    Ok(None) => return ReadStatus::Err(IoError::Eof),
                    Err(err) => return ReadStatus::Err(IoError::Read(err)),
                }
            }
        };

        let stopped = stop.wait();

        if timeout.is_zero() {
            tokio::select! {
                status = body => status,
                _ = stopped => ReadStatus::Interrupted,
            }
        } else {
            tokio::select! {
                status = body => status,
                _ = tokio::time::sleep(timeout) => ReadStatus::Timeout,
                _ = stopped => ReadStatus::Interrupted,
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Removes this child from the live-process set and terminates it if
    /// still running. Idempotent.
    #[instrument(skip(self), fields(name = %self.name))]
    pub async fn kill(&mut self) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.child.start_kill() {
            warn!(%err, "failed to kill child process");
        }
        let _ = self.child.wait().await;
        self.registry.deregister(self.pid).await;
    }
}

#[cfg(unix)]
fn new_process_group(cmd: &mut tokio::process::Command) {
    use std::os::unix::process::CommandExt;
    unsafe {
        cmd.pre_exec(|| {
            libc_setsid();
            Ok(())
        });
    }
}

#[cfg(unix)]
fn libc_setsid() {
    // SAFETY: setsid(2) has no preconditions beyond being called in the
    // child after fork, which `pre_exec` guarantees.
    unsafe {
        libc::setsid();
    }
}

#[cfg(not(unix))]
fn new_process_group(_cmd: &mut tokio::process::Command) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_write_read_echo() {
        let registry = ProcessRegistry::new();
        let mut proc = ProcessController::spawn(
            Path::new("cat"),
            &[],
            None,
            "cat",
            registry.clone(),
        )
        .await
        .unwrap();

        proc.write_line("hello world").await.unwrap();

        let mut out = Vec::new();
        let stop = StopFlag::new();
        let status = proc
            .read_until("hello", Duration::from_secs(2), &mut out, &stop)
            .await;
        assert!(matches!(status, ReadStatus::Ok));
        assert_eq!(out, vec!["hello world".to_string()]);

        proc.kill().await;
        assert_eq!(registry.live_count().await, 0);
    }

    #[tokio::test]
    async fn read_until_times_out() {
        let registry = ProcessRegistry::new();
        let mut proc = ProcessController::spawn(
            Path::new("cat"),
            &[],
            None,
            "cat",
            registry.clone(),
        )
        .await
        .unwrap();

        let mut out = Vec::new();
        let stop = StopFlag::new();
        let status = proc
            .read_until("nope", Duration::from_millis(50), &mut out, &stop)
            .await;
        assert!(matches!(status, ReadStatus::Timeout));
        proc.kill().await;
    }

    #[tokio::test]
    async fn stop_flag_interrupts_read() {
        let registry = ProcessRegistry::new();
        let mut proc = ProcessController::spawn(
            Path::new("cat"),
            &[],
            None,
            "cat",
            registry.clone(),
        )
        .await
        .unwrap();

        let stop = StopFlag::new();
        stop.set();

        let mut out = Vec::new();
        let status = proc
            .read_until("nope", Duration::ZERO, &mut out, &stop)
            .await;
        assert!(matches!(status, ReadStatus::Interrupted));
        proc.kill().await;
    }
}
