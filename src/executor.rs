//! Single-test execution.
//!
//! The executor spawns one test program, sends its interleaved
//! stdout/stderr to the test's log file, waits for it (forwarding an
//! interrupt if one arrives) and maps the exit code to a [`TestStatus`].
//! It never retries; reruns are the flake classifier's job.

use crate::catalog::{TestCase, TestId};
use crate::config::RunConfig;
use crate::signal::InterruptHandle;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::{Child, Command};

/// Environment variable telling a test whether to clean up after failing.
pub const CLEANUP_ENV: &str = "REGRESS_CLEANUP_ON_FAILURE";
/// Environment variable carrying the id of the running test.
pub const TEST_ID_ENV: &str = "REGRESS_TEST_ID";

/// Exit code recorded when the test program could not be started at all.
const SPAWN_FAILURE_CODE: i32 = 1;

/// Outcome of one process invocation, derived from its exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Skip,
    Fail,
}

impl TestStatus {
    /// `0` passes, anything above 127 means the test declined to run,
    /// everything else (including `-signo` for signal deaths) fails.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => TestStatus::Pass,
            c if c > 127 => TestStatus::Skip,
            _ => TestStatus::Fail,
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "pass"),
            TestStatus::Skip => write!(f, "skip"),
            TestStatus::Fail => write!(f, "fail"),
        }
    }
}

/// One counted test invocation, as written to the JSON report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub id: TestId,
    /// Epoch seconds, millisecond precision
    pub start_time: f64,
    /// Seconds, millisecond precision
    pub duration: f64,
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// What to do with the log once the process exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogPolicy {
    /// Primary run: drop on pass/skip unless logs are kept; on failure keep
    /// it, renamed to `.failed` outside dev mode.
    Standard,
    /// Scratch run: always delete.
    Discard,
}

/// Executor settings, lifted from the run configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub test_dir: PathBuf,
    pub keep_logs: bool,
    pub dev_mode: bool,
    pub cleanup_on_failure: bool,
    /// Read the log back for non-passing results (needed for reasons)
    pub capture_log: bool,
    pub interpreter: Option<String>,
}

impl ExecutorConfig {
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self {
            test_dir: config.paths.test_dir.clone(),
            keep_logs: config.keep_logs,
            dev_mode: config.dev_mode,
            cleanup_on_failure: !config.stop_on_first_fail,
            capture_log: config.results_file.is_some() || config.jenkins_file.is_some(),
            interpreter: config.interpreter.clone(),
        }
    }
}

/// Everything the session needs to know about one invocation.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub result: ExecutionResult,
    pub exit_code: i32,
    /// The session was interrupted while this process ran
    pub interrupted: bool,
    /// Where the log lives now, if it was kept
    pub log_file: Option<PathBuf>,
    /// Log contents of a non-passing run, when capture is enabled
    pub log_text: Option<String>,
}

/// Path a failed test's log is renamed to.
pub fn failed_log_path(log_path: &Path) -> PathBuf {
    let mut name = log_path.as_os_str().to_owned();
    name.push(".failed");
    PathBuf::from(name)
}

/// Rename a log to its `.failed` name and return the new path.
pub fn mark_log_failed(log_path: &Path) -> std::io::Result<PathBuf> {
    let failed = failed_log_path(log_path);
    std::fs::rename(log_path, &failed)?;
    Ok(failed)
}

/// Runs test programs one at a time.
pub struct TestExecutor {
    config: ExecutorConfig,
    interrupt: InterruptHandle,
}

impl TestExecutor {
    pub fn new(config: ExecutorConfig, interrupt: InterruptHandle) -> Self {
        Self { config, interrupt }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `case` to completion, logging to `log_path`.
    ///
    /// Only log-file I/O is an error here. A test that cannot be spawned is
    /// a failing result with the spawn error in its log.
    pub async fn run(&self, case: &TestCase, log_path: &Path, policy: LogPolicy) -> Result<RunReport> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }
        let stale = failed_log_path(log_path);
        if stale.exists() {
            std::fs::remove_file(&stale)
                .with_context(|| format!("Failed to remove stale log {}", stale.display()))?;
        }

        let log = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?;
        let log_err = log.try_clone().context("Failed to duplicate log file handle")?;

        let mut cmd = match &self.config.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&case.path);
                cmd
            }
            None => Command::new(&case.path),
        };
        cmd.current_dir(&self.config.test_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .env(CLEANUP_ENV, self.config.cleanup_on_failure.to_string())
            .env(TEST_ID_ENV, case.id.to_string())
            .kill_on_drop(true);

        let started_at = Utc::now();
        let start = Instant::now();

        let (exit_code, interrupted) = match cmd.spawn() {
            Ok(mut child) => {
                tracing::debug!(test = %case.id, pid = ?child.id(), "spawned test");
                self.wait(&mut child).await?
            }
            Err(e) => {
                tracing::debug!(test = %case.id, error = %e, "failed to spawn test");
                let mut log = std::fs::OpenOptions::new()
                    .append(true)
                    .open(log_path)
                    .with_context(|| format!("Failed to reopen log file {}", log_path.display()))?;
                writeln!(log, "regress: failed to spawn {}: {}", case.path.display(), e)
                    .context("Failed to write spawn error to log")?;
                (SPAWN_FAILURE_CODE, false)
            }
        };

        let duration = start.elapsed();
        let status = TestStatus::from_exit_code(exit_code);
        tracing::debug!(test = %case.id, exit_code, %status, interrupted, "test exited");

        let log_text = if self.config.capture_log && status != TestStatus::Pass {
            std::fs::read_to_string(log_path).ok()
        } else {
            None
        };

        let log_file = self.dispose_log(log_path, status, policy)?;

        Ok(RunReport {
            result: ExecutionResult {
                id: case.id,
                start_time: started_at.timestamp_millis() as f64 / 1000.0,
                duration: duration.as_millis() as f64 / 1000.0,
                status,
                reason: None,
            },
            exit_code,
            interrupted,
            log_file,
            log_text,
        })
    }

    /// Wait for the child, forwarding an interrupt if the session gets one.
    async fn wait(&self, child: &mut Child) -> Result<(i32, bool)> {
        let mut interrupt = self.interrupt.clone();
        tokio::select! {
            status = child.wait() => {
                let status = status.context("Failed to wait for test process")?;
                Ok((exit_code_of(status), false))
            }
            _ = interrupt.interrupted() => {
                forward_interrupt(child);
                let status = child.wait().await.context("Failed to wait for interrupted test")?;
                Ok((exit_code_of(status), true))
            }
        }
    }

    fn dispose_log(&self, log_path: &Path, status: TestStatus, policy: LogPolicy) -> Result<Option<PathBuf>> {
        let remove = |path: &Path| {
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove log {}", path.display()))
        };
        match (policy, status) {
            (LogPolicy::Discard, _) => {
                remove(log_path)?;
                Ok(None)
            }
            (LogPolicy::Standard, TestStatus::Pass | TestStatus::Skip) => {
                if self.config.keep_logs {
                    Ok(Some(log_path.to_path_buf()))
                } else {
                    remove(log_path)?;
                    Ok(None)
                }
            }
            (LogPolicy::Standard, TestStatus::Fail) => {
                if self.config.dev_mode {
                    Ok(Some(log_path.to_path_buf()))
                } else {
                    let failed = mark_log_failed(log_path).with_context(|| {
                        format!("Failed to rename log {}", log_path.display())
                    })?;
                    Ok(Some(failed))
                }
            }
        }
    }
}

#[cfg(unix)]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| -sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(unix)]
fn forward_interrupt(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: pid belongs to a child we spawned and have not yet reaped.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGINT);
        }
    }
}

#[cfg(not(unix))]
fn forward_interrupt(child: &mut Child) {
    let _ = child.start_kill();
}
