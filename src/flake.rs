//! Intermittent-failure detection.
//!
//! In dev mode a failing test is rerun `recursions` times. If any rerun
//! does not fail, the original failure is intermittent; otherwise it is
//! real.

use crate::catalog::TestCase;
use crate::executor::{LogPolicy, TestExecutor, TestStatus, mark_log_failed};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Verdict on a failure after reruns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Intermittent { passes: u32, reruns: u32 },
    RealFailure,
}

/// What the classifier concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Verdict(Verdict),
    /// An interrupt arrived during a rerun; there is no verdict.
    Aborted,
}

/// `passes = recursions - fails`; any pass makes the failure intermittent.
pub fn verdict_for(recursions: u32, fails: u32) -> Verdict {
    let passes = recursions.saturating_sub(fails);
    if passes > 0 {
        Verdict::Intermittent {
            passes,
            reruns: recursions,
        }
    } else {
        Verdict::RealFailure
    }
}

/// Scratch log used by reruns, so the primary failure log survives.
pub fn rerun_log_path(log_path: &Path) -> PathBuf {
    let mut name = log_path.as_os_str().to_owned();
    name.push(".rerun");
    PathBuf::from(name)
}

/// Reruns failing tests through an executor.
pub struct FlakeClassifier<'a> {
    executor: &'a TestExecutor,
    recursions: u32,
}

impl<'a> FlakeClassifier<'a> {
    pub fn new(executor: &'a TestExecutor, recursions: u32) -> Self {
        Self {
            executor,
            recursions,
        }
    }

    /// Rerun `case` and classify its earlier failure.
    ///
    /// `on_rerun` is called after each rerun with its 1-based attempt
    /// number and status. On a real failure the primary log at `log_path`
    /// is renamed to its `.failed` name.
    pub async fn classify(
        &self,
        case: &TestCase,
        log_path: &Path,
        mut on_rerun: impl FnMut(u32, TestStatus),
    ) -> Result<Classification> {
        let scratch = rerun_log_path(log_path);
        let mut fails = 0;

        for attempt in 1..=self.recursions {
            let report = self.executor.run(case, &scratch, LogPolicy::Discard).await?;
            if report.interrupted {
                tracing::debug!(test = %case.id, attempt, "classification interrupted");
                return Ok(Classification::Aborted);
            }
            if report.result.status == TestStatus::Fail {
                fails += 1;
            }
            on_rerun(attempt, report.result.status);
        }

        let verdict = verdict_for(self.recursions, fails);
        tracing::debug!(test = %case.id, fails, recursions = self.recursions, ?verdict, "classified failure");

        if verdict == Verdict::RealFailure && log_path.exists() {
            if let Err(e) = mark_log_failed(log_path) {
                tracing::warn!(log = %log_path.display(), error = %e, "failed to rename failure log");
            }
        }

        Ok(Classification::Verdict(verdict))
    }
}


#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use crate::catalog::TestId;
    use crate::executor::test_support::write_test;
    use crate::executor::{ExecutorConfig, failed_log_path};
    use crate::signal;
    use std::time::Duration;
    use tempfile::tempdir;

    fn executor(dir: &Path, interrupt: signal::InterruptHandle) -> TestExecutor {
        TestExecutor::new(
            ExecutorConfig {
                test_dir: dir.to_path_buf(),
                keep_logs: false,
                dev_mode: true,
                cleanup_on_failure: true,
                capture_log: false,
                interpreter: None,
            },
            interrupt,
        )
    }

    /// A test that fails on the listed (1-based) invocations and passes
    /// otherwise, counting invocations in a file next to it.
    fn scripted(dir: &Path, id: TestId, failing_calls: &[u32]) -> TestCase {
        let counter = dir.join(format!("{}.count", id.file_name()));
        let cases: String = failing_calls
            .iter()
            .map(|n| format!("  {n}) exit 1 ;;\n"))
            .collect();
        let body = format!(
            "n=$(cat '{c}' 2>/dev/null || echo 0)\nn=$((n+1))\necho $n > '{c}'\ncase $n in\n{cases}  *) exit 0 ;;\nesac",
            c = counter.display()
        );
        write_test(dir, id, &body)
    }

    #[tokio::test]
    async fn test_intermittent_when_some_reruns_pass() {
        let dir = tempdir().unwrap();
        // Primary call (1) already happened; reruns are calls 2..=4.
        let case = scripted(dir.path(), TestId::new(4, 2), &[1, 2]);
        let exec = executor(dir.path(), signal::never());
        let log = dir.path().join("test4.2.log");
        exec.run(&case, &log, LogPolicy::Standard).await.unwrap();

        let mut seen = Vec::new();
        let classification = FlakeClassifier::new(&exec, 3)
            .classify(&case, &log, |attempt, status| seen.push((attempt, status)))
            .await
            .unwrap();

        assert_eq!(
            classification,
            Classification::Verdict(Verdict::Intermittent {
                passes: 2,
                reruns: 3
            })
        );
        assert_eq!(
            seen,
            vec![
                (1, TestStatus::Fail),
                (2, TestStatus::Pass),
                (3, TestStatus::Pass)
            ]
        );
        assert!(log.exists());
        assert!(!failed_log_path(&log).exists());
        assert!(!rerun_log_path(&log).exists());
    }

    #[tokio::test]
    async fn test_real_failure_renames_primary_log() {
        let dir = tempdir().unwrap();
        let case = write_test(dir.path(), TestId::new(5, 1), "exit 1");
        let exec = executor(dir.path(), signal::never());
        let log = dir.path().join("test5.1.log");
        exec.run(&case, &log, LogPolicy::Standard).await.unwrap();

        let classification = FlakeClassifier::new(&exec, 2)
            .classify(&case, &log, |_, _| {})
            .await
            .unwrap();

        assert_eq!(classification, Classification::Verdict(Verdict::RealFailure));
        assert!(!log.exists());
        assert!(failed_log_path(&log).exists());
    }

    #[tokio::test]
    async fn test_interrupt_during_rerun_aborts() {
        let dir = tempdir().unwrap();
        let case = write_test(
            dir.path(),
            TestId::new(6, 1),
            "trap 'exit 1' INT\nwhile true; do sleep 0.05; done",
        );
        let (interrupter, handle) = signal::channel();
        let exec = executor(dir.path(), handle);
        let log = dir.path().join("test6.1.log");

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            interrupter.interrupt();
        });

        let classification = tokio::time::timeout(
            Duration::from_secs(10),
            FlakeClassifier::new(&exec, 3).classify(&case, &log, |_, _| {}),
        )
        .await
        .expect("classification should stop on interrupt")
        .unwrap();

        assert_eq!(classification, Classification::Aborted);
    }
}
