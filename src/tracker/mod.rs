//! Per-session result accounting and artifact persistence.
//!
//! One [`ResultTracker`] is created per session. It owns the outcome ledger,
//! the counted execution results, and knows how to turn them into the order
//! file, the fails file, the JSON report and the JUnit report.

pub mod junit;
pub mod reason;

pub use reason::extract_reason;

use crate::catalog::TestId;
use crate::executor::{ExecutionResult, TestStatus};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Final classification of a test within one run. Never changes once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Skipped,
    /// Real failure: reproduced on every rerun, or failed outside dev mode
    Failed,
    /// Failed, then passed at least one rerun
    Intermittent { passes: u32, reruns: u32 },
    /// Failed while the session was being interrupted; never counted as real
    FailedAndAborted,
}

impl Outcome {
    pub fn is_real_failure(&self) -> bool {
        matches!(self, Outcome::Failed)
    }
}

/// One line of the order file.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRow {
    pub id: TestId,
    pub duration: f64,
}

/// Rows for every persisted artifact.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub order_rows: Vec<OrderRow>,
    pub fails_rows: Vec<TestId>,
    pub json_rows: Vec<ExecutionResult>,
}

/// Where to write artifacts; `None` skips that artifact.
#[derive(Debug, Clone, Default)]
pub struct ArtifactTargets {
    pub order_file: Option<PathBuf>,
    pub fails_file: Option<PathBuf>,
    pub results_file: Option<PathBuf>,
    pub jenkins_file: Option<PathBuf>,
}

/// Result of writing one artifact.
#[derive(Debug)]
pub struct ArtifactWrite {
    pub kind: &'static str,
    pub path: PathBuf,
    pub error: Option<anyhow::Error>,
}

/// End-of-run counts for the console summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub intermittent: Vec<(TestId, u32, u32)>,
    pub failed_list: Vec<TestId>,
    pub aborted: Option<TestId>,
    pub incomplete: bool,
}

#[derive(Debug, Clone)]
struct Counted {
    result: ExecutionResult,
    /// Interrupted mid-run: reported, but its duration is not trustworthy
    aborted: bool,
}

/// Outcome ledger plus the execution results that count toward scheduling.
#[derive(Debug, Default)]
pub struct ResultTracker {
    capture_reasons: bool,
    ledger: Vec<(TestId, Outcome)>,
    index: HashMap<TestId, usize>,
    results: Vec<Counted>,
    in_flight: Option<TestId>,
    interrupted: bool,
    incomplete: bool,
}

impl ResultTracker {
    /// `capture_reasons`: extract failure reasons from logs (only needed
    /// when a report file was requested).
    pub fn new(capture_reasons: bool) -> Self {
        Self {
            capture_reasons,
            ..Default::default()
        }
    }

    /// Mark `id` as the test currently executing.
    pub fn begin(&mut self, id: TestId) {
        self.in_flight = Some(id);
    }

    /// The in-flight test is fully evaluated.
    pub fn finish(&mut self) {
        self.in_flight = None;
    }

    pub fn in_flight(&self) -> Option<TestId> {
        self.in_flight
    }

    /// The run ended because of an interrupt.
    pub fn mark_interrupted(&mut self) {
        self.interrupted = true;
        self.incomplete = true;
    }

    /// The run loop stopped before the sequence was exhausted.
    pub fn mark_incomplete(&mut self) {
        self.incomplete = true;
    }

    pub fn outcome(&self, id: TestId) -> Option<Outcome> {
        self.outcome_ref(id).copied()
    }

    fn outcome_ref(&self, id: TestId) -> Option<&Outcome> {
        self.index.get(&id).map(|&i| &self.ledger[i].1)
    }

    pub fn contains(&self, id: TestId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn real_fail_count(&self) -> usize {
        self.ledger.iter().filter(|(_, o)| o.is_real_failure()).count()
    }

    /// Record a test's final outcome and its counted execution result.
    ///
    /// Returns `false` (and records nothing) if the test already has an
    /// outcome in this run.
    pub fn record(&mut self, result: ExecutionResult, log_text: Option<&str>, outcome: Outcome) -> bool {
        self.record_inner(result, log_text, outcome, false)
    }

    /// Record the test that was executing when the run was interrupted.
    /// It is reported, but kept out of the order file.
    pub fn record_interrupted(&mut self, result: ExecutionResult, log_text: Option<&str>, outcome: Outcome) -> bool {
        self.mark_interrupted();
        self.record_inner(result, log_text, outcome, true)
    }

    fn record_inner(
        &mut self,
        mut result: ExecutionResult,
        log_text: Option<&str>,
        outcome: Outcome,
        aborted: bool,
    ) -> bool {
        if self.contains(result.id) {
            tracing::warn!(test = %result.id, "outcome already recorded, ignoring");
            return false;
        }
        if self.capture_reasons && result.status != TestStatus::Pass && result.reason.is_none() {
            result.reason = log_text.and_then(extract_reason);
        }
        self.index.insert(result.id, self.ledger.len());
        self.ledger.push((result.id, outcome));
        self.results.push(Counted { result, aborted });
        true
    }

    /// Rows for the three flat-file artifacts.
    pub fn build_artifacts(&self) -> Artifacts {
        let mut order_rows: Vec<OrderRow> = self
            .results
            .iter()
            .filter(|c| !c.aborted)
            .map(|c| OrderRow {
                id: c.result.id,
                duration: c.result.duration,
            })
            .collect();
        order_rows.sort_by(|a, b| a.duration.total_cmp(&b.duration));

        let mut fails_rows: Vec<TestId> = self
            .ledger
            .iter()
            .filter(|(_, o)| o.is_real_failure())
            .map(|(id, _)| *id)
            .collect();
        // Session records an interrupted test as FailedAndAborted, which is
        // never a real failure. This covers callers that `record` a plain
        // Failed for the in-flight test and then `mark_interrupted`.
        if self.interrupted && self.in_flight.is_some() && fails_rows.last() == self.in_flight.as_ref() {
            fails_rows.pop();
        }

        Artifacts {
            order_rows,
            fails_rows,
            json_rows: self.results.iter().map(|c| c.result.clone()).collect(),
        }
    }

    /// Write every configured artifact. A failed write is logged and
    /// reported; it never stops the others.
    pub fn persist(&self, targets: &ArtifactTargets) -> Vec<ArtifactWrite> {
        let artifacts = self.build_artifacts();
        let mut writes = Vec::new();

        let mut attempt = |kind: &'static str, path: &Path, result: Result<()>| {
            if let Err(e) = &result {
                tracing::warn!(artifact = kind, path = %path.display(), error = %e, "failed to write artifact");
            }
            writes.push(ArtifactWrite {
                kind,
                path: path.to_path_buf(),
                error: result.err(),
            });
        };

        if let Some(path) = &targets.order_file {
            attempt("order file", path, write_order_file(path, &artifacts.order_rows));
        }
        if let Some(path) = &targets.fails_file {
            attempt("fails file", path, write_fails_file(path, &artifacts.fails_rows));
        }
        if let Some(path) = &targets.results_file {
            attempt("results file", path, write_json_report(path, &artifacts.json_rows));
        }
        if let Some(path) = &targets.jenkins_file {
            let report = junit::build_report(
                self.results
                    .iter()
                    .map(|c| (&c.result, self.outcome_ref(c.result.id))),
            );
            attempt("jenkins file", path, write_junit_report(path, &report));
        }

        writes
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            incomplete: self.incomplete,
            ..Default::default()
        };
        for (id, outcome) in &self.ledger {
            match outcome {
                Outcome::Passed => summary.passed += 1,
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Failed => {
                    summary.failed += 1;
                    summary.failed_list.push(*id);
                }
                Outcome::Intermittent { passes, reruns } => {
                    summary.intermittent.push((*id, *passes, *reruns));
                }
                Outcome::FailedAndAborted => summary.aborted = Some(*id),
            }
        }
        summary
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// `test<id>,<duration>` per line, fastest first.
pub fn write_order_file(path: &Path, rows: &[OrderRow]) -> Result<()> {
    ensure_parent(path)?;
    let content: String = rows
        .iter()
        .map(|row| format!("{},{:.3}\n", row.id.file_name(), row.duration))
        .collect();
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write order file {}", path.display()))
}

/// `test<id>` per line.
pub fn write_fails_file(path: &Path, ids: &[TestId]) -> Result<()> {
    ensure_parent(path)?;
    let content: String = ids.iter().map(|id| format!("{}\n", id.file_name())).collect();
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write fails file {}", path.display()))
}

pub fn write_json_report(path: &Path, rows: &[ExecutionResult]) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(rows).context("Failed to serialize results")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write results file {}", path.display()))
}

pub fn write_junit_report(path: &Path, report: &quick_junit::Report) -> Result<()> {
    ensure_parent(path)?;
    let xml = junit::render(report)?;
    std::fs::write(path, xml)
        .with_context(|| format!("Failed to write JUnit report {}", path.display()))
}
