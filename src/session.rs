//! Session control: one pass over the run sequence.
//!
//! A session moves through [`SessionState`]s:
//!
//! ```text
//! Idle -> Scheduling -> Running(id) -> Evaluating(id) -> Scheduling ...
//!                            |               |
//!                            +---------------+--> Aborting -> Finished
//! ```
//!
//! Scheduling picks the next id that is in the catalog and not yet in the
//! ledger. Running executes it once. Evaluating classifies a dev-mode
//! failure through reruns and decides whether the fail limit was hit.
//! Finished persists artifacts and prints the summary.

use crate::catalog::{TestCase, TestCatalog, TestId, discover};
use crate::config::{PersistedConfig, PersistedUpdates, RunConfig, RunPaths, SessionOverrides};
use crate::errors::SetupError;
use crate::executor::{ExecutorConfig, LogPolicy, RunReport, TestExecutor, TestStatus};
use crate::flake::{Classification, FlakeClassifier, Verdict};
use crate::order::{OrderInputs, RunOrder, build_order, read_id_list};
use crate::signal::InterruptHandle;
use crate::tracker::{ArtifactTargets, Outcome, ResultTracker, Summary};
use crate::ui::SessionUI;
use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scheduling,
    Running(TestId),
    Evaluating(TestId),
    Aborting,
    Finished,
}

/// Exit code and summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub exit_code: i32,
    pub summary: Summary,
}

/// Load the config store, apply `--set-*` updates and merge in the session
/// overrides.
///
/// With `save`, the state directory is created and the store is rewritten
/// with the updated persisted values.
pub fn load_config(
    paths: RunPaths,
    overrides: &SessionOverrides,
    updates: &PersistedUpdates,
    save: bool,
) -> Result<RunConfig, SetupError> {
    if !paths.test_dir.is_dir() {
        return Err(SetupError::TestDirMissing(paths.test_dir));
    }

    let store = paths.config_file();
    let persisted = PersistedConfig::load_or_default(&store)?.with_updates(updates);

    if save {
        std::fs::create_dir_all(&paths.state_dir).map_err(|source| SetupError::StateDir {
            path: paths.state_dir.clone(),
            source,
        })?;
        persisted.save(&store)?;
    }

    Ok(RunConfig::merge(&persisted, overrides, paths))
}

/// Everything needed to start the run loop.
#[derive(Debug, Clone)]
pub struct Plan {
    pub config: RunConfig,
    pub catalog: TestCatalog,
    pub order: RunOrder,
}

impl Plan {
    /// Discover tests and compute the run sequence.
    ///
    /// The previous run's failures and the order file are only consulted in
    /// dev mode. User mode always runs in directory order.
    pub fn prepare(config: RunConfig) -> Result<Self, SetupError> {
        let catalog = discover(
            &config.paths.test_dir,
            &config.include_tests,
            &config.exclude_tests,
        )?;

        let last_fails = if config.dev_mode {
            read_id_list(&config.paths.fails_file()).unwrap_or_default()
        } else {
            Vec::new()
        };

        let order = build_order(
            &catalog,
            &OrderInputs {
                order_file: config.order_file.as_deref().filter(|_| config.dev_mode),
                last_fails: &last_fails,
                exclude_fails: config.exclude_fails,
                generate_order_file: config.generate_order_file,
                begin_from: config.begin_from_test,
            },
        );

        tracing::debug!(
            catalog = catalog.len(),
            sequence = order.ids.len(),
            external = order.uses_external_order,
            "run plan ready"
        );
        Ok(Self {
            config,
            catalog,
            order,
        })
    }

    /// Ids that will actually execute, in order.
    pub fn runnable_ids(&self) -> Vec<TestId> {
        let mut seen = std::collections::HashSet::new();
        self.order
            .ids
            .iter()
            .copied()
            .filter(|id| self.catalog.contains(*id) && seen.insert(*id))
            .collect()
    }
}

enum Step {
    Continue,
    Abort,
}

/// Drives one run.
pub struct Session {
    plan: Plan,
    executor: TestExecutor,
    tracker: ResultTracker,
    interrupt: InterruptHandle,
    ui: SessionUI,
    state: SessionState,
}

impl Session {
    pub fn new(plan: Plan, interrupt: InterruptHandle, ui: SessionUI) -> Self {
        let executor = TestExecutor::new(ExecutorConfig::from_run_config(&plan.config), interrupt.clone());
        let capture_reasons = plan.config.results_file.is_some() || plan.config.jenkins_file.is_some();
        Self {
            plan,
            executor,
            tracker: ResultTracker::new(capture_reasons),
            interrupt,
            ui,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    /// Run every scheduled test, persist artifacts and print the summary.
    ///
    /// Errors are limited to log-file I/O in the executor; test failures,
    /// interrupts and artifact write failures all end in a normal outcome.
    pub async fn run(mut self) -> Result<SessionOutcome> {
        let config = &self.plan.config;
        tracing::info!(
            tests = self.plan.order.ids.len(),
            dev_mode = config.dev_mode,
            recursions = config.recursions,
            max_fails = config.max_fails,
            "session started"
        );
        self.ui.print_header(
            self.plan.runnable_ids().len(),
            config.dev_mode,
            self.plan.order.uses_external_order,
        );

        let mut queue = self.plan.order.ids.clone().into_iter();
        self.transition(SessionState::Scheduling);

        while self.state == SessionState::Scheduling {
            if self.interrupt.is_interrupted() {
                self.ui.interrupted();
                self.tracker.mark_interrupted();
                self.transition(SessionState::Aborting);
                break;
            }

            let Some(case) = self.next_case(&mut queue) else {
                break;
            };

            self.transition(SessionState::Running(case.id));
            match self.run_one(&case).await? {
                Step::Continue => self.transition(SessionState::Scheduling),
                Step::Abort => {
                    self.tracker.mark_incomplete();
                    self.transition(SessionState::Aborting);
                }
            }
        }

        self.transition(SessionState::Finished);
        Ok(self.finish())
    }

    /// Next id that is in the catalog and not yet in the ledger.
    fn next_case(&self, queue: &mut impl Iterator<Item = TestId>) -> Option<TestCase> {
        for id in queue {
            if self.tracker.contains(id) {
                tracing::debug!(test = %id, "already run, skipping");
                continue;
            }
            match self.plan.catalog.get(id) {
                Some(case) => return Some(case.clone()),
                None => tracing::debug!(test = %id, "not in catalog, skipping"),
            }
        }
        None
    }

    async fn run_one(&mut self, case: &TestCase) -> Result<Step> {
        let id = case.id;
        let log_path = self.plan.config.log_path(id);

        self.tracker.begin(id);
        self.ui.test_started(id);
        let report = self.executor.run(case, &log_path, LogPolicy::Standard).await?;

        if report.interrupted {
            let outcome = match report.result.status {
                TestStatus::Pass => Outcome::Passed,
                TestStatus::Skip => Outcome::Skipped,
                TestStatus::Fail => Outcome::FailedAndAborted,
            };
            self.record_interrupted(report, outcome);
            return Ok(Step::Abort);
        }

        self.transition(SessionState::Evaluating(id));
        let config = &self.plan.config;

        let outcome = match report.result.status {
            TestStatus::Pass => Outcome::Passed,
            TestStatus::Skip => Outcome::Skipped,
            TestStatus::Fail if config.dev_mode => {
                let recursions = config.recursions;
                let ui = &self.ui;
                ui.reruns_started(id, recursions);
                let classification = FlakeClassifier::new(&self.executor, recursions)
                    .classify(case, &log_path, |attempt, status| {
                        ui.rerun_finished(id, attempt, recursions, status)
                    })
                    .await?;
                match classification {
                    Classification::Aborted => {
                        self.record_interrupted(report, Outcome::FailedAndAborted);
                        return Ok(Step::Abort);
                    }
                    Classification::Verdict(Verdict::Intermittent { passes, reruns }) => {
                        Outcome::Intermittent { passes, reruns }
                    }
                    Classification::Verdict(Verdict::RealFailure) => Outcome::Failed,
                }
            }
            TestStatus::Fail => Outcome::Failed,
        };

        self.ui.test_finished(id, outcome, report.result.duration);
        self.tracker
            .record(report.result, report.log_text.as_deref(), outcome);
        self.tracker.finish();

        if outcome.is_real_failure() {
            let config = &self.plan.config;
            if self.tracker.real_fail_count() >= config.max_fails as usize {
                self.ui.fail_limit_reached(config.max_fails);
                return Ok(Step::Abort);
            }
            if !config.dev_mode && config.stop_on_first_fail {
                self.ui.stopped_on_first_fail();
                return Ok(Step::Abort);
            }
        }
        Ok(Step::Continue)
    }

    fn record_interrupted(&mut self, report: RunReport, outcome: Outcome) {
        let id = report.result.id;
        tracing::info!(test = %id, ?outcome, "test interrupted");
        self.ui
            .test_finished(id, outcome, report.result.duration);
        self.ui.interrupted();
        self.tracker
            .record_interrupted(report.result, report.log_text.as_deref(), outcome);
    }

    fn finish(self) -> SessionOutcome {
        let config = &self.plan.config;
        let targets = ArtifactTargets {
            order_file: if config.dev_mode && !self.plan.order.uses_external_order {
                config.order_file.clone()
            } else {
                None
            },
            fails_file: config.dev_mode.then(|| config.paths.fails_file()),
            results_file: config.results_file.clone(),
            jenkins_file: config.jenkins_file.clone(),
        };

        let writes = self.tracker.persist(&targets);
        self.ui.artifact_warnings(&writes);

        let summary = self.tracker.summary();
        self.ui.print_summary(&summary);

        let exit_code = if self.tracker.real_fail_count() > 0 { 1 } else { 0 };
        tracing::info!(
            exit_code,
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            incomplete = summary.incomplete,
            "session finished"
        );
        SessionOutcome { exit_code, summary }
    }
}
