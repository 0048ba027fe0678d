use crate::catalog::TestId;
use crate::executor::TestStatus;
use crate::tracker::{ArtifactWrite, Outcome, Summary};
use crate::ui::icons::{CHECK, CLOCK, CROSS, FLAKE, SKIP, STOP, WARN};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Console output for a session.
///
/// Result lines go to stdout. While a test runs, a spinner on stderr shows
/// which test (or rerun) is in progress; it is hidden when stderr is not a
/// terminal.
pub struct SessionUI {
    spinner: ProgressBar,
    time_individual: bool,
}

impl SessionUI {
    /// `time_individual`: append each test's duration to its result line.
    pub fn new(time_individual: bool) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {msg} {elapsed:.dim}")
                .expect("progress bar template is a valid static string"),
        );
        Self {
            spinner,
            time_individual,
        }
    }

    /// A UI that never draws a spinner. Result lines are still printed.
    pub fn hidden(time_individual: bool) -> Self {
        Self {
            spinner: ProgressBar::hidden(),
            time_individual,
        }
    }

    fn print_line(&self, msg: impl AsRef<str>) {
        self.spinner.suspend(|| println!("{}", msg.as_ref()));
    }

    pub fn print_header(&self, total: usize, dev_mode: bool, external_order: bool) {
        let mode = if dev_mode { "dev mode" } else { "user mode" };
        let order = if external_order {
            "historical order"
        } else {
            "directory order"
        };
        self.print_line(format!(
            "{} {} {}",
            style("Running").bold(),
            style(format!("{total} tests")).cyan(),
            style(format!("({mode}, {order})")).dim()
        ));
    }

    pub fn test_started(&self, id: TestId) {
        self.spinner.reset_elapsed();
        self.spinner
            .set_message(format!("Running test {}", style(id).yellow()));
        self.spinner.enable_steady_tick(Duration::from_millis(100));
    }

    /// The primary run failed and reruns are starting.
    pub fn reruns_started(&self, id: TestId, recursions: u32) {
        self.spinner.set_message(format!(
            "Test {} failed, rerunning {} times",
            style(id).yellow(),
            recursions
        ));
    }

    pub fn rerun_finished(&self, id: TestId, attempt: u32, recursions: u32, status: TestStatus) {
        self.spinner.set_message(format!(
            "Test {} rerun {}/{}: {}",
            style(id).yellow(),
            attempt,
            recursions,
            status
        ));
    }

    /// Print the final result line of one test.
    pub fn test_finished(&self, id: TestId, outcome: Outcome, duration: f64) {
        self.spinner.disable_steady_tick();
        self.spinner.set_message("");
        let mut line = format!("Running test {} ... {}", id, outcome_label(outcome));
        if self.time_individual {
            line.push_str(&format!(" {}{}", CLOCK, style(format!("({duration:.3}s)")).dim()));
        }
        self.print_line(line);
    }

    pub fn interrupted(&self) {
        self.spinner.disable_steady_tick();
        self.print_line(format!(
            "{}{}",
            STOP,
            style("Interrupted, stopping the run").red().bold()
        ));
    }

    pub fn fail_limit_reached(&self, max_fails: u32) {
        self.print_line(format!(
            "{}{}",
            STOP,
            style(format!("Stopping: reached {max_fails} real failure(s)")).red()
        ));
    }

    pub fn stopped_on_first_fail(&self) {
        self.print_line(format!(
            "{}{}",
            STOP,
            style("Stopping on first failure").red()
        ));
    }

    pub fn artifact_warnings(&self, writes: &[ArtifactWrite]) {
        for write in writes {
            if let Some(err) = &write.error {
                self.print_line(format!(
                    "{}{} {}: {:#}",
                    WARN,
                    style(format!("Could not write {}", write.kind)).yellow(),
                    write.path.display(),
                    err
                ));
            }
        }
    }

    pub fn print_summary(&self, summary: &Summary) {
        self.spinner.finish_and_clear();
        self.print_line("");
        self.print_line(format!("{}", style("═".repeat(60)).cyan()));
        self.print_line(counts_line(summary));
        for (id, passes, reruns) in &summary.intermittent {
            self.print_line(format!(
                "{}Intermittent: {} ({}/{} passed)",
                FLAKE,
                style(id).yellow(),
                passes,
                reruns
            ));
        }
        if !summary.failed_list.is_empty() {
            let ids: Vec<String> = summary.failed_list.iter().map(ToString::to_string).collect();
            self.print_line(format!(
                "{}Failed tests: {}",
                CROSS,
                style(ids.join(", ")).red().bold()
            ));
        }
        if let Some(id) = summary.aborted {
            self.print_line(format!(
                "{}Test {} was interrupted",
                STOP,
                style(id).red()
            ));
        }
        if summary.incomplete {
            self.print_line(format!(
                "{}{}",
                WARN,
                style("Run incomplete: not every test was executed").yellow()
            ));
        } else if summary.failed == 0 {
            self.print_line(format!("{}{}", CHECK, style("No real failures").green()));
        }
    }
}

fn counts_line(summary: &Summary) -> String {
    format!(
        "{}{} passed, {} failed, {} skipped",
        CHECK,
        style(summary.passed).green(),
        style(summary.failed).red(),
        style(summary.skipped).yellow()
    )
}

/// Inline result marker for a test.
pub fn outcome_label(outcome: Outcome) -> String {
    match outcome {
        Outcome::Passed => style("PASSED").green().to_string(),
        Outcome::Skipped => format!("{}{}", SKIP, style("SKIPPED").yellow()),
        Outcome::Failed => style("FAILED!").red().bold().to_string(),
        Outcome::Intermittent { passes, reruns } => format!(
            "{} {}",
            style("FAILED").yellow(),
            style(format!("(intermittent, {passes}/{reruns} passed)")).yellow()
        ),
        Outcome::FailedAndAborted => style("ABORTED").red().to_string(),
    }
}
