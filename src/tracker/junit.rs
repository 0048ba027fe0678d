//! JUnit XML rendering of a run, for CI servers such as Jenkins.

use super::Outcome;
use crate::executor::ExecutionResult;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use std::time::Duration;

const SUITE_NAME: &str = "regress";

/// Build a report with one test case per counted result.
pub fn build_report<'a>(
    rows: impl IntoIterator<Item = (&'a ExecutionResult, Option<&'a Outcome>)>,
) -> Report {
    let mut suite = TestSuite::new(SUITE_NAME);
    let mut total = Duration::ZERO;

    for (result, outcome) in rows {
        let status = match outcome {
            Some(Outcome::Passed) | Some(Outcome::Intermittent { .. }) => TestCaseStatus::success(),
            Some(Outcome::Skipped) => {
                let mut status = TestCaseStatus::skipped();
                if let Some(reason) = &result.reason {
                    status.set_message(reason.as_str());
                }
                status
            }
            Some(Outcome::Failed) | Some(Outcome::FailedAndAborted) | None => {
                let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
                if let Some(reason) = &result.reason {
                    status.set_message(reason.as_str());
                }
                if matches!(outcome, Some(Outcome::FailedAndAborted)) {
                    status.set_type("aborted");
                }
                status
            }
        };

        let time = Duration::from_secs_f64(result.duration.max(0.0));
        total += time;

        let mut testcase = TestCase::new(result.id.file_name(), status);
        testcase.set_classname(SUITE_NAME).set_time(time);
        if let Some(Outcome::Intermittent { passes, reruns }) = outcome {
            testcase.set_system_out(format!(
                "intermittent failure: {passes}/{reruns} reruns passed"
            ));
        }
        suite.add_test_case(testcase);
    }

    suite.set_time(total);
    let mut report = Report::new(SUITE_NAME);
    report.set_time(total).add_test_suites(vec![suite]);
    report
}

/// Serialize a report to XML text.
pub fn render(report: &Report) -> anyhow::Result<String> {
    let mut buf = Vec::new();
    report
        .serialize(&mut buf)
        .map_err(|e| anyhow::anyhow!("Failed to serialize JUnit report: {e}"))?;
    Ok(String::from_utf8(buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TestId;
    use crate::executor::TestStatus;

    fn result(major: u32, minor: u32, status: TestStatus, reason: Option<&str>) -> ExecutionResult {
        ExecutionResult {
            id: TestId::new(major, minor),
            start_time: 1_700_000_000.0,
            duration: 1.5,
            status,
            reason: reason.map(str::to_string),
        }
    }

    #[test]
    fn test_report_contains_each_case() {
        let pass = result(1, 1, TestStatus::Pass, None);
        let fail = result(2, 3, TestStatus::Fail, Some("job never started"));
        let skip = result(3, 1, TestStatus::Skip, None);
        let flaky = result(4, 2, TestStatus::Fail, None);
        let outcomes = [
            Outcome::Passed,
            Outcome::Failed,
            Outcome::Skipped,
            Outcome::Intermittent {
                passes: 2,
                reruns: 3,
            },
        ];

        let report = build_report(vec![
            (&pass, Some(&outcomes[0])),
            (&fail, Some(&outcomes[1])),
            (&skip, Some(&outcomes[2])),
            (&flaky, Some(&outcomes[3])),
        ]);
        let xml = render(&report).unwrap();

        assert!(xml.contains("test1.1"));
        assert!(xml.contains("test2.3"));
        assert!(xml.contains("<failure"));
        assert!(xml.contains("job never started"));
        assert!(xml.contains("<skipped"));
        assert!(xml.contains("2/3 reruns passed"));
    }
}
