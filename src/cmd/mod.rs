//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `run`    | `Run`            |
//! | `list`   | `List`           |
//! | `config` | `Config`         |
//!
//! Every command returns the process exit code. Errors that stop a command
//! before any test runs map to [`SETUP_FAILURE_CODE`].

use anyhow::Result;
use console::style;
use regress::catalog::{TestId, TestPattern};
use regress::config::SessionOverrides;

use super::SelectionArgs;

pub mod config;
pub mod list;
pub mod run;

pub use config::cmd_config;
pub use list::cmd_list;
pub use run::cmd_run;

/// Exit code for setup failures: missing test dir, empty catalog, bad config.
pub const SETUP_FAILURE_CODE: i32 = -1;

/// Print a command error and return the setup failure code.
pub fn report_error(err: &anyhow::Error) -> i32 {
    tracing::debug!(error = ?err, "command failed");
    eprintln!("{} {:#}", style("error:").red().bold(), err);
    SETUP_FAILURE_CODE
}

/// Session overrides shared by `run` and `list`.
pub fn selection_overrides(args: &SelectionArgs) -> Result<SessionOverrides> {
    let parse_patterns = |raw: &[String]| -> Result<Vec<TestPattern>> {
        raw.iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<TestPattern>().map_err(Into::into))
            .collect()
    };

    Ok(SessionOverrides {
        dev_mode: !args.user_mode,
        exclude_fails: args.exclude_fails,
        include_tests: parse_patterns(&args.include)?,
        exclude_tests: parse_patterns(&args.exclude)?,
        begin_from_test: args
            .begin_from_test
            .as_deref()
            .map(str::parse::<TestId>)
            .transpose()?,
        order_file: args.order_file.clone(),
        ..Default::default()
    })
}
