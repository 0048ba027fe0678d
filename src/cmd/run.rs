//! Suite execution: `regress run`.

use anyhow::{Context, Result};
use regress::config::{PersistedUpdates, RunPaths};
use regress::session::{Plan, Session, load_config};
use regress::signal;
use regress::ui::SessionUI;
use std::path::PathBuf;

use super::super::{Cli, RunArgs};
use super::{report_error, selection_overrides};

pub async fn cmd_run(cli: &Cli, test_dir: PathBuf, args: &RunArgs) -> i32 {
    match run(cli, test_dir, args).await {
        Ok(code) => code,
        Err(e) => report_error(&e),
    }
}

async fn run(cli: &Cli, test_dir: PathBuf, args: &RunArgs) -> Result<i32> {
    let paths = RunPaths::new(test_dir, cli.state_dir.clone(), args.log_dir.clone());

    let mut overrides = selection_overrides(&args.selection)?;
    overrides.keep_logs = args.keep_logs;
    overrides.time_individual = args.time_individual;
    overrides.stop_on_first_fail = args.stop_on_first_fail;
    overrides.generate_order_file = args.generate_order_file;
    overrides.results_file = args.results_file.clone();
    overrides.recursions = args.recursions;
    overrides.max_fails = args.max_fails;
    overrides.jenkins_file = args.jenkins_file.clone();
    overrides.interpreter = args.interpreter.clone();

    let updates = PersistedUpdates {
        recursions: args.set_recursions,
        max_fails: args.set_max_fails,
        order_file: args.set_order_file.clone(),
        jenkins_file: args.set_jenkins_file.clone(),
    };

    let config = load_config(paths, &overrides, &updates, true)?;
    let plan = Plan::prepare(config)?;

    let interrupt = signal::install().context("Failed to install signal handlers")?;
    let outcome = Session::new(plan, interrupt, SessionUI::new(args.time_individual))
        .run()
        .await?;
    Ok(outcome.exit_code)
}
