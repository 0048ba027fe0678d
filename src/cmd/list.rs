//! `regress list`: print the effective run sequence without running it.

use anyhow::Result;
use console::style;
use regress::config::{PersistedUpdates, RunPaths};
use regress::session::{Plan, load_config};
use std::path::PathBuf;

use super::super::{Cli, SelectionArgs};
use super::{report_error, selection_overrides};

pub fn cmd_list(cli: &Cli, test_dir: PathBuf, args: &SelectionArgs) -> i32 {
    match list(cli, test_dir, args) {
        Ok(()) => 0,
        Err(e) => report_error(&e),
    }
}

fn list(cli: &Cli, test_dir: PathBuf, args: &SelectionArgs) -> Result<()> {
    let paths = RunPaths::new(test_dir, cli.state_dir.clone(), None);
    let overrides = selection_overrides(args)?;
    let config = load_config(paths, &overrides, &PersistedUpdates::default(), false)?;
    let plan = Plan::prepare(config)?;

    let ids = plan.runnable_ids();
    let source = if plan.order.uses_external_order {
        "historical order"
    } else {
        "directory order"
    };
    eprintln!(
        "{}",
        style(format!("{} of {} tests, {}", ids.len(), plan.catalog.len(), source)).dim()
    );
    for id in ids {
        println!("{}", id.file_name());
    }
    Ok(())
}
