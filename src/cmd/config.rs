//! Persisted configuration view: `regress config`.

use anyhow::{Context, Result};
use regress::config::{PersistedConfig, RunPaths};
use std::path::PathBuf;

use super::super::{Cli, ConfigCommands};
use super::report_error;

pub fn cmd_config(cli: &Cli, test_dir: PathBuf, command: Option<ConfigCommands>) -> i32 {
    let result = match command {
        None | Some(ConfigCommands::Show) => show(cli, test_dir),
    };
    match result {
        Ok(()) => 0,
        Err(e) => report_error(&e),
    }
}

fn show(cli: &Cli, test_dir: PathBuf) -> Result<()> {
    let paths = RunPaths::new(test_dir, cli.state_dir.clone(), None);
    let store = paths.config_file();

    println!();
    println!("Regress Configuration");
    println!("=====================");
    println!();

    if store.exists() {
        println!("Config file: {}", store.display());
    } else {
        println!("No config file at {} (using defaults)", store.display());
    }
    println!();

    let persisted = PersistedConfig::load_or_default(&store)?;
    let rendered = toml::to_string_pretty(&persisted).context("Failed to render configuration")?;
    for line in rendered.lines() {
        println!("  {}", line);
    }
    println!();

    let describe = |configured: &str| match paths.resolve(configured) {
        Some(path) => path.display().to_string(),
        None => "(not set)".to_string(),
    };
    println!("Resolved paths:");
    println!("  order file   = {}", describe(&persisted.order_file));
    println!("  jenkins file = {}", describe(&persisted.jenkins_file));
    println!("  fails file   = {}", paths.fails_file().display());
    println!("  log dir      = {}", paths.log_dir.display());
    println!();
    Ok(())
}
