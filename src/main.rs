use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "regress")]
#[command(version, about = "Adaptive regression-suite orchestrator")]
pub struct Cli {
    /// Log debug events to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding the test<M>.<N> programs (defaults to the current directory)
    #[arg(long, global = true)]
    pub test_dir: Option<PathBuf>,

    /// Directory for the config store, fails file and logs (defaults to <test-dir>/.regress)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the suite
    Run(RunArgs),
    /// Print the tests a run would execute, in order
    List(SelectionArgs),
    /// View the persisted configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the persisted configuration
    Show,
}

/// Flags that decide which tests run and in what order.
#[derive(Args, Clone, Debug, Default)]
pub struct SelectionArgs {
    /// Skip these tests (comma-separated, e.g. 2.*,4.1)
    #[arg(short, long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Run only these tests (comma-separated, e.g. 1.*,3.2)
    #[arg(short, long, value_delimiter = ',')]
    pub include: Vec<String>,

    /// Start the sequence at this test
    #[arg(short, long)]
    pub begin_from_test: Option<String>,

    /// User mode: no reruns, no history, failed logs renamed to .failed
    #[arg(short, long)]
    pub user_mode: bool,

    /// Do not put the previous run's failures first
    #[arg(long)]
    pub exclude_fails: bool,

    /// Order file for this run only
    #[arg(long)]
    pub order_file: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Print each test's duration
    #[arg(short, long)]
    pub time_individual: bool,

    /// Keep logs of passing and skipped tests
    #[arg(short, long)]
    pub keep_logs: bool,

    /// Stop at the first failure (user mode)
    #[arg(short, long)]
    pub stop_on_first_fail: bool,

    /// Write a JSON report of every executed test
    #[arg(short, long)]
    pub results_file: Option<PathBuf>,

    /// Real failures tolerated before aborting, for this run only
    #[arg(long)]
    pub max_fails: Option<u32>,

    /// Reruns used to classify a failure, for this run only
    #[arg(long)]
    pub recursions: Option<u32>,

    /// JUnit XML report path for this run only
    #[arg(long)]
    pub jenkins_file: Option<String>,

    /// Persist a new fail limit
    #[arg(long)]
    pub set_max_fails: Option<u32>,

    /// Persist a new rerun count
    #[arg(long)]
    pub set_recursions: Option<u32>,

    /// Persist a new order file path (empty to unset)
    #[arg(long)]
    pub set_order_file: Option<String>,

    /// Persist a new JUnit XML report path (empty to unset)
    #[arg(long)]
    pub set_jenkins_file: Option<String>,

    /// Ignore the existing order file and regenerate it from this run
    #[arg(long)]
    pub generate_order_file: bool,

    /// Launch every test through this program, e.g. `expect`
    #[arg(long)]
    pub interpreter: Option<String>,

    /// Directory for per-test logs (defaults to <state-dir>/logs)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let test_dir = match cli.test_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let code = match &cli.command {
        Commands::Run(args) => cmd::cmd_run(&cli, test_dir, args).await,
        Commands::List(args) => cmd::cmd_list(&cli, test_dir, args),
        Commands::Config { command } => cmd::cmd_config(&cli, test_dir, command.clone()),
    };

    std::process::exit(code);
}
