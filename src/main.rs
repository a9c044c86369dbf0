mod cache;
mod cmd;
mod config;
mod context;
mod domain;
mod error;
mod infra;
mod services;
mod workflow;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::cache::{self as cache_cmd, CacheArgs};
use crate::cmd::config::{self as config_cmd, ConfigArgs};
use crate::cmd::triage::{self as triage_cmd, TriageArgs};
use crate::config::AppConfig;
use crate::context::AppContext;
use crate::error::AppResult;

#[derive(Parser)]
#[command(
    name = "triage",
    author,
    version,
    about = "Reconcile triage sheets against cached issue tracker projects"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh project caches and enrich a triage sheet with live ticket fields.
    Run(TriageArgs),
    /// Refresh project caches and rewrite a wide triage sheet into sorted open and closed sections.
    Update(TriageArgs),
    /// Inspect or refresh the offline project caches.
    Cache(CacheArgs),
    /// Manage tracker connections.
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(matches!(&cli.command, Commands::Run(args) | Commands::Update(args) if args.verbose));

    if let Err(error) = run(cli).await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

// Logs go to stderr so they never mix with rows written to stdout.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> AppResult<()> {
    match cli.command {
        Commands::Config(args) => config_cmd::run(args.command),
        Commands::Cache(args) => {
            let mut context = AppContext::load(AppConfig::load()?)?;
            cache_cmd::run(&mut context, args.command).await
        }
        Commands::Run(args) => {
            let mut context = AppContext::load(AppConfig::load()?)?;
            let report = triage_cmd::run(&mut context, args).await?;
            warn_stale(report.refresh_failures.len());
            Ok(())
        }
        Commands::Update(args) => {
            let mut context = AppContext::load(AppConfig::load()?)?;
            let report = triage_cmd::update(&mut context, args).await?;
            warn_stale(report.refresh_failures.len());
            Ok(())
        }
    }
}

fn warn_stale(refresh_failures: usize) {
    if refresh_failures > 0 {
        eprintln!(
            "Warning: {refresh_failures} project cache(s) failed to refresh; stale snapshots were used."
        );
    }
}
