use clap::{Args, Subcommand};

use crate::context::AppContext;
use crate::error::AppResult;
use crate::workflow::triage::{EngineOptions, TriageEngine};

#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommand {
    /// Pull a fresh snapshot of every project cache.
    Refresh {
        /// Refresh project caches concurrently.
        #[arg(long)]
        parallel: bool,
    },
    /// List project caches with their owning connection.
    List,
}

pub async fn run(ctx: &mut AppContext, command: CacheCommand) -> AppResult<()> {
    match command {
        CacheCommand::Refresh { parallel } => {
            let engine = TriageEngine::new(EngineOptions {
                parallel_refresh: parallel,
                ..EngineOptions::default()
            });
            let report = engine.refresh(&mut ctx.caches).await;
            println!(
                "Refreshed {} project(s), {} failed.",
                report.refreshed.len(),
                report.failures.len()
            );
            for failure in &report.failures {
                println!("  {failure}");
            }
            Ok(())
        }
        CacheCommand::List => {
            if ctx.caches.is_empty() {
                println!("No project caches. Add projects with `triage config init`.");
            }
            for (project, cache) in &ctx.caches {
                let owner = match ctx.registry.owner_of(project) {
                    Some(conn) => format!("{} ({})", conn.name, conn.base_url),
                    None => "<no connection>".to_string(),
                };
                println!("{project}\t{owner}\t{} issue(s)", cache.len());
            }
            Ok(())
        }
    }
}
