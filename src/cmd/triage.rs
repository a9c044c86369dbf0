use std::path::PathBuf;

use clap::Args;

use crate::context::AppContext;
use crate::error::AppResult;
use crate::infra::tabular::{self, RowWriter};
use crate::workflow::triage::{EngineOptions, RunReport, TriageEngine};
use crate::workflow::update::UpdateReport;

const STAMP_FORMAT: &str = "%Y/%m/%d %H:%M";

#[derive(Args, Debug, Clone)]
pub struct TriageArgs {
    /// Comma-delimited triage sheet to reconcile.
    pub input: PathBuf,
    /// Write rows here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Log every routing decision.
    #[arg(short, long)]
    pub verbose: bool,
    /// Refresh project caches concurrently.
    #[arg(long)]
    pub parallel_refresh: bool,
    /// Consecutive write failures tolerated before aborting.
    #[arg(long)]
    pub write_failure_threshold: Option<usize>,
}

fn engine(ctx: &AppContext, args: &TriageArgs) -> TriageEngine {
    TriageEngine::new(EngineOptions {
        verbose: args.verbose,
        parallel_refresh: args.parallel_refresh,
        write_failure_threshold: args
            .write_failure_threshold
            .unwrap_or(ctx.config.write_failure_threshold)
            .max(1),
        ..EngineOptions::default()
    })
}

pub async fn run(ctx: &mut AppContext, args: TriageArgs) -> AppResult<RunReport> {
    let engine = engine(ctx, &args);

    let lines = tabular::read_lines(&args.input)?;
    let mut writer = RowWriter::new(tabular::open_output(args.output.as_deref())?);

    let report = engine
        .run(lines, &mut ctx.caches, &ctx.registry, &mut writer)
        .await?;

    tracing::info!(
        emitted = report.emitted,
        passed_through = report.passed_through,
        dropped = report.diagnostics.total(),
        refresh_failures = report.refresh_failures.len(),
        write_failures = report.write_failures,
        digest = %report.output_digest,
        "triage run complete"
    );
    Ok(report)
}

/// Rewrites a wide triage sheet into sorted open and closed sections.
pub async fn update(ctx: &mut AppContext, args: TriageArgs) -> AppResult<UpdateReport> {
    let engine = engine(ctx, &args);
    let stamp = chrono::Local::now().format(STAMP_FORMAT).to_string();

    let lines = tabular::read_lines(&args.input)?;
    let mut writer = RowWriter::new(tabular::open_output(args.output.as_deref())?);

    let report = engine
        .update(lines, &mut ctx.caches, &ctx.registry, &mut writer, &stamp)
        .await?;

    tracing::info!(
        open = report.open,
        closed = report.closed,
        dropped = report.diagnostics.total(),
        refresh_failures = report.refresh_failures.len(),
        write_failures = report.write_failures,
        digest = %report.output_digest,
        "triage update complete"
    );
    Ok(report)
}
