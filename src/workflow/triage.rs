use std::io::{self, Write};

use futures::future::join_all;

use crate::domain::connection::ConnectionRegistry;
use crate::domain::diagnostic::{DiagnosticEvent, DiagnosticKind, DiagnosticLog};
use crate::domain::ticket::{ProjectKey, TicketReference, TriageOutputRow};
use crate::error::{AppError, AppResult, RefreshError};
use crate::infra::tabular::{RowWriter, trim_terminator};
use crate::services::ProjectCaches;
use crate::workflow::routing::{Route, route};

const DEFAULT_WRITE_FAILURE_THRESHOLD: usize = 3;
const DEFAULT_RETAINED_DIAGNOSTICS: usize = 256;

/// Per-run engine settings.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Log every routing decision, not just dropped rows.
    pub verbose: bool,
    pub parallel_refresh: bool,
    /// Consecutive write failures tolerated before the run aborts.
    pub write_failure_threshold: usize,
    /// Dropped-row events kept in the report; the rest are only counted.
    pub retained_diagnostics: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            parallel_refresh: false,
            write_failure_threshold: DEFAULT_WRITE_FAILURE_THRESHOLD,
            retained_diagnostics: DEFAULT_RETAINED_DIAGNOSTICS,
        }
    }
}

#[derive(Debug, Default)]
pub struct RefreshReport {
    pub refreshed: Vec<ProjectKey>,
    pub failures: Vec<RefreshError>,
}

/// Decision for a single input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// Header row, kept with its original line terminator.
    PassThrough(String),
    Emit(TriageOutputRow),
    Dropped(DiagnosticEvent),
    /// Configuration fault; nothing after this line is processed.
    Aborted(DiagnosticEvent),
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub emitted: usize,
    pub passed_through: usize,
    pub write_failures: usize,
    pub refresh_failures: Vec<RefreshError>,
    pub diagnostics: DiagnosticLog,
    pub output_digest: String,
}

/// Tracks consecutive write failures against the configured threshold.
pub struct WriteBudget {
    threshold: usize,
    consecutive: usize,
    failures: usize,
}

impl WriteBudget {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
            failures: 0,
        }
    }

    /// Returns whether the row was written, or an error once too many
    /// writes in a row have failed.
    pub fn record(&mut self, result: io::Result<()>, row: &str) -> AppResult<bool> {
        match result {
            Ok(()) => {
                self.consecutive = 0;
                Ok(true)
            }
            Err(err) => {
                self.consecutive += 1;
                self.failures += 1;
                tracing::warn!(error = %err, row = %trim_terminator(row), "failed to write output row");
                if self.consecutive >= self.threshold {
                    Err(AppError::OutputFailures {
                        consecutive: self.consecutive,
                    })
                } else {
                    Ok(false)
                }
            }
        }
    }

    pub fn failures(&self) -> usize {
        self.failures
    }
}

pub(crate) fn abort_error(event: DiagnosticEvent) -> AppError {
    match event.kind {
        DiagnosticKind::OrphanedProject { project, ticket_id } => AppError::OrphanedProject {
            project,
            ticket: ticket_id,
        },
        other => AppError::Configuration(format!("run aborted: {other:?}")),
    }
}

pub struct TriageEngine {
    options: EngineOptions,
}

impl TriageEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Refreshes every cache. A failing project is reported and keeps its
    /// previous snapshot; the others still refresh.
    pub async fn refresh(&self, caches: &mut ProjectCaches) -> RefreshReport {
        let results = if self.options.parallel_refresh {
            join_all(
                caches.values_mut().map(|cache| async move {
                    (cache.project_key().clone(), cache.refresh().await)
                }),
            )
            .await
        } else {
            let mut results = Vec::with_capacity(caches.len());
            for cache in caches.values_mut() {
                results.push((cache.project_key().clone(), cache.refresh().await));
            }
            results
        };

        let mut report = RefreshReport::default();
        for (key, result) in results {
            match result {
                Ok(()) => report.refreshed.push(key),
                Err(err) => {
                    tracing::warn!(project = %err.project, reason = %err.reason, "project cache refresh failed; serving previous snapshot");
                    report.failures.push(err);
                }
            }
        }
        report
    }

    /// Lazily decides each input line against already-refreshed caches.
    pub fn reconcile<'a, I>(
        &'a self,
        lines: I,
        caches: &'a ProjectCaches,
        registry: &'a ConnectionRegistry,
    ) -> Reconcile<'a, I>
    where
        I: Iterator<Item = io::Result<String>>,
    {
        Reconcile {
            lines,
            caches,
            registry,
            verbose: self.options.verbose,
            line_number: 0,
            finished: false,
        }
    }

    /// Refreshes the caches, then streams `lines` through the reconciler into
    /// `writer`. Rows already written stay written if the run aborts.
    pub async fn run<I, W>(
        &self,
        lines: I,
        caches: &mut ProjectCaches,
        registry: &ConnectionRegistry,
        writer: &mut RowWriter<W>,
    ) -> AppResult<RunReport>
    where
        I: Iterator<Item = io::Result<String>>,
        W: Write,
    {
        let refresh = self.refresh(caches).await;
        let mut report = RunReport {
            refresh_failures: refresh.failures,
            diagnostics: DiagnosticLog::with_limit(self.options.retained_diagnostics),
            ..RunReport::default()
        };
        let mut budget = WriteBudget::new(self.options.write_failure_threshold);

        for outcome in self.reconcile(lines, caches, registry) {
            let (text, result, emitted) = match outcome? {
                RowOutcome::PassThrough(raw) => {
                    let result = writer.write_verbatim(&raw);
                    (raw, result, false)
                }
                RowOutcome::Emit(row) => {
                    let line = row.to_line();
                    let result = writer.write_row(&line);
                    (line, result, true)
                }
                RowOutcome::Dropped(event) => {
                    report.diagnostics.record(event);
                    continue;
                }
                RowOutcome::Aborted(event) => {
                    event.emit();
                    if let Err(err) = writer.flush() {
                        tracing::warn!(error = %err, "failed to flush partial output");
                    }
                    return Err(abort_error(event));
                }
            };

            let written = budget.record(result, &text);
            report.write_failures = budget.failures();
            if written? {
                if emitted {
                    report.emitted += 1;
                } else {
                    report.passed_through += 1;
                }
            }
        }

        writer.flush()?;
        report.output_digest = writer.digest();
        Ok(report)
    }
}

/// Iterator returned by [`TriageEngine::reconcile`]. Stops after a read
/// error or an aborted row.
pub struct Reconcile<'a, I> {
    lines: I,
    caches: &'a ProjectCaches,
    registry: &'a ConnectionRegistry,
    verbose: bool,
    line_number: usize,
    finished: bool,
}

impl<I> Reconcile<'_, I> {
    fn decide(&self, raw: String) -> RowOutcome {
        let line = trim_terminator(&raw);
        let fields = line.split(',').collect::<Vec<_>>();
        if fields.len() <= 2 {
            return RowOutcome::PassThrough(raw);
        }

        let reference = TicketReference::from_fields(&fields);
        let (connection, snapshot) =
            match route(&reference.ticket_id, line, self.caches, self.registry) {
                Route::Resolved {
                    connection,
                    snapshot,
                    ..
                } => (connection, snapshot),
                Route::Unresolved(kind) => {
                    return RowOutcome::Dropped(DiagnosticEvent::new(self.line_number, kind));
                }
                Route::Orphaned(kind) => {
                    return RowOutcome::Aborted(DiagnosticEvent::new(self.line_number, kind));
                }
            };

        if !snapshot.is_open {
            return RowOutcome::Dropped(DiagnosticEvent::new(
                self.line_number,
                DiagnosticKind::ResolvedFiltered {
                    ticket_id: reference.ticket_id,
                    status: snapshot.status.clone(),
                },
            ));
        }

        if self.verbose {
            tracing::info!(
                line = self.line_number,
                ticket = %reference.ticket_id,
                connection = %connection.name,
                "enriching open ticket"
            );
        }
        RowOutcome::Emit(TriageOutputRow::enrich(reference, snapshot))
    }
}

impl<I> Iterator for Reconcile<'_, I>
where
    I: Iterator<Item = io::Result<String>>,
{
    type Item = AppResult<RowOutcome>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(err) => {
                self.finished = true;
                return Some(Err(AppError::Io(err)));
            }
        };
        self.line_number += 1;

        let outcome = self.decide(line);
        if matches!(outcome, RowOutcome::Aborted(_)) {
            self.finished = true;
        }
        Some(Ok(outcome))
    }
}
