use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::io::{self, Write};

use crate::domain::connection::ConnectionRegistry;
use crate::domain::diagnostic::{DiagnosticEvent, DiagnosticLog};
use crate::domain::ticket::{IssueSnapshot, sanitize};
use crate::error::{AppResult, RefreshError};
use crate::infra::tabular::{RowWriter, trim_terminator};
use crate::services::ProjectCaches;
use crate::workflow::routing::{Route, route};
use crate::workflow::triage::{TriageEngine, WriteBudget, abort_error};

pub const COLUMN_HEADER: &str =
    ",Key,Summary,assignee,reviewer,status,resolution,Prio,Repro,Scope,Type,Component";
const OPEN_SECTION: &str = "Open Issues";
const CLOSED_SECTION: &str = "Closed Issues";
const STAMP_PREFIX: &str = "Last updated";
const LEGACY_STAMP_PREFIX: &str = "Last argus cleaning";
// Sorts rows without a priority bucket after every real component.
const DEFERRED_COMPONENT: &str = "ZZZ";
const COMPONENT_SEPARATOR: &str = ":";

/// One row of the wide triage sheet: link, key, summary, then the columns
/// the update rewrites and the hand-maintained repro and scope columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideRow {
    fields: Vec<String>,
}

impl WideRow {
    const KEY: usize = 1;
    const ASSIGNEE: usize = 3;
    const REVIEWER: usize = 4;
    const STATUS: usize = 5;
    const RESOLUTION: usize = 6;
    const PRIO: usize = 7;
    const REPRO: usize = 8;
    const SCOPE: usize = 9;
    const TYPE: usize = 10;
    const COMPONENT: usize = 11;
    const WIDTH: usize = 12;

    /// Splits a line into exactly [`Self::WIDTH`] columns. Quotes are dropped,
    /// short rows are padded and extra trailing columns are ignored.
    pub fn parse(line: &str) -> Self {
        let mut fields = line
            .split(',')
            .take(Self::WIDTH)
            .map(|field| field.replace('"', ""))
            .collect::<Vec<_>>();
        fields.resize(Self::WIDTH, String::new());
        Self { fields }
    }

    pub fn key(&self) -> &str {
        &self.fields[Self::KEY]
    }

    pub fn prio(&self) -> &str {
        &self.fields[Self::PRIO]
    }

    pub fn component(&self) -> &str {
        &self.fields[Self::COMPONENT]
    }

    /// Section titles, the column header and earlier timestamp lines are
    /// regenerated on output, so only rows with a real key are data.
    pub fn is_data(&self) -> bool {
        let first = self.fields[0].as_str();
        let key = self.key();
        !(key.is_empty()
            || key == "Key"
            || first.starts_with(STAMP_PREFIX)
            || first.starts_with(LEGACY_STAMP_PREFIX))
    }

    /// Overwrites the tracker-owned columns. Components from the sheet and
    /// the tracker are merged, so re-running an update is stable.
    pub fn apply(&mut self, snapshot: &IssueSnapshot) {
        self.fields[Self::ASSIGNEE] = sanitize(&snapshot.assignee);
        self.fields[Self::REVIEWER] = sanitize(snapshot.primary_reviewer());
        self.fields[Self::STATUS] = sanitize(&snapshot.status);
        self.fields[Self::RESOLUTION] = sanitize(&snapshot.resolution);
        self.fields[Self::TYPE] = sanitize(&snapshot.issue_type);
        self.fields[Self::PRIO] = sanitize(&snapshot.priority);

        let components = self.fields[Self::COMPONENT]
            .split(COMPONENT_SEPARATOR)
            .map(str::to_string)
            .chain(snapshot.components.iter().map(|component| sanitize(component)))
            .filter(|component| !component.is_empty())
            .collect::<BTreeSet<_>>();
        self.fields[Self::COMPONENT] = components
            .into_iter()
            .collect::<Vec<_>>()
            .join(COMPONENT_SEPARATOR);
    }

    pub fn to_line(&self) -> String {
        self.fields.join(",")
    }

    /// Component, then priority ascending; repro and scope descending.
    fn sort_order(&self, other: &Self) -> Ordering {
        self.component()
            .cmp(other.component())
            .then_with(|| self.prio().cmp(other.prio()))
            .then_with(|| other.fields[Self::REPRO].cmp(&self.fields[Self::REPRO]))
            .then_with(|| other.fields[Self::SCOPE].cmp(&self.fields[Self::SCOPE]))
    }
}

/// Orders one section in place. Rows with priority `N` sink to the end.
pub fn sort_section(rows: &mut [WideRow]) {
    for row in rows.iter_mut() {
        if row.prio() == "N" {
            row.fields[WideRow::COMPONENT] = DEFERRED_COMPONENT.to_string();
        }
    }
    rows.sort_by(WideRow::sort_order);
}

#[derive(Debug, Default)]
pub struct UpdateReport {
    pub open: usize,
    pub closed: usize,
    pub write_failures: usize,
    pub refresh_failures: Vec<RefreshError>,
    pub diagnostics: DiagnosticLog,
    pub output_digest: String,
}

impl TriageEngine {
    /// Rewrites a wide triage sheet from refreshed caches. Every row is read
    /// and routed before anything is written, since output is regrouped into
    /// open and closed sections. `stamp` fills the `Last updated` line.
    pub async fn update<I, W>(
        &self,
        lines: I,
        caches: &mut ProjectCaches,
        registry: &ConnectionRegistry,
        writer: &mut RowWriter<W>,
        stamp: &str,
    ) -> AppResult<UpdateReport>
    where
        I: Iterator<Item = io::Result<String>>,
        W: Write,
    {
        let refresh = self.refresh(caches).await;
        let mut report = UpdateReport {
            refresh_failures: refresh.failures,
            diagnostics: DiagnosticLog::with_limit(self.options().retained_diagnostics),
            ..UpdateReport::default()
        };

        let mut open = Vec::new();
        let mut closed = Vec::new();
        for (index, raw) in lines.enumerate() {
            let raw = raw?;
            let line_number = index + 1;
            let line = trim_terminator(&raw);
            let mut row = WideRow::parse(line);
            if !row.is_data() {
                continue;
            }

            match route(row.key(), line, caches, registry) {
                Route::Resolved {
                    connection,
                    snapshot,
                    ..
                } => {
                    if self.options().verbose {
                        tracing::info!(
                            line = line_number,
                            ticket = %row.key(),
                            connection = %connection.name,
                            open = snapshot.is_open,
                            "updating ticket"
                        );
                    }
                    row.apply(snapshot);
                    if snapshot.is_open {
                        open.push(row);
                    } else {
                        closed.push(row);
                    }
                }
                Route::Unresolved(kind) => {
                    report
                        .diagnostics
                        .record(DiagnosticEvent::new(line_number, kind));
                }
                Route::Orphaned(kind) => {
                    let event = DiagnosticEvent::new(line_number, kind);
                    event.emit();
                    return Err(abort_error(event));
                }
            }
        }

        sort_section(&mut open);
        sort_section(&mut closed);

        let mut budget = WriteBudget::new(self.options().write_failure_threshold);
        let stamp_line = format!("{STAMP_PREFIX} w/triage,{stamp}");
        for header in [stamp_line.as_str(), OPEN_SECTION, COLUMN_HEADER] {
            budget.record(writer.write_row(header), header)?;
        }
        for row in &open {
            let line = row.to_line();
            if budget.record(writer.write_row(&line), &line)? {
                report.open += 1;
            }
        }
        for header in ["", CLOSED_SECTION] {
            budget.record(writer.write_row(header), header)?;
        }
        for row in &closed {
            let line = row.to_line();
            if budget.record(writer.write_row(&line), &line)? {
                report.closed += 1;
            }
        }
        report.write_failures = budget.failures();

        writer.flush()?;
        report.output_digest = writer.digest();
        Ok(report)
    }
}
