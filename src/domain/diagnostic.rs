use std::collections::BTreeMap;
use std::fmt;

use crate::domain::ticket::ProjectKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    MalformedTicket { line: String },
    UnknownProject { ticket_id: String },
    UnknownIssue { project: ProjectKey, ticket_id: String },
    OrphanedProject { project: ProjectKey, ticket_id: String },
    ResolvedFiltered { ticket_id: String, status: String },
}

/// Why a row was dropped or why the run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEvent {
    /// 1-based input line number.
    pub line_number: usize,
    pub kind: DiagnosticKind,
}

impl DiagnosticKind {
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticKind::MalformedTicket { .. } => "malformed_ticket",
            DiagnosticKind::UnknownProject { .. } => "unknown_project",
            DiagnosticKind::UnknownIssue { .. } => "unknown_issue",
            DiagnosticKind::OrphanedProject { .. } => "orphaned_project",
            DiagnosticKind::ResolvedFiltered { .. } => "resolved_filtered",
        }
    }
}

impl DiagnosticEvent {
    pub fn new(line_number: usize, kind: DiagnosticKind) -> Self {
        Self { line_number, kind }
    }

    pub fn severity(&self) -> Severity {
        match self.kind {
            DiagnosticKind::ResolvedFiltered { .. } => Severity::Info,
            DiagnosticKind::OrphanedProject { .. } => Severity::Fatal,
            _ => Severity::Warning,
        }
    }

    pub fn emit(&self) {
        match self.severity() {
            Severity::Info => tracing::info!(line = self.line_number, "{}", self),
            Severity::Warning => tracing::warn!(line = self.line_number, "{}", self),
            Severity::Fatal => tracing::error!(line = self.line_number, "{}", self),
        }
    }
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::MalformedTicket { line } => {
                write!(f, "expected a hyphen in the ticket column, skipping [{line}]")
            }
            DiagnosticKind::UnknownProject { ticket_id } => {
                write!(f, "no cached project for ticket {ticket_id}, skipping")
            }
            DiagnosticKind::UnknownIssue { project, ticket_id } => write!(
                f,
                "found project {project} but not ticket {ticket_id}; cache may be stale"
            ),
            DiagnosticKind::OrphanedProject { project, ticket_id } => write!(
                f,
                "no connection owns project {project} (ticket {ticket_id})"
            ),
            DiagnosticKind::ResolvedFiltered { ticket_id, status } => {
                write!(f, "filtered resolved ticket {ticket_id} (status: {status})")
            }
        }
    }
}

const DEFAULT_RETAINED_DIAGNOSTICS: usize = 256;

/// Emits every event and keeps counts per kind, but only holds on to the
/// first `limit` events so memory stays bounded on large inputs.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    limit: usize,
    total: usize,
    by_kind: BTreeMap<&'static str, usize>,
    retained: Vec<DiagnosticEvent>,
}

impl DiagnosticLog {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            total: 0,
            by_kind: BTreeMap::new(),
            retained: Vec::new(),
        }
    }

    pub fn record(&mut self, event: DiagnosticEvent) {
        event.emit();
        self.total += 1;
        *self.by_kind.entry(event.kind.name()).or_default() += 1;
        if self.retained.len() < self.limit {
            self.retained.push(event);
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn count(&self, kind: &str) -> usize {
        self.by_kind.get(kind).copied().unwrap_or(0)
    }

    pub fn by_kind(&self) -> &BTreeMap<&'static str, usize> {
        &self.by_kind
    }

    pub fn retained(&self) -> &[DiagnosticEvent] {
        &self.retained
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::with_limit(DEFAULT_RETAINED_DIAGNOSTICS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn malformed(line_number: usize) -> DiagnosticEvent {
        DiagnosticEvent::new(
            line_number,
            DiagnosticKind::MalformedTicket {
                line: format!("row {line_number}"),
            },
        )
    }

    #[test]
    fn log_caps_retained_events_but_counts_all() {
        let mut log = DiagnosticLog::with_limit(2);
        for line_number in 1..=5 {
            log.record(malformed(line_number));
        }
        log.record(DiagnosticEvent::new(
            6,
            DiagnosticKind::UnknownProject {
                ticket_id: "PROJZ-1".to_string(),
            },
        ));

        assert_eq!(log.total(), 6);
        assert_eq!(log.count("malformed_ticket"), 5);
        assert_eq!(log.count("unknown_project"), 1);
        assert_eq!(log.retained(), &[malformed(1), malformed(2)]);
    }

    #[test]
    fn severity_follows_kind() {
        assert_eq!(malformed(1).severity(), Severity::Warning);
        let orphan = DiagnosticEvent::new(
            1,
            DiagnosticKind::OrphanedProject {
                project: ProjectKey::new("PROJQ").unwrap(),
                ticket_id: "PROJQ-1".to_string(),
            },
        );
        assert_eq!(orphan.severity(), Severity::Fatal);
    }
}
