use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Project prefix of a ticket identifier, e.g. `PROJA` in `PROJA-12`.
///
/// Keys are compared exactly as stored; no case folding is applied.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectKey(String);

impl ProjectKey {
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() || trimmed.contains('-') {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed ticket identifier '{ticket}': expected <PROJECTKEY>-<number>")]
pub struct MalformedTicket {
    pub ticket: String,
}

pub fn parse_project_key(ticket_id: &str) -> Result<ProjectKey, MalformedTicket> {
    match ticket_id.split_once('-') {
        Some((prefix, _)) if !prefix.is_empty() => Ok(ProjectKey(prefix.to_string())),
        _ => Err(MalformedTicket {
            ticket: ticket_id.to_string(),
        }),
    }
}

/// Offline view of one issue as last pulled from the tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSnapshot {
    pub issue_key: String,
    pub is_open: bool,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub reviewers: Vec<String>,
    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub issue_type: String,
    #[serde(default)]
    pub components: Vec<String>,
}

impl IssueSnapshot {
    pub fn primary_reviewer(&self) -> &str {
        self.reviewers.first().map(String::as_str).unwrap_or("")
    }
}

/// One data row of the triage sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketReference {
    pub link: String,
    pub ticket_id: String,
    pub summary: String,
    pub bucket: String,
}

impl TicketReference {
    const LINK: usize = 0;
    const TICKET: usize = 1;
    const SUMMARY: usize = 2;
    const BUCKET: usize = 3;

    /// Builds a reference from split columns. Columns past the bucket are
    /// output-only and ignored; missing columns read as empty.
    pub fn from_fields(fields: &[&str]) -> Self {
        let column = |index: usize| fields.get(index).copied().unwrap_or("").to_string();
        Self {
            link: column(Self::LINK),
            ticket_id: column(Self::TICKET),
            summary: column(Self::SUMMARY),
            bucket: column(Self::BUCKET),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriageOutputRow {
    pub reference: TicketReference,
    pub assignee: String,
    pub reviewer: String,
    pub status: String,
}

impl TriageOutputRow {
    pub fn enrich(reference: TicketReference, snapshot: &IssueSnapshot) -> Self {
        Self {
            reference,
            assignee: sanitize(&snapshot.assignee),
            reviewer: sanitize(snapshot.primary_reviewer()),
            status: sanitize(&snapshot.status),
        }
    }

    pub fn to_line(&self) -> String {
        [
            self.reference.link.as_str(),
            self.reference.ticket_id.as_str(),
            self.reference.summary.as_str(),
            self.reference.bucket.as_str(),
            self.assignee.as_str(),
            self.reviewer.as_str(),
            self.status.as_str(),
        ]
        .join(",")
    }
}

// Tracker values may carry commas or quotes, which would break the
// unquoted comma-delimited output.
pub fn sanitize(value: &str) -> String {
    value.replace(',', " ").replace('"', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefix_before_first_hyphen() {
        let key = parse_project_key("PROJA-12").unwrap();
        assert_eq!(key.as_str(), "PROJA");

        let key = parse_project_key("CASS-1-backport").unwrap();
        assert_eq!(key.as_str(), "CASS");
    }

    #[test]
    fn keeps_case_as_given() {
        assert_eq!(parse_project_key("proja-3").unwrap().as_str(), "proja");
    }

    #[test]
    fn rejects_ticket_without_hyphen() {
        let err = parse_project_key("NOHYPHEN").unwrap_err();
        assert_eq!(err.ticket, "NOHYPHEN");
    }

    #[test]
    fn rejects_empty_prefix() {
        assert!(parse_project_key("-42").is_err());
        assert!(parse_project_key("").is_err());
    }

    #[test]
    fn reference_tolerates_short_rows() {
        let reference = TicketReference::from_fields(&["link", "PROJA-1", "summary"]);
        assert_eq!(reference.bucket, "");
        assert_eq!(reference.ticket_id, "PROJA-1");
    }

    #[test]
    fn output_row_has_seven_fields_after_sanitizing() {
        let reference = TicketReference::from_fields(&["link", "PROJA-1", "summary", "bucket"]);
        let snapshot = IssueSnapshot {
            issue_key: "PROJA-1".to_string(),
            is_open: true,
            assignee: "Doe, Jane".to_string(),
            status: "\"Open\"".to_string(),
            reviewers: vec![],
            ..IssueSnapshot::default()
        };
        let line = TriageOutputRow::enrich(reference, &snapshot).to_line();
        assert_eq!(line, "link,PROJA-1,summary,bucket,Doe  Jane,,Open");
        assert_eq!(line.split(',').count(), 7);
    }
}
