use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::{BASE64_STANDARD, Engine as _};
use reqwest::{
    Client,
    header::{ACCEPT, AUTHORIZATION},
};
use serde::Deserialize;
use serde_json::Value;

use crate::config::ConnectionConfig;
use crate::domain::ticket::{IssueSnapshot, ProjectKey};
use crate::error::{AppError, AppResult};
use crate::services::IssueSource;

const PAGE_SIZE: usize = 1000;

pub struct JiraClient {
    http: Client,
    connection: String,
    base_url: Option<String>,
    email: Option<String>,
    token: Option<String>,
    reviewer_field: Option<String>,
}

impl JiraClient {
    pub fn new(config: &ConnectionConfig, timeout: Duration) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::IssueTracker(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            connection: config.name.clone(),
            base_url: config.base_url.clone(),
            email: config.email.clone(),
            token: config.token.clone(),
            reviewer_field: config.reviewer_field.clone(),
        })
    }

    fn api_details(&self) -> AppResult<(&str, &str, &str)> {
        let missing = |what: &str| {
            AppError::Configuration(format!(
                "{what} not configured for connection '{}'",
                self.connection
            ))
        };
        let base_url = self
            .base_url
            .as_deref()
            .ok_or_else(|| missing("Jira base URL"))?;
        let email = self.email.as_deref().ok_or_else(|| missing("Jira email"))?;
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| missing("Jira API token"))?;
        Ok((base_url, email, token))
    }

    fn auth_header(email: &str, token: &str) -> String {
        let credentials = format!("{email}:{token}");
        let encoded = BASE64_STANDARD.encode(credentials);
        format!("Basic {encoded}")
    }

    fn search_endpoint(base_url: &str) -> String {
        format!("{}/rest/api/2/search", base_url.trim_end_matches('/'))
    }

    fn requested_fields(&self) -> String {
        let mut fields = vec![
            "status",
            "assignee",
            "resolution",
            "priority",
            "issuetype",
            "components",
        ];
        if let Some(field) = self.reviewer_field.as_deref() {
            fields.push(field);
        }
        fields.join(",")
    }

    async fn search_page(
        &self,
        project: &ProjectKey,
        start_at: usize,
    ) -> AppResult<JiraSearchResponse> {
        let (base_url, email, token) = self.api_details()?;
        let jql = format!("project = {}", project.as_str());

        let response = self
            .http
            .get(Self::search_endpoint(base_url))
            .header(AUTHORIZATION, Self::auth_header(email, token))
            .header(ACCEPT, "application/json")
            .query(&[
                ("jql", jql.as_str()),
                ("fields", self.requested_fields().as_str()),
                ("startAt", start_at.to_string().as_str()),
                ("maxResults", PAGE_SIZE.to_string().as_str()),
            ])
            .send()
            .await
            .map_err(|err| AppError::IssueTracker(format!("failed to call Jira: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read response>".to_string());
            return Err(AppError::IssueTracker(format!(
                "Jira responded with {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|err| AppError::IssueTracker(format!("failed to parse Jira response: {err}")))
    }
}

#[async_trait]
impl IssueSource for JiraClient {
    async fn fetch_project(&self, project: &ProjectKey) -> AppResult<Vec<IssueSnapshot>> {
        tracing::info!(connection = %self.connection, %project, "querying project snapshot");

        let mut snapshots = Vec::new();
        loop {
            let page = self.search_page(project, snapshots.len()).await?;
            if page.issues.is_empty() {
                break;
            }
            snapshots.extend(
                page.issues
                    .into_iter()
                    .map(|issue| issue.into_snapshot(self.reviewer_field.as_deref())),
            );
            if snapshots.len() >= page.total {
                break;
            }
        }
        Ok(snapshots)
    }
}

#[derive(Deserialize)]
struct JiraSearchResponse {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    issues: Vec<JiraIssue>,
}

#[derive(Deserialize)]
struct JiraIssue {
    key: String,
    #[serde(default)]
    fields: serde_json::Map<String, Value>,
}

impl JiraIssue {
    fn into_snapshot(self, reviewer_field: Option<&str>) -> IssueSnapshot {
        let status = self
            .fields
            .get("status")
            .and_then(|status| status.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let assignee = self
            .fields
            .get("assignee")
            .map(user_names)
            .and_then(|names| names.into_iter().next())
            .unwrap_or_default();
        let is_open = self.fields.get("resolution").is_none_or(Value::is_null);
        let resolution = self.named("resolution");
        let priority = self.named("priority");
        let issue_type = self.named("issuetype");
        let components = match self.fields.get("components") {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|component| component.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        let reviewers = reviewer_field
            .and_then(|field| self.fields.get(field))
            .map(user_names)
            .unwrap_or_default();

        IssueSnapshot {
            issue_key: self.key,
            is_open,
            assignee,
            status,
            reviewers,
            resolution,
            priority,
            issue_type,
            components,
        }
    }

    /// `name` of an object-valued field such as `priority`, or empty.
    fn named(&self, field: &str) -> String {
        self.fields
            .get(field)
            .and_then(|value| value.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

/// User fields come back as a user object, a list of them, or plain text
/// depending on the field type.
fn user_names(value: &Value) -> Vec<String> {
    match value {
        Value::Array(values) => values.iter().flat_map(user_names).collect(),
        Value::Object(user) => user
            .get("displayName")
            .or_else(|| user.get("name"))
            .and_then(Value::as_str)
            .map(|name| vec![name.to_string()])
            .unwrap_or_default(),
        Value::String(name) if !name.is_empty() => vec![name.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn issue(fields: Value) -> JiraIssue {
        serde_json::from_value(json!({ "key": "PROJA-1", "fields": fields })).unwrap()
    }

    #[test]
    fn open_issue_maps_status_assignee_and_reviewers() {
        let snapshot = issue(json!({
            "status": { "name": "In Progress" },
            "assignee": { "displayName": "alice" },
            "resolution": null,
            "customfield_1": [{ "displayName": "bob" }, { "displayName": "carol" }]
        }))
        .into_snapshot(Some("customfield_1"));

        assert!(snapshot.is_open);
        assert_eq!(snapshot.status, "In Progress");
        assert_eq!(snapshot.assignee, "alice");
        assert_eq!(snapshot.reviewers, vec!["bob", "carol"]);
    }

    #[test]
    fn resolved_issue_is_closed() {
        let snapshot = issue(json!({
            "status": { "name": "Resolved" },
            "assignee": null,
            "resolution": { "name": "Fixed" }
        }))
        .into_snapshot(None);

        assert!(!snapshot.is_open);
        assert_eq!(snapshot.resolution, "Fixed");
        assert_eq!(snapshot.assignee, "");
        assert!(snapshot.reviewers.is_empty());
    }

    #[test]
    fn maps_priority_type_and_components() {
        let snapshot = issue(json!({
            "priority": { "name": "Major" },
            "issuetype": { "name": "Bug" },
            "components": [{ "name": "Compaction" }, { "name": "Streaming" }]
        }))
        .into_snapshot(None);

        assert_eq!(snapshot.priority, "Major");
        assert_eq!(snapshot.issue_type, "Bug");
        assert_eq!(snapshot.components, vec!["Compaction", "Streaming"]);
    }

    #[test]
    fn reviewer_field_may_be_single_user() {
        let snapshot = issue(json!({ "reviewer": { "name": "dave" } })).into_snapshot(Some("reviewer"));
        assert_eq!(snapshot.reviewers, vec!["dave"]);
    }

    #[test]
    fn builds_search_endpoint() {
        assert_eq!(
            JiraClient::search_endpoint("https://issues.example.com/jira/"),
            "https://issues.example.com/jira/rest/api/2/search"
        );
    }
}
