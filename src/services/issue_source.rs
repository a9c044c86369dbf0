use async_trait::async_trait;

use crate::domain::ticket::{IssueSnapshot, ProjectKey};
use crate::error::AppResult;

/// Pulls a full snapshot of a project from a live tracker.
#[async_trait]
pub trait IssueSource: Send + Sync {
    async fn fetch_project(&self, project: &ProjectKey) -> AppResult<Vec<IssueSnapshot>>;
}
