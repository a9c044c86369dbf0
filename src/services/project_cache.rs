use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::ticket::{IssueSnapshot, ProjectKey};
use crate::error::RefreshError;

/// Offline snapshot of one project's issues.
#[async_trait]
pub trait ProjectCache: Send + Sync {
    fn project_key(&self) -> &ProjectKey;

    /// Replaces the whole snapshot with the latest one from the tracker. On
    /// failure the previous snapshot stays in place.
    async fn refresh(&mut self) -> Result<(), RefreshError>;

    fn issue(&self, ticket_id: &str) -> Option<&IssueSnapshot>;

    fn len(&self) -> usize;
}

pub type ProjectCaches = BTreeMap<ProjectKey, Box<dyn ProjectCache>>;
