use std::io;

use thiserror::Error;

use crate::domain::ticket::ProjectKey;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("issue tracker error: {0}")]
    IssueTracker(String),
    #[error(
        "project {project} has a cache but no owning connection (ticket {ticket}); fix the connection configuration"
    )]
    OrphanedProject { project: ProjectKey, ticket: String },
    #[error("aborting after {consecutive} consecutive output write failures")]
    OutputFailures { consecutive: usize },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type AppResult<T> = Result<T, AppError>;

/// A single project cache could not be refreshed. The cache keeps serving its
/// previous snapshot.
#[derive(Debug, Clone, Error)]
#[error("failed to refresh project {project}: {reason}")]
pub struct RefreshError {
    pub project: ProjectKey,
    pub reason: String,
}

impl RefreshError {
    pub fn new(project: ProjectKey, reason: impl Into<String>) -> Self {
        Self {
            project,
            reason: reason.into(),
        }
    }
}
