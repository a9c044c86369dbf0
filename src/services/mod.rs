pub mod issue_source;
pub mod project_cache;

pub use issue_source::IssueSource;
pub use project_cache::{ProjectCache, ProjectCaches};
