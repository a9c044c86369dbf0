pub mod jira;
pub mod tabular;
