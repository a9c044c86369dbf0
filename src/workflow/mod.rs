pub mod routing;
pub mod triage;
pub mod update;
