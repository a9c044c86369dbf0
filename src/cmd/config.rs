use std::io::{self, Write};

use clap::{Args, Subcommand};

use crate::config::{StoredConfig, config_file_path};
use crate::error::{AppError, AppResult};

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Add or update a connection interactively.
    Init,
    /// Show the stored configuration (secrets masked).
    Show,
}

pub fn run(command: ConfigCommand) -> AppResult<()> {
    match command {
        ConfigCommand::Init => run_init(),
        ConfigCommand::Show => run_show(),
    }
}

fn run_init() -> AppResult<()> {
    let mut cfg = StoredConfig::load()?;

    println!("Configuring a triage connection.");
    println!("Press Enter to keep the current value, '-' to clear it.");
    println!("Secrets are stored in the local config file; protect your filesystem accordingly.");
    println!();

    let mut name = None;
    apply_prompt("Connection name", &mut name, false)?;
    let name = name.ok_or_else(|| {
        AppError::Configuration("a connection name is required".to_string())
    })?;

    let conn = cfg.connection_mut(&name);
    apply_prompt(
        "Jira base URL (e.g., https://issues.apache.org/jira)",
        &mut conn.base_url,
        false,
    )?;
    apply_prompt("Jira email", &mut conn.email, false)?;
    apply_prompt("Jira API token", &mut conn.token, true)?;
    apply_prompt(
        "Reviewer custom field (e.g., customfield_12313420)",
        &mut conn.reviewer_field,
        false,
    )?;

    let mut projects = (!conn.projects.is_empty()).then(|| conn.projects.join(","));
    apply_prompt("Project keys (comma-separated)", &mut projects, false)?;
    conn.projects = projects
        .map(|list| split_projects(&list))
        .unwrap_or_default();

    cfg.save()?;

    let path = config_file_path()?;
    println!("\nConfiguration saved to {}", path.display());
    Ok(())
}

fn run_show() -> AppResult<()> {
    let cfg = StoredConfig::load()?;
    let path = config_file_path()?;

    println!("Configuration file: {}", path.display());
    if cfg.connections.is_empty() {
        println!("No connections configured.");
    }
    for conn in &cfg.connections {
        println!();
        println!("Connection: {}", conn.name);
        println!("  Jira base URL: {}", display_value(&conn.base_url));
        println!("  Jira email: {}", display_value(&conn.email));
        println!("  Jira API token: {}", mask_secret(&conn.token));
        println!("  Reviewer field: {}", display_value(&conn.reviewer_field));
        println!("  Projects: {}", conn.projects.join(", "));
    }

    Ok(())
}

fn split_projects(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

fn apply_prompt(field: &str, target: &mut Option<String>, secret: bool) -> AppResult<()> {
    match prompt(field, target.as_deref(), secret)? {
        PromptAction::Keep => {}
        PromptAction::Clear => *target = None,
        PromptAction::Set(value) => *target = Some(value),
    }
    Ok(())
}

fn prompt(field: &str, current: Option<&str>, secret: bool) -> AppResult<PromptAction> {
    let mut stdout = io::stdout();

    match (current, secret) {
        (Some(_), true) => write!(stdout, "{field} [****] (Enter to keep, '-' to clear): ")?,
        (Some(value), false) => {
            write!(stdout, "{field} [{value}] (Enter to keep, '-' to clear): ")?
        }
        (None, _) => write!(stdout, "{field} (Enter to skip): ")?,
    }
    stdout.flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let trimmed = input.trim();

    if trimmed.is_empty() {
        Ok(PromptAction::Keep)
    } else if trimmed == "-" {
        Ok(PromptAction::Clear)
    } else {
        Ok(PromptAction::Set(trimmed.to_string()))
    }
}

fn display_value(value: &Option<String>) -> String {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "<not set>".to_string())
}

fn mask_secret(value: &Option<String>) -> String {
    match value {
        Some(token) if token.chars().count() > 6 => {
            let chars = token.chars().collect::<Vec<_>>();
            let prefix = chars[..3].iter().collect::<String>();
            let suffix = chars[chars.len() - 3..].iter().collect::<String>();
            format!("{prefix}***{suffix}")
        }
        Some(token) if !token.is_empty() => "***".to_string(),
        _ => "<not set>".to_string(),
    }
}

enum PromptAction {
    Keep,
    Clear,
    Set(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_project_list() {
        assert_eq!(
            split_projects(" PROJA, PROJB ,,"),
            vec!["PROJA".to_string(), "PROJB".to_string()]
        );
    }

    #[test]
    fn masks_secrets() {
        assert_eq!(mask_secret(&Some("abcdefghij".to_string())), "abc***hij");
        assert_eq!(mask_secret(&Some("abc".to_string())), "***");
        assert_eq!(mask_secret(&None), "<not set>");
    }

    #[test]
    fn masks_non_ascii_secrets_by_character() {
        assert_eq!(
            mask_secret(&Some("ключ-секрет-токен".to_string())),
            "клю***кен"
        );
        assert_eq!(mask_secret(&Some("пароль".to_string())), "***");
    }
}
