use std::collections::{BTreeSet, HashSet};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::connection::Connection;
use crate::domain::ticket::ProjectKey;
use crate::error::{AppError, AppResult};

const CONFIG_FILE_NAME: &str = "config.json";
const CACHE_DIR_NAME: &str = "cache";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_WRITE_FAILURE_THRESHOLD: usize = 3;

pub fn config_directory() -> AppResult<PathBuf> {
    if let Some(dir) = env::var_os("TRIAGE_CONFIG_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(dir).join("triage"));
    }
    env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".config").join("triage"))
        .ok_or_else(|| {
            AppError::Configuration(
                "cannot locate a config directory; set TRIAGE_CONFIG_DIR".to_string(),
            )
        })
}

pub fn config_file_path() -> AppResult<PathBuf> {
    Ok(config_directory()?.join(CONFIG_FILE_NAME))
}

/// On-disk configuration, as edited by `config init`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredConfig {
    #[serde(default)]
    pub connections: Vec<StoredConnection>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub write_failure_threshold: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredConnection {
    pub name: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    /// Custom field holding the reviewer, e.g. `customfield_12313420`.
    #[serde(default)]
    pub reviewer_field: Option<String>,
    #[serde(default)]
    pub projects: Vec<String>,
}

impl StoredConfig {
    pub fn load() -> AppResult<Self> {
        let path = config_file_path()?;
        match fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(AppError::Io(err)),
        }
    }

    pub fn parse(contents: &str) -> AppResult<Self> {
        serde_json::from_str(contents)
            .map_err(|err| AppError::Configuration(format!("invalid config file: {err}")))
    }

    pub fn save(&self) -> AppResult<()> {
        let path = config_file_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|err| AppError::Serialization(format!("failed to write config: {err}")))?;
        fs::write(&path, data)?;
        Ok(())
    }

    pub fn connection_mut(&mut self, name: &str) -> &mut StoredConnection {
        let index = match self.connections.iter().position(|conn| conn.name == name) {
            Some(index) => index,
            None => {
                self.connections.push(StoredConnection {
                    name: name.to_string(),
                    ..StoredConnection::default()
                });
                self.connections.len() - 1
            }
        };
        &mut self.connections[index]
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub name: String,
    pub base_url: Option<String>,
    pub email: Option<String>,
    pub token: Option<String>,
    pub reviewer_field: Option<String>,
    pub projects: BTreeSet<ProjectKey>,
}

impl ConnectionConfig {
    pub fn to_connection(&self) -> Connection {
        Connection {
            name: self.name.clone(),
            base_url: self.base_url.clone().unwrap_or_default(),
            owned_projects: self.projects.clone(),
        }
    }
}

/// Validated configuration with defaults applied.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub connections: Vec<ConnectionConfig>,
    pub cache_dir: PathBuf,
    pub request_timeout: Duration,
    pub write_failure_threshold: usize,
}

impl AppConfig {
    pub fn load() -> AppResult<Self> {
        let stored = StoredConfig::load()?;
        let default_cache_dir = config_directory()?.join(CACHE_DIR_NAME);
        Self::resolve(stored, default_cache_dir)
    }

    pub fn resolve(stored: StoredConfig, default_cache_dir: PathBuf) -> AppResult<Self> {
        let mut seen = HashSet::new();
        let mut connections = Vec::with_capacity(stored.connections.len());

        for conn in stored.connections {
            let name = conn.name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::Configuration(
                    "connection name must not be empty".to_string(),
                ));
            }
            if !seen.insert(name.clone()) {
                return Err(AppError::Configuration(format!(
                    "duplicate connection name '{name}'"
                )));
            }

            let projects = conn
                .projects
                .iter()
                .map(|raw| {
                    ProjectKey::new(raw.as_str()).ok_or_else(|| {
                        AppError::Configuration(format!(
                            "connection '{name}' lists invalid project key '{raw}'"
                        ))
                    })
                })
                .collect::<AppResult<BTreeSet<_>>>()?;

            connections.push(ConnectionConfig {
                name,
                base_url: non_empty(conn.base_url),
                email: non_empty(conn.email),
                token: non_empty(conn.token),
                reviewer_field: non_empty(conn.reviewer_field),
                projects,
            });
        }

        let write_failure_threshold = stored
            .write_failure_threshold
            .unwrap_or(DEFAULT_WRITE_FAILURE_THRESHOLD);
        if write_failure_threshold == 0 {
            return Err(AppError::Configuration(
                "write_failure_threshold must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            connections,
            cache_dir: stored.cache_dir.unwrap_or(default_cache_dir),
            request_timeout: Duration::from_secs(
                stored.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            write_failure_threshold,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_defaults() {
        let stored = StoredConfig::parse(
            r#"{"connections":[{"name":"apache","base_url":"https://issues.apache.org/jira","projects":["CASSANDRA"]}]}"#,
        )
        .unwrap();
        let config = AppConfig::resolve(stored, PathBuf::from("/tmp/cache")).unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/cache"));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.write_failure_threshold, 3);
        let conn = &config.connections[0];
        assert!(conn.projects.contains(&ProjectKey::new("CASSANDRA").unwrap()));
        assert_eq!(conn.token, None);
    }

    #[test]
    fn rejects_duplicate_connection_names() {
        let mut stored = StoredConfig::default();
        stored.connection_mut("a");
        stored.connections.push(StoredConnection {
            name: "a".to_string(),
            ..StoredConnection::default()
        });
        let err = AppConfig::resolve(stored, PathBuf::from("cache")).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn rejects_hyphenated_project_key() {
        let mut stored = StoredConfig::default();
        stored.connection_mut("a").projects = vec!["PROJ-1".to_string()];
        assert!(AppConfig::resolve(stored, PathBuf::from("cache")).is_err());
    }

    #[test]
    fn connection_mut_updates_existing_entry() {
        let mut stored = StoredConfig::default();
        stored.connection_mut("a").email = Some("one@example.com".to_string());
        stored.connection_mut("a").token = Some("secret".to_string());
        assert_eq!(stored.connections.len(), 1);
        assert_eq!(stored.connections[0].email.as_deref(), Some("one@example.com"));
    }
}
