use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::cache::OfflineProjectCache;
use crate::config::{AppConfig, ConnectionConfig};
use crate::domain::connection::ConnectionRegistry;
use crate::domain::ticket::ProjectKey;
use crate::error::AppResult;
use crate::infra::jira::JiraClient;
use crate::services::{IssueSource, ProjectCache, ProjectCaches};

pub struct AppContext {
    pub config: AppConfig,
    pub registry: ConnectionRegistry,
    pub caches: ProjectCaches,
}

impl AppContext {
    pub fn new(config: AppConfig, registry: ConnectionRegistry, caches: ProjectCaches) -> Self {
        Self {
            config,
            registry,
            caches,
        }
    }

    /// Wires one Jira client per connection and loads a cache for every
    /// configured project plus every cache file already on disk.
    pub fn load(config: AppConfig) -> AppResult<Self> {
        let registry = ConnectionRegistry::build(
            config
                .connections
                .iter()
                .map(ConnectionConfig::to_connection)
                .collect(),
        )?;

        let mut sources: HashMap<String, Arc<dyn IssueSource>> = HashMap::new();
        for connection in &config.connections {
            let client = JiraClient::new(connection, config.request_timeout)?;
            sources.insert(connection.name.clone(), Arc::new(client));
        }

        let mut projects: BTreeSet<ProjectKey> = registry.project_keys().cloned().collect();
        projects.extend(OfflineProjectCache::discover(&config.cache_dir)?);

        let mut caches = ProjectCaches::new();
        for project in projects {
            let source = registry
                .owner_of(&project)
                .and_then(|owner| sources.get(&owner.name))
                .cloned();
            if source.is_none() {
                tracing::warn!(%project, "cached project has no owning connection");
            }
            let cache = OfflineProjectCache::load(&config.cache_dir, project.clone(), source)?;
            caches.insert(project, Box::new(cache) as Box<dyn ProjectCache>);
        }

        Ok(Self::new(config, registry, caches))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::*;
    use crate::config::{StoredConfig, StoredConnection};

    #[test]
    fn loads_configured_and_discovered_caches() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("PROJQ.json"),
            r#"{"issues":[{"issue_key":"PROJQ-1","is_open":true}]}"#,
        )
        .unwrap();

        let stored = StoredConfig {
            connections: vec![StoredConnection {
                name: "internal".to_string(),
                base_url: Some("https://jira.example.com".to_string()),
                projects: vec!["PROJA".to_string()],
                ..StoredConnection::default()
            }],
            ..StoredConfig::default()
        };
        let config = AppConfig::resolve(stored, PathBuf::from(dir.path())).unwrap();
        let context = AppContext::load(config).unwrap();

        let keys: Vec<_> = context.caches.keys().map(ProjectKey::as_str).collect();
        assert_eq!(keys, vec!["PROJA", "PROJQ"]);

        let orphan = ProjectKey::new("PROJQ").unwrap();
        assert!(context.registry.owner_of(&orphan).is_none());
        assert_eq!(context.caches[&orphan].len(), 1);
        assert!(context.caches[&orphan].issue("PROJQ-1").is_some());
    }
}
