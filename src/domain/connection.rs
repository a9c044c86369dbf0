use std::collections::{BTreeSet, HashMap};

use crate::domain::ticket::ProjectKey;
use crate::error::{AppError, AppResult};

/// A tracker endpoint and the projects it serves.
#[derive(Debug, Clone)]
pub struct Connection {
    pub name: String,
    pub base_url: String,
    pub owned_projects: BTreeSet<ProjectKey>,
}

impl Connection {
    pub fn owns_project(&self, key: &ProjectKey) -> bool {
        self.owned_projects.contains(key)
    }
}

/// Connections indexed by the projects they own.
///
/// Each project key maps to exactly one connection; this is checked when the
/// registry is built.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Vec<Connection>,
    owners: HashMap<ProjectKey, usize>,
}

impl ConnectionRegistry {
    pub fn build(connections: Vec<Connection>) -> AppResult<Self> {
        let mut owners = HashMap::new();
        for (index, connection) in connections.iter().enumerate() {
            for key in &connection.owned_projects {
                if let Some(previous) = owners.insert(key.clone(), index) {
                    return Err(AppError::Configuration(format!(
                        "project {key} is claimed by both '{}' and '{}'",
                        connections[previous].name, connection.name
                    )));
                }
            }
        }
        Ok(Self {
            connections,
            owners,
        })
    }

    pub fn owner_of(&self, key: &ProjectKey) -> Option<&Connection> {
        self.owners
            .get(key)
            .map(|&index| &self.connections[index])
            .filter(|conn| conn.owns_project(key))
    }

    pub fn project_keys(&self) -> impl Iterator<Item = &ProjectKey> {
        self.connections
            .iter()
            .flat_map(|conn| conn.owned_projects.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(name: &str, projects: &[&str]) -> Connection {
        Connection {
            name: name.to_string(),
            base_url: format!("https://{name}.example.com"),
            owned_projects: projects
                .iter()
                .filter_map(|key| ProjectKey::new(*key))
                .collect(),
        }
    }

    #[test]
    fn routes_project_to_owner() {
        let registry = ConnectionRegistry::build(vec![
            connection("apache", &["CASSANDRA"]),
            connection("internal", &["PROJA", "PROJB"]),
        ])
        .unwrap();

        let key = ProjectKey::new("PROJB").unwrap();
        let owner = registry.owner_of(&key).unwrap();
        assert_eq!(owner.name, "internal");
        assert!(owner.owns_project(&key));
        assert!(registry.owner_of(&ProjectKey::new("PROJZ").unwrap()).is_none());
    }

    #[test]
    fn rejects_project_claimed_twice() {
        let err = ConnectionRegistry::build(vec![
            connection("one", &["PROJA"]),
            connection("two", &["PROJA"]),
        ])
        .unwrap_err();
        assert!(matches!(err, AppError::Configuration(message) if message.contains("PROJA")));
    }
}
