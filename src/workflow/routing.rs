use crate::domain::connection::{Connection, ConnectionRegistry};
use crate::domain::diagnostic::DiagnosticKind;
use crate::domain::ticket::{IssueSnapshot, ProjectKey, parse_project_key};
use crate::services::ProjectCaches;

/// Where a ticket identifier resolves to.
#[derive(Debug)]
pub enum Route<'a> {
    Resolved {
        project: ProjectKey,
        connection: &'a Connection,
        snapshot: &'a IssueSnapshot,
    },
    /// The row cannot be resolved; skip it and keep going.
    Unresolved(DiagnosticKind),
    /// The project's cache has no owning connection.
    Orphaned(DiagnosticKind),
}

/// Resolves `ticket_id` to its cache entry and owning connection. `line` is
/// only used to describe a malformed identifier.
pub fn route<'a>(
    ticket_id: &str,
    line: &str,
    caches: &'a ProjectCaches,
    registry: &'a ConnectionRegistry,
) -> Route<'a> {
    let Ok(project) = parse_project_key(ticket_id) else {
        return Route::Unresolved(DiagnosticKind::MalformedTicket {
            line: line.to_string(),
        });
    };

    let Some(cache) = caches.get(&project) else {
        return Route::Unresolved(DiagnosticKind::UnknownProject {
            ticket_id: ticket_id.to_string(),
        });
    };

    let Some(snapshot) = cache.issue(ticket_id) else {
        return Route::Unresolved(DiagnosticKind::UnknownIssue {
            project,
            ticket_id: ticket_id.to_string(),
        });
    };

    match registry.owner_of(&project) {
        Some(connection) => Route::Resolved {
            project,
            connection,
            snapshot,
        },
        None => Route::Orphaned(DiagnosticKind::OrphanedProject {
            project,
            ticket_id: ticket_id.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;

    use super::*;
    use crate::error::RefreshError;
    use crate::services::ProjectCache;

    struct OneIssue {
        key: ProjectKey,
        issue: IssueSnapshot,
    }

    #[async_trait]
    impl ProjectCache for OneIssue {
        fn project_key(&self) -> &ProjectKey {
            &self.key
        }

        async fn refresh(&mut self) -> Result<(), RefreshError> {
            Ok(())
        }

        fn issue(&self, ticket_id: &str) -> Option<&IssueSnapshot> {
            (self.issue.issue_key == ticket_id).then_some(&self.issue)
        }

        fn len(&self) -> usize {
            1
        }
    }

    fn key(value: &str) -> ProjectKey {
        ProjectKey::new(value).unwrap()
    }

    fn setup(owned: &str) -> (ProjectCaches, ConnectionRegistry) {
        let mut caches: ProjectCaches = BTreeMap::new();
        caches.insert(
            key("PROJA"),
            Box::new(OneIssue {
                key: key("PROJA"),
                issue: IssueSnapshot {
                    issue_key: "PROJA-1".to_string(),
                    is_open: true,
                    ..IssueSnapshot::default()
                },
            }),
        );
        let registry = ConnectionRegistry::build(vec![Connection {
            name: "primary".to_string(),
            base_url: "https://jira.example.com".to_string(),
            owned_projects: [key(owned)].into_iter().collect(),
        }])
        .unwrap();
        (caches, registry)
    }

    #[test]
    fn resolves_cached_and_owned_ticket() {
        let (caches, registry) = setup("PROJA");
        match route("PROJA-1", "x,PROJA-1", &caches, &registry) {
            Route::Resolved {
                project,
                connection,
                snapshot,
            } => {
                assert_eq!(project.as_str(), "PROJA");
                assert_eq!(connection.name, "primary");
                assert_eq!(snapshot.issue_key, "PROJA-1");
            }
            other => panic!("expected resolved route, got {other:?}"),
        }
    }

    #[test]
    fn unresolved_kinds_follow_lookup_order() {
        let (caches, registry) = setup("PROJQ");
        assert!(matches!(
            route("NOHYPHEN", "x,NOHYPHEN", &caches, &registry),
            Route::Unresolved(DiagnosticKind::MalformedTicket { line }) if line == "x,NOHYPHEN"
        ));
        assert!(matches!(
            route("PROJZ-1", "x,PROJZ-1", &caches, &registry),
            Route::Unresolved(DiagnosticKind::UnknownProject { .. })
        ));
        // A missing ticket is reported before the missing owner.
        assert!(matches!(
            route("PROJA-9", "x,PROJA-9", &caches, &registry),
            Route::Unresolved(DiagnosticKind::UnknownIssue { .. })
        ));
        assert!(matches!(
            route("PROJA-1", "x,PROJA-1", &caches, &registry),
            Route::Orphaned(DiagnosticKind::OrphanedProject { .. })
        ));
    }
}
