use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ticket::{IssueSnapshot, ProjectKey};
use crate::error::{AppError, AppResult, RefreshError};
use crate::services::{IssueSource, ProjectCache};

const CACHE_FILE_EXTENSION: &str = "json";

#[derive(Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    project: Option<ProjectKey>,
    #[serde(default)]
    issues: Vec<IssueSnapshot>,
}

/// Project snapshot persisted as `<cache_dir>/<KEY>.json`.
pub struct OfflineProjectCache {
    project: ProjectKey,
    file_path: PathBuf,
    issues: BTreeMap<String, IssueSnapshot>,
    source: Option<Arc<dyn IssueSource>>,
}

impl OfflineProjectCache {
    pub fn load(
        cache_dir: &Path,
        project: ProjectKey,
        source: Option<Arc<dyn IssueSource>>,
    ) -> AppResult<Self> {
        let path = Self::path_for(cache_dir, &project);
        let file = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str::<CacheFile>(&contents).map_err(|err| {
                AppError::Configuration(format!("invalid cache file {}: {err}", path.display()))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => CacheFile::default(),
            Err(err) => return Err(AppError::Io(err)),
        };

        Ok(Self {
            project,
            file_path: path,
            issues: index(file.issues),
            source,
        })
    }

    pub fn path_for(cache_dir: &Path, project: &ProjectKey) -> PathBuf {
        cache_dir.join(format!("{}.{CACHE_FILE_EXTENSION}", project.as_str()))
    }

    /// Project keys of every cache file present in `cache_dir`.
    pub fn discover(cache_dir: &Path) -> AppResult<Vec<ProjectKey>> {
        let entries = match fs::read_dir(cache_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(AppError::Io(err)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CACHE_FILE_EXTENSION) {
                continue;
            }
            match path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(ProjectKey::new)
            {
                Some(key) => keys.push(key),
                None => tracing::warn!(path = %path.display(), "ignoring unrecognised cache file"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    pub fn save(&self) -> AppResult<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = CacheFile {
            project: Some(self.project.clone()),
            issues: self.issues.values().cloned().collect(),
        };
        let data = serde_json::to_string_pretty(&file)
            .map_err(|err| AppError::Serialization(format!("failed to write cache: {err}")))?;
        fs::write(&self.file_path, data)?;
        Ok(())
    }
}

#[async_trait]
impl ProjectCache for OfflineProjectCache {
    fn project_key(&self) -> &ProjectKey {
        &self.project
    }

    async fn refresh(&mut self) -> Result<(), RefreshError> {
        let source = self.source.as_ref().ok_or_else(|| {
            RefreshError::new(self.project.clone(), "no connection owns this project")
        })?;

        let issues = source
            .fetch_project(&self.project)
            .await
            .map_err(|err| RefreshError::new(self.project.clone(), err.to_string()))?;

        self.issues = index(issues);
        tracing::debug!(project = %self.project, issues = self.issues.len(), "refreshed project cache");

        // The in-memory snapshot is already current; a failed write only
        // costs the next process a stale start.
        if let Err(err) = self.save() {
            tracing::warn!(project = %self.project, error = %err, "failed to persist project cache");
        }
        Ok(())
    }

    fn issue(&self, ticket_id: &str) -> Option<&IssueSnapshot> {
        self.issues.get(ticket_id)
    }

    fn len(&self) -> usize {
        self.issues.len()
    }
}

fn index(issues: Vec<IssueSnapshot>) -> BTreeMap<String, IssueSnapshot> {
    issues
        .into_iter()
        .map(|issue| (issue.issue_key.clone(), issue))
        .collect()
}
