//! Repository manager
//!
//! The only component that mutates hosting state. An app is considered
//! deployed once its repository holds a manifest, which every deployment
//! commit rewrites with the next revision number.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::RepositoryError;
use crate::models::artifact::{GeneratedArtifact, MANIFEST_PATH};
use crate::models::deployment::AppId;
use crate::repo::backend::{FileChange, HostingBackend, PagesCreation, RepoHandle};
use crate::repo::manifest::Manifest;

/// What happens to files of the previous deployment that the new artifact lacks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitPolicy {
    /// Never delete; absent files stay as they were
    #[default]
    Additive,
    /// The artifact replaces the previous deployment's file set
    Authoritative,
}

/// Repository manager options
#[derive(Debug, Clone, Default)]
pub struct RepositoryOptions {
    /// Prepended to the app id to form the repository name
    pub repo_prefix: String,
    pub commit_policy: CommitPolicy,
}

/// Persisted state of a deployed app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRecord {
    pub app_id: AppId,
    pub repo: RepoHandle,
    pub published_url: Option<String>,
    pub revision: u32,
    pub files: Vec<String>,
}

/// A commit made for a deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRef {
    pub sha: String,
    pub revision: u32,
}

pub struct RepositoryManager {
    backend: Arc<dyn HostingBackend>,
    options: RepositoryOptions,
}

impl RepositoryManager {
    pub fn new(backend: Arc<dyn HostingBackend>, options: RepositoryOptions) -> Self {
        Self { backend, options }
    }

    /// Deterministic repository name for an app.
    ///
    /// Hosting names are case-insensitive, so ids differing only in case share one.
    pub fn repo_name(&self, app_id: &AppId) -> String {
        format!("{}{}", self.options.repo_prefix, app_id.key())
    }

    /// Look up the record of a deployed app
    pub async fn find_app(&self, app_id: &AppId) -> Result<Option<AppRecord>, RepositoryError> {
        let name = self.repo_name(app_id);
        let Some(repo) = self.backend.get_repository(&name).await? else {
            debug!("No repository {} for app {}", name, app_id);
            return Ok(None);
        };

        let Some(manifest) = self.read_manifest(&repo).await? else {
            // Repository exists from an earlier attempt that never committed
            info!("Repository {} exists but holds no deployment yet", name);
            return Ok(None);
        };

        let published_url = self
            .backend
            .get_pages(&repo)
            .await
            .map_err(|e| RepositoryError::LookupFailed(e.to_string()))?;

        Ok(Some(AppRecord {
            app_id: app_id.clone(),
            repo,
            published_url,
            revision: manifest.revision,
            files: manifest.files,
        }))
    }

    /// Current contents of every file the app's last deployment wrote
    pub async fn fetch_files(
        &self,
        record: &AppRecord,
    ) -> Result<BTreeMap<String, String>, RepositoryError> {
        let mut files = BTreeMap::new();
        for path in &record.files {
            match self.backend.read_file(&record.repo, path).await? {
                Some(content) => {
                    files.insert(path.clone(), content);
                }
                None => warn!("{} listed in manifest of {} but missing", path, record.repo.name),
            }
        }
        Ok(files)
    }

    /// Return the app's repository, creating it when absent
    pub async fn ensure_repository(&self, app_id: &AppId) -> Result<RepoHandle, RepositoryError> {
        let name = self.repo_name(app_id);
        if let Some(existing) = self
            .backend
            .get_repository(&name)
            .await
            .map_err(|e| RepositoryError::RepoCreateFailed(e.to_string()))?
        {
            debug!("Reusing repository {}", existing.name);
            return Ok(existing);
        }

        info!("Creating repository {}", name);
        let description = format!("Generated static app for {}", app_id);
        self.backend.create_repository(&name, &description).await
    }

    /// Write the artifact and a new manifest as one commit
    pub async fn commit_files(
        &self,
        handle: &RepoHandle,
        artifact: &GeneratedArtifact,
    ) -> Result<CommitRef, RepositoryError> {
        let previous = self
            .read_manifest(handle)
            .await
            .map_err(|e| RepositoryError::CommitFailed(e.to_string()))?;
        let revision = match &previous {
            None => 1,
            Some(m) => m.revision.checked_add(1).ok_or_else(|| {
                RepositoryError::CommitFailed(format!(
                    "{}: manifest revision {} cannot be incremented",
                    handle.name, m.revision
                ))
            })?,
        };

        let mut changes: Vec<FileChange> = artifact
            .files()
            .iter()
            .map(|(path, content)| FileChange::Write {
                path: path.clone(),
                content: content.clone(),
            })
            .collect();

        let mut tracked: BTreeSet<String> = artifact.paths().map(str::to_string).collect();
        if let Some(previous) = &previous {
            let stale: Vec<&String> = previous
                .files
                .iter()
                .filter(|p| artifact.get(p).is_none())
                .collect();
            match self.options.commit_policy {
                // Untouched files stay live, so they stay in the manifest
                CommitPolicy::Additive => tracked.extend(stale.into_iter().cloned()),
                CommitPolicy::Authoritative => {
                    for path in stale {
                        let live = self
                            .backend
                            .read_file(handle, path)
                            .await
                            .map_err(|e| RepositoryError::CommitFailed(e.to_string()))?;
                        if live.is_none() {
                            debug!("{} already absent from {}", path, handle.name);
                            continue;
                        }
                        debug!("Removing {} absent from the new artifact", path);
                        changes.push(FileChange::Delete { path: path.clone() });
                    }
                }
            }
        }

        let digest = artifact.digest();
        let manifest = Manifest {
            app_id: handle.name.clone(),
            revision,
            files: tracked.into_iter().collect(),
            digest: digest.clone(),
            updated_at: Utc::now(),
        };
        changes.push(FileChange::Write {
            path: MANIFEST_PATH.to_string(),
            content: manifest.render().map_err(RepositoryError::CommitFailed)?,
        });

        let message = format!("Deploy revision {} ({})", revision, &digest[..12]);
        let sha = self.backend.commit(handle, &message, &changes).await?;
        info!(
            "Committed {} changes to {} as {} (revision {})",
            changes.len(),
            handle.name,
            sha,
            revision
        );

        Ok(CommitRef { sha, revision })
    }

    /// Enable static-page publishing; returns the existing URL when already on
    pub async fn enable_pages(&self, handle: &RepoHandle) -> Result<String, RepositoryError> {
        if let Some(url) = self.backend.get_pages(handle).await? {
            debug!("Pages already enabled for {} at {}", handle.name, url);
            return Ok(url);
        }

        match self.backend.create_pages(handle).await? {
            PagesCreation::Created(url) => {
                info!("Pages enabled for {} at {}", handle.name, url);
                Ok(url)
            }
            PagesCreation::AlreadyExists => {
                // Enabled between our lookup and create
                self.backend.get_pages(handle).await?.ok_or_else(|| {
                    RepositoryError::PublishFailed(format!(
                        "Pages reported as enabled for {} but has no URL",
                        handle.name
                    ))
                })
            }
        }
    }

    async fn read_manifest(&self, repo: &RepoHandle) -> Result<Option<Manifest>, RepositoryError> {
        match self.backend.read_file(repo, MANIFEST_PATH).await? {
            Some(raw) => Manifest::parse(&raw)
                .map(Some)
                .map_err(|e| RepositoryError::LookupFailed(format!("{}: {}", repo.name, e))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::memory::InMemoryHosting;

    fn artifact(entries: &[(&str, &str)]) -> GeneratedArtifact {
        let files = entries
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        GeneratedArtifact::from_files(files, "a todo list").unwrap()
    }

    fn manager(policy: CommitPolicy) -> (Arc<InMemoryHosting>, RepositoryManager) {
        let hosting = Arc::new(InMemoryHosting::new("user", "https://user.github.io"));
        let manager = RepositoryManager::new(
            hosting.clone(),
            RepositoryOptions {
                repo_prefix: String::new(),
                commit_policy: policy,
            },
        );
        (hosting, manager)
    }

    fn app() -> AppId {
        AppId::parse("todo-app").unwrap()
    }

    #[tokio::test]
    async fn test_ensure_repository_is_idempotent() {
        let (hosting, manager) = manager(CommitPolicy::Additive);

        let first = manager.ensure_repository(&app()).await.unwrap();
        let second = manager.ensure_repository(&app()).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.name, second.name);
        assert_eq!(hosting.counts().repo_creates, 1);
    }

    #[tokio::test]
    async fn test_enable_pages_is_idempotent() {
        let (hosting, manager) = manager(CommitPolicy::Additive);
        let handle = manager.ensure_repository(&app()).await.unwrap();

        let first = manager.enable_pages(&handle).await.unwrap();
        let second = manager.enable_pages(&handle).await.unwrap();

        assert_eq!(first, "https://user.github.io/todo-app/");
        assert_eq!(first, second);
        assert_eq!(hosting.counts().pages_creates, 1);
    }

    #[tokio::test]
    async fn test_record_appears_after_first_commit() {
        let (_, manager) = manager(CommitPolicy::Additive);
        assert!(manager.find_app(&app()).await.unwrap().is_none());

        let handle = manager.ensure_repository(&app()).await.unwrap();
        // Created but not committed: still no record
        assert!(manager.find_app(&app()).await.unwrap().is_none());

        let commit = manager
            .commit_files(&handle, &artifact(&[("index.html", "v1")]))
            .await
            .unwrap();
        assert_eq!(commit.revision, 1);

        let record = manager.find_app(&app()).await.unwrap().unwrap();
        assert_eq!(record.revision, 1);
        assert_eq!(record.files, vec!["LICENSE", "README.md", "index.html"]);

        let files = manager.fetch_files(&record).await.unwrap();
        assert_eq!(files["index.html"], "v1");
    }

    #[tokio::test]
    async fn test_revisions_increment() {
        let (_, manager) = manager(CommitPolicy::Additive);
        let handle = manager.ensure_repository(&app()).await.unwrap();

        manager.commit_files(&handle, &artifact(&[("index.html", "v1")])).await.unwrap();
        let second = manager
            .commit_files(&handle, &artifact(&[("index.html", "v2")]))
            .await
            .unwrap();
        assert_eq!(second.revision, 2);
    }

    #[tokio::test]
    async fn test_additive_policy_keeps_absent_files() {
        let (hosting, manager) = manager(CommitPolicy::Additive);
        let handle = manager.ensure_repository(&app()).await.unwrap();

        manager
            .commit_files(&handle, &artifact(&[("index.html", "v1"), ("app.js", "js")]))
            .await
            .unwrap();
        manager
            .commit_files(&handle, &artifact(&[("index.html", "v2")]))
            .await
            .unwrap();

        let files = hosting.files("todo-app").unwrap();
        assert_eq!(files["index.html"], "v2");
        assert_eq!(files["app.js"], "js");

        // Still live, so still tracked
        let record = manager.find_app(&app()).await.unwrap().unwrap();
        assert!(record.files.contains(&"app.js".to_string()));
    }

    #[tokio::test]
    async fn test_authoritative_policy_removes_absent_files() {
        let (hosting, manager) = manager(CommitPolicy::Authoritative);
        let handle = manager.ensure_repository(&app()).await.unwrap();

        manager
            .commit_files(&handle, &artifact(&[("index.html", "v1"), ("app.js", "js")]))
            .await
            .unwrap();
        manager
            .commit_files(&handle, &artifact(&[("index.html", "v2")]))
            .await
            .unwrap();

        let files = hosting.files("todo-app").unwrap();
        assert_eq!(files["index.html"], "v2");
        assert!(!files.contains_key("app.js"));
        assert!(files.contains_key(MANIFEST_PATH));

        let record = manager.find_app(&app()).await.unwrap().unwrap();
        assert!(!record.files.contains(&"app.js".to_string()));
    }

    #[tokio::test]
    async fn test_authoritative_policy_skips_files_already_gone() {
        let (hosting, manager) = manager(CommitPolicy::Authoritative);
        let handle = manager.ensure_repository(&app()).await.unwrap();

        manager
            .commit_files(&handle, &artifact(&[("index.html", "v1"), ("app.js", "js")]))
            .await
            .unwrap();
        // Removed outside of any deployment
        hosting
            .commit(
                &handle,
                "manual cleanup",
                &[FileChange::Delete {
                    path: "app.js".to_string(),
                }],
            )
            .await
            .unwrap();

        let commit = manager
            .commit_files(&handle, &artifact(&[("index.html", "v2")]))
            .await
            .unwrap();
        assert_eq!(commit.revision, 2);
        assert_eq!(hosting.files("todo-app").unwrap()["index.html"], "v2");
    }

    #[tokio::test]
    async fn test_exhausted_revision_counter_fails_commit() {
        let (hosting, manager) = manager(CommitPolicy::Additive);
        let handle = manager.ensure_repository(&app()).await.unwrap();
        let manifest = Manifest {
            app_id: "todo-app".to_string(),
            revision: u32::MAX,
            files: vec!["index.html".to_string()],
            digest: "abc".to_string(),
            updated_at: Utc::now(),
        };
        hosting
            .commit(
                &handle,
                "corrupt",
                &[FileChange::Write {
                    path: MANIFEST_PATH.to_string(),
                    content: manifest.render().unwrap(),
                }],
            )
            .await
            .unwrap();

        let result = manager
            .commit_files(&handle, &artifact(&[("index.html", "v2")]))
            .await;
        assert!(matches!(result, Err(RepositoryError::CommitFailed(_))));
        assert_eq!(hosting.counts().commits, 1);
    }

    #[tokio::test]
    async fn test_repo_prefix() {
        let hosting = Arc::new(InMemoryHosting::new("user", "https://user.github.io"));
        let manager = RepositoryManager::new(
            hosting,
            RepositoryOptions {
                repo_prefix: "llm-".to_string(),
                commit_policy: CommitPolicy::Additive,
            },
        );
        assert_eq!(manager.repo_name(&app()), "llm-todo-app");
    }
}
