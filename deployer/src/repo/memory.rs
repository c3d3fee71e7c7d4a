//! In-process hosting backend for dry runs

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use crate::errors::RepositoryError;
use crate::repo::backend::{FileChange, HostingBackend, PagesCreation, RepoHandle};
use crate::utils::sha256_hex;

#[derive(Debug, Clone)]
struct MemoryRepo {
    handle: RepoHandle,
    files: BTreeMap<String, String>,
    commits: Vec<String>,
    pages_url: Option<String>,
}

/// Counters for every backend call, for dry-run reporting and tests
#[derive(Debug, Default)]
pub struct CallCounters {
    pub repo_lookups: AtomicU64,
    pub repo_creates: AtomicU64,
    pub file_reads: AtomicU64,
    pub commits: AtomicU64,
    pub pages_lookups: AtomicU64,
    pub pages_creates: AtomicU64,
}

/// Snapshot of [`CallCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub repo_lookups: u64,
    pub repo_creates: u64,
    pub file_reads: u64,
    pub commits: u64,
    pub pages_lookups: u64,
    pub pages_creates: u64,
}

impl CallCounts {
    /// Calls that change hosting state
    pub fn mutations(&self) -> u64 {
        self.repo_creates + self.commits + self.pages_creates
    }
}

/// Hosting backend keeping repositories in memory
pub struct InMemoryHosting {
    owner: String,
    pages_base_url: String,
    repos: Mutex<HashMap<String, MemoryRepo>>,
    counters: CallCounters,
}

impl InMemoryHosting {
    pub fn new(owner: impl Into<String>, pages_base_url: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            pages_base_url: pages_base_url.into().trim_end_matches('/').to_string(),
            repos: Mutex::new(HashMap::new()),
            counters: CallCounters::default(),
        }
    }

    fn repos(&self) -> MutexGuard<'_, HashMap<String, MemoryRepo>> {
        self.repos.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn counts(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            repo_lookups: c.repo_lookups.load(Ordering::SeqCst),
            repo_creates: c.repo_creates.load(Ordering::SeqCst),
            file_reads: c.file_reads.load(Ordering::SeqCst),
            commits: c.commits.load(Ordering::SeqCst),
            pages_lookups: c.pages_lookups.load(Ordering::SeqCst),
            pages_creates: c.pages_creates.load(Ordering::SeqCst),
        }
    }

    /// Current files of a repository
    pub fn files(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.repos().get(name).map(|repo| repo.files.clone())
    }

    /// Commit shas of a repository, oldest first
    pub fn commits(&self, name: &str) -> Vec<String> {
        self.repos()
            .get(name)
            .map(|repo| repo.commits.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HostingBackend for InMemoryHosting {
    async fn get_repository(&self, name: &str) -> Result<Option<RepoHandle>, RepositoryError> {
        self.counters.repo_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.repos().get(name).map(|repo| RepoHandle {
            created: false,
            ..repo.handle.clone()
        }))
    }

    async fn create_repository(
        &self,
        name: &str,
        description: &str,
    ) -> Result<RepoHandle, RepositoryError> {
        self.counters.repo_creates.fetch_add(1, Ordering::SeqCst);
        let mut repos = self.repos();
        if repos.contains_key(name) {
            return Err(RepositoryError::RepoCreateFailed(format!(
                "422: name already exists on this account: {}",
                name
            )));
        }

        debug!("Creating in-memory repository {} ({})", name, description);
        let handle = RepoHandle {
            owner: self.owner.clone(),
            name: name.to_string(),
            html_url: format!("memory://{}/{}", self.owner, name),
            default_branch: "main".to_string(),
            created: true,
        };

        let mut files = BTreeMap::new();
        files.insert("README.md".to_string(), format!("# {}\n", name));
        let initial = sha256_hex(name.as_bytes())[..40].to_string();

        repos.insert(
            name.to_string(),
            MemoryRepo {
                handle: handle.clone(),
                files,
                commits: vec![initial],
                pages_url: None,
            },
        );
        Ok(handle)
    }

    async fn read_file(
        &self,
        repo: &RepoHandle,
        path: &str,
    ) -> Result<Option<String>, RepositoryError> {
        self.counters.file_reads.fetch_add(1, Ordering::SeqCst);
        let repos = self.repos();
        let stored = repos
            .get(&repo.name)
            .ok_or_else(|| RepositoryError::LookupFailed(format!("404: no repository {}", repo.name)))?;
        Ok(stored.files.get(path).cloned())
    }

    async fn commit(
        &self,
        repo: &RepoHandle,
        message: &str,
        changes: &[FileChange],
    ) -> Result<String, RepositoryError> {
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        let mut repos = self.repos();
        let stored = repos
            .get_mut(&repo.name)
            .ok_or_else(|| RepositoryError::CommitFailed(format!("404: no repository {}", repo.name)))?;

        // Deleting a path that is not there is rejected, as the git tree API does
        if let Some(missing) = changes.iter().find_map(|change| match change {
            FileChange::Delete { path } if !stored.files.contains_key(path) => Some(path),
            _ => None,
        }) {
            return Err(RepositoryError::CommitFailed(format!(
                "422: cannot delete missing path {}",
                missing
            )));
        }

        let mut seed = stored.commits.last().cloned().unwrap_or_default().into_bytes();
        seed.extend_from_slice(message.as_bytes());
        for change in changes {
            match change {
                FileChange::Write { path, content } => {
                    seed.extend_from_slice(path.as_bytes());
                    seed.extend_from_slice(content.as_bytes());
                    stored.files.insert(path.clone(), content.clone());
                }
                FileChange::Delete { path } => {
                    seed.extend_from_slice(path.as_bytes());
                    stored.files.remove(path);
                }
            }
        }

        let sha = sha256_hex(&seed)[..40].to_string();
        stored.commits.push(sha.clone());
        Ok(sha)
    }

    async fn get_pages(&self, repo: &RepoHandle) -> Result<Option<String>, RepositoryError> {
        self.counters.pages_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .repos()
            .get(&repo.name)
            .and_then(|stored| stored.pages_url.clone()))
    }

    async fn create_pages(&self, repo: &RepoHandle) -> Result<PagesCreation, RepositoryError> {
        self.counters.pages_creates.fetch_add(1, Ordering::SeqCst);
        let mut repos = self.repos();
        let stored = repos
            .get_mut(&repo.name)
            .ok_or_else(|| RepositoryError::PublishFailed(format!("404: no repository {}", repo.name)))?;

        if stored.pages_url.is_some() {
            return Ok(PagesCreation::AlreadyExists);
        }

        let url = format!("{}/{}/", self.pages_base_url, repo.name);
        stored.pages_url = Some(url.clone());
        Ok(PagesCreation::Created(url))
    }
}
