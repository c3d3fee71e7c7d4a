//! Source-hosting backend interface

use async_trait::async_trait;

use crate::errors::RepositoryError;

/// A repository on the hosting backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    pub owner: String,
    pub name: String,
    pub html_url: String,
    pub default_branch: String,
    /// Whether the call that produced this handle created the repository
    pub created: bool,
}

/// One change within a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Write { path: String, content: String },
    Delete { path: String },
}

/// Result of asking the backend to publish a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagesCreation {
    Created(String),
    AlreadyExists,
}

/// Repository CRUD and static-page publishing.
///
/// Implementations return the [`RepositoryError`] variant matching the
/// operation: lookups and reads give `LookupFailed`, creation gives
/// `RepoCreateFailed`, commits give `CommitFailed` and Pages calls give
/// `PublishFailed`.
#[async_trait]
pub trait HostingBackend: Send + Sync {
    /// Look up a repository owned by the configured account
    async fn get_repository(&self, name: &str) -> Result<Option<RepoHandle>, RepositoryError>;

    /// Create a public repository with an initial commit on its default branch
    async fn create_repository(
        &self,
        name: &str,
        description: &str,
    ) -> Result<RepoHandle, RepositoryError>;

    /// Read a text file from the default branch
    async fn read_file(
        &self,
        repo: &RepoHandle,
        path: &str,
    ) -> Result<Option<String>, RepositoryError>;

    /// Apply every change as a single commit on the default branch, returning its sha
    async fn commit(
        &self,
        repo: &RepoHandle,
        message: &str,
        changes: &[FileChange],
    ) -> Result<String, RepositoryError>;

    /// Published URL if Pages is enabled
    async fn get_pages(&self, repo: &RepoHandle) -> Result<Option<String>, RepositoryError>;

    /// Enable Pages from the root of the default branch
    async fn create_pages(&self, repo: &RepoHandle) -> Result<PagesCreation, RepositoryError>;
}
