//! GitHub REST API client

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use openapi_client::models::{
    ContentsResponse, CreateCommitRequest, CreatePagesRequest, CreateRepoRequest,
    CreateTreeRequest, GitCommit, GitHubRepo, GitObject, GitRef, PagesSite, PagesSource,
    TreeEntry, UpdateRefRequest,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use tracing::{debug, info, warn};
use url::{Position, Url};

use crate::errors::{HttpError, RepositoryError};
use crate::http::client::HttpClient;
use crate::repo::backend::{FileChange, HostingBackend, PagesCreation, RepoHandle};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const API_VERSION: &str = "2022-11-28";

/// Default headers for every GitHub API request
pub fn github_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("x-github-api-version"),
        HeaderValue::from_static(API_VERSION),
    );
    headers
}

/// Percent-encoded API path from raw segments and query pairs
fn api_path(segments: &[&str], query: &[(&str, &str)]) -> String {
    let Ok(mut url) = Url::parse("http://localhost/") else {
        return String::new();
    };
    if let Ok(mut path) = url.path_segments_mut() {
        path.clear();
        for segment in segments {
            // Nested file paths keep their separators as distinct segments
            path.extend(segment.split('/'));
        }
    }
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    url[Position::BeforePath..].to_string()
}

impl HttpClient {
    pub async fn get_repo(&self, owner: &str, name: &str) -> Result<Option<GitHubRepo>, HttpError> {
        self.get_optional(&api_path(&["repos", owner, name], &[])).await
    }

    pub async fn create_user_repo(&self, request: &CreateRepoRequest) -> Result<GitHubRepo, HttpError> {
        self.post("/user/repos", request).await
    }

    pub async fn get_contents(
        &self,
        repo: &RepoHandle,
        path: &str,
    ) -> Result<Option<ContentsResponse>, HttpError> {
        let path = api_path(
            &["repos", &repo.owner, &repo.name, "contents", path],
            &[("ref", repo.default_branch.as_str())],
        );
        self.get_optional(&path).await
    }

    pub async fn get_branch_ref(&self, repo: &RepoHandle) -> Result<GitRef, HttpError> {
        let path = api_path(
            &["repos", &repo.owner, &repo.name, "git", "ref", "heads", &repo.default_branch],
            &[],
        );
        self.get(&path).await
    }

    pub async fn get_git_commit(&self, repo: &RepoHandle, sha: &str) -> Result<GitCommit, HttpError> {
        let path = api_path(&["repos", &repo.owner, &repo.name, "git", "commits", sha], &[]);
        self.get(&path).await
    }

    pub async fn create_tree(
        &self,
        repo: &RepoHandle,
        request: &CreateTreeRequest,
    ) -> Result<GitObject, HttpError> {
        let path = api_path(&["repos", &repo.owner, &repo.name, "git", "trees"], &[]);
        self.post(&path, request).await
    }

    pub async fn create_git_commit(
        &self,
        repo: &RepoHandle,
        request: &CreateCommitRequest,
    ) -> Result<GitCommit, HttpError> {
        let path = api_path(&["repos", &repo.owner, &repo.name, "git", "commits"], &[]);
        self.post(&path, request).await
    }

    pub async fn update_branch_ref(
        &self,
        repo: &RepoHandle,
        request: &UpdateRefRequest,
    ) -> Result<GitRef, HttpError> {
        let path = api_path(
            &["repos", &repo.owner, &repo.name, "git", "refs", "heads", &repo.default_branch],
            &[],
        );
        self.patch(&path, request).await
    }

    pub async fn get_pages_site(&self, repo: &RepoHandle) -> Result<Option<PagesSite>, HttpError> {
        self.get_optional(&api_path(&["repos", &repo.owner, &repo.name, "pages"], &[]))
            .await
    }

    pub async fn create_pages_site(
        &self,
        repo: &RepoHandle,
        request: &CreatePagesRequest,
    ) -> Result<PagesSite, HttpError> {
        let path = api_path(&["repos", &repo.owner, &repo.name, "pages"], &[]);
        self.post(&path, request).await
    }
}

/// [`HostingBackend`] on GitHub repositories and GitHub Pages
pub struct GitHubHosting {
    client: HttpClient,
    owner: String,
}

impl GitHubHosting {
    pub fn new(client: HttpClient, owner: impl Into<String>) -> Self {
        Self {
            client,
            owner: owner.into(),
        }
    }

    fn handle(repo: GitHubRepo, created: bool) -> RepoHandle {
        RepoHandle {
            owner: repo.owner.login,
            name: repo.name,
            html_url: repo.html_url,
            default_branch: repo.default_branch,
            created,
        }
    }

    /// Pages URL when the API omits one
    fn default_pages_url(repo: &RepoHandle) -> String {
        format!("https://{}.github.io/{}/", repo.owner.to_lowercase(), repo.name)
    }

    async fn commit_inner(
        &self,
        repo: &RepoHandle,
        message: &str,
        changes: &[FileChange],
    ) -> Result<String, HttpError> {
        let head = self.client.get_branch_ref(repo).await?;
        let parent = self.client.get_git_commit(repo, &head.object.sha).await?;

        let tree = changes
            .iter()
            .map(|change| match change {
                FileChange::Write { path, content } => TreeEntry::file(path, content),
                FileChange::Delete { path } => TreeEntry::removal(path),
            })
            .collect();
        let tree = self
            .client
            .create_tree(
                repo,
                &CreateTreeRequest {
                    base_tree: parent.tree.sha,
                    tree,
                },
            )
            .await?;
        debug!("Created tree {} for {}", tree.sha, repo.name);

        let commit = self
            .client
            .create_git_commit(
                repo,
                &CreateCommitRequest {
                    message: message.to_string(),
                    tree: tree.sha,
                    parents: vec![parent.sha],
                },
            )
            .await?;

        // Not forced: a concurrent writer makes this fail instead of losing history
        self.client
            .update_branch_ref(
                repo,
                &UpdateRefRequest {
                    sha: commit.sha.clone(),
                    force: false,
                },
            )
            .await?;
        Ok(commit.sha)
    }
}

#[async_trait]
impl HostingBackend for GitHubHosting {
    async fn get_repository(&self, name: &str) -> Result<Option<RepoHandle>, RepositoryError> {
        let repo = self
            .client
            .get_repo(&self.owner, name)
            .await
            .map_err(|e| RepositoryError::LookupFailed(e.to_string()))?;
        Ok(repo.map(|repo| Self::handle(repo, false)))
    }

    async fn create_repository(
        &self,
        name: &str,
        description: &str,
    ) -> Result<RepoHandle, RepositoryError> {
        let request = CreateRepoRequest {
            name: name.to_string(),
            description: description.to_string(),
            private: false,
            auto_init: true,
        };

        match self.client.create_user_repo(&request).await {
            Ok(repo) => {
                info!("Created repository {}", repo.html_url);
                Ok(Self::handle(repo, true))
            }
            Err(HttpError::Status { status, body })
                if status == StatusCode::UNPROCESSABLE_ENTITY.as_u16() =>
            {
                // Created concurrently by someone else; reuse it
                warn!("Repository {} could not be created ({}); looking it up", name, body);
                self.get_repository(name)
                    .await
                    .map_err(|e| RepositoryError::RepoCreateFailed(e.to_string()))?
                    .ok_or_else(|| RepositoryError::RepoCreateFailed(format!("{}: {}", status, body)))
            }
            Err(e) => Err(RepositoryError::RepoCreateFailed(e.to_string())),
        }
    }

    async fn read_file(
        &self,
        repo: &RepoHandle,
        path: &str,
    ) -> Result<Option<String>, RepositoryError> {
        let Some(contents) = self
            .client
            .get_contents(repo, path)
            .await
            .map_err(|e| RepositoryError::LookupFailed(e.to_string()))?
        else {
            return Ok(None);
        };

        decode_contents(path, &contents.encoding, &contents.content).map(Some)
    }

    async fn commit(
        &self,
        repo: &RepoHandle,
        message: &str,
        changes: &[FileChange],
    ) -> Result<String, RepositoryError> {
        self.commit_inner(repo, message, changes)
            .await
            .map_err(|e| RepositoryError::CommitFailed(e.to_string()))
    }

    async fn get_pages(&self, repo: &RepoHandle) -> Result<Option<String>, RepositoryError> {
        let site = self
            .client
            .get_pages_site(repo)
            .await
            .map_err(|e| RepositoryError::PublishFailed(e.to_string()))?;
        Ok(site.map(|site| site.html_url.unwrap_or_else(|| Self::default_pages_url(repo))))
    }

    async fn create_pages(&self, repo: &RepoHandle) -> Result<PagesCreation, RepositoryError> {
        let request = CreatePagesRequest {
            source: PagesSource {
                branch: repo.default_branch.clone(),
                path: "/".to_string(),
            },
        };

        match self.client.create_pages_site(repo, &request).await {
            Ok(site) => Ok(PagesCreation::Created(
                site.html_url.unwrap_or_else(|| Self::default_pages_url(repo)),
            )),
            Err(HttpError::Status { status, .. }) if status == StatusCode::CONFLICT.as_u16() => {
                Ok(PagesCreation::AlreadyExists)
            }
            Err(e) => Err(RepositoryError::PublishFailed(e.to_string())),
        }
    }
}

/// GET a published page, returning its status code
pub async fn fetch_status(url: &str, timeout: Duration) -> Result<u16, HttpError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.get(url).send().await?;
    Ok(response.status().as_u16())
}

/// Decode a contents API payload into text. Files that are not UTF-8 are an error.
fn decode_contents(path: &str, encoding: &str, content: &str) -> Result<String, RepositoryError> {
    if encoding != "base64" {
        return Err(RepositoryError::LookupFailed(format!(
            "{} has unsupported encoding '{}'",
            path, encoding
        )));
    }

    let packed: String = content.split_whitespace().collect();
    let bytes = STANDARD
        .decode(packed)
        .map_err(|e| RepositoryError::LookupFailed(format!("{}: {}", path, e)))?;
    String::from_utf8(bytes)
        .map_err(|_| RepositoryError::LookupFailed(format!("{} is not UTF-8 text", path)))
}
