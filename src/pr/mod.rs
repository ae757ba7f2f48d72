pub mod diff;
pub mod types;

pub use types::{
    ChangedFile, ContentLookup, ExistingComment, FileSnapshot, FileStatus, PullRequestContext,
    PullRevisions,
};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::GitHubConfig;

const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const COMMENTS_PER_PAGE: u32 = 100;
/// The pulls-files endpoint never returns more than this per page.
const MAX_FILES_PER_PAGE: u32 = 100;

#[derive(Debug, Error)]
pub enum PrError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("Invalid GitHub API URL: {0}")]
    InvalidApiUrl(String),

    #[error("Invalid repository name (expected owner/repo): {0}")]
    InvalidRepository(String),

    #[error("Content of {path} at {revision} is not valid UTF-8")]
    Decode { path: String, revision: String },
}

/// Everything the tool needs from the hosting platform.
///
/// The production implementation is [`GitHubClient`]; tests substitute an
/// in-memory fake.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Head and base commit of the pull request.
    async fn pull_revisions(&self, pr_number: u64) -> Result<PullRevisions, PrError>;

    /// Files changed by the pull request, in platform order.
    async fn list_files(&self, pr_number: u64) -> Result<Vec<ChangedFile>, PrError>;

    /// Best-effort fetch of a file's full text at a revision. Never fails:
    /// every problem is folded into [`ContentLookup`].
    async fn get_content(&self, path: &str, revision: &str) -> ContentLookup;

    /// Every comment currently on the pull request conversation.
    async fn list_comments(&self, pr_number: u64) -> Result<Vec<ExistingComment>, PrError>;

    async fn create_comment(&self, pr_number: u64, body: &str) -> Result<(), PrError>;
}

/// Extract the pull request number from a webhook ref such as `refs/pull/42/merge`.
///
/// The number is the second-to-last `/`-separated segment. Returns `None`
/// when the ref has fewer than two segments or that segment is not an integer,
/// which is what a push or tag ref looks like.
pub fn parse_pr_ref(git_ref: &str) -> Option<u64> {
    let segments: Vec<&str> = git_ref.split('/').collect();
    if segments.len() < 2 {
        return None;
    }
    segments[segments.len() - 2].parse::<u64>().ok()
}

/// REST client for the subset of the GitHub API this tool consumes.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: Url,
    owner: String,
    repo: String,
    token: String,
    files_per_page: u32,
    max_file_pages: u32,
}

impl GitHubClient {
    pub fn new(repository: &str, token: &str, config: &GitHubConfig) -> Result<Self, PrError> {
        let api_url = Url::parse(&config.api_url)
            .map_err(|_| PrError::InvalidApiUrl(config.api_url.clone()))?;
        if api_url.cannot_be_a_base() {
            return Err(PrError::InvalidApiUrl(config.api_url.clone()));
        }

        let (owner, repo) = repository
            .split_once('/')
            .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty() && !repo.contains('/'))
            .ok_or_else(|| PrError::InvalidRepository(repository.to_string()))?;

        Ok(Self {
            http: reqwest::Client::new(),
            api_url,
            owner: owner.to_string(),
            repo: repo.to_string(),
            token: token.to_string(),
            files_per_page: config.files_per_page.clamp(1, MAX_FILES_PER_PAGE),
            max_file_pages: config.max_file_pages.max(1),
        })
    }

    /// Build `{api_url}/repos/{owner}/{repo}/{segments...}` with every segment
    /// percent-encoded on its own.
    fn repo_endpoint<'s>(
        &self,
        segments: impl IntoIterator<Item = &'s str>,
    ) -> Result<Url, PrError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| PrError::InvalidApiUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, accept: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(USER_AGENT, "queue-index-advisor")
            .header(ACCEPT, accept)
            .header(AUTHORIZATION, format!("token {}", self.token))
    }

    async fn fetch_raw(&self, path: &str, revision: &str) -> Result<Option<String>, PrError> {
        let mut url = self.repo_endpoint(
            std::iter::once("contents").chain(path.split('/').filter(|s| !s.is_empty())),
        )?;
        url.query_pairs_mut().append_pair("ref", revision);

        let response = self.request(Method::GET, url, RAW_MEDIA_TYPE).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = response.error_for_status()?.bytes().await?;
        let content = String::from_utf8(bytes.to_vec()).map_err(|_| PrError::Decode {
            path: path.to_string(),
            revision: revision.to_string(),
        })?;
        Ok(Some(content))
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn pull_revisions(&self, pr_number: u64) -> Result<PullRevisions, PrError> {
        #[derive(serde::Deserialize)]
        struct GitRef {
            sha: String,
        }

        #[derive(serde::Deserialize)]
        struct PullResponse {
            head: GitRef,
            base: GitRef,
        }

        let number = pr_number.to_string();
        let url = self.repo_endpoint(["pulls", number.as_str()])?;

        debug!("fetching PR metadata from GitHub API");
        let pull = self
            .request(Method::GET, url, JSON_MEDIA_TYPE)
            .send()
            .await?
            .error_for_status()?
            .json::<PullResponse>()
            .await?;
        debug!(head = %pull.head.sha, base = %pull.base.sha, "received PR revisions");

        Ok(PullRevisions {
            head: pull.head.sha,
            base: pull.base.sha,
        })
    }

    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn list_files(&self, pr_number: u64) -> Result<Vec<ChangedFile>, PrError> {
        let number = pr_number.to_string();
        let mut files = Vec::new();

        for page in 1..=self.max_file_pages {
            let mut url = self.repo_endpoint(["pulls", number.as_str(), "files"])?;
            url.query_pairs_mut()
                .append_pair("per_page", &self.files_per_page.to_string())
                .append_pair("page", &page.to_string());

            debug!(page, "fetching PR files page");
            let batch = self
                .request(Method::GET, url, JSON_MEDIA_TYPE)
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<ChangedFile>>()
                .await?;

            let full_page = batch.len() >= self.files_per_page as usize;
            files.extend(batch);
            if !full_page {
                return Ok(files);
            }
        }

        warn!(
            files = files.len(),
            max_pages = self.max_file_pages,
            "page limit reached with a full last page; later files were not inspected"
        );
        Ok(files)
    }

    #[instrument(skip(self))]
    async fn get_content(&self, path: &str, revision: &str) -> ContentLookup {
        match self.fetch_raw(path, revision).await {
            Ok(Some(content)) => ContentLookup::Found(FileSnapshot { content }),
            Ok(None) => {
                debug!("file not present at revision");
                ContentLookup::NotFound
            }
            Err(err) => {
                warn!(error = %err, "could not fetch file content");
                ContentLookup::Unavailable(err.to_string())
            }
        }
    }

    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn list_comments(&self, pr_number: u64) -> Result<Vec<ExistingComment>, PrError> {
        let number = pr_number.to_string();
        let mut comments = Vec::new();
        let mut page: u32 = 1;

        loop {
            let mut url = self.repo_endpoint(["issues", number.as_str(), "comments"])?;
            url.query_pairs_mut()
                .append_pair("per_page", &COMMENTS_PER_PAGE.to_string())
                .append_pair("page", &page.to_string());

            let batch = self
                .request(Method::GET, url, JSON_MEDIA_TYPE)
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<ExistingComment>>()
                .await?;

            let full_page = batch.len() >= COMMENTS_PER_PAGE as usize;
            comments.extend(batch);
            if !full_page {
                break;
            }
            page += 1;
        }

        debug!(comments = comments.len(), "received existing comments");
        Ok(comments)
    }

    #[instrument(skip(self, body), fields(repo = %self.repo, body_len = body.len()))]
    async fn create_comment(&self, pr_number: u64, body: &str) -> Result<(), PrError> {
        let number = pr_number.to_string();
        let url = self.repo_endpoint(["issues", number.as_str(), "comments"])?;

        self.request(Method::POST, url, JSON_MEDIA_TYPE)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?
            .error_for_status()?;
        debug!("comment created");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard, files_per_page: u32, max_file_pages: u32) -> GitHubClient {
        let config = GitHubConfig {
            api_url: server.url(),
            token: None,
            files_per_page,
            max_file_pages,
        };
        GitHubClient::new("org/repo", "test-token", &config).unwrap()
    }

    #[test]
    fn test_parse_pr_ref() {
        assert_eq!(parse_pr_ref("refs/pull/42/merge"), Some(42));
        assert_eq!(parse_pr_ref("refs/pull/7/head"), Some(7));
        assert_eq!(parse_pr_ref("refs/heads/main"), None);
        assert_eq!(parse_pr_ref("refs/tags/v1.0/x"), None);
        assert_eq!(parse_pr_ref("42"), None);
        assert_eq!(parse_pr_ref(""), None);
    }

    #[test]
    fn test_client_rejects_bad_repository() {
        let config = GitHubConfig::default();
        assert!(matches!(
            GitHubClient::new("no-slash", "t", &config),
            Err(PrError::InvalidRepository(_))
        ));
        assert!(matches!(
            GitHubClient::new("a/b/c", "t", &config),
            Err(PrError::InvalidRepository(_))
        ));
        assert!(GitHubClient::new("org/repo", "t", &config).is_ok());
    }

    #[tokio::test]
    async fn test_list_files_single_page() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/org/repo/pulls/42/files")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("per_page".into(), "30".into()),
                Matcher::UrlEncoded("page".into(), "1".into()),
            ]))
            .match_header("authorization", "token test-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"filename": "QueueFooAsyncAction.groovy", "status": "added", "patch": "+x"},
                    {"filename": "README.md", "status": "modified"}]"#,
            )
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, 30, 1);
        let files = client.list_files(42).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].status, FileStatus::Added);
        assert_eq!(files[1].filename, "README.md");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_files_follows_pages_up_to_limit() {
        let mut server = mockito::Server::new_async().await;
        let page1 = server
            .mock("GET", "/repos/org/repo/pulls/42/files")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_body(r#"[{"filename": "A.groovy", "status": "added"}]"#)
            .expect(1)
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/repos/org/repo/pulls/42/files")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(r#"[{"filename": "B.groovy", "status": "added"}]"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, 1, 2);
        let files = client.list_files(42).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].filename, "B.groovy");
        page1.assert_async().await;
        page2.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_files_page_size_capped_at_platform_limit() {
        let mut server = mockito::Server::new_async().await;
        let full_page: Vec<serde_json::Value> = (0..MAX_FILES_PER_PAGE)
            .map(|i| serde_json::json!({ "filename": format!("File{i}.groovy"), "status": "modified" }))
            .collect();
        let page1 = server
            .mock("GET", "/repos/org/repo/pulls/42/files")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("per_page".into(), "100".into()),
                Matcher::UrlEncoded("page".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(serde_json::Value::Array(full_page).to_string())
            .expect(1)
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/repos/org/repo/pulls/42/files")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("per_page".into(), "100".into()),
                Matcher::UrlEncoded("page".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(r#"[{"filename": "QueueLastAsyncAction.groovy", "status": "added"}]"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, 150, 5);
        let files = client.list_files(42).await.unwrap();
        assert_eq!(files.len(), MAX_FILES_PER_PAGE as usize + 1);
        assert_eq!(files.last().unwrap().filename, "QueueLastAsyncAction.groovy");
        page1.assert_async().await;
        page2.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_files_error_status_propagates() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/org/repo/pulls/42/files")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let client = client_for(&server, 30, 1);
        assert!(matches!(
            client.list_files(42).await,
            Err(PrError::ApiRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_pull_revisions() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/org/repo/pulls/42")
            .with_status(200)
            .with_body(r#"{"number": 42, "head": {"sha": "aaa", "ref": "feature"}, "base": {"sha": "bbb", "ref": "main"}}"#)
            .create_async()
            .await;

        let client = client_for(&server, 30, 1);
        let revisions = client.pull_revisions(42).await.unwrap();
        assert_eq!(revisions.head, "aaa");
        assert_eq!(revisions.base, "bbb");
    }

    #[tokio::test]
    async fn test_get_content_found_not_found_and_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _found = server
            .mock("GET", "/repos/org/repo/contents/grails-app/QueueBar.groovy")
            .match_query(Matcher::UrlEncoded("ref".into(), "aaa".into()))
            .match_header("accept", RAW_MEDIA_TYPE)
            .with_status(200)
            .with_body("class QueueBar extends BaseAsyncAction {}")
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/repos/org/repo/contents/grails-app/QueueBar.groovy")
            .match_query(Matcher::UrlEncoded("ref".into(), "bbb".into()))
            .with_status(404)
            .create_async()
            .await;
        let _broken = server
            .mock("GET", "/repos/org/repo/contents/grails-app/QueueBar.groovy")
            .match_query(Matcher::UrlEncoded("ref".into(), "ccc".into()))
            .with_status(502)
            .create_async()
            .await;
        let _binary = server
            .mock("GET", "/repos/org/repo/contents/grails-app/QueueBar.groovy")
            .match_query(Matcher::UrlEncoded("ref".into(), "ddd".into()))
            .with_status(200)
            .with_body(vec![0xffu8, 0xfe, 0x00])
            .create_async()
            .await;

        let client = client_for(&server, 30, 1);
        let path = "grails-app/QueueBar.groovy";
        assert_eq!(
            client.get_content(path, "aaa").await.into_content().as_deref(),
            Some("class QueueBar extends BaseAsyncAction {}")
        );
        assert_eq!(client.get_content(path, "bbb").await, ContentLookup::NotFound);
        assert!(matches!(
            client.get_content(path, "ccc").await,
            ContentLookup::Unavailable(_)
        ));
        assert!(matches!(
            client.get_content(path, "ddd").await,
            ContentLookup::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_list_comments_reads_every_page() {
        let mut server = mockito::Server::new_async().await;
        let full_page: Vec<serde_json::Value> = (0..COMMENTS_PER_PAGE)
            .map(|i| serde_json::json!({ "id": i, "body": format!("comment {i}") }))
            .collect();
        let _page1 = server
            .mock("GET", "/repos/org/repo/issues/42/comments")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_body(serde_json::Value::Array(full_page).to_string())
            .create_async()
            .await;
        let _page2 = server
            .mock("GET", "/repos/org/repo/issues/42/comments")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(r#"[{"id": 999, "body": "last one"}]"#)
            .create_async()
            .await;

        let client = client_for(&server, 30, 1);
        let comments = client.list_comments(42).await.unwrap();
        assert_eq!(comments.len(), COMMENTS_PER_PAGE as usize + 1);
        assert_eq!(comments.last().unwrap().body, "last one");
    }

    #[tokio::test]
    async fn test_create_comment_posts_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/repos/org/repo/issues/42/comments")
            .match_header("authorization", "token test-token")
            .match_body(Matcher::PartialJson(serde_json::json!({ "body": "hello" })))
            .with_status(201)
            .with_body(r#"{"id": 1, "body": "hello"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, 30, 1);
        client.create_comment(42, "hello").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_comment_failure_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/repos/org/repo/issues/42/comments")
            .with_status(403)
            .create_async()
            .await;

        let client = client_for(&server, 30, 1);
        assert!(client.create_comment(42, "hello").await.is_err());
    }
}
