use async_trait::async_trait;
use kensa_core::{GitHubConfig, KensaError, RepoRef};
use serde::Deserialize;
use tracing::debug;

const DEFAULT_API_URL: &str = "https://api.github.com";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const USER_AGENT: &str = concat!("kensa/", env!("CARGO_PKG_VERSION"));

/// Pull request metadata needed for prompting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestInfo {
    pub title: String,
    /// Description body; empty when the author left none.
    pub description: String,
    pub head_ref: String,
    pub head_sha: String,
}

/// Source-control host the pipeline reads diffs from and publishes to.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Fetch title, description and head of a pull request.
    async fn get_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<PullRequestInfo, KensaError>;

    /// Unified diff of the whole pull request.
    async fn get_diff(&self, repo: &RepoRef, number: u64) -> Result<String, KensaError>;

    /// Unified diff between two commits.
    async fn compare_commits(
        &self,
        repo: &RepoRef,
        base: &str,
        head: &str,
    ) -> Result<String, KensaError>;

    /// Raw content of a file at `git_ref`.
    async fn get_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<String, KensaError>;

    /// Post a Markdown comment on the pull request's conversation.
    async fn post_issue_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        body: &str,
    ) -> Result<(), KensaError>;
}

#[derive(Deserialize)]
struct PullResponse {
    title: Option<String>,
    body: Option<String>,
    head: HeadResponse,
}

#[derive(Deserialize)]
struct HeadResponse {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: String,
}

/// GitHub REST client.
///
/// # Examples
///
/// ```no_run
/// use kensa_core::GitHubConfig;
/// use kensa_review::github::GitHubClient;
///
/// # async fn demo() -> Result<(), kensa_core::KensaError> {
/// let config = GitHubConfig {
///     token: Some("ghp_xxxx".into()),
///     api_url: None,
/// };
/// let client = GitHubClient::new(&config)?;
/// # Ok(())
/// # }
/// ```
pub struct GitHubClient {
    octocrab: octocrab::Octocrab,
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    /// Build a client for the configured API endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`KensaError::Config`] if no token is configured or the API
    /// URL is invalid.
    pub fn new(config: &GitHubConfig) -> Result<Self, KensaError> {
        let token = config.token.clone().ok_or_else(|| {
            KensaError::Config(
                "GitHub token not set. Provide the GITHUB_TOKEN input or set GITHUB_TOKEN".into(),
            )
        })?;
        let api_url = config
            .api_url
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();

        let octocrab = octocrab::Octocrab::builder()
            .personal_token(token.clone())
            .base_uri(api_url.as_str())
            .map_err(|e| KensaError::Config(format!("invalid GitHub API URL '{api_url}': {e}")))?
            .build()
            .map_err(|e| KensaError::Config(format!("failed to create GitHub client: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| KensaError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            octocrab,
            http,
            api_url,
            token,
        })
    }

    /// GET `url` with a custom media type and return the body as text.
    async fn get_text(
        &self,
        url: &str,
        accept: &str,
        query: &[(&str, &str)],
    ) -> Result<String, KensaError> {
        debug!(url, accept, "fetching from GitHub");
        let response = self
            .http
            .get(url)
            .query(query)
            .header("Accept", accept)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| KensaError::Acquisition(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KensaError::Acquisition(format!(
                "GitHub API error {status}: {body}"
            )));
        }

        response
            .text()
            .await
            .map_err(|e| KensaError::Acquisition(format!("failed to read response: {e}")))
    }
}

#[async_trait]
impl SourceHost for GitHubClient {
    async fn get_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<PullRequestInfo, KensaError> {
        let route = format!("/repos/{}/{}/pulls/{number}", repo.owner, repo.name);
        let pr: PullResponse = self
            .octocrab
            .get(route, None::<&()>)
            .await
            .map_err(|e| KensaError::Acquisition(format!("failed to fetch pull request: {e}")))?;

        Ok(PullRequestInfo {
            title: pr.title.unwrap_or_default(),
            description: pr.body.unwrap_or_default(),
            head_ref: pr.head.ref_name,
            head_sha: pr.head.sha,
        })
    }

    async fn get_diff(&self, repo: &RepoRef, number: u64) -> Result<String, KensaError> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{number}",
            self.api_url, repo.owner, repo.name
        );
        self.get_text(&url, DIFF_MEDIA_TYPE, &[]).await
    }

    async fn compare_commits(
        &self,
        repo: &RepoRef,
        base: &str,
        head: &str,
    ) -> Result<String, KensaError> {
        let url = format!(
            "{}/repos/{}/{}/compare/{base}...{head}",
            self.api_url, repo.owner, repo.name
        );
        self.get_text(&url, DIFF_MEDIA_TYPE, &[]).await
    }

    async fn get_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<String, KensaError> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url,
            repo.owner,
            repo.name,
            path.trim_start_matches('/')
        );
        self.get_text(&url, RAW_MEDIA_TYPE, &[("ref", git_ref)])
            .await
    }

    async fn post_issue_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        body: &str,
    ) -> Result<(), KensaError> {
        let route = format!(
            "/repos/{}/{}/issues/{number}/comments",
            repo.owner, repo.name
        );
        let payload = serde_json::json!({ "body": body });
        let _response: serde_json::Value = self
            .octocrab
            .post(route, Some(&payload))
            .await
            .map_err(|e| KensaError::Publish(format!("failed to post comment: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> GitHubClient {
        GitHubClient::new(&GitHubConfig {
            token: Some("ghs_test".into()),
            api_url: Some(server.url()),
        })
        .unwrap()
    }

    fn repo() -> RepoRef {
        RepoRef::new("acme", "web")
    }

    #[test]
    fn missing_token_is_config_error() {
        let err = GitHubClient::new(&GitHubConfig::default()).err().unwrap();
        assert!(matches!(err, KensaError::Config(_)));
    }

    #[tokio::test]
    async fn get_diff_requests_diff_media_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/web/pulls/7")
            .match_header("accept", DIFF_MEDIA_TYPE)
            .match_header("authorization", "Bearer ghs_test")
            .with_status(200)
            .with_body("diff --git a/x b/x\n")
            .create_async()
            .await;

        let diff = client_for(&server).get_diff(&repo(), 7).await.unwrap();
        assert_eq!(diff, "diff --git a/x b/x\n");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn compare_commits_uses_three_dot_range() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/web/compare/aaa...bbb")
            .match_header("accept", DIFF_MEDIA_TYPE)
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let diff = client_for(&server)
            .compare_commits(&repo(), "aaa", "bbb")
            .await
            .unwrap();
        assert!(diff.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_file_content_passes_ref() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/web/contents/docs/review.md")
            .match_query(Matcher::UrlEncoded("ref".into(), "feature/x".into()))
            .match_header("accept", RAW_MEDIA_TYPE)
            .with_status(200)
            .with_body("# Guidelines\n")
            .create_async()
            .await;

        let text = client_for(&server)
            .get_file_content(&repo(), "docs/review.md", "feature/x")
            .await
            .unwrap();
        assert_eq!(text, "# Guidelines\n");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_failure_is_acquisition_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/acme/web/pulls/7")
            .with_status(404)
            .with_body("{\"message\":\"Not Found\"}")
            .create_async()
            .await;

        let err = client_for(&server).get_diff(&repo(), 7).await.unwrap_err();
        assert!(matches!(err, KensaError::Acquisition(_)));
    }

    #[tokio::test]
    async fn get_pull_request_reads_metadata() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/acme/web/pulls/7")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"number":7,"title":"Add login","body":null,"head":{"ref":"feature/x","sha":"bbb"}}"#,
            )
            .create_async()
            .await;

        let info = client_for(&server)
            .get_pull_request(&repo(), 7)
            .await
            .unwrap();
        assert_eq!(info.title, "Add login");
        assert_eq!(info.description, "");
        assert_eq!(info.head_ref, "feature/x");
    }

    #[tokio::test]
    async fn post_issue_comment_sends_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/repos/acme/web/issues/7/comments")
            .match_body(Matcher::Json(serde_json::json!({"body": "# AI Reviewer\n"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":1}"#)
            .create_async()
            .await;

        client_for(&server)
            .post_issue_comment(&repo(), 7, "# AI Reviewer\n")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn post_failure_is_publish_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/repos/acme/web/issues/7/comments")
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":"Resource not accessible by integration"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .post_issue_comment(&repo(), 7, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, KensaError::Publish(_)));
    }
}
