//! Minimal GitHub REST client for the destination side.

use anyhow::{Context, Result, bail};
use reqwest::{Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

const USER_AGENT: &str = "repo-migrator";

/// A GitHub repository (subset of fields we care about).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRepo {
    pub full_name: String,
    pub name: String,
    pub private: bool,
    pub html_url: String,
    pub clone_url: String,
    pub description: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
}

#[derive(Debug, Serialize)]
struct UpdateRepoRequest<'a> {
    description: &'a str,
    private: bool,
}

/// Error body GitHub returns on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

impl ApiErrorBody {
    fn describe(&self) -> String {
        let details: Vec<String> = self
            .errors
            .iter()
            .filter_map(|e| {
                e.get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .or_else(|| e.as_str().map(str::to_string))
            })
            .collect();
        if details.is_empty() {
            self.message.clone()
        } else {
            format!("{} ({})", self.message, details.join("; "))
        }
    }
}

pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Fetch a repository; `None` when it does not exist.
    pub async fn get_repo(&self, org: &str, name: &str) -> Result<Option<GitHubRepo>> {
        let path = format!("/repos/{}/{}", org, name);
        let resp = self.send(Method::GET, &path, None::<&()>).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(resp, &Method::GET, &path).await?;
        let repo = resp
            .json::<GitHubRepo>()
            .await
            .context("Failed to parse repository response from GitHub")?;
        Ok(Some(repo))
    }

    /// Whether an existing repository has no branches.
    pub async fn is_empty(&self, org: &str, name: &str) -> Result<bool> {
        let path = format!("/repos/{}/{}/branches?per_page=1", org, name);
        let resp = self.send(Method::GET, &path, None::<&()>).await?;
        // Some GitHub versions answer 409 "Git Repository is empty" instead of [].
        if resp.status() == StatusCode::CONFLICT {
            return Ok(true);
        }
        let branches = check(resp, &Method::GET, &path)
            .await?
            .json::<Vec<serde_json::Value>>()
            .await
            .context("Failed to parse branches response from GitHub")?;
        Ok(branches.is_empty())
    }

    pub async fn create_repo(
        &self,
        org: &str,
        name: &str,
        description: &str,
        private: bool,
    ) -> Result<GitHubRepo> {
        let path = format!("/orgs/{}/repos", org);
        let body = CreateRepoRequest {
            name,
            description,
            private,
        };
        let resp = self.send(Method::POST, &path, Some(&body)).await?;
        check(resp, &Method::POST, &path)
            .await?
            .json::<GitHubRepo>()
            .await
            .context("Failed to parse created repository from GitHub")
    }

    pub async fn update_repo(
        &self,
        org: &str,
        name: &str,
        description: &str,
        private: bool,
    ) -> Result<GitHubRepo> {
        let path = format!("/repos/{}/{}", org, name);
        let body = UpdateRepoRequest {
            description,
            private,
        };
        let resp = self.send(Method::PATCH, &path, Some(&body)).await?;
        check(resp, &Method::PATCH, &path)
            .await?
            .json::<GitHubRepo>()
            .await
            .context("Failed to parse updated repository from GitHub")
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        debug!(%method, path, "GitHub request");
        let mut req = self
            .http
            .request(method.clone(), format!("{}{}", self.api_url, path))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        req.send()
            .await
            .map_err(|e| anyhow::Error::new(e.without_url()))
            .with_context(|| format!("network error contacting GitHub ({} {})", method, path))
    }
}

/// Turn a non-2xx response into an error naming the status and GitHub's message.
async fn check(resp: Response, method: &Method, path: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let body: ApiErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = if body.message.is_empty() {
        text.trim().to_string()
    } else {
        body.describe()
    };
    bail!("GitHub API error: {} on {} {}: {}", status, method, path, message)
}
