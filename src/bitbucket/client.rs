//! Pull request lookups against the Bitbucket Server REST API

use super::pull_request::PullRequest;
use crate::config::BitbucketConfig;
use crate::errors::{CascadeError, Result};
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
enum Credentials {
    /// HTTP access token paired with the account that owns it
    Basic { username: String, token: String },
    Bearer(String),
}

/// Reads the pull requests of one repository
pub struct PullRequestClient {
    http: Client,
    repo_url: Url,
    credentials: Credentials,
}

impl PullRequestClient {
    pub fn new(config: &BitbucketConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .ok_or_else(|| CascadeError::config("bitbucket.token is not set"))?;
        let credentials = match &config.username {
            Some(username) => Credentials::Basic {
                username: username.clone(),
                token,
            },
            None => Credentials::Bearer(token),
        };

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CascadeError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            repo_url: repository_url(config)?,
            credentials,
        })
    }

    fn pull_request_url(&self, number: u64) -> Result<Url> {
        let mut url = self.repo_url.clone();
        url.path_segments_mut()
            .map_err(|_| CascadeError::config(format!("'{}' cannot be a base URL", self.repo_url)))?
            .extend(["pull-requests", number.to_string().as_str()]);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::Basic { username, token } => request.basic_auth(username, Some(token)),
            Credentials::Bearer(token) => request.bearer_auth(token),
        }
    }

    /// Fetch pull request `number`; an unknown number is `NotFound`
    pub async fn pull_request(&self, number: u64) -> Result<PullRequest> {
        let url = self.pull_request_url(number)?;
        debug!("GET {}", url);

        let response = self
            .authorize(self.http.get(url).header(ACCEPT, "application/json"))
            .send()
            .await
            .map_err(|e| CascadeError::hosting(format!("Could not reach Bitbucket: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(CascadeError::not_found(format!(
                "Pull request #{number}"
            ))),
            status if status.is_success() => {
                let body = response.text().await?;
                trace!("Pull request #{} payload: {}", number, body);
                serde_json::from_str(&body).map_err(|e| {
                    CascadeError::hosting(format!("Unexpected payload for pull request #{number}: {e}"))
                })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(CascadeError::hosting(format!(
                    "Lookup of pull request #{number} failed with {status}: {body}"
                )))
            }
        }
    }
}

/// `<server>/rest/api/1.0/projects/<project>/repos/<repo>`
fn repository_url(config: &BitbucketConfig) -> Result<Url> {
    let mut url = Url::parse(&config.url)
        .map_err(|e| CascadeError::config(format!("Invalid bitbucket.url '{}': {e}", config.url)))?;
    url.path_segments_mut()
        .map_err(|_| CascadeError::config(format!("'{}' cannot be a base URL", config.url)))?
        .pop_if_empty()
        .extend([
            "rest",
            "api",
            "1.0",
            "projects",
            config.project.as_str(),
            "repos",
            config.repo.as_str(),
        ]);
    Ok(url)
}
