use super::client::PullRequestClient;
use super::{PullRequestOracle, PullRequestStatus};
use crate::config::BitbucketConfig;
use crate::errors::{CascadeError, Result};
use serde::Deserialize;
use tokio::runtime::Handle;
use tracing::debug;

/// The subset of a Bitbucket pull request needed to judge whether it merged
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    pub state: PullRequestState,
    #[serde(default)]
    pub links: Option<PullRequestLinks>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestLinks {
    #[serde(rename = "self", default)]
    pub self_link: Vec<SelfLink>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelfLink {
    pub href: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PullRequestState {
    Open,
    Merged,
    Declined,
}

impl PullRequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Merged => "MERGED",
            Self::Declined => "DECLINED",
        }
    }
}

impl PullRequest {
    pub fn web_url(&self) -> Option<String> {
        self.links
            .as_ref()
            .and_then(|links| links.self_link.first())
            .map(|link| link.href.clone())
    }
}

/// [`PullRequestOracle`] backed by the Bitbucket Server REST API.
///
/// The HTTP client is async; calls are driven to completion on `runtime`, so
/// the oracle must be used from a thread that is not itself running async
/// tasks (e.g. inside `spawn_blocking`).
pub struct BitbucketOracle {
    client: PullRequestClient,
    runtime: Handle,
}

impl BitbucketOracle {
    pub fn new(config: &BitbucketConfig, runtime: Handle) -> Result<Self> {
        Ok(Self {
            client: PullRequestClient::new(config)?,
            runtime,
        })
    }

    pub async fn get_pull_request(&self, pr_id: u64) -> Result<PullRequest> {
        self.client.pull_request(pr_id).await
    }
}

impl PullRequestOracle for BitbucketOracle {
    fn get_pr(&self, number: u64) -> Result<PullRequestStatus> {
        debug!("Looking up pull request #{}", number);
        let pr = self.runtime.block_on(self.get_pull_request(number))?;

        if pr.id != number {
            return Err(CascadeError::hosting(format!(
                "Asked for pull request #{number} but got #{}",
                pr.id
            )));
        }

        Ok(PullRequestStatus {
            number: pr.id,
            merged: pr.state == PullRequestState::Merged,
            state: pr.state.as_str().to_string(),
            url: pr.web_url(),
        })
    }
}
