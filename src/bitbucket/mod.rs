//! Bitbucket Server integration: pull request lookups used to detect merges
//! that ancestry alone cannot see (squash and rebase merges).

pub mod client;
pub mod pull_request;

pub use client::PullRequestClient;
pub use pull_request::{BitbucketOracle, PullRequest, PullRequestState};

use crate::errors::Result;

/// Hosting-side view of one pull request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestStatus {
    pub number: u64,
    pub merged: bool,
    pub state: String,
    pub url: Option<String>,
}

/// Answers "has this pull request been merged?"
pub trait PullRequestOracle {
    fn get_pr(&self, number: u64) -> Result<PullRequestStatus>;
}
