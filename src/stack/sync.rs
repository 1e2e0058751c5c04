//! Keeping stacked branches on top of their parents.
//!
//! Each branch is checked against its effective parent:
//! - parent is the stack root: rebase onto the upstream root when behind;
//! - parent was just merged upstream: replay only the branch's own commits
//!   onto the nearest unmerged ancestor (or the root) and record the merge;
//! - parent is an ordinary tracked branch: rebase onto it when behind.
//!
//! A batch stops at the first conflict or failure. Anything settled before
//! that point is already saved.

use super::manager::StackManager;
use crate::bitbucket::PullRequestOracle;
use crate::errors::{CascadeError, Result};
use crate::git::{RebaseOutcome, VersionControl};
use crate::store::RepoState;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    UpToDate,
    Rebased { onto: String },
    /// Parent was merged; the branch now sits on `to`
    Reparented { from: String, to: String },
    Conflict,
    Failed(String),
    /// A rebase from an earlier run is still stopped in the worktree
    RebaseInProgress,
    /// Not eligible for syncing (remote, merged, or missing locally)
    Skipped(String),
}

impl SyncStatus {
    /// Whether a batch must stop after this result
    pub fn halts(&self) -> bool {
        matches!(
            self,
            SyncStatus::Conflict | SyncStatus::Failed(_) | SyncStatus::RebaseInProgress
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub branch: String,
    pub status: SyncStatus,
    pub worktree: Option<PathBuf>,
}

/// Pre-rebase tips of branches rewritten during the current run
#[derive(Debug, Default)]
struct Run {
    rewritten: HashMap<String, String>,
}

pub struct SyncEngine<'a, G: VersionControl> {
    manager: &'a StackManager<G>,
    oracle: Option<&'a dyn PullRequestOracle>,
    fetch: bool,
}

impl<'a, G: VersionControl> SyncEngine<'a, G> {
    pub fn new(manager: &'a StackManager<G>) -> Self {
        Self {
            manager,
            oracle: None,
            fetch: manager.settings().git.fetch_before_sync,
        }
    }

    /// Consult `oracle` when ancestry cannot tell whether a parent merged
    pub fn with_oracle(mut self, oracle: &'a dyn PullRequestOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn fetch_first(mut self, fetch: bool) -> Self {
        self.fetch = fetch;
        self
    }

    fn vcs(&self) -> &G {
        self.manager.vcs()
    }

    fn maybe_fetch(&self) {
        if !self.fetch {
            return;
        }
        let remote = &self.manager.settings().git.remote;
        if let Err(e) = self.vcs().fetch(remote) {
            warn!("Fetch from '{}' failed, syncing against local refs: {}", remote, e);
        }
    }

    /// Sync every branch of one stack in tree order
    pub fn sync_stack(&self, hash: &str) -> Result<Vec<SyncResult>> {
        self.maybe_fetch();
        self.sync_stack_inner(hash, &mut Run::default())
    }

    /// Sync every stack; a halted stack does not stop the others
    pub fn sync_all(&self) -> Result<Vec<(String, Vec<SyncResult>)>> {
        self.maybe_fetch();
        let hashes: Vec<String> = self.manager.snapshot()?.stacks.into_keys().collect();

        let mut run = Run::default();
        let mut all = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let results = self.sync_stack_inner(&hash, &mut run)?;
            all.push((hash, results));
        }
        Ok(all)
    }

    fn sync_stack_inner(&self, hash: &str, run: &mut Run) -> Result<Vec<SyncResult>> {
        let names = self
            .manager
            .snapshot()?
            .stacks
            .get(hash)
            .map(|stack| stack.tree.branch_names())
            .ok_or_else(|| CascadeError::not_found(format!("Stack {hash}")))?;

        let mut results = Vec::new();
        for name in names {
            // Earlier steps may have recorded merges; always decide on fresh state
            let repo = self.manager.snapshot()?;
            let result = self.sync_one(&repo, &name, run)?;
            if let SyncStatus::Skipped(reason) = &result.status {
                debug!("Skipping '{}': {}", name, reason);
                continue;
            }
            let halt = result.status.halts();
            results.push(result);
            if halt {
                info!("Stopping sync of stack {} at '{}'", hash, name);
                break;
            }
        }
        Ok(results)
    }

    /// Apply the same decision to a single branch
    pub fn sync_branch(&self, name: &str) -> Result<SyncResult> {
        self.maybe_fetch();
        let repo = self.manager.snapshot()?;
        if !repo.is_tracked(name) {
            return Err(CascadeError::not_found(format!("Branch '{name}' is not tracked")));
        }

        self.sync_one(&repo, name, &mut Run::default())
    }

    /// Rebase the effective children of `name` onto it, recursively.
    ///
    /// Stops at the first child that does not rebase cleanly; that child's
    /// descendants are not attempted.
    pub fn restack_descendants(&self, name: &str) -> Result<Vec<SyncResult>> {
        if !self.manager.is_tracked(name)? {
            return Err(CascadeError::not_found(format!("Branch '{name}' is not tracked")));
        }
        let mut results = Vec::new();
        self.restack_into(name, &mut Run::default(), &mut results)?;
        Ok(results)
    }

    /// Returns `false` once something halted
    fn restack_into(&self, parent: &str, run: &mut Run, results: &mut Vec<SyncResult>) -> Result<bool> {
        let repo = self.manager.snapshot()?;
        let children: Vec<String> = repo
            .stack_for_branch(parent)
            .map(|stack| {
                stack
                    .branches
                    .iter()
                    .filter(|b| b.parent == parent && !b.is_merged && !b.is_remote)
                    .map(|b| b.name.clone())
                    .collect()
            })
            .unwrap_or_default();

        for child in children {
            let repo = self.manager.snapshot()?;
            if !self.vcs().branch_exists(&child) {
                debug!("Skipping '{}': local branch is gone", child);
                continue;
            }
            let result = match self.in_progress(&repo, &child) {
                Some(stopped) => stopped,
                None => self.rebase_onto_parent(&repo, &child, parent, run)?,
            };
            let halt = result.status.halts();
            results.push(result);
            if halt {
                return Ok(false);
            }
            if !self.restack_into(&child, run, results)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn sync_one(&self, repo: &RepoState, name: &str, run: &mut Run) -> Result<SyncResult> {
        let view = repo
            .branch(name)
            .ok_or_else(|| CascadeError::not_found(format!("Branch '{name}'")))?;

        let skipped = |reason: &str| SyncResult {
            branch: name.to_string(),
            status: SyncStatus::Skipped(reason.to_string()),
            worktree: view.worktree_path.clone(),
        };

        if view.is_remote {
            return Ok(skipped("remote branch"));
        }
        if view.is_merged {
            return Ok(skipped("already merged"));
        }
        if !self.vcs().branch_exists(name) {
            return Ok(skipped("local branch is missing"));
        }
        if let Some(stopped) = self.in_progress(repo, name) {
            return Ok(stopped);
        }

        let root = repo
            .stack_for_branch(name)
            .map(|stack| stack.root.clone())
            .ok_or_else(|| CascadeError::not_found(format!("Stack for '{name}'")))?;
        let upstream = self.manager.upstream_ref(&root);

        // Its children move off it once they are synced
        if self.is_freshly_merged(repo, name, &upstream, run) {
            return Ok(skipped("merged upstream"));
        }

        let parent = view.parent.clone();
        if parent != root && self.is_freshly_merged(repo, &parent, &upstream, run) {
            return self.replace_merged_parent(repo, name, &parent, &root, &upstream, run);
        }

        self.rebase_onto_parent(repo, name, &parent, run)
    }

    fn in_progress(&self, repo: &RepoState, name: &str) -> Option<SyncResult> {
        let worktree = self.worktree_for(repo, name);
        if !self.vcs().is_rebase_in_progress(&worktree) {
            return None;
        }
        warn!("A rebase is already in progress in {}", worktree.display());
        Some(SyncResult {
            branch: name.to_string(),
            status: SyncStatus::RebaseInProgress,
            worktree: Some(worktree),
        })
    }

    /// Plain rebase onto the parent when behind
    fn rebase_onto_parent(&self, repo: &RepoState, name: &str, parent: &str, run: &mut Run) -> Result<SyncResult> {
        let worktree = self.worktree_for(repo, name);
        let parent_ref = self.manager.ref_for(repo, parent);

        if self.vcs().commits_behind(name, &parent_ref)? == 0 {
            debug!("'{}' is up to date with '{}'", name, parent_ref);
            return Ok(SyncResult {
                branch: name.to_string(),
                status: SyncStatus::UpToDate,
                worktree: Some(worktree),
            });
        }

        let old_tip = self.vcs().branch_head(name)?;
        let outcome = match run.rewritten.get(parent) {
            // Parent was rewritten this run: move only what sits above its old tip
            Some(parent_old_tip) => {
                self.vcs()
                    .rebase_onto(&worktree, name, &parent_ref, parent_old_tip)?
            }
            None => self.vcs().rebase(&worktree, name, &parent_ref)?,
        };

        let status = match outcome {
            RebaseOutcome::Success => {
                run.rewritten.insert(name.to_string(), old_tip);
                info!("Rebased '{}' onto '{}'", name, parent_ref);
                SyncStatus::Rebased { onto: parent_ref }
            }
            other => failure_status(name, other),
        };

        Ok(SyncResult {
            branch: name.to_string(),
            status,
            worktree: Some(worktree),
        })
    }

    /// Move `name` off its merged parent onto the nearest unmerged ancestor
    fn replace_merged_parent(
        &self,
        repo: &RepoState,
        name: &str,
        merged_parent: &str,
        root: &str,
        upstream: &str,
        run: &mut Run,
    ) -> Result<SyncResult> {
        let mut merged = vec![merged_parent.to_string()];
        let mut new_parent = repo
            .branch(merged_parent)
            .map(|b| b.parent.clone())
            .unwrap_or_else(|| root.to_string());

        while new_parent != root && self.is_freshly_merged(repo, &new_parent, upstream, run) {
            merged.push(new_parent.clone());
            new_parent = repo
                .branch(&new_parent)
                .map(|b| b.parent.clone())
                .unwrap_or_else(|| root.to_string());
        }

        let worktree = self.worktree_for(repo, name);
        let new_ref = self.manager.ref_for(repo, &new_parent);
        let Some(old_base) = self.merged_parent_anchor(repo, name, merged_parent) else {
            let message = format!("cannot find where '{name}' forked from merged '{merged_parent}'");
            warn!("Not moving '{}': {}", name, message);
            return Ok(SyncResult {
                branch: name.to_string(),
                status: SyncStatus::Failed(message),
                worktree: Some(worktree),
            });
        };
        let old_tip = self.vcs().branch_head(name)?;

        info!(
            "'{}' was merged; moving '{}' onto '{}'",
            merged_parent, name, new_parent
        );
        let status = match self.vcs().rebase_onto(&worktree, name, &new_ref, &old_base)? {
            RebaseOutcome::Success => {
                run.rewritten.insert(name.to_string(), old_tip);
                self.manager.record_merged(&merged)?;
                SyncStatus::Reparented {
                    from: merged_parent.to_string(),
                    to: new_parent,
                }
            }
            other => failure_status(name, other),
        };

        Ok(SyncResult {
            branch: name.to_string(),
            status,
            worktree: Some(worktree),
        })
    }

    /// Where `name` forked from its merged parent.
    ///
    /// The parent's local branch is often deleted after a squash merge; its
    /// remote-tracking ref is the fallback.
    fn merged_parent_anchor(&self, repo: &RepoState, name: &str, merged_parent: &str) -> Option<String> {
        let local = self.manager.ref_for(repo, merged_parent);
        let remote = format!("{}/{}", self.manager.settings().git.remote, merged_parent);

        [local, remote]
            .into_iter()
            .filter(|candidate| self.vcs().ref_exists(candidate))
            .find_map(|candidate| match self.vcs().merge_base(name, &candidate) {
                Ok(base) => Some(base),
                Err(e) => {
                    debug!("No merge base between '{}' and '{}': {}", name, candidate, e);
                    None
                }
            })
    }

    /// Merged upstream but not yet recorded.
    ///
    /// Ancestry only counts when the branch has commits of its own, so a fresh
    /// branch sitting on its parent's tip is not mistaken for merged. A branch
    /// rebased earlier in this run is never merged. The hosting oracle covers
    /// squash and rebase merges.
    fn is_freshly_merged(&self, repo: &RepoState, branch: &str, upstream: &str, run: &Run) -> bool {
        let Some(view) = repo.branch(branch) else {
            return false;
        };
        if view.is_merged || run.rewritten.contains_key(branch) {
            return false;
        }

        let branch_ref = self.manager.ref_for(repo, branch);
        if self.vcs().ref_exists(&branch_ref) {
            // Local parent ref, so an updated upstream root does not hide own commits
            let parent_ref = if repo.is_tracked(&view.parent) {
                self.manager.ref_for(repo, &view.parent)
            } else {
                view.parent.clone()
            };
            let has_own_commits = view.pr_number.is_some()
                || self
                    .vcs()
                    .commits_ahead(&branch_ref, &parent_ref)
                    .map(|n| n > 0)
                    .unwrap_or(false);

            if has_own_commits
                && self
                    .vcs()
                    .is_branch_merged(&branch_ref, upstream)
                    .unwrap_or(false)
            {
                debug!("'{}' is contained in '{}'", branch, upstream);
                return true;
            }
        }

        match (self.oracle, view.pr_number) {
            (Some(oracle), Some(number)) => match oracle.get_pr(number) {
                Ok(status) => status.merged,
                Err(e) => {
                    warn!("Could not check pull request #{} for '{}': {}", number, branch, e);
                    false
                }
            },
            _ => false,
        }
    }

    fn worktree_for(&self, repo: &RepoState, name: &str) -> PathBuf {
        repo.branch(name)
            .and_then(|b| b.worktree_path.clone())
            .unwrap_or_else(|| self.vcs().root_path().to_path_buf())
    }
}

fn failure_status(name: &str, outcome: RebaseOutcome) -> SyncStatus {
    match outcome {
        RebaseOutcome::Conflict => {
            warn!("Rebase of '{}' stopped on conflicts", name);
            SyncStatus::Conflict
        }
        RebaseOutcome::Failed(message) => {
            warn!("Rebase of '{}' failed: {}", name, message);
            SyncStatus::Failed(message)
        }
        RebaseOutcome::Success => SyncStatus::UpToDate,
    }
}
