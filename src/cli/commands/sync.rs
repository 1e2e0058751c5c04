use super::{current_branch, open_manager};
use crate::bitbucket::{BitbucketOracle, PullRequestOracle};
use crate::cli::output::Output;
use crate::errors::{CascadeError, Result};
use crate::stack::{SyncEngine, SyncResult, SyncStatus};
use tokio::runtime::Handle;
use tracing::warn;

/// Sync one branch, every stack, or the stack of the current branch
pub fn sync(branch: Option<String>, all: bool, fetch: bool, runtime: Handle) -> Result<()> {
    let manager = open_manager()?;

    let oracle = match &manager.settings().bitbucket {
        Some(config) => match BitbucketOracle::new(config, runtime) {
            Ok(oracle) => Some(oracle),
            Err(e) => {
                warn!("Bitbucket is configured but unusable, relying on git ancestry: {}", e);
                None
            }
        },
        None => None,
    };

    let mut engine = SyncEngine::new(&manager).fetch_first(fetch);
    if let Some(oracle) = &oracle {
        engine = engine.with_oracle(oracle as &dyn PullRequestOracle);
    }

    let results = if all {
        let mut results = Vec::new();
        for (hash, stack_results) in engine.sync_all()? {
            Output::section(format!("Stack {hash}"));
            stack_results.iter().for_each(Output::sync_result);
            results.extend(stack_results);
        }
        results
    } else if let Some(name) = branch {
        let result = engine.sync_branch(&name)?;
        Output::sync_result(&result);
        vec![result]
    } else {
        let current = current_branch()?;
        let stack = manager
            .stack_for_branch(&current)?
            .ok_or_else(|| CascadeError::not_found(format!("Branch '{current}' is not tracked")))?;
        Output::section(format!("Syncing stack '{}'", stack.name));
        let results = engine.sync_stack(&stack.hash)?;
        results.iter().for_each(Output::sync_result);
        results
    };

    finish(&results)
}

/// Rebase the descendants of `branch` (or the current branch)
pub fn restack(branch: Option<String>) -> Result<()> {
    let manager = open_manager()?;
    let name = match branch {
        Some(name) => name,
        None => current_branch()?,
    };

    let results = SyncEngine::new(&manager).restack_descendants(&name)?;
    if results.is_empty() {
        Output::info(format!("'{name}' has no descendants to restack"));
    }
    results.iter().for_each(Output::sync_result);
    finish(&results)
}

/// A halted run becomes the command's error
fn finish(results: &[SyncResult]) -> Result<()> {
    let Some(halted) = results.iter().find(|r| r.status.halts()) else {
        return Ok(());
    };

    let worktree = halted.worktree.clone().unwrap_or_default();
    Err(match &halted.status {
        SyncStatus::Failed(message) => {
            CascadeError::rebase(format!("'{}': {}", halted.branch, message))
        }
        _ => CascadeError::RebaseConflict {
            branch: halted.branch.clone(),
            worktree,
        },
    })
}
