pub mod branch;
pub mod config;
pub mod list;
pub mod repair;
pub mod sync;

use crate::config::load_settings;
use crate::errors::{CascadeError, Result};
use crate::git::{get_current_repository, GitRepository};
use crate::stack::StackManager;
use crate::store::Store;
use std::env;

/// Manager for the repository containing the current directory
pub(crate) fn open_manager() -> Result<StackManager<GitRepository>> {
    let repo = get_current_repository()?;
    let store = Store::open_default()?;
    let settings = load_settings()?;
    Ok(StackManager::new(repo, store, settings))
}

/// Branch checked out in the current directory's worktree
pub(crate) fn current_branch() -> Result<String> {
    let current_dir = env::current_dir()
        .map_err(|e| CascadeError::config(format!("Could not get current directory: {e}")))?;
    let repo = git2::Repository::discover(&current_dir)?;
    let head = repo.head()?;
    head.shorthand()
        .filter(|_| head.is_branch())
        .map(str::to_string)
        .ok_or_else(|| CascadeError::git("HEAD is detached; name a branch explicitly"))
}
