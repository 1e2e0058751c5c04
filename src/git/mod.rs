pub mod repository;
#[cfg(test)]
pub(crate) mod testing;

pub use repository::GitRepository;

use crate::errors::{CascadeError, Result};
use std::path::{Path, PathBuf};

/// A linked worktree and the branch checked out in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    /// `None` for a detached HEAD
    pub branch: Option<String>,
}

/// How a rebase attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseOutcome {
    Success,
    /// Stopped on conflicts; the rebase is left in progress in the worktree
    Conflict,
    Failed(String),
}

/// Version-control operations needed by the stack manager and sync engine.
///
/// Ref arguments accept anything git can resolve (local branch, `origin/main`,
/// commit id).
pub trait VersionControl {
    /// Update remote-tracking refs from `remote`
    fn fetch(&self, remote: &str) -> Result<()>;

    /// Branch checked out in the main worktree
    fn current_branch(&self) -> Result<String>;

    /// Whether a local branch named `name` exists
    fn branch_exists(&self, name: &str) -> bool;

    /// Whether `reference` resolves to a commit
    fn ref_exists(&self, reference: &str) -> bool;

    /// Commit id at the tip of `reference`
    fn branch_head(&self, reference: &str) -> Result<String>;

    fn list_branches(&self) -> Result<Vec<String>>;

    /// Create `branch` from `from_ref` and check it out at `path`
    fn create_worktree(&self, branch: &str, path: &Path, from_ref: &str) -> Result<()>;

    /// Remove the worktree at `path`, then delete `branch` if given
    fn remove_worktree(&self, path: &Path, force: bool, branch: Option<&str>) -> Result<()>;

    fn delete_branch(&self, name: &str, force: bool) -> Result<()>;

    fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>>;

    /// Commits reachable from `branch` but not from `base`
    fn commits_ahead(&self, branch: &str, base: &str) -> Result<usize>;

    /// Commits reachable from `base` but not from `branch`
    fn commits_behind(&self, branch: &str, base: &str) -> Result<usize>;

    /// Whether the tip of `branch` is reachable from `target`
    fn is_branch_merged(&self, branch: &str, target: &str) -> Result<bool>;

    fn merge_base(&self, a: &str, b: &str) -> Result<String>;

    /// Rebase `branch`, checked out in `worktree`, onto `onto`
    fn rebase(&self, worktree: &Path, branch: &str, onto: &str) -> Result<RebaseOutcome>;

    /// Replay the commits of `branch` after `old_base` onto `new_base`
    fn rebase_onto(
        &self,
        worktree: &Path,
        branch: &str,
        new_base: &str,
        old_base: &str,
    ) -> Result<RebaseOutcome>;

    fn is_rebase_in_progress(&self, worktree: &Path) -> bool;

    /// Working directory of the main worktree
    fn root_path(&self) -> &Path;
}

/// Resolve the per-worktree git directory from a workdir path.
/// Handles both normal repos (.git is a directory) and worktrees (.git is a file
/// containing `gitdir: <path>`).
pub fn resolve_git_dir(workdir: &Path) -> Result<PathBuf> {
    let git_path = workdir.join(".git");
    if git_path.is_dir() {
        Ok(git_path)
    } else if git_path.is_file() {
        let content = std::fs::read_to_string(&git_path)
            .map_err(|e| CascadeError::git(format!("Failed to read .git file: {e}")))?;
        let gitdir = content
            .strip_prefix("gitdir: ")
            .map(|s| s.trim())
            .ok_or_else(|| CascadeError::git("Invalid .git file format"))?;
        let resolved = if Path::new(gitdir).is_absolute() {
            PathBuf::from(gitdir)
        } else {
            workdir.join(gitdir)
        };
        Ok(resolved)
    } else {
        Err(CascadeError::git(format!(
            "Not a git repository: {}",
            git_path.display()
        )))
    }
}

/// Whether a rebase is stopped in the worktree at `workdir`
pub fn rebase_in_progress_at(workdir: &Path) -> bool {
    match resolve_git_dir(workdir) {
        Ok(git_dir) => {
            git_dir.join("REBASE_HEAD").exists()
                || git_dir.join("rebase-merge").exists()
                || git_dir.join("rebase-apply").exists()
        }
        Err(_) => false,
    }
}

/// Find the root of the Git repository
pub fn find_repository_root(start_path: &Path) -> Result<PathBuf> {
    let repo = git2::Repository::discover(start_path)?;

    let workdir = repo
        .workdir()
        .ok_or_else(|| CascadeError::git("Repository has no working directory (bare repo?)"))?;

    Ok(workdir.to_path_buf())
}

/// Open the repository containing the current directory
pub fn get_current_repository() -> Result<GitRepository> {
    let current_dir = std::env::current_dir()
        .map_err(|e| CascadeError::git(format!("Could not get current directory: {e}")))?;

    let repo_root = find_repository_root(&current_dir)?;
    GitRepository::open(&repo_root)
}
