use super::{rebase_in_progress_at, RebaseOutcome, VersionControl, WorktreeInfo};
use crate::errors::{CascadeError, Result};
use git2::{BranchType, Oid, Repository};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, info, warn};

/// Git access for one repository.
///
/// Object-graph queries go through libgit2; worktree and rebase operations
/// shell out to the git CLI, which owns the on-disk rebase state.
pub struct GitRepository {
    repo: Repository,
    path: PathBuf,
}

impl GitRepository {
    /// Open a Git repository at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .map_err(|e| CascadeError::git(format!("Not a git repository: {}", e.message())))?;

        // Linked worktrees report their own workdir; always anchor on the main one
        let workdir = if repo.is_worktree() {
            repo.commondir()
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| CascadeError::git("Could not locate the main worktree"))?
        } else {
            repo.workdir()
                .ok_or_else(|| CascadeError::git("Repository has no working directory"))?
                .to_path_buf()
        };

        Ok(Self {
            repo,
            path: workdir,
        })
    }

    /// Resolve a reference (branch name, remote ref, or commit hash) to a commit id
    fn resolve(&self, reference: &str) -> Result<Oid> {
        if let Ok(oid) = Oid::from_str(reference) {
            if self.repo.find_commit(oid).is_ok() {
                return Ok(oid);
            }
        }

        let object = self.repo.revparse_single(reference).map_err(|e| {
            CascadeError::git(format!(
                "Could not resolve reference '{}': {}",
                reference,
                e.message()
            ))
        })?;

        object.peel_to_commit().map(|c| c.id()).map_err(|e| {
            CascadeError::git(format!(
                "Reference '{}' does not point to a commit: {}",
                reference,
                e.message()
            ))
        })
    }

    fn git(&self, dir: &Path, args: &[&str]) -> Result<Output> {
        debug!("git -C {} {}", dir.display(), args.join(" "));
        Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .map_err(|e| CascadeError::git(format!("Failed to run git: {e}")))
    }

    /// Run git and fail with its stderr when it exits non-zero
    fn git_checked(&self, dir: &Path, args: &[&str]) -> Result<Output> {
        let output = self.git(dir, args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CascadeError::git(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )));
        }
        Ok(output)
    }

    /// Branch checked out in `dir`, or the commit id when detached
    fn checked_out(&self, dir: &Path) -> Option<String> {
        let symbolic = self.git(dir, &["symbolic-ref", "--quiet", "--short", "HEAD"]).ok()?;
        let output = if symbolic.status.success() {
            symbolic
        } else {
            self.git_checked(dir, &["rev-parse", "HEAD"]).ok()?
        };
        let head = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!head.is_empty()).then_some(head)
    }

    /// `git rebase <upstream> <branch>` leaves `branch` checked out in `worktree`
    fn run_rebase(&self, worktree: &Path, branch: &str, args: &[&str]) -> Result<RebaseOutcome> {
        let previous = self.checked_out(worktree).filter(|head| head != branch);

        let output = self.git(worktree, args)?;
        if output.status.success() {
            if let Some(previous) = previous {
                match self.git_checked(worktree, &["checkout", "--quiet", &previous]) {
                    Ok(_) => debug!("Checked '{}' back out in {}", previous, worktree.display()),
                    Err(e) => warn!(
                        "'{}' is left checked out in {}; could not return to '{}': {}",
                        branch,
                        worktree.display(),
                        previous,
                        e
                    ),
                }
            }
            return Ok(RebaseOutcome::Success);
        }

        if rebase_in_progress_at(worktree) {
            if let Some(previous) = previous {
                warn!(
                    "'{}' stays checked out in {} until its rebase is resolved; '{}' was checked out before",
                    branch,
                    worktree.display(),
                    previous
                );
            }
            return Ok(RebaseOutcome::Conflict);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(RebaseOutcome::Failed(stderr.trim().to_string()))
    }
}

impl VersionControl for GitRepository {
    fn fetch(&self, remote: &str) -> Result<()> {
        info!("Fetching from {}", remote);

        let mut handle = self
            .repo
            .find_remote(remote)
            .map_err(|e| CascadeError::git(format!("No remote '{}' found: {}", remote, e.message())))?;

        handle.fetch::<&str>(&[], None, None)?;

        debug!("Fetch completed successfully");
        Ok(())
    }

    fn current_branch(&self) -> Result<String> {
        let head = self.repo.head()?;
        head.shorthand()
            .map(str::to_string)
            .ok_or_else(|| CascadeError::git("HEAD is not a valid UTF-8 branch name"))
    }

    fn branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, BranchType::Local).is_ok()
    }

    fn ref_exists(&self, reference: &str) -> bool {
        self.resolve(reference).is_ok()
    }

    fn branch_head(&self, reference: &str) -> Result<String> {
        Ok(self.resolve(reference)?.to_string())
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for branch in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn create_worktree(&self, branch: &str, path: &Path, from_ref: &str) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.git_checked(
            &self.path,
            &["worktree", "add", "-b", branch, &path_str, from_ref],
        )?;
        info!("Created worktree for '{}' at {}", branch, path.display());
        Ok(())
    }

    fn remove_worktree(&self, path: &Path, force: bool, branch: Option<&str>) -> Result<()> {
        if path.exists() {
            let path_str = path.to_string_lossy();
            let mut args = vec!["worktree", "remove"];
            if force {
                args.push("--force");
            }
            args.push(path_str.as_ref());
            self.git_checked(&self.path, &args)?;
        } else {
            // Directory already gone; drop git's stale bookkeeping
            self.git_checked(&self.path, &["worktree", "prune"])?;
        }

        if let Some(branch) = branch {
            if self.branch_exists(branch) {
                self.delete_branch(branch, force)?;
            }
        }
        Ok(())
    }

    fn delete_branch(&self, name: &str, force: bool) -> Result<()> {
        let flag = if force { "-D" } else { "-d" };
        self.git_checked(&self.path, &["branch", flag, name])?;
        info!("Deleted branch '{}'", name);
        Ok(())
    }

    fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>> {
        let output = self.git_checked(&self.path, &["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn commits_ahead(&self, branch: &str, base: &str) -> Result<usize> {
        let (ahead, _) = self
            .repo
            .graph_ahead_behind(self.resolve(branch)?, self.resolve(base)?)?;
        Ok(ahead)
    }

    fn commits_behind(&self, branch: &str, base: &str) -> Result<usize> {
        let (_, behind) = self
            .repo
            .graph_ahead_behind(self.resolve(branch)?, self.resolve(base)?)?;
        Ok(behind)
    }

    fn is_branch_merged(&self, branch: &str, target: &str) -> Result<bool> {
        let branch_oid = self.resolve(branch)?;
        let target_oid = self.resolve(target)?;
        if branch_oid == target_oid {
            return Ok(true);
        }
        Ok(self.repo.graph_descendant_of(target_oid, branch_oid)?)
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        let oid = self.repo.merge_base(self.resolve(a)?, self.resolve(b)?)?;
        Ok(oid.to_string())
    }

    fn rebase(&self, worktree: &Path, branch: &str, onto: &str) -> Result<RebaseOutcome> {
        info!("Rebasing '{}' onto '{}'", branch, onto);
        self.run_rebase(worktree, branch, &["rebase", onto, branch])
    }

    fn rebase_onto(
        &self,
        worktree: &Path,
        branch: &str,
        new_base: &str,
        old_base: &str,
    ) -> Result<RebaseOutcome> {
        info!(
            "Rebasing '{}' onto '{}' (upstream {})",
            branch, new_base, old_base
        );
        self.run_rebase(worktree, branch, &["rebase", "--onto", new_base, old_base, branch])
    }

    fn is_rebase_in_progress(&self, worktree: &Path) -> bool {
        rebase_in_progress_at(worktree)
    }

    fn root_path(&self) -> &Path {
        &self.path
    }
}

/// Parse `git worktree list --porcelain`
fn parse_worktree_list(output: &str) -> Vec<WorktreeInfo> {
    let mut worktrees = Vec::new();
    let mut current: Option<WorktreeInfo> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(done) = current.take() {
                worktrees.push(done);
            }
            current = Some(WorktreeInfo {
                path: PathBuf::from(path),
                branch: None,
            });
        } else if let Some(reference) = line.strip_prefix("branch ") {
            if let Some(wt) = current.as_mut() {
                wt.branch = Some(
                    reference
                        .strip_prefix("refs/heads/")
                        .unwrap_or(reference)
                        .to_string(),
                );
            }
        }
    }

    worktrees.extend(current);
    worktrees
}
