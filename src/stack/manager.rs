use super::cache::BranchEntry;
use super::stack::{sort_topologically, unique_stack_hash, Branch, Stack};
use crate::config::Settings;
use crate::errors::{CascadeError, Result};
use crate::git::{RebaseOutcome, VersionControl};
use crate::store::{RepoState, Store};
use crate::utils::paths;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Lifecycle operations on the stacks of one repository.
///
/// Every mutating call loads the store, changes it in memory, recomputes the
/// flattened views and saves it atomically. Validation errors are raised
/// before anything is written.
pub struct StackManager<G: VersionControl> {
    vcs: G,
    store: Store,
    settings: Settings,
    repo_key: String,
}

impl<G: VersionControl> StackManager<G> {
    pub fn new(vcs: G, store: Store, settings: Settings) -> Self {
        let repo_key = paths::normalize(vcs.root_path())
            .to_string_lossy()
            .into_owned();
        Self {
            vcs,
            store,
            settings,
            repo_key,
        }
    }

    pub fn vcs(&self) -> &G {
        &self.vcs
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Key of this repository in the store
    pub fn repo_key(&self) -> &str {
        &self.repo_key
    }

    /// Current state of this repository, views refreshed
    pub fn snapshot(&self) -> Result<RepoState> {
        let document = self.store.load()?;
        let mut repo = document.repo(&self.repo_key).cloned().unwrap_or_default();
        repo.refresh();
        Ok(repo)
    }

    /// Load, apply `mutate`, refresh and save. Nothing is saved if `mutate` fails.
    pub(crate) fn update<T>(&self, mutate: impl FnOnce(&mut RepoState) -> Result<T>) -> Result<T> {
        let mut document = self.store.load()?;
        let repo = document.repo_mut(&self.repo_key);
        repo.refresh();
        let out = mutate(repo)?;
        repo.refresh();
        self.store.save(&mut document)?;
        Ok(out)
    }

    /// `<remote>/<root>` when the remote-tracking ref exists, else the local root
    pub fn upstream_ref(&self, root: &str) -> String {
        let upstream = format!("{}/{}", self.settings.git.remote, root);
        if self.vcs.ref_exists(&upstream) {
            upstream
        } else {
            root.to_string()
        }
    }

    /// Ref git operations should use for `branch`
    pub(crate) fn ref_for(&self, repo: &RepoState, branch: &str) -> String {
        if !repo.is_tracked(branch) {
            return self.upstream_ref(branch);
        }
        if repo.branches.is_remote(branch) && !self.vcs.branch_exists(branch) {
            return format!("{}/{}", self.settings.git.remote, branch);
        }
        branch.to_string()
    }

    fn validate_parent(&self, repo: &RepoState, parent: &str) -> Result<()> {
        if repo.is_tracked(parent)
            || self.vcs.branch_exists(parent)
            || self
                .vcs
                .ref_exists(&format!("{}/{}", self.settings.git.remote, parent))
        {
            Ok(())
        } else {
            Err(CascadeError::not_found(format!("Parent branch '{parent}'")))
        }
    }

    fn ensure_untracked(repo: &RepoState, name: &str) -> Result<()> {
        if repo.is_tracked(name) {
            return Err(CascadeError::AlreadyTracked(name.to_string()));
        }
        Ok(())
    }

    /// Create `name` on top of `parent` (default branch when `None`) in a new worktree
    pub fn create_branch(&self, name: &str, parent: Option<&str>) -> Result<Branch> {
        let parent = parent.unwrap_or(&self.settings.git.default_branch).to_string();

        self.update(|repo| {
            Self::ensure_untracked(repo, name)?;
            self.validate_parent(repo, &parent)?;
            if self.vcs.branch_exists(name) {
                return Err(CascadeError::git(format!(
                    "Branch '{name}' already exists; track it instead"
                )));
            }

            let worktree = self
                .settings
                .worktree_base_dir()?
                .join(paths::sanitize_filename(name));
            if worktree.exists() {
                return Err(CascadeError::config(format!(
                    "Worktree path {} already exists",
                    worktree.display()
                )));
            }

            let from_ref = self.ref_for(repo, &parent);
            self.vcs.create_worktree(name, &worktree, &from_ref)?;

            attach(repo, name, &parent, BranchEntry::local(Some(worktree)));
            info!("Created branch '{}' on '{}'", name, parent);
            Ok(())
        })?;

        self.expect_branch(name)
    }

    /// Start tracking an existing local branch without touching git
    pub fn register_branch(
        &self,
        name: &str,
        parent: &str,
        worktree: Option<PathBuf>,
    ) -> Result<Branch> {
        self.update(|repo| {
            Self::ensure_untracked(repo, name)?;
            self.validate_parent(repo, parent)?;
            if !self.vcs.branch_exists(name) {
                return Err(CascadeError::not_found(format!("Branch '{name}'")));
            }

            let worktree = match worktree {
                Some(path) => Some(path),
                None => self.worktree_of(name)?,
            };

            attach(repo, name, parent, BranchEntry::local(worktree));
            info!("Tracking branch '{}' on '{}'", name, parent);
            Ok(())
        })?;

        self.expect_branch(name)
    }

    /// Track a collaborator's branch that has no local worktree
    pub fn register_remote_branch(
        &self,
        name: &str,
        parent: &str,
        pr_number: Option<u64>,
        pr_url: Option<String>,
    ) -> Result<Branch> {
        self.update(|repo| {
            Self::ensure_untracked(repo, name)?;
            self.validate_parent(repo, parent)?;
            attach(repo, name, parent, BranchEntry::remote(pr_number, pr_url));
            info!("Tracking remote branch '{}' on '{}'", name, parent);
            Ok(())
        })?;

        self.expect_branch(name)
    }

    /// Delete `name`: worktree and local branch first, then tracking.
    ///
    /// Without `force` a branch with children is refused. Children move up to
    /// the deleted branch's parent.
    pub fn delete_branch(&self, name: &str, force: bool) -> Result<()> {
        self.update(|repo| {
            check_deletable(repo, name, force)?;

            let entry = repo.branches.get(name).cloned().unwrap_or_default();
            if !entry.is_remote && self.vcs.branch_exists(name) {
                match &entry.worktree_path {
                    Some(path) => self.vcs.remove_worktree(path, force, Some(name))?,
                    None => self.vcs.delete_branch(name, force)?,
                }
            } else {
                debug!("Branch '{}' has no local branch to remove", name);
            }

            forget(repo, name);
            info!("Deleted branch '{}'", name);
            Ok(())
        })
    }

    /// Stop tracking `name` without any git action
    pub fn untrack_branch(&self, name: &str) -> Result<()> {
        self.update(|repo| {
            if !repo.is_tracked(name) {
                return Err(CascadeError::not_found(format!("Branch '{name}' is not tracked")));
            }
            forget(repo, name);
            info!("Untracked branch '{}'", name);
            Ok(())
        })
    }

    /// Flag `name` merged and clean up its worktree on a best-effort basis.
    ///
    /// The tree node stays so children keep their display anchor.
    pub fn mark_merged(&self, name: &str) -> Result<()> {
        self.update(|repo| {
            if !repo.is_tracked(name) {
                return Err(CascadeError::not_found(format!("Branch '{name}' is not tracked")));
            }

            let entry = repo.branches.entry_or_default(name);
            entry.is_merged = true;
            let worktree = entry.worktree_path.take();
            let is_remote = entry.is_remote;

            if !is_remote {
                let cleanup = match &worktree {
                    Some(path) => self.vcs.remove_worktree(path, true, Some(name)),
                    None if self.vcs.branch_exists(name) => self.vcs.delete_branch(name, true),
                    None => Ok(()),
                };
                if let Err(e) = cleanup {
                    warn!("Could not clean up merged branch '{}': {}", name, e);
                }
            }

            info!("Marked branch '{}' as merged", name);
            Ok(())
        })
    }

    /// Flag branches merged in the cache only; worktrees are left alone
    pub fn record_merged(&self, names: &[String]) -> Result<()> {
        self.update(|repo| {
            for name in names {
                if !repo.is_tracked(name) {
                    warn!("Ignoring merged status for untracked branch '{}'", name);
                    continue;
                }
                repo.branches.entry_or_default(name).is_merged = true;
                debug!("Recorded '{}' as merged", name);
            }
            Ok(())
        })
    }

    pub fn set_pull_request(&self, name: &str, number: u64, url: Option<String>) -> Result<()> {
        self.update(|repo| {
            if !repo.is_tracked(name) {
                return Err(CascadeError::not_found(format!("Branch '{name}' is not tracked")));
            }
            let entry = repo.branches.entry_or_default(name);
            entry.pr_number = Some(number);
            entry.pr_url = url;
            info!("Linked branch '{}' to pull request #{}", name, number);
            Ok(())
        })
    }

    /// Move `name` (with its descendants) under `new_parent`.
    ///
    /// An untracked `name` is adopted. With `rebase`, only the branch's own
    /// commits are replayed onto the new parent; a conflict aborts the move.
    pub fn reparent_branch(&self, name: &str, new_parent: &str, rebase: bool) -> Result<Branch> {
        self.update(|repo| {
            self.validate_parent(repo, new_parent)?;
            if name == new_parent {
                return Err(CascadeError::CycleDetected {
                    branch: name.to_string(),
                    new_parent: new_parent.to_string(),
                });
            }

            if !repo.is_tracked(name) {
                return self.adopt(repo, name, new_parent, rebase);
            }

            if creates_cycle(repo, name, new_parent) {
                return Err(CascadeError::CycleDetected {
                    branch: name.to_string(),
                    new_parent: new_parent.to_string(),
                });
            }

            if rebase {
                self.rebase_for_move(repo, name, new_parent)?;
            }

            move_in_tree(repo, name, new_parent)?;
            info!("Moved branch '{}' onto '{}'", name, new_parent);
            Ok(())
        })?;

        self.expect_branch(name)
    }

    fn adopt(&self, repo: &mut RepoState, name: &str, new_parent: &str, rebase: bool) -> Result<()> {
        if !self.vcs.branch_exists(name) {
            return Err(CascadeError::not_found(format!("Branch '{name}'")));
        }
        let worktree = self.worktree_of(name)?;

        if rebase {
            let onto = self.ref_for(repo, new_parent);
            let dir = worktree.clone().unwrap_or_else(|| self.vcs.root_path().to_path_buf());
            check_rebase(name, &dir, self.vcs.rebase(&dir, name, &onto)?)?;
        }

        attach(repo, name, new_parent, BranchEntry::local(worktree));
        info!("Adopted branch '{}' onto '{}'", name, new_parent);
        Ok(())
    }

    fn rebase_for_move(&self, repo: &RepoState, name: &str, new_parent: &str) -> Result<()> {
        let view = repo
            .branch(name)
            .ok_or_else(|| CascadeError::not_found(format!("Branch '{name}'")))?;
        if view.is_remote || view.is_merged {
            warn!("Not rebasing '{}': it has no local history to move", name);
            return Ok(());
        }

        let old_ref = self.ref_for(repo, &view.parent);
        let new_ref = self.ref_for(repo, new_parent);
        let merge_base = self.vcs.merge_base(name, &old_ref)?;
        let dir = view
            .worktree_path
            .clone()
            .unwrap_or_else(|| self.vcs.root_path().to_path_buf());

        let outcome = self.vcs.rebase_onto(&dir, name, &new_ref, &merge_base)?;
        check_rebase(name, &dir, outcome)
    }

    /// Whether putting `branch` under `new_parent` would make it its own ancestor
    pub fn would_create_cycle(&self, branch: &str, new_parent: &str) -> Result<bool> {
        Ok(creates_cycle(&self.snapshot()?, branch, new_parent))
    }

    pub fn stacks(&self) -> Result<Vec<Stack>> {
        Ok(self.snapshot()?.stacks.into_values().collect())
    }

    pub fn stack(&self, hash: &str) -> Result<Option<Stack>> {
        Ok(self.snapshot()?.stacks.remove(hash))
    }

    pub fn stack_for_branch(&self, name: &str) -> Result<Option<Stack>> {
        Ok(self.snapshot()?.stack_for_branch(name).cloned())
    }

    pub fn branch(&self, name: &str) -> Result<Option<Branch>> {
        Ok(self.snapshot()?.branch(name).cloned())
    }

    pub fn is_tracked(&self, name: &str) -> Result<bool> {
        Ok(self.snapshot()?.is_tracked(name))
    }

    /// Every tracked branch, ordered so each follows its ancestor
    pub fn display_branches(&self) -> Result<Vec<Branch>> {
        let repo = self.snapshot()?;
        let all: Vec<Branch> = repo.all_branches().cloned().collect();
        Ok(sort_topologically(&all))
    }

    fn expect_branch(&self, name: &str) -> Result<Branch> {
        self.branch(name)?
            .ok_or_else(|| CascadeError::not_found(format!("Branch '{name}'")))
    }

    fn worktree_of(&self, branch: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .vcs
            .list_worktrees()?
            .into_iter()
            .find(|w| w.branch.as_deref() == Some(branch))
            .map(|w| w.path))
    }
}

/// Insert into the parent's stack, or start a new stack rooted at `parent`
fn attach(repo: &mut RepoState, name: &str, parent: &str, entry: BranchEntry) {
    match repo.stack_for_branch_mut(parent) {
        Some(stack) => {
            let root = stack.root.clone();
            stack.tree.add(name, parent, &root);
        }
        None => {
            let hash = unique_stack_hash(parent, name, |h| repo.stacks.contains_key(h));
            let mut stack = Stack::new(name.to_string(), hash.clone(), parent.to_string());
            stack.tree.add(name, parent, parent);
            debug!("Started stack '{}' ({}) on '{}'", name, hash, parent);
            repo.stacks.insert(hash, stack);
        }
    }
    repo.branches.set(name, entry);
}

fn check_deletable(repo: &RepoState, name: &str, force: bool) -> Result<()> {
    let stack = repo
        .stack_for_branch(name)
        .ok_or_else(|| CascadeError::not_found(format!("Branch '{name}' is not tracked")))?;

    let children = stack.tree.children(name, &stack.root);
    if !children.is_empty() && !force {
        return Err(CascadeError::HasChildren {
            branch: name.to_string(),
            children,
        });
    }
    Ok(())
}

/// Drop `name` from its tree and the cache; empty stacks go too
pub(crate) fn forget(repo: &mut RepoState, name: &str) {
    if let Some(hash) = repo.stack_hash_for(name) {
        if let Some(stack) = repo.stacks.get_mut(&hash) {
            stack.tree.remove(name);
            if stack.is_empty() {
                debug!("Stack '{}' is empty, removing it", stack.name);
                repo.stacks.remove(&hash);
            }
        }
    }
    repo.branches.remove(name);
}

/// Walk up the structural parents of `new_parent` looking for `branch`
fn creates_cycle(repo: &RepoState, branch: &str, new_parent: &str) -> bool {
    let mut visited = HashSet::new();
    let mut current = new_parent.to_string();

    loop {
        if current == branch {
            return true;
        }
        if !visited.insert(current.clone()) {
            return false;
        }
        match repo.branch(&current) {
            Some(view) => current = view.base_branch.clone(),
            None => return false,
        }
    }
}

fn move_in_tree(repo: &mut RepoState, name: &str, new_parent: &str) -> Result<()> {
    let source = repo
        .stack_hash_for(name)
        .ok_or_else(|| CascadeError::not_found(format!("Branch '{name}' is not tracked")))?;
    let target = repo.stack_hash_for(new_parent);

    let same_stack = match &target {
        Some(hash) => *hash == source,
        None => repo
            .stacks
            .get(&source)
            .is_some_and(|stack| stack.root == new_parent),
    };

    if same_stack {
        let stack = repo
            .stacks
            .get_mut(&source)
            .ok_or_else(|| CascadeError::not_found(format!("Stack {source}")))?;
        let root = stack.root.clone();
        if !stack.tree.reparent(name, new_parent, &root) {
            return Err(CascadeError::CycleDetected {
                branch: name.to_string(),
                new_parent: new_parent.to_string(),
            });
        }
        return Ok(());
    }

    let subtree = repo
        .stacks
        .get_mut(&source)
        .and_then(|stack| stack.tree.extract_subtree(name))
        .ok_or_else(|| CascadeError::not_found(format!("Branch '{name}' in stack {source}")))?;

    match target {
        Some(hash) => {
            if let Some(stack) = repo.stacks.get_mut(&hash) {
                let root = stack.root.clone();
                stack.tree.add_subtree(name, subtree, new_parent, &root);
            }
        }
        None => {
            // New base branch: the subtree becomes its own stack
            let hash = unique_stack_hash(new_parent, name, |h| repo.stacks.contains_key(h));
            let mut stack = Stack::new(name.to_string(), hash.clone(), new_parent.to_string());
            stack.tree.add_subtree(name, subtree, new_parent, new_parent);
            repo.stacks.insert(hash, stack);
        }
    }

    if repo.stacks.get(&source).is_some_and(Stack::is_empty) {
        debug!("Source stack {} is empty after move, removing it", source);
        repo.stacks.remove(&source);
    }
    Ok(())
}

fn check_rebase(branch: &str, worktree: &Path, outcome: RebaseOutcome) -> Result<()> {
    match outcome {
        RebaseOutcome::Success => Ok(()),
        RebaseOutcome::Conflict => Err(CascadeError::RebaseConflict {
            branch: branch.to_string(),
            worktree: worktree.to_path_buf(),
        }),
        RebaseOutcome::Failed(message) => Err(CascadeError::rebase(message)),
    }
}
