//! In-memory [`VersionControl`] used by unit tests.
//!
//! History is a single-parent commit graph; rebases replay commits as fresh
//! ids so ahead/behind and ancestry behave like git for linear stacks.

use super::{RebaseOutcome, VersionControl, WorktreeInfo};
use crate::errors::{CascadeError, Result};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
struct State {
    next_id: usize,
    parents: HashMap<String, Option<String>>,
    refs: BTreeMap<String, String>,
    worktrees: Vec<WorktreeInfo>,
    conflicts: HashSet<String>,
    in_progress: HashSet<PathBuf>,
    fail_remove: bool,
    fail_fetch: bool,
    calls: Vec<String>,
}

impl State {
    fn new_commit(&mut self, parent: Option<String>) -> String {
        self.next_id += 1;
        let id = format!("c{}", self.next_id);
        self.parents.insert(id.clone(), parent);
        id
    }

    fn resolve(&self, reference: &str) -> Result<String> {
        if let Some(id) = self.refs.get(reference) {
            return Ok(id.clone());
        }
        if self.parents.contains_key(reference) {
            return Ok(reference.to_string());
        }
        Err(CascadeError::git(format!("Could not resolve reference '{reference}'")))
    }

    /// `id` and every ancestor, newest first
    fn ancestry(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut cursor = Some(id.to_string());
        while let Some(current) = cursor {
            cursor = self.parents.get(&current).cloned().flatten();
            out.push(current);
        }
        out
    }

    fn only_in(&self, a: &str, b: &str) -> Result<Vec<String>> {
        let base: HashSet<String> = self.ancestry(&self.resolve(b)?).into_iter().collect();
        Ok(self
            .ancestry(&self.resolve(a)?)
            .into_iter()
            .filter(|c| !base.contains(c))
            .collect())
    }

    /// Copy the commits of `branch` not reachable from `upstream` onto `onto`
    fn replay(&mut self, branch: &str, onto: &str, upstream: &str) -> Result<()> {
        let mut commits = self.only_in(branch, upstream)?;
        commits.reverse();
        let mut tip = self.resolve(onto)?;
        for _ in commits {
            tip = self.new_commit(Some(tip));
        }
        self.refs.insert(branch.to_string(), tip);
        Ok(())
    }
}

pub(crate) struct FakeVcs {
    root: PathBuf,
    state: RefCell<State>,
}

impl FakeVcs {
    /// Repository with a single commit on `root_branch` and its `origin/` copy
    pub fn new(root_branch: &str) -> Self {
        let mut state = State::default();
        let initial = state.new_commit(None);
        state.refs.insert(root_branch.to_string(), initial.clone());
        state.refs.insert(format!("origin/{root_branch}"), initial);
        let root = PathBuf::from("/repo");
        state.worktrees.push(WorktreeInfo {
            path: root.clone(),
            branch: Some(root_branch.to_string()),
        });
        Self {
            root,
            state: RefCell::new(state),
        }
    }

    /// Create `branch` at `from` with `commits` new commits and a worktree
    pub fn add_branch(&self, branch: &str, from: &str, commits: usize) -> PathBuf {
        let path = PathBuf::from(format!("/wt/{branch}"));
        self.create_worktree(branch, &path, from)
            .unwrap_or_else(|e| panic!("add_branch {branch}: {e}"));
        self.commit(branch, commits);
        path
    }

    pub fn commit(&self, reference: &str, count: usize) {
        let mut state = self.state.borrow_mut();
        for _ in 0..count {
            let parent = state.refs.get(reference).cloned();
            let id = state.new_commit(parent);
            state.refs.insert(reference.to_string(), id);
        }
    }

    /// Point `target` at a new commit on top of `branch`, as a merge would
    pub fn merge_into(&self, branch: &str, target: &str) {
        let mut state = self.state.borrow_mut();
        let tip = state.refs.get(branch).cloned();
        let id = state.new_commit(tip);
        state.refs.insert(target.to_string(), id);
    }

    /// Point `name` at whatever `target` resolves to
    pub fn set_ref(&self, name: &str, target: &str) {
        let mut state = self.state.borrow_mut();
        let id = state
            .resolve(target)
            .unwrap_or_else(|e| panic!("set_ref {name}: {e}"));
        state.refs.insert(name.to_string(), id);
    }

    /// Forget a local branch without touching worktrees, as a rename elsewhere would
    pub fn drop_ref(&self, name: &str) {
        self.state.borrow_mut().refs.remove(name);
    }

    pub fn add_worktree_entry(&self, path: &Path, branch: &str) {
        self.state.borrow_mut().worktrees.push(WorktreeInfo {
            path: path.to_path_buf(),
            branch: Some(branch.to_string()),
        });
    }

    pub fn set_conflict(&self, branch: &str) {
        self.state.borrow_mut().conflicts.insert(branch.to_string());
    }

    pub fn set_in_progress(&self, worktree: &Path) {
        self.state
            .borrow_mut()
            .in_progress
            .insert(worktree.to_path_buf());
    }

    pub fn fail_remove(&self) {
        self.state.borrow_mut().fail_remove = true;
    }

    pub fn fail_fetch(&self) {
        self.state.borrow_mut().fail_fetch = true;
    }

    pub fn head(&self, reference: &str) -> String {
        self.state
            .borrow()
            .resolve(reference)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Recorded mutating calls, e.g. `rebase feature-b main`
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }
}

impl VersionControl for FakeVcs {
    fn fetch(&self, remote: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("fetch {remote}"));
        if state.fail_fetch {
            return Err(CascadeError::git("network unreachable"));
        }
        Ok(())
    }

    fn current_branch(&self) -> Result<String> {
        let state = self.state.borrow();
        state
            .worktrees
            .iter()
            .find(|w| w.path == self.root)
            .and_then(|w| w.branch.clone())
            .ok_or_else(|| CascadeError::git("detached HEAD"))
    }

    fn branch_exists(&self, name: &str) -> bool {
        !name.contains('/') && self.state.borrow().refs.contains_key(name)
    }

    fn ref_exists(&self, reference: &str) -> bool {
        self.state.borrow().resolve(reference).is_ok()
    }

    fn branch_head(&self, reference: &str) -> Result<String> {
        self.state.borrow().resolve(reference)
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        Ok(self
            .state
            .borrow()
            .refs
            .keys()
            .filter(|name| !name.contains('/'))
            .cloned()
            .collect())
    }

    fn create_worktree(&self, branch: &str, path: &Path, from_ref: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.refs.contains_key(branch) {
            return Err(CascadeError::git(format!("branch '{branch}' already exists")));
        }
        let tip = state.resolve(from_ref)?;
        state.refs.insert(branch.to_string(), tip);
        state.worktrees.push(WorktreeInfo {
            path: path.to_path_buf(),
            branch: Some(branch.to_string()),
        });
        state.calls.push(format!("create_worktree {branch} {from_ref}"));
        Ok(())
    }

    fn remove_worktree(&self, path: &Path, _force: bool, branch: Option<&str>) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("remove_worktree {}", path.display()));
        if state.fail_remove {
            return Err(CascadeError::git("worktree is locked"));
        }
        state.worktrees.retain(|w| w.path != path);
        if let Some(branch) = branch {
            state.refs.remove(branch);
        }
        Ok(())
    }

    fn delete_branch(&self, name: &str, _force: bool) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("delete_branch {name}"));
        state
            .refs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CascadeError::git(format!("branch '{name}' not found")))
    }

    fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>> {
        Ok(self.state.borrow().worktrees.clone())
    }

    fn commits_ahead(&self, branch: &str, base: &str) -> Result<usize> {
        Ok(self.state.borrow().only_in(branch, base)?.len())
    }

    fn commits_behind(&self, branch: &str, base: &str) -> Result<usize> {
        Ok(self.state.borrow().only_in(base, branch)?.len())
    }

    fn is_branch_merged(&self, branch: &str, target: &str) -> Result<bool> {
        let state = self.state.borrow();
        let tip = state.resolve(branch)?;
        Ok(state.ancestry(&state.resolve(target)?).contains(&tip))
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        let state = self.state.borrow();
        let theirs: HashSet<String> = state.ancestry(&state.resolve(b)?).into_iter().collect();
        state
            .ancestry(&state.resolve(a)?)
            .into_iter()
            .find(|c| theirs.contains(c))
            .ok_or_else(|| CascadeError::git(format!("no merge base for {a} and {b}")))
    }

    fn rebase(&self, worktree: &Path, branch: &str, onto: &str) -> Result<RebaseOutcome> {
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("rebase {branch} {onto}"));
        if state.conflicts.contains(branch) {
            state.in_progress.insert(worktree.to_path_buf());
            return Ok(RebaseOutcome::Conflict);
        }
        state.replay(branch, onto, onto)?;
        Ok(RebaseOutcome::Success)
    }

    fn rebase_onto(
        &self,
        worktree: &Path,
        branch: &str,
        new_base: &str,
        old_base: &str,
    ) -> Result<RebaseOutcome> {
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("rebase_onto {branch} {new_base}"));
        if state.conflicts.contains(branch) {
            state.in_progress.insert(worktree.to_path_buf());
            return Ok(RebaseOutcome::Conflict);
        }
        state.replay(branch, new_base, old_base)?;
        Ok(RebaseOutcome::Success)
    }

    fn is_rebase_in_progress(&self, worktree: &Path) -> bool {
        self.state.borrow().in_progress.contains(worktree)
    }

    fn root_path(&self) -> &Path {
        &self.root
    }
}
