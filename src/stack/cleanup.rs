//! Reconciling tracked branches with what git actually has.
//!
//! A branch renamed outside the tool leaves a tracked name with no git branch
//! and a worktree whose branch nobody tracks; both sides are matched by path.
//! Tracked branches whose git branch or worktree is simply gone are orphans.

use super::manager::{forget, StackManager};
use crate::errors::Result;
use crate::git::VersionControl;
use crate::store::RepoState;
use crate::utils::paths;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameCandidate {
    pub old_name: String,
    pub new_name: String,
    pub worktree_path: PathBuf,
    pub stack_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanReason {
    BranchMissing,
    WorktreeMissing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanCandidate {
    pub branch: String,
    pub stack_hash: String,
    pub reason: OrphanReason,
}

/// What `repair` found (and, unless `dry_run`, fixed)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub renames: Vec<RenameCandidate>,
    pub orphans: Vec<OrphanCandidate>,
    pub dry_run: bool,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.renames.is_empty() && self.orphans.is_empty()
    }
}

impl<G: VersionControl> StackManager<G> {
    pub fn detect_renames(&self) -> Result<Vec<RenameCandidate>> {
        let repo = self.snapshot()?;
        self.rename_candidates(&repo)
    }

    fn rename_candidates(&self, repo: &RepoState) -> Result<Vec<RenameCandidate>> {
        let local = self.local_branches()?;
        let untracked: HashMap<PathBuf, String> = self
            .vcs()
            .list_worktrees()?
            .into_iter()
            .filter_map(|wt| {
                let branch = wt.branch?;
                (!repo.is_tracked(&branch)).then(|| (paths::normalize(&wt.path), branch))
            })
            .collect();

        let mut candidates = Vec::new();
        for branch in repo.all_branches() {
            if branch.is_merged || branch.is_remote || local.contains(&branch.name) {
                continue;
            }
            let Some(path) = &branch.worktree_path else {
                continue;
            };
            if let Some(new_name) = untracked.get(&paths::normalize(path)) {
                candidates.push(RenameCandidate {
                    old_name: branch.name.clone(),
                    new_name: new_name.clone(),
                    worktree_path: path.clone(),
                    stack_hash: branch.stack_hash.clone(),
                });
            }
        }
        Ok(candidates)
    }

    /// Rename tree nodes and cache entries in place; stack hashes never change
    pub fn apply_renames(&self, renames: &[RenameCandidate]) -> Result<usize> {
        self.update(|repo| {
            let mut applied = 0;
            for rename in renames {
                if repo.is_tracked(&rename.new_name) {
                    warn!(
                        "Skipping rename of '{}': '{}' is already tracked",
                        rename.old_name, rename.new_name
                    );
                    continue;
                }
                let Some(stack) = repo.stacks.get_mut(&rename.stack_hash) else {
                    warn!("Stack {} vanished before rename", rename.stack_hash);
                    continue;
                };
                if !stack.tree.rename(&rename.old_name, &rename.new_name) {
                    continue;
                }
                if stack.name == rename.old_name {
                    stack.name = rename.new_name.clone();
                }
                repo.branches.rename(&rename.old_name, &rename.new_name);
                info!("Renamed '{}' to '{}'", rename.old_name, rename.new_name);
                applied += 1;
            }
            Ok(applied)
        })
    }

    /// Tracked local branches whose git branch or worktree directory is gone
    pub fn find_orphans(&self) -> Result<Vec<OrphanCandidate>> {
        let repo = self.snapshot()?;
        self.orphan_candidates(&repo)
    }

    fn local_branches(&self) -> Result<HashSet<String>> {
        Ok(self.vcs().list_branches()?.into_iter().collect())
    }

    fn orphan_candidates(&self, repo: &RepoState) -> Result<Vec<OrphanCandidate>> {
        let local = self.local_branches()?;
        let orphans = repo
            .all_branches()
            .filter(|b| !b.is_merged && !b.is_remote)
            .filter_map(|b| {
                let reason = if !local.contains(&b.name) {
                    OrphanReason::BranchMissing
                } else if b.worktree_path.as_ref().is_some_and(|p| !p.exists()) {
                    OrphanReason::WorktreeMissing
                } else {
                    return None;
                };
                Some(OrphanCandidate {
                    branch: b.name.clone(),
                    stack_hash: b.stack_hash.clone(),
                    reason,
                })
            })
            .collect();
        Ok(orphans)
    }

    /// Forget every orphan; children move up to the orphan's parent
    pub fn remove_orphans(&self) -> Result<Vec<OrphanCandidate>> {
        self.update(|repo| {
            let orphans = self.orphan_candidates(repo)?;
            for orphan in &orphans {
                forget(repo, &orphan.branch);
                info!("Removed orphaned branch '{}' ({:?})", orphan.branch, orphan.reason);
            }
            Ok(orphans)
        })
    }

    /// Resolve renames first, then drop what is still orphaned
    pub fn repair(&self, dry_run: bool) -> Result<RepairReport> {
        if dry_run {
            let repo = self.snapshot()?;
            let renames = self.rename_candidates(&repo)?;
            let renamed: HashSet<&str> = renames.iter().map(|r| r.old_name.as_str()).collect();
            let orphans = self
                .orphan_candidates(&repo)?
                .into_iter()
                .filter(|o| !renamed.contains(o.branch.as_str()))
                .collect();
            return Ok(RepairReport {
                renames,
                orphans,
                dry_run,
            });
        }

        let renames = self.detect_renames()?;
        if !renames.is_empty() {
            self.apply_renames(&renames)?;
        }
        let orphans = self.remove_orphans()?;

        Ok(RepairReport {
            renames,
            orphans,
            dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::testing::fixture;
    use std::fs;

    /// Branch tracked with a real directory as its worktree
    fn tracked_with_dir(f: &crate::stack::testing::Fixture, name: &str, parent: &str) -> PathBuf {
        let path = f.dir.path().join(format!("wt-{name}"));
        fs::create_dir_all(&path).unwrap();
        f.manager.vcs().add_branch(name, "main", 0);
        f.manager
            .register_branch(name, parent, Some(path.clone()))
            .unwrap();
        path
    }

    #[test]
    fn test_rename_detected_and_applied() {
        let f = fixture();
        let path = tracked_with_dir(&f, "feature", "main");
        tracked_with_dir(&f, "child", "feature");
        let hash = f.manager.branch("feature").unwrap().unwrap().stack_hash;

        // Renamed outside the tool: old ref gone, same worktree on the new name
        f.manager.vcs().drop_ref("feature");
        f.manager.vcs().commit("feature-v2", 1);
        f.manager.vcs().add_worktree_entry(&path, "feature-v2");

        let renames = f.manager.detect_renames().unwrap();
        assert_eq!(renames.len(), 1);
        assert_eq!(renames[0].old_name, "feature");
        assert_eq!(renames[0].new_name, "feature-v2");

        assert_eq!(f.manager.apply_renames(&renames).unwrap(), 1);
        let stack = f.manager.stack(&hash).unwrap().unwrap();
        assert_eq!(stack.name, "feature-v2");
        assert_eq!(stack.tree.children("feature-v2", "main"), vec!["child"]);

        let renamed = f.manager.branch("feature-v2").unwrap().unwrap();
        assert_eq!(renamed.worktree_path, Some(path));
        assert!(!f.manager.is_tracked("feature").unwrap());
    }

    #[test]
    fn test_orphans_found_and_removed() {
        let f = fixture();
        tracked_with_dir(&f, "gone", "main");
        let missing_dir = tracked_with_dir(&f, "no-dir", "gone");
        tracked_with_dir(&f, "fine", "no-dir");
        f.manager
            .register_remote_branch("theirs", "main", Some(3), None)
            .unwrap();

        f.manager.vcs().drop_ref("gone");
        fs::remove_dir_all(&missing_dir).unwrap();

        let orphans = f.manager.find_orphans().unwrap();
        let reasons: Vec<_> = orphans.iter().map(|o| (o.branch.as_str(), o.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                ("gone", OrphanReason::BranchMissing),
                ("no-dir", OrphanReason::WorktreeMissing)
            ]
        );

        f.manager.remove_orphans().unwrap();
        assert!(!f.manager.is_tracked("gone").unwrap());
        assert!(f.manager.is_tracked("theirs").unwrap());
        assert_eq!(f.manager.branch("fine").unwrap().unwrap().parent, "main");
    }

    #[test]
    fn test_repair_dry_run_changes_nothing() {
        let f = fixture();
        let path = tracked_with_dir(&f, "old", "main");
        tracked_with_dir(&f, "lost", "main");
        f.manager.vcs().drop_ref("old");
        f.manager.vcs().commit("new", 1);
        f.manager.vcs().add_worktree_entry(&path, "new");
        f.manager.vcs().drop_ref("lost");

        let report = f.manager.repair(true).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.renames.len(), 1);
        assert_eq!(report.orphans.len(), 1);
        assert_eq!(report.orphans[0].branch, "lost");
        assert!(f.manager.is_tracked("old").unwrap());

        let applied = f.manager.repair(false).unwrap();
        assert_eq!(applied.renames.len(), 1);
        assert!(f.manager.is_tracked("new").unwrap());
        assert!(!f.manager.is_tracked("lost").unwrap());
        assert!(f.manager.repair(true).unwrap().is_clean());
    }
}
