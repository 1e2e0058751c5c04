use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Per-branch metadata, independent of where the branch sits in a tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchEntry {
    /// Local checkout of the branch; `None` for remote and merged branches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    /// Merged upstream; kept only to anchor ordering and display
    #[serde(default)]
    pub is_merged: bool,
    /// Someone else's branch with no local worktree
    #[serde(default)]
    pub is_remote: bool,
}

impl BranchEntry {
    /// Entry for a branch checked out in a local worktree
    pub fn local(worktree_path: Option<PathBuf>) -> Self {
        Self {
            worktree_path,
            ..Default::default()
        }
    }

    /// Entry for a collaborator's branch known only through its PR
    pub fn remote(pr_number: Option<u64>, pr_url: Option<String>) -> Self {
        Self {
            pr_number,
            pr_url,
            is_remote: true,
            ..Default::default()
        }
    }
}

/// Branch metadata for one repository, keyed by branch name.
///
/// This is the only home of merged/remote flags, worktree paths and PR
/// linkage; renaming or merging a branch never touches tree structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchCache {
    entries: BTreeMap<String, BranchEntry>,
}

impl BranchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&BranchEntry> {
        self.entries.get(name)
    }

    /// Entry for `name`, created empty if the branch has no metadata yet
    pub fn entry_or_default(&mut self, name: &str) -> &mut BranchEntry {
        self.entries.entry(name.to_string()).or_default()
    }

    pub fn set(&mut self, name: &str, entry: BranchEntry) {
        self.entries.insert(name.to_string(), entry);
    }

    pub fn remove(&mut self, name: &str) -> Option<BranchEntry> {
        self.entries.remove(name)
    }

    /// Move an entry to a new key, replacing anything already there
    pub fn rename(&mut self, old: &str, new: &str) {
        if let Some(entry) = self.entries.remove(old) {
            self.entries.insert(new.to_string(), entry);
        }
    }

    pub fn is_remote(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|e| e.is_remote)
    }
}
