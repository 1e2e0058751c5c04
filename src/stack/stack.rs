use super::cache::BranchCache;
use super::tree::BranchTree;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;

/// Number of hex characters kept from the identity digest
const HASH_LEN: usize = 12;

/// One chain of dependent branches rooted at a base branch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stack {
    /// Human-readable name; follows renames of the branch it was named after
    pub name: String,
    /// Stable identifier, fixed at creation
    pub hash: String,
    /// Base branch the stack is built on (not a node of `tree`)
    pub root: String,
    pub tree: BranchTree,
    /// Flattened view, recomputed from `tree` + cache; never persisted
    #[serde(skip)]
    pub branches: Vec<Branch>,
}

/// A tracked branch as seen through its stack and the branch cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Branch {
    pub name: String,
    /// Nearest ancestor that is not merged (possibly the root); used for git operations
    pub parent: String,
    /// Literal tree parent; used for display and ordering
    pub base_branch: String,
    pub stack_hash: String,
    pub worktree_path: Option<PathBuf>,
    pub pr_number: Option<u64>,
    pub pr_url: Option<String>,
    pub is_remote: bool,
    pub is_merged: bool,
}

impl Branch {
    /// Whether this branch has been moved off its structural parent
    pub fn is_reparented(&self) -> bool {
        self.parent != self.base_branch
    }
}

impl Stack {
    /// Create an empty stack on `root`, identified by `hash`
    pub fn new(name: String, hash: String, root: String) -> Self {
        Self {
            name,
            hash,
            root,
            tree: BranchTree::new(),
            branches: Vec::new(),
        }
    }

    /// Rebuild the derived branch list from the tree and the cache
    pub fn refresh(&mut self, cache: &BranchCache) {
        self.branches = self.flatten(cache);
    }

    /// Derived view of the branch, if `refresh` has run since the last mutation
    pub fn branch(&self, name: &str) -> Option<&Branch> {
        self.branches.iter().find(|b| b.name == name)
    }

    pub fn has_branch(&self, name: &str) -> bool {
        self.tree.has_branch(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Pre-order walk producing one [`Branch`] per node.
    ///
    /// Merged branches are emitted but are transparent to their children's
    /// effective parent.
    pub fn flatten(&self, cache: &BranchCache) -> Vec<Branch> {
        let mut out = Vec::with_capacity(self.tree.len());
        self.flatten_into(&self.tree, &self.root, &self.root, cache, &mut out);
        out
    }

    fn flatten_into(
        &self,
        node: &BranchTree,
        tree_parent: &str,
        effective_parent: &str,
        cache: &BranchCache,
        out: &mut Vec<Branch>,
    ) {
        for (name, children) in node.nodes() {
            let entry = cache.get(name).cloned().unwrap_or_default();

            let child_effective_parent = if entry.is_merged {
                effective_parent
            } else {
                name.as_str()
            };

            out.push(Branch {
                name: name.clone(),
                parent: effective_parent.to_string(),
                base_branch: tree_parent.to_string(),
                stack_hash: self.hash.clone(),
                worktree_path: entry.worktree_path,
                pr_number: entry.pr_number,
                pr_url: entry.pr_url,
                is_remote: entry.is_remote,
                is_merged: entry.is_merged,
            });

            self.flatten_into(children, name, child_effective_parent, cache, out);
        }
    }
}

/// Stable identifier for a stack created on `root` for `canonical_name`.
///
/// `attempt` disambiguates collisions with existing stacks.
pub fn stack_hash(root: &str, canonical_name: &str, attempt: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.as_bytes());
    hasher.update(b":");
    hasher.update(canonical_name.as_bytes());
    if attempt > 0 {
        hasher.update(format!("#{attempt}").as_bytes());
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..HASH_LEN].to_string()
}

/// First hash for (`root`, `name`) not rejected by `taken`
pub fn unique_stack_hash(root: &str, name: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut attempt = 0;
    loop {
        let hash = stack_hash(root, name, attempt);
        if !taken(&hash) {
            return hash;
        }
        attempt += 1;
    }
}

/// Reorder a flat branch list so that every branch follows its ancestor.
///
/// A branch groups under its `base_branch` when that branch is in the list,
/// otherwise under its `parent`; branches with neither present seed the walk.
/// The walk is breadth-first and stable with respect to the input order.
pub fn sort_topologically(branches: &[Branch]) -> Vec<Branch> {
    let present: HashMap<&str, usize> = branches
        .iter()
        .enumerate()
        .map(|(i, b)| (b.name.as_str(), i))
        .collect();

    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();

    for (index, branch) in branches.iter().enumerate() {
        let anchor = [branch.base_branch.as_str(), branch.parent.as_str()]
            .into_iter()
            .find(|candidate| *candidate != branch.name && present.contains_key(candidate));

        match anchor {
            Some(anchor) => groups.entry(anchor).or_default().push(index),
            None => roots.push(index),
        }
    }

    let mut visited: HashSet<usize> = HashSet::new();
    let mut queue: VecDeque<usize> = roots.into_iter().collect();
    let mut ordered = Vec::with_capacity(branches.len());

    while let Some(index) = queue.pop_front() {
        if !visited.insert(index) {
            continue;
        }
        ordered.push(branches[index].clone());
        if let Some(children) = groups.get(branches[index].name.as_str()) {
            queue.extend(children.iter().copied());
        }
    }

    // Only reachable with malformed hierarchy (e.g. two branches anchored on each other)
    for (index, branch) in branches.iter().enumerate() {
        if !visited.contains(&index) {
            ordered.push(branch.clone());
        }
    }

    ordered
}
