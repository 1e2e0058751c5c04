use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structural parent→child relationships of one stack.
///
/// The value held by a [`Stack`](super::Stack) is the forest of top-level
/// nodes; the stack's root branch is not itself a node. Children are kept in a
/// `BTreeMap`, so every walk visits siblings in lexicographic order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchTree {
    children: BTreeMap<String, BranchTree>,
}

impl BranchTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct children of this node, keyed by branch name
    pub fn nodes(&self) -> &BTreeMap<String, BranchTree> {
        &self.children
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of branches in the whole tree
    pub fn len(&self) -> usize {
        self.children.values().map(|child| 1 + child.len()).sum()
    }

    /// Insert `branch` as a new leaf under `parent`.
    ///
    /// Returns `false` without changing anything when `parent` is neither the
    /// root nor a node of this tree.
    pub fn add(&mut self, branch: &str, parent: &str, root: &str) -> bool {
        self.add_subtree(branch, BranchTree::new(), parent, root)
    }

    /// Insert `branch` with an existing set of descendants under `parent`
    pub fn add_subtree(
        &mut self,
        branch: &str,
        subtree: BranchTree,
        parent: &str,
        root: &str,
    ) -> bool {
        if parent.is_empty() || parent == root {
            self.children.insert(branch.to_string(), subtree);
            return true;
        }

        match self.find_node_mut(parent) {
            Some(node) => {
                node.children.insert(branch.to_string(), subtree);
                true
            }
            None => false,
        }
    }

    /// Delete one node, splicing its children into its former slot
    pub fn remove(&mut self, branch: &str) -> bool {
        let Some(siblings) = self.containing_map_mut(branch) else {
            return false;
        };

        if let Some(removed) = siblings.remove(branch) {
            siblings.extend(removed.children);
            true
        } else {
            false
        }
    }

    /// Remove and return a node together with all of its descendants
    pub fn extract_subtree(&mut self, branch: &str) -> Option<BranchTree> {
        self.containing_map_mut(branch)?.remove(branch)
    }

    /// Move `branch` (children still attached) under `new_parent`.
    ///
    /// An empty `new_parent` or the root makes it a top-level node. Refuses a
    /// parent that is unknown or inside the moved subtree.
    pub fn reparent(&mut self, branch: &str, new_parent: &str, root: &str) -> bool {
        if !self.has_branch(branch) || branch == new_parent {
            return false;
        }

        let to_top_level = new_parent.is_empty() || new_parent == root;
        if !to_top_level
            && (!self.has_branch(new_parent)
                || self.descendants(branch).iter().any(|d| d == new_parent))
        {
            return false;
        }

        match self.extract_subtree(branch) {
            Some(subtree) => self.add_subtree(branch, subtree, new_parent, root),
            None => false,
        }
    }

    /// Structural parent of `branch`: the root for top-level nodes
    pub fn find_parent(&self, branch: &str, root: &str) -> Option<String> {
        if self.children.contains_key(branch) {
            return Some(root.to_string());
        }
        self.find_parent_inner(branch)
    }

    fn find_parent_inner(&self, branch: &str) -> Option<String> {
        for (name, node) in &self.children {
            if node.children.contains_key(branch) {
                return Some(name.clone());
            }
            if let Some(found) = node.find_parent_inner(branch) {
                return Some(found);
            }
        }
        None
    }

    /// Direct children of `branch` (or the top-level nodes for the root), sorted
    pub fn children(&self, branch: &str, root: &str) -> Vec<String> {
        if branch == root {
            return self.children.keys().cloned().collect();
        }
        self.find_node(branch)
            .map(|node| node.children.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_branch(&self, branch: &str) -> bool {
        self.find_node(branch).is_some()
    }

    /// Replace a node's key, keeping its children and its parent
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return self.has_branch(old);
        }
        if self.has_branch(new) {
            return false;
        }

        let Some(siblings) = self.containing_map_mut(old) else {
            return false;
        };
        match siblings.remove(old) {
            Some(node) => {
                siblings.insert(new.to_string(), node);
                true
            }
            None => false,
        }
    }

    /// All branch names in depth-first pre-order
    pub fn branch_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.fill_names(&mut names);
        names
    }

    /// Every descendant of `branch`, pre-order, excluding `branch` itself
    pub fn descendants(&self, branch: &str) -> Vec<String> {
        self.find_node(branch)
            .map(|node| node.branch_names())
            .unwrap_or_default()
    }

    fn fill_names(&self, names: &mut Vec<String>) {
        for (name, node) in &self.children {
            names.push(name.clone());
            node.fill_names(names);
        }
    }

    fn find_node(&self, branch: &str) -> Option<&BranchTree> {
        if let Some(node) = self.children.get(branch) {
            return Some(node);
        }
        self.children
            .values()
            .find_map(|child| child.find_node(branch))
    }

    fn find_node_mut(&mut self, branch: &str) -> Option<&mut BranchTree> {
        if self.children.contains_key(branch) {
            return self.children.get_mut(branch);
        }
        self.children
            .values_mut()
            .find_map(|child| child.find_node_mut(branch))
    }

    /// The sibling map that holds `branch` as a key
    fn containing_map_mut(&mut self, branch: &str) -> Option<&mut BTreeMap<String, BranchTree>> {
        if self.children.contains_key(branch) {
            return Some(&mut self.children);
        }
        self.children
            .values_mut()
            .find_map(|child| child.containing_map_mut(branch))
    }
}
