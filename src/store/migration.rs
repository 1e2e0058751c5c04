//! Schema migrations for the stack store.
//!
//! Each step is a pure transform of the raw JSON document from version `i` to
//! `i + 1`. Steps are applied in order and never skipped.

use crate::errors::{CascadeError, Result};
use crate::stack::cache::BranchEntry;
use crate::stack::stack::unique_stack_hash;
use crate::stack::tree::BranchTree;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use tracing::debug;

/// Version written by this build
pub const CURRENT_VERSION: u64 = 2;

/// Inputs a migration may need beyond the document itself
#[derive(Debug, Default, Clone)]
pub struct MigrationContext {
    /// Pre-v2 standalone branch cache: `{ "<repo path>": { "<branch>": entry } }`
    pub legacy_cache: Option<Value>,
}

type Migration = fn(Value, &MigrationContext) -> Result<Value>;

/// Indexed by source version
const MIGRATIONS: [Migration; CURRENT_VERSION as usize] = [migrate_v0_to_v1, migrate_v1_to_v2];

/// Schema version of a raw document; documents without one are version 0
pub fn document_version(doc: &Value) -> Result<u64> {
    match doc.get("version") {
        None | Some(Value::Null) => Ok(0),
        Some(v) => v.as_u64().ok_or_else(|| {
            CascadeError::persistence(format!("Store version is not a non-negative integer: {v}"))
        }),
    }
}

/// Bring `doc` up to [`CURRENT_VERSION`]; the flag reports whether anything ran
pub fn migrate(mut doc: Value, ctx: &MigrationContext) -> Result<(Value, bool)> {
    let mut version = document_version(&doc)?;

    if version > CURRENT_VERSION {
        return Err(CascadeError::persistence(format!(
            "Store version {version} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    if version == CURRENT_VERSION {
        return Ok((doc, false));
    }

    while version < CURRENT_VERSION {
        debug!("Migrating stack store from v{} to v{}", version, version + 1);
        doc = MIGRATIONS[version as usize](doc, ctx)?;
        version += 1;
    }

    Ok((doc, true))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyStack {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    branches: Vec<LegacyBranch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyBranch {
    name: String,
    parent: String,
    #[serde(default)]
    worktree_path: Option<String>,
    #[serde(default)]
    pr_number: Option<u64>,
    #[serde(default)]
    pr_url: Option<String>,
    #[serde(default)]
    is_merged: bool,
    #[serde(default)]
    is_remote: bool,
}

impl LegacyBranch {
    fn entry(&self) -> BranchEntry {
        BranchEntry {
            worktree_path: self
                .worktree_path
                .as_deref()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            pr_number: self.pr_number,
            pr_url: self.pr_url.clone().filter(|u| !u.is_empty()),
            is_merged: self.is_merged,
            is_remote: self.is_remote,
        }
    }
}

fn object_field<'a>(value: &'a Value, field: &str, context: &str) -> Result<Option<&'a Map<String, Value>>> {
    match value.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(CascadeError::persistence(format!(
            "Malformed {context}: '{field}' must be an object, found {other}"
        ))),
    }
}

/// v0 stored each stack as a flat list of `{name, parent, ...metadata}` records
fn migrate_v0_to_v1(doc: Value, _ctx: &MigrationContext) -> Result<Value> {
    if !doc.is_object() {
        return Err(CascadeError::persistence("Store document is not a JSON object"));
    }

    let mut repos_out = Map::new();

    for (repo_path, repo) in object_field(&doc, "repos", "store")?.into_iter().flatten() {
        let mut stacks_out = Map::new();
        let mut branches_out: BTreeMap<String, BranchEntry> = BTreeMap::new();
        let mut owners: BTreeMap<String, String> = BTreeMap::new();

        for (key, raw_stack) in object_field(repo, "stacks", "repository")?.into_iter().flatten() {
            let legacy: LegacyStack = serde_json::from_value(raw_stack.clone()).map_err(|e| {
                CascadeError::persistence(format!("Malformed v0 stack '{key}' in {repo_path}: {e}"))
            })?;

            if legacy.branches.is_empty() {
                continue;
            }

            let name = legacy.name.clone().unwrap_or_else(|| key.clone());
            let (root, tree) = build_tree(&name, &legacy.branches)?;

            for branch in &legacy.branches {
                if let Some(owner) = owners.insert(branch.name.clone(), key.clone()) {
                    return Err(CascadeError::persistence(format!(
                        "Branch '{}' in {repo_path} belongs to both legacy stacks '{owner}' and '{key}'",
                        branch.name
                    )));
                }
                branches_out.insert(branch.name.clone(), branch.entry());
            }

            // Names may repeat across legacy stacks; keys cannot
            stacks_out.insert(
                key.clone(),
                json!({ "name": name, "root": root, "tree": tree }),
            );
        }

        repos_out.insert(
            repo_path.clone(),
            json!({ "stacks": stacks_out, "branches": branches_out }),
        );
    }

    Ok(json!({ "version": 1, "repos": repos_out }))
}

/// Infer the root and build the tree for one legacy stack
fn build_tree(stack: &str, branches: &[LegacyBranch]) -> Result<(String, BranchTree)> {
    let names: HashSet<&str> = branches.iter().map(|b| b.name.as_str()).collect();

    let roots: BTreeSet<&str> = branches
        .iter()
        .map(|b| b.parent.as_str())
        .filter(|parent| !names.contains(parent))
        .collect();

    let root = match roots.len() {
        1 => roots.into_iter().next().unwrap_or_default().to_string(),
        0 => {
            return Err(CascadeError::persistence(format!(
                "Cannot infer root of legacy stack '{stack}': every parent is itself a branch"
            )))
        }
        _ => {
            return Err(CascadeError::persistence(format!(
                "Cannot infer root of legacy stack '{stack}': several candidates ({})",
                roots.into_iter().collect::<Vec<_>>().join(", ")
            )))
        }
    };

    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for branch in branches {
        adjacency
            .entry(branch.parent.as_str())
            .or_default()
            .push(branch.name.as_str());
    }

    fn build(parent: &str, adjacency: &BTreeMap<&str, Vec<&str>>, seen: &mut HashSet<String>) -> BranchTree {
        let mut node = BranchTree::new();
        for child in adjacency.get(parent).into_iter().flatten() {
            if !seen.insert(child.to_string()) {
                continue;
            }
            let subtree = build(child, adjacency, seen);
            node.add_subtree(child, subtree, "", "");
        }
        node
    }

    let mut seen = HashSet::new();
    let tree = build(&root, &adjacency, &mut seen);

    if seen.len() != names.len() {
        return Err(CascadeError::persistence(format!(
            "Legacy stack '{stack}' has branches unreachable from root '{root}'"
        )));
    }

    Ok((root, tree))
}

/// v2 folds the standalone branch cache into the store and keys stacks by hash
fn migrate_v1_to_v2(doc: Value, ctx: &MigrationContext) -> Result<Value> {
    let mut repos: BTreeMap<String, Value> = object_field(&doc, "repos", "store")?
        .map(|m| m.clone().into_iter().collect())
        .unwrap_or_default();

    let legacy_repos = match &ctx.legacy_cache {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(CascadeError::persistence(format!(
                "Malformed legacy branch cache: expected an object, found {other}"
            )))
        }
    };

    for repo_path in legacy_repos.keys() {
        repos
            .entry(repo_path.clone())
            .or_insert_with(|| json!({ "stacks": {}, "branches": {} }));
    }

    let mut repos_out = Map::new();

    for (repo_path, repo) in repos {
        let mut branches: BTreeMap<String, BranchEntry> = match repo.get("branches") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
                CascadeError::persistence(format!("Malformed branch cache for {repo_path}: {e}"))
            })?,
        };

        if let Some(raw) = legacy_repos.get(&repo_path) {
            let legacy: BTreeMap<String, LegacyCacheEntry> = serde_json::from_value(raw.clone())
                .map_err(|e| {
                    CascadeError::persistence(format!(
                        "Malformed legacy branch cache for {repo_path}: {e}"
                    ))
                })?;
            for (name, entry) in legacy {
                // Existing entries win
                branches.entry(name).or_insert_with(|| entry.into_entry());
            }
        }

        let raw_stacks = object_field(&repo, "stacks", "repository")?;

        let mut taken: HashSet<String> = HashSet::new();
        for (key, stack) in raw_stacks.into_iter().flatten() {
            if let Some(existing) = stack.get("hash").and_then(Value::as_str) {
                if !existing.is_empty() && !taken.insert(existing.to_string()) {
                    return Err(CascadeError::persistence(format!(
                        "Stack '{key}' in {repo_path} reuses hash '{existing}'"
                    )));
                }
            }
        }

        let mut stacks_out = Map::new();
        for (key, stack) in raw_stacks.into_iter().flatten() {
            let name = stack
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(key)
                .to_string();
            let root = stack
                .get("root")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    CascadeError::persistence(format!("Stack '{key}' in {repo_path} has no root"))
                })?
                .to_string();
            let tree = stack.get("tree").cloned().unwrap_or_else(|| json!({}));
            serde_json::from_value::<BranchTree>(tree.clone()).map_err(|e| {
                CascadeError::persistence(format!("Malformed tree for stack '{key}': {e}"))
            })?;

            let hash = match stack.get("hash").and_then(Value::as_str) {
                Some(existing) if !existing.is_empty() => existing.to_string(),
                _ => {
                    let hash = unique_stack_hash(&root, &name, |h| taken.contains(h));
                    taken.insert(hash.clone());
                    hash
                }
            };

            stacks_out.insert(
                hash.clone(),
                json!({ "name": name, "hash": hash, "root": root, "tree": tree }),
            );
        }

        repos_out.insert(
            repo_path,
            json!({ "stacks": stacks_out, "branches": branches }),
        );
    }

    Ok(json!({ "version": 2, "repos": repos_out }))
}

/// Legacy cache records used an empty string for "no worktree"
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyCacheEntry {
    #[serde(default)]
    worktree_path: Option<String>,
    #[serde(default)]
    pr_number: Option<u64>,
    #[serde(default)]
    pr_url: Option<String>,
    #[serde(default)]
    is_merged: bool,
    #[serde(default)]
    is_remote: bool,
}

impl LegacyCacheEntry {
    fn into_entry(self) -> BranchEntry {
        BranchEntry {
            worktree_path: self.worktree_path.filter(|p| !p.is_empty()).map(PathBuf::from),
            pr_number: self.pr_number,
            pr_url: self.pr_url.filter(|u| !u.is_empty()),
            is_merged: self.is_merged,
            is_remote: self.is_remote,
        }
    }
}
