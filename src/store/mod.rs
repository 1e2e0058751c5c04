//! Persistent, versioned store of every repository's stacks and branch cache.
//!
//! One JSON document holds all repositories. Loading runs the migration chain
//! and writes the upgraded document back once; saving replaces the file
//! atomically.

pub mod migration;

pub use migration::{MigrationContext, CURRENT_VERSION};

use crate::config;
use crate::errors::{CascadeError, Result};
use crate::stack::cache::BranchCache;
use crate::stack::stack::{Branch, Stack};
use crate::utils::atomic_file;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The whole on-disk document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repos: BTreeMap<String, RepoState>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            updated_at: None,
            repos: BTreeMap::new(),
        }
    }
}

impl StoreDocument {
    /// State for `repo`, created empty on first use
    pub fn repo_mut(&mut self, repo: &str) -> &mut RepoState {
        self.repos.entry(repo.to_string()).or_default()
    }

    pub fn repo(&self, repo: &str) -> Option<&RepoState> {
        self.repos.get(repo)
    }

    /// Recompute every stack's derived branch list
    pub fn refresh(&mut self) {
        for repo in self.repos.values_mut() {
            repo.refresh();
        }
    }
}

/// Stacks (keyed by hash) and branch metadata of one repository
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoState {
    #[serde(default)]
    pub stacks: BTreeMap<String, Stack>,
    #[serde(default)]
    pub branches: BranchCache,
}

impl RepoState {
    pub fn refresh(&mut self) {
        for stack in self.stacks.values_mut() {
            stack.refresh(&self.branches);
        }
    }

    /// Hash of the stack whose tree contains `branch`
    pub fn stack_hash_for(&self, branch: &str) -> Option<String> {
        self.stacks
            .values()
            .find(|stack| stack.has_branch(branch))
            .map(|stack| stack.hash.clone())
    }

    pub fn stack_for_branch(&self, branch: &str) -> Option<&Stack> {
        self.stacks.values().find(|stack| stack.has_branch(branch))
    }

    pub fn stack_for_branch_mut(&mut self, branch: &str) -> Option<&mut Stack> {
        self.stacks.values_mut().find(|stack| stack.has_branch(branch))
    }

    pub fn is_tracked(&self, branch: &str) -> bool {
        self.stacks.values().any(|stack| stack.has_branch(branch))
    }

    /// Derived view of `branch`; valid after [`RepoState::refresh`]
    pub fn branch(&self, branch: &str) -> Option<&Branch> {
        self.stacks.values().find_map(|stack| stack.branch(branch))
    }

    /// Every tracked branch across all stacks
    pub fn all_branches(&self) -> impl Iterator<Item = &Branch> {
        self.stacks.values().flat_map(|stack| stack.branches.iter())
    }
}

/// File-backed handle to the store
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    legacy_cache_path: Option<PathBuf>,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            legacy_cache_path: None,
        }
    }

    /// Also adopt the pre-v2 standalone branch cache during migration
    pub fn with_legacy_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.legacy_cache_path = Some(path.into());
        self
    }

    /// Store at the default location under the configuration directory
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(config::store_path()?).with_legacy_cache(config::legacy_cache_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read, migrate and deserialize the document.
    ///
    /// A missing file yields an empty document at the current version. If any
    /// migration ran, the upgraded document is written back before returning;
    /// a failed migration writes nothing.
    pub fn load(&self) -> Result<StoreDocument> {
        if !self.path.exists() {
            debug!("No stack store at {}, starting empty", self.path.display());
            return Ok(StoreDocument::default());
        }

        let content = fs::read_to_string(&self.path)?;
        let raw: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            CascadeError::persistence(format!(
                "Stack store {} is not valid JSON: {e}",
                self.path.display()
            ))
        })?;

        let from_version = migration::document_version(&raw)?;
        let ctx = if from_version < CURRENT_VERSION {
            self.migration_context()?
        } else {
            MigrationContext::default()
        };

        let (migrated, changed) = migration::migrate(raw, &ctx)?;
        let mut document: StoreDocument = serde_json::from_value(migrated).map_err(|e| {
            CascadeError::persistence(format!(
                "Stack store {} has an unexpected shape: {e}",
                self.path.display()
            ))
        })?;

        if changed {
            info!(
                "Migrated stack store from v{} to v{}",
                from_version, CURRENT_VERSION
            );
            self.save(&mut document)?;
        }

        document.refresh();
        Ok(document)
    }

    /// Stamp and atomically persist `document`
    pub fn save(&self, document: &mut StoreDocument) -> Result<()> {
        document.version = CURRENT_VERSION;
        document.updated_at = Some(Utc::now());
        atomic_file::write_json(&self.path, document)?;
        debug!("Saved stack store to {}", self.path.display());
        Ok(())
    }

    fn migration_context(&self) -> Result<MigrationContext> {
        let legacy_cache = match &self.legacy_cache_path {
            Some(path) if path.exists() => {
                let content = fs::read_to_string(path)?;
                let value = serde_json::from_str(&content).map_err(|e| {
                    CascadeError::persistence(format!(
                        "Legacy branch cache {} is not valid JSON: {e}",
                        path.display()
                    ))
                })?;
                Some(value)
            }
            _ => None,
        };
        Ok(MigrationContext { legacy_cache })
    }
}
