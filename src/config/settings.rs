use crate::errors::{CascadeError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub worktrees: WorktreeConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitbucket: Option<BitbucketConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Base branch used when no parent is given
    pub default_branch: String,
    /// Remote whose refs count as "upstream"
    pub remote: String,
    /// Fetch before syncing
    pub fetch_before_sync: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorktreeConfig {
    /// Directory new worktrees are created under
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitbucketConfig {
    pub url: String,
    pub project: String,
    pub repo: String,
    pub username: Option<String>,
    pub token: Option<String>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            default_branch: "main".to_string(),
            remote: "origin".to_string(),
            fetch_before_sync: true,
        }
    }
}

impl Settings {
    /// Load settings from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| CascadeError::config(format!("Failed to read config file: {e}")))?;

        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| CascadeError::config(format!("Failed to parse config file: {e}")))?;

        Ok(settings)
    }

    /// Save settings to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        crate::utils::atomic_file::write_json(path, self)
    }

    /// The directory new worktrees go in; it must be configured and exist
    pub fn worktree_base_dir(&self) -> Result<PathBuf> {
        let dir = self.worktrees.base_dir.clone().ok_or_else(|| {
            CascadeError::config(
                "No worktree base directory configured (set worktrees.base_dir)",
            )
        })?;

        if !dir.is_dir() {
            return Err(CascadeError::config(format!(
                "Worktree base directory '{}' does not exist",
                dir.display()
            )));
        }

        Ok(dir)
    }

    /// Update a configuration value by key
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() != 2 {
            return Err(CascadeError::config(format!(
                "Invalid config key format: {key}"
            )));
        }

        match (parts[0], parts[1]) {
            ("git", "default_branch") => self.git.default_branch = value.to_string(),
            ("git", "remote") => self.git.remote = value.to_string(),
            ("git", "fetch_before_sync") => {
                self.git.fetch_before_sync = value
                    .parse()
                    .map_err(|_| CascadeError::config(format!("Invalid boolean value: {value}")))?;
            }
            ("worktrees", "base_dir") => {
                self.worktrees.base_dir = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            ("bitbucket", field) => {
                let bitbucket = self.bitbucket.get_or_insert_with(|| BitbucketConfig {
                    url: String::new(),
                    project: String::new(),
                    repo: String::new(),
                    username: None,
                    token: None,
                });
                match field {
                    "url" => bitbucket.url = value.to_string(),
                    "project" => bitbucket.project = value.to_string(),
                    "repo" => bitbucket.repo = value.to_string(),
                    "username" => bitbucket.username = Some(value.to_string()),
                    "token" => bitbucket.token = Some(value.to_string()),
                    _ => return Err(CascadeError::config(format!("Unknown config key: {key}"))),
                }
            }
            _ => return Err(CascadeError::config(format!("Unknown config key: {key}"))),
        }

        Ok(())
    }

    /// Get a configuration value by key
    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() != 2 {
            return Err(CascadeError::config(format!(
                "Invalid config key format: {key}"
            )));
        }

        let value = match (parts[0], parts[1]) {
            ("git", "default_branch") => self.git.default_branch.clone(),
            ("git", "remote") => self.git.remote.clone(),
            ("git", "fetch_before_sync") => self.git.fetch_before_sync.to_string(),
            ("worktrees", "base_dir") => self
                .worktrees
                .base_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            ("bitbucket", field) => {
                let Some(bitbucket) = &self.bitbucket else {
                    return Ok(String::new());
                };
                match field {
                    "url" => bitbucket.url.clone(),
                    "project" => bitbucket.project.clone(),
                    "repo" => bitbucket.repo.clone(),
                    "username" => bitbucket.username.clone().unwrap_or_default(),
                    // Never echo secrets back
                    "token" => bitbucket
                        .token
                        .as_ref()
                        .map(|_| "********".to_string())
                        .unwrap_or_default(),
                    _ => return Err(CascadeError::config(format!("Unknown config key: {key}"))),
                }
            }
            _ => return Err(CascadeError::config(format!("Unknown config key: {key}"))),
        };

        Ok(value)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.git.default_branch.trim().is_empty() {
            return Err(CascadeError::config("git.default_branch must not be empty"));
        }

        if self.git.remote.trim().is_empty() {
            return Err(CascadeError::config("git.remote must not be empty"));
        }

        if let Some(bitbucket) = &self.bitbucket {
            url::Url::parse(&bitbucket.url).map_err(|e| {
                CascadeError::config(format!("Invalid Bitbucket URL '{}': {e}", bitbucket.url))
            })?;
            if bitbucket.project.is_empty() || bitbucket.repo.is_empty() {
                return Err(CascadeError::config(
                    "Bitbucket project and repo must both be set",
                ));
            }
        }

        Ok(())
    }
}
