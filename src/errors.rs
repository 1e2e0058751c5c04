use std::path::PathBuf;

/// Cascade Error Types
#[derive(Debug, thiserror::Error)]
pub enum CascadeError {
    /// A branch, stack or parent that the operation needs does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The branch is already part of a stack in this repository
    #[error("Branch '{0}' is already tracked")]
    AlreadyTracked(String),

    /// Deleting a branch that still has children without forcing
    #[error("Branch '{branch}' has children: {}", children.join(", "))]
    HasChildren {
        branch: String,
        children: Vec<String>,
    },

    /// Moving a branch under one of its own descendants
    #[error("Moving '{branch}' onto '{new_parent}' would create a cycle")]
    CycleDetected { branch: String, new_parent: String },

    /// A rebase stopped on conflicts that need manual resolution
    #[error("Rebase of '{branch}' stopped on conflicts in {}", worktree.display())]
    RebaseConflict { branch: String, worktree: PathBuf },

    /// A rebase failed for a reason other than a conflict
    #[error("Rebase error: {0}")]
    RebaseFailed(String),

    /// Reading, migrating or writing the stack store failed
    #[error("Persistence error: {0}")]
    PersistenceFailed(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    /// Git-related errors
    #[error("Git error: {0}")]
    Git(String),

    /// Hosting API errors
    #[error("Hosting API error: {0}")]
    Hosting(String),
}

impl CascadeError {
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        CascadeError::NotFound(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        CascadeError::InvalidConfiguration(msg.into())
    }

    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        CascadeError::PersistenceFailed(msg.into())
    }

    pub fn git<S: Into<String>>(msg: S) -> Self {
        CascadeError::Git(msg.into())
    }

    pub fn rebase<S: Into<String>>(msg: S) -> Self {
        CascadeError::RebaseFailed(msg.into())
    }

    pub fn hosting<S: Into<String>>(msg: S) -> Self {
        CascadeError::Hosting(msg.into())
    }
}

impl From<std::io::Error> for CascadeError {
    fn from(e: std::io::Error) -> Self {
        CascadeError::PersistenceFailed(format!("I/O error: {e}"))
    }
}

impl From<serde_json::Error> for CascadeError {
    fn from(e: serde_json::Error) -> Self {
        CascadeError::PersistenceFailed(format!("JSON error: {e}"))
    }
}

impl From<git2::Error> for CascadeError {
    fn from(e: git2::Error) -> Self {
        CascadeError::Git(e.message().to_string())
    }
}

impl From<reqwest::Error> for CascadeError {
    fn from(e: reqwest::Error) -> Self {
        CascadeError::Hosting(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CascadeError>;
