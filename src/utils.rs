use crate::errors::{CascadeError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Atomic file operations to prevent corruption during writes
///
/// No lock file is taken. Concurrent writers resolve as last-writer-wins,
/// never as a torn file.
pub mod atomic_file {
    use super::*;

    /// Write JSON data to a file atomically using a temporary file + rename strategy
    pub fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| CascadeError::persistence(format!("Failed to serialize data: {e}")))?;

        write_string(path, &content)
    }

    /// Write string content to a file atomically using a temporary file + rename strategy
    pub fn write_string(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    CascadeError::persistence(format!(
                        "Failed to create directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        // The temporary file must live in the target's directory for rename to be atomic
        let temp_path = temp_path_for(path);

        if let Err(e) = fs::write(&temp_path, content) {
            let _ = fs::remove_file(&temp_path);
            return Err(CascadeError::persistence(format!(
                "Failed to write temporary file: {e}"
            )));
        }

        atomic_rename(&temp_path, path)
    }

    fn temp_path_for(path: &Path) -> PathBuf {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cascade".to_string());
        path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()))
    }

    /// Platform-specific atomic rename operation
    #[cfg(windows)]
    fn atomic_rename(temp_path: &Path, final_path: &Path) -> Result<()> {
        const MAX_RETRIES: u32 = 3;
        const RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(100);

        for attempt in 1..=MAX_RETRIES {
            match fs::rename(temp_path, final_path) {
                Ok(()) => return Ok(()),
                Err(e) if attempt == MAX_RETRIES => {
                    let _ = fs::remove_file(temp_path);
                    return Err(CascadeError::persistence(format!(
                        "Failed to finalize file write after {MAX_RETRIES} attempts on Windows: {e}"
                    )));
                }
                Err(_) => std::thread::sleep(RETRY_DELAY),
            }
        }

        Ok(())
    }

    #[cfg(not(windows))]
    fn atomic_rename(temp_path: &Path, final_path: &Path) -> Result<()> {
        fs::rename(temp_path, final_path).map_err(|e| {
            let _ = fs::remove_file(temp_path);
            CascadeError::persistence(format!("Failed to finalize file write: {e}"))
        })
    }
}

/// Path helpers shared by the worktree and rename logic
pub mod paths {
    use super::*;

    /// Sanitize a branch name into a single directory component
    pub fn sanitize_filename(name: &str) -> String {
        name.chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
                _ => '_',
            })
            .collect()
    }

    /// Canonicalize when the path exists, otherwise return it unchanged.
    ///
    /// Worktree paths recorded by older runs may point at directories that
    /// are gone, so comparison must not require existence.
    pub fn normalize(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
    }

    /// Compare two worktree paths after normalization
    pub fn same_location(a: &Path, b: &Path) -> bool {
        normalize(a) == normalize(b)
    }
}

/// Async utilities to prevent blocking operations
pub mod async_ops {
    use super::*;
    use tokio::task;

    /// Run the synchronous core (git, store, blocking HTTP bridge) off the async runtime
    pub async fn run_blocking<F, R>(operation: F) -> Result<R>
    where
        F: FnOnce() -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        task::spawn_blocking(operation)
            .await
            .map_err(|e| CascadeError::config(format!("Background task failed: {e}")))?
    }
}
